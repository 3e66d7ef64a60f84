//! Error types for oppctl

use std::path::PathBuf;

use opp_gen2_platform::PlatformError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("No serial ports given; pass --port or list them in the config file")]
    NoPorts,

    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to open serial port {port}: {source}")]
    Serial {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoPorts | Self::ConfigNotFound(_) | Self::YamlError(_) => 2,
            Self::Serial { .. } => 3,
            Self::Platform(err) if err.is_fatal() => 4,
            Self::Platform(_) => 5,
            Self::IoError(_) | Self::JsonError(_) => 1,
        }
    }
}
