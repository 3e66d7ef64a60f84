//! Platform error types.

use opp_gen2_protocol::{FirmwareVersion, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("No response from OPP hardware on chain {chain} after {attempts} probes")]
    NoResponse { chain: String, attempts: u32 },

    #[error("Timed out after {timeout_ms}ms waiting for the {step} response on chain {chain}")]
    Timeout {
        chain: String,
        step: &'static str,
        timeout_ms: u64,
    },

    #[error("Firmware on chain {chain} is too old: requires {required}, found {found}")]
    FirmwareTooOld {
        chain: String,
        required: FirmwareVersion,
        found: FirmwareVersion,
    },

    #[error("Board {addr:#04x} on chain {chain} runs pre-release firmware {version}; update the board firmware")]
    PreReleaseFirmware {
        chain: String,
        addr: u8,
        version: FirmwareVersion,
    },

    #[error("Malformed {step} response on chain {chain}: {detail}")]
    MalformedResponse {
        chain: String,
        step: &'static str,
        detail: String,
    },

    #[error("Chain {0} closed")]
    ChainClosed(String),

    #[error("Chain {0} is not connected")]
    NotConnected(String),

    #[error("Chain {0} is already connected")]
    AlreadyConnected(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No OPP {kind} with number {number}")]
    UnknownChannel { kind: &'static str, number: String },

    #[error("Invalid switch {switch} for driver {driver}: {reason}")]
    SwitchCoilMismatch {
        switch: String,
        driver: String,
        reason: &'static str,
    },

    #[error("Not supported by OPP hardware: {0}")]
    Unsupported(&'static str),

    #[error("No tokio runtime available to start the {0}")]
    NoRuntime(&'static str),
}

impl PlatformError {
    /// Whether the error means the chain cannot be used at all.
    ///
    /// Handshake and transport failures are fatal. Configuration errors only
    /// reject the offending request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::NoResponse { .. }
                | Self::Timeout { .. }
                | Self::FirmwareTooOld { .. }
                | Self::PreReleaseFirmware { .. }
                | Self::MalformedResponse { .. }
                | Self::ChainClosed(_)
        )
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
