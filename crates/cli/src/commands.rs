//! Command implementations for oppctl

use std::path::Path;
use std::sync::Arc;

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use opp_gen2_platform::{
    CoilConfig, DriverPlatform, OppConfig, OppPlatform, SwitchPlatform, SwitchStateTracker,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use crate::Cli;
use crate::error::CliError;
use crate::output::{self, BoardReport, ChainReport};

/// Ignores switch edges.
struct QuietTracker;

impl SwitchStateTracker for QuietTracker {
    fn process_switch_by_num(&self, _number: &str, _state: u8, _platform: &OppPlatform) {}
}

/// Prints every switch edge as it arrives.
struct PrintTracker {
    json: bool,
}

impl SwitchStateTracker for PrintTracker {
    fn process_switch_by_num(&self, number: &str, state: u8, _platform: &OppPlatform) {
        output::print_edge(number, state, self.json);
    }
}

/// Loads the platform configuration. Ports given on the command line replace
/// the ones in the file. Each port is also aliased by its index.
pub fn load_config(path: Option<&Path>, ports: &[String]) -> Result<OppConfig, CliError> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::ConfigNotFound(path.to_path_buf()));
            }
            let text = std::fs::read_to_string(path)?;
            serde_yaml::from_str::<OppConfig>(&text)?
        }
        None => OppConfig::default(),
    };
    if !ports.is_empty() {
        config.ports = ports.to_vec();
    }
    if config.ports.is_empty() {
        return Err(CliError::NoPorts);
    }
    config.add_index_aliases();
    config.validate()?;
    Ok(config)
}

/// Opens every configured port and runs the handshake on it. Each chain is
/// identified by its port name.
async fn connect(
    config: OppConfig,
    tracker: Arc<dyn SwitchStateTracker>,
) -> Result<OppPlatform, CliError> {
    let ports = config.ports.clone();
    let baud = config.baud;
    let platform = OppPlatform::new(config, tracker)?;
    for port in &ports {
        info!(port, baud, "opening chain");
        let stream = tokio_serial::new(port, baud)
            .open_native_async()
            .map_err(|source| CliError::Serial {
                port: port.clone(),
                source,
            })?;
        if let Err(err) = platform.connect(port, stream).await {
            platform.stop().await;
            return Err(err.into());
        }
    }
    Ok(platform)
}

pub async fn probe(config: OppConfig, json: bool) -> Result<(), CliError> {
    let platform = connect(config, Arc::new(QuietTracker)).await?;
    let reports: Vec<ChainReport> = platform
        .chains()
        .into_iter()
        .map(|chain| ChainReport {
            firmware: platform.firmware_version(&chain).map(|v| v.to_string()),
            boards: platform
                .boards(&chain)
                .iter()
                .map(BoardReport::from)
                .collect(),
            cards: platform.card_counts(&chain).into(),
            chain,
        })
        .collect();
    platform.stop().await;
    output::print_probe(&reports, json)
}

pub async fn switches(config: OppConfig, json: bool) -> Result<(), CliError> {
    let platform = connect(config, Arc::new(QuietTracker)).await?;
    let states = platform.get_hw_switch_states();
    platform.stop().await;
    output::print_switches(&states, json)
}

pub async fn watch(config: OppConfig, json: bool) -> Result<(), CliError> {
    let platform = connect(config, Arc::new(PrintTracker { json })).await?;
    platform.initialize()?;
    info!("watching switches, press Ctrl-C to stop");
    let result = tokio::signal::ctrl_c().await;
    let crc_errors = platform.bad_crc_count();
    platform.stop().await;
    result?;
    if crc_errors > 0 {
        info!(crc_errors, "records dropped for bad CRC");
    }
    Ok(())
}

pub async fn pulse(
    config: OppConfig,
    coil: &str,
    pulse_ms: Option<u8>,
    json: bool,
) -> Result<(), CliError> {
    let platform = connect(config, Arc::new(QuietTracker)).await?;
    let result = pulse_coil(&platform, coil, pulse_ms).await;
    platform.stop().await;
    let number = result?;
    output::print_success(&format!("Pulsed coil {number}"), json)
}

async fn pulse_coil(
    platform: &OppPlatform,
    coil: &str,
    pulse_ms: Option<u8>,
) -> Result<String, CliError> {
    let driver = platform.configure_driver(&CoilConfig {
        pulse_ms,
        ..CoilConfig::new(coil)
    })?;
    driver.pulse(None)?;
    platform.drain().await?;
    Ok(driver.number())
}

/// Writes a completion script for `shell` to stdout.
pub fn completion(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "oppctl", &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use opp_gen2_platform::channel::ChannelResolver;
    use std::io::Write;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_load_config_from_yaml() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "ports: [/dev/ttyACM0, /dev/ttyACM1]")?;
        writeln!(file, "poll_hz: 50")?;
        writeln!(file, "chains:")?;
        writeln!(file, "  left: /dev/ttyACM1")?;

        let config = load_config(Some(file.path()), &[])?;
        assert_eq!(config.ports, vec!["/dev/ttyACM0", "/dev/ttyACM1"]);
        assert_eq!(config.poll_hz, 50);
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.chains.get("left").map(String::as_str), Some("/dev/ttyACM1"));
        Ok(())
    }

    #[test]
    fn test_identifiers_resolve_to_port_chains() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "ports: [/dev/ttyACM0, /dev/ttyACM1]")?;
        writeln!(file, "chains:")?;
        writeln!(file, "  left: /dev/ttyACM1")?;

        let config = load_config(Some(file.path()), &[])?;
        assert_eq!(config.chains.get("0").map(String::as_str), Some("/dev/ttyACM0"));
        assert_eq!(config.chains.get("1").map(String::as_str), Some("/dev/ttyACM1"));

        let resolver = ChannelResolver::new(&config.chains, &config.ports);
        let key = resolver.resolve("switch", "1-0-3")?;
        assert_eq!(key.chain, "/dev/ttyACM1");
        assert_eq!(resolver.resolve("coil", "left-2-5")?.to_string(), "/dev/ttyACM1-2-5");
        assert_eq!(resolver.resolve("switch", "0-9")?.chain, "/dev/ttyACM0");
        Ok(())
    }

    #[test]
    fn test_command_line_ports_override_file() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "ports: [/dev/ttyACM0]")?;

        let config = load_config(Some(file.path()), &["/dev/ttyUSB3".to_string()])?;
        assert_eq!(config.ports, vec!["/dev/ttyUSB3"]);
        Ok(())
    }

    #[test]
    fn test_missing_ports_rejected() {
        assert!(matches!(load_config(None, &[]), Err(CliError::NoPorts)));
    }

    #[test]
    fn test_missing_config_file() {
        let result = load_config(Some(Path::new("/nonexistent/opp.yaml")), &[]);
        assert!(matches!(result, Err(CliError::ConfigNotFound(_))));
    }

    #[test]
    fn test_invalid_config_rejected() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "ports: [/dev/ttyACM0]")?;
        writeln!(file, "poll_hz: 0")?;

        let result = load_config(Some(file.path()), &[]);
        assert!(matches!(result, Err(CliError::Platform(_))));
        Ok(())
    }
}
