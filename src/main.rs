//! # GeoLinker Agent
//!
//! Runs one boot cycle of the tracker and hands control back to the reset
//! line or the process supervisor.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use geolinker_agent::agent::{Agent, AgentSettings};
use geolinker_agent::config::{Config, LoggingConfig};
use geolinker_agent::reset::ConfiguredReset;
use geolinker_agent::serial::SerialChannels;
use geolinker_agent::store::{FileStore, RecordStore};

/// Used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for the GeoLinker agent
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load and validate the configuration
///    - Set up logging (stderr, plus a file when configured)
///    - Open the persistent store image
///
/// 2. **One Cycle**
///    - The stored flag selects GPS acquisition or upload
///    - Serial channels are opened only by the phase that needs them
///
/// 3. **Reset**
///    - Pulse the reset line, or exit and let the supervisor restart us
///
/// Ctrl+C aborts the cycle without touching the store.
///
/// # Examples
///
/// ```bash
/// geolinker-agent /etc/geolinker/agent.toml
/// ```
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = config_path(std::env::args());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _guard = init_logging(&config.logging)?;

    info!("GeoLinker agent v{} starting...", env!("CARGO_PKG_VERSION"));

    let medium = FileStore::open(&config.store.path)
        .with_context(|| format!("Failed to open store {}", config.store.path))?;
    let store = RecordStore::new(medium);
    let channels = SerialChannels::new(config.gps.serial(), config.modem.serial());
    let reset = ConfiguredReset::from_config(&config.reset);

    let mut agent = Agent::new(store, channels, reset, AgentSettings::from_config(&config));

    tokio::select! {
        report = agent.run() => {
            let report = report?;
            info!("Cycle finished: {:?}", report);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cycle aborted");
        }
    }

    Ok(())
}

/// First command line argument, or the default path
fn config_path(mut args: impl Iterator<Item = String>) -> String {
    args.nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides `[logging].level`. The returned guard flushes the
/// file sink and must live until exit.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level {}", config.level))?;

    let (file_layer, guard) = match &config.file {
        Some(file) => {
            let (dir, name) = split_log_path(file)?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Directory and file name of a log file path
fn split_log_path(file: &str) -> Result<(&Path, &std::ffi::OsStr)> {
    let path = Path::new(file);
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Log file {} has no file name", file))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_config_path_default() {
        assert_eq!(config_path(args(&["geolinker-agent"])), DEFAULT_CONFIG_PATH);
    }

    #[test]
    fn test_config_path_from_args() {
        assert_eq!(
            config_path(args(&["geolinker-agent", "/etc/geolinker.toml"])),
            "/etc/geolinker.toml"
        );
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = Config::parse(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config.upload.device_id, "GeoLinker_tracker");
        assert_eq!(config.upload.max_retries, 100);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path("/var/log/geolinker/agent.log").unwrap();
        assert_eq!(dir, Path::new("/var/log/geolinker"));
        assert_eq!(name, "agent.log");

        let (dir, name) = split_log_path("agent.log").unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "agent.log");

        assert!(split_log_path("/").is_err());
    }
}
