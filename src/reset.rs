//! # Reset Trigger
//!
//! Ends a boot cycle. The next cycle starts from the mode flag in the store.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::config::{ResetConfig, ResetMethod};
use crate::error::{GeoLinkerError, Result};

/// Something that restarts the tracker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResetTrigger: Send {
    async fn trigger(&mut self) -> Result<()>;
}

/// Pulse a GPIO wired to the board's reset line
///
/// Drives the sysfs `value` file of an exported, output-configured pin.
#[derive(Debug, Clone)]
pub struct GpioReset {
    value_path: PathBuf,
    active_low: bool,
    pulse: Duration,
}

impl GpioReset {
    pub fn new(value_path: impl Into<PathBuf>, active_low: bool, pulse: Duration) -> Self {
        Self {
            value_path: value_path.into(),
            active_low,
            pulse,
        }
    }

    fn level(&self, asserted: bool) -> &'static [u8] {
        if asserted != self.active_low {
            b"1"
        } else {
            b"0"
        }
    }

    async fn write_level(&self, asserted: bool) -> Result<()> {
        tokio::fs::write(&self.value_path, self.level(asserted))
            .await
            .map_err(|e| {
                let path = self.value_path.display();
                GeoLinkerError::Reset(format!("Failed to drive {}: {}", path, e))
            })
    }
}

#[async_trait]
impl ResetTrigger for GpioReset {
    async fn trigger(&mut self) -> Result<()> {
        info!("Resetting via {}", self.value_path.display());
        self.write_level(true).await?;
        sleep(self.pulse).await;
        // Only reached if the line is not wired to this board's own reset
        self.write_level(false).await?;
        warn!("Reset pulse returned; board still running");
        Ok(())
    }
}

/// Let the supervisor restart the agent
///
/// `trigger` only logs; the caller returns and the process exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRestart;

#[async_trait]
impl ResetTrigger for ProcessRestart {
    async fn trigger(&mut self) -> Result<()> {
        info!("Cycle complete, exiting for restart");
        Ok(())
    }
}

/// Reset trigger selected by `[reset].method`
pub enum ConfiguredReset {
    Gpio(GpioReset),
    Exit(ProcessRestart),
}

impl ConfiguredReset {
    pub fn from_config(config: &ResetConfig) -> Self {
        match config.method {
            ResetMethod::Gpio => ConfiguredReset::Gpio(GpioReset::new(
                &config.gpio_value_path,
                config.active_low,
                Duration::from_millis(config.pulse_ms),
            )),
            ResetMethod::Exit => ConfiguredReset::Exit(ProcessRestart),
        }
    }
}

#[async_trait]
impl ResetTrigger for ConfiguredReset {
    async fn trigger(&mut self) -> Result<()> {
        match self {
            ConfiguredReset::Gpio(reset) => reset.trigger().await,
            ConfiguredReset::Exit(reset) => reset.trigger().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::create_valid_config;
    use tempfile::tempdir;

    #[tokio::test(start_paused = true)]
    async fn test_gpio_reset_active_low_ends_released() {
        let dir = tempdir().unwrap();
        let value = dir.path().join("value");
        std::fs::write(&value, b"1").unwrap();

        let mut reset = GpioReset::new(&value, true, Duration::from_millis(100));
        reset.trigger().await.unwrap();

        assert_eq!(std::fs::read(&value).unwrap(), b"1");
    }

    #[test]
    fn test_gpio_levels() {
        let low = GpioReset::new("/tmp/value", true, Duration::from_millis(1));
        assert_eq!(low.level(true), b"0");
        assert_eq!(low.level(false), b"1");

        let high = GpioReset::new("/tmp/value", false, Duration::from_millis(1));
        assert_eq!(high.level(true), b"1");
        assert_eq!(high.level(false), b"0");
    }

    #[tokio::test]
    async fn test_gpio_reset_missing_pin() {
        let mut reset = GpioReset::new(
            "/nonexistent/gpio/value",
            true,
            Duration::from_millis(1),
        );

        match reset.trigger().await {
            Err(GeoLinkerError::Reset(msg)) => assert!(msg.contains("/nonexistent/gpio/value")),
            other => panic!("Expected Reset error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_restart_succeeds() {
        let mut reset = ProcessRestart;
        tokio_test::assert_ok!(reset.trigger().await);
    }

    #[tokio::test]
    async fn test_configured_reset_follows_method() {
        let mut config = create_valid_config().reset;
        assert!(matches!(ConfiguredReset::from_config(&config), ConfiguredReset::Exit(_)));

        config.method = ResetMethod::Gpio;
        config.gpio_value_path = "/nonexistent/gpio/value".to_string();
        let mut reset = ConfiguredReset::from_config(&config);
        assert!(matches!(reset, ConfiguredReset::Gpio(_)));
        tokio_test::assert_err!(reset.trigger().await);
    }

    #[tokio::test]
    async fn test_mock_trigger_is_called_once() {
        let mut reset = MockResetTrigger::new();
        reset.expect_trigger().times(1).returning(|| Ok(()));

        reset.trigger().await.unwrap();
    }
}
