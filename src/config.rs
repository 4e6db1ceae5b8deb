//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{GeoLinkerError, Result};
use crate::nmea::TimeOffset;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gps: GpsConfig,
    pub modem: ModemConfig,
    pub upload: UploadConfig,
    pub time: TimeConfig,
    pub store: StoreConfig,
    pub reset: ResetConfig,
    pub logging: LoggingConfig,
}

/// Device path and line speed of one UART link
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
}

/// GPS receiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GpsConfig {
    #[serde(default = "default_gps_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Give up on a fix after this long
    #[serde(default = "default_acquisition_timeout_s")]
    pub acquisition_timeout_s: u64,
}

/// GSM modem configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ModemConfig {
    #[serde(default = "default_modem_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_apn")]
    pub apn: String,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    #[serde(default = "default_prompt_delay_ms")]
    pub prompt_delay_ms: u64,
}

/// Upload configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Sent verbatim as the `Authorization` header
    pub api_key: String,

    #[serde(default = "default_device_id")]
    pub device_id: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait after a failed registration or attach check
    #[serde(default = "default_precondition_retry_delay_ms")]
    pub precondition_retry_delay_ms: u64,

    /// Wait after a failed POST
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Static UTC offset applied to the fix time
#[derive(Debug, Deserialize, Clone)]
pub struct TimeConfig {
    #[serde(default = "default_offset_hours")]
    pub offset_hours: i8,

    #[serde(default = "default_offset_minutes")]
    pub offset_minutes: i8,
}

/// Persistent store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

/// How the board is reset at the end of a cycle
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResetMethod {
    /// Pulse a GPIO wired to the reset line
    Gpio,
    /// Exit and let the supervisor restart the agent
    Exit,
}

/// Reset trigger configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ResetConfig {
    #[serde(default = "default_reset_method")]
    pub method: ResetMethod,

    #[serde(default = "default_gpio_value_path")]
    pub gpio_value_path: String,

    #[serde(default = "default_active_low")]
    pub active_low: bool,

    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,

    /// Delay before reset after an acquisition cycle
    #[serde(default = "default_gps_settle_ms")]
    pub gps_settle_ms: u64,

    /// Delay before reset after an upload cycle
    #[serde(default = "default_upload_settle_ms")]
    pub upload_settle_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write logs to this file when set
    #[serde(default)]
    pub file: Option<String>,
}

// Default value functions
fn default_gps_port() -> String { "/dev/ttyS1".to_string() }
fn default_modem_port() -> String { "/dev/ttyS2".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_acquisition_timeout_s() -> u64 { 300 }

fn default_apn() -> String { "internet".to_string() }
fn default_command_timeout_ms() -> u64 { 5000 }
fn default_connect_timeout_ms() -> u64 { 15000 }
fn default_response_timeout_ms() -> u64 { 15000 }
fn default_prompt_delay_ms() -> u64 { 50 }

fn default_device_id() -> String { "GeoLinker_tracker".to_string() }
fn default_max_retries() -> u32 { 100 }
fn default_precondition_retry_delay_ms() -> u64 { 2000 }
fn default_retry_delay_ms() -> u64 { 3000 }

fn default_offset_hours() -> i8 { 5 }
fn default_offset_minutes() -> i8 { 30 }

fn default_store_path() -> String { "/var/lib/geolinker/store.bin".to_string() }

fn default_reset_method() -> ResetMethod { ResetMethod::Exit }
fn default_gpio_value_path() -> String { "/sys/class/gpio/gpio12/value".to_string() }
fn default_active_low() -> bool { true }
fn default_pulse_ms() -> u64 { 100 }
fn default_gps_settle_ms() -> u64 { 2500 }
fn default_upload_settle_ms() -> u64 { 3500 }

fn default_log_level() -> String { "info".to_string() }

/// UART speeds the tracker's GPS modules and SIM800 modems accept
const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn invalid(message: impl std::fmt::Display) -> GeoLinkerError {
    GeoLinkerError::Config(toml::de::Error::custom(message))
}

impl GpsConfig {
    pub fn serial(&self) -> SerialConfig {
        SerialConfig {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
        }
    }
}

impl ModemConfig {
    pub fn serial(&self) -> SerialConfig {
        SerialConfig {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
        }
    }
}

impl TimeConfig {
    pub fn offset(&self) -> TimeOffset {
        TimeOffset::new(self.offset_hours, self.offset_minutes)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use geolinker_agent::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Serial links
        for (name, port, baud_rate) in [
            ("gps", &self.gps.port, self.gps.baud_rate),
            ("modem", &self.modem.port, self.modem.baud_rate),
        ] {
            if port.is_empty() {
                return Err(invalid(format!("{} port cannot be empty", name)));
            }
            if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
                return Err(invalid(format!(
                    "{} baud_rate must be one of: {:?}",
                    name, SUPPORTED_BAUD_RATES
                )));
            }
        }

        if self.gps.acquisition_timeout_s == 0 || self.gps.acquisition_timeout_s > 3600 {
            return Err(invalid("acquisition_timeout_s must be between 1 and 3600"));
        }

        // Modem
        if self.modem.apn.is_empty() {
            return Err(invalid("apn cannot be empty"));
        }
        if self.modem.apn.contains('"') {
            return Err(invalid("apn cannot contain quotes"));
        }

        if self.modem.command_timeout_ms == 0 || self.modem.command_timeout_ms > 60000 {
            return Err(invalid("command_timeout_ms must be between 1 and 60000"));
        }

        for (name, value) in [
            ("connect_timeout_ms", self.modem.connect_timeout_ms),
            ("response_timeout_ms", self.modem.response_timeout_ms),
        ] {
            if value == 0 || value > 120000 {
                return Err(invalid(format!("{} must be between 1 and 120000", name)));
            }
        }

        if self.modem.prompt_delay_ms > 5000 {
            return Err(invalid("prompt_delay_ms must be at most 5000"));
        }

        // Upload
        if self.upload.api_key.is_empty() {
            return Err(invalid("api_key cannot be empty"));
        }
        if self.upload.api_key.chars().any(|c| c.is_control()) {
            return Err(invalid("api_key cannot contain control characters"));
        }

        // The device id is spliced into the JSON body unescaped
        if self.upload.device_id.is_empty() {
            return Err(invalid("device_id cannot be empty"));
        }
        if self
            .upload
            .device_id
            .chars()
            .any(|c| c == '"' || c == '\\' || c.is_control())
        {
            return Err(invalid(
                "device_id cannot contain quotes, backslashes or control characters",
            ));
        }

        if self.upload.max_retries == 0 || self.upload.max_retries > 1000 {
            return Err(invalid("max_retries must be between 1 and 1000"));
        }

        for (name, value) in [
            ("precondition_retry_delay_ms", self.upload.precondition_retry_delay_ms),
            ("retry_delay_ms", self.upload.retry_delay_ms),
        ] {
            if value > 60000 {
                return Err(invalid(format!("{} must be at most 60000", name)));
            }
        }

        // Time offset
        if !(-12..=14).contains(&self.time.offset_hours) {
            return Err(invalid("offset_hours must be between -12 and 14"));
        }
        if !(-59..=59).contains(&self.time.offset_minutes) {
            return Err(invalid("offset_minutes must be between -59 and 59"));
        }
        if (self.time.offset_hours > 0 && self.time.offset_minutes < 0)
            || (self.time.offset_hours < 0 && self.time.offset_minutes > 0)
        {
            return Err(invalid("offset_hours and offset_minutes must have the same sign"));
        }

        // Store
        if self.store.path.is_empty() {
            return Err(invalid("store path cannot be empty"));
        }

        // Reset
        if self.reset.method == ResetMethod::Gpio && self.reset.gpio_value_path.is_empty() {
            return Err(invalid("gpio_value_path cannot be empty when method is gpio"));
        }

        if self.reset.pulse_ms == 0 || self.reset.pulse_ms > 10000 {
            return Err(invalid("pulse_ms must be between 1 and 10000"));
        }

        for (name, value) in [
            ("gps_settle_ms", self.reset.gps_settle_ms),
            ("upload_settle_ms", self.reset.upload_settle_ms),
        ] {
            if value > 60000 {
                return Err(invalid(format!("{} must be at most 60000", name)));
            }
        }

        // Logging
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!("log level must be one of: {}", LOG_LEVELS.join(", "))));
        }
        if matches!(&self.logging.file, Some(file) if file.is_empty()) {
            return Err(invalid("log file cannot be empty when set"));
        }

        Ok(())
    }
}
