//! # Mode State Machine
//!
//! One boot cycle of the tracker.
//!
//! ## Control Flow
//!
//! ```text
//! boot -> read flag
//!   AcquireGps: GPS lines -> first valid RMC fix (or timeout)
//!               -> save fix + set Upload flag -> settle -> reset
//!   Upload:     load fix -> payload -> attempts 1..=max_retries
//!               -> clear store -> settle -> reset
//! ```
//!
//! A stored fix is tried for at most one upload cycle; the store is cleared
//! whether or not the server accepted it.

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{GeoLinkerError, Result};
use crate::modem::Modem;
use crate::nmea::parser::is_candidate;
use crate::nmea::{parse_rmc, LineBuffer, TimeOffset};
use crate::reset::ResetTrigger;
use crate::serial::port_trait::SerialPortIO;
use crate::serial::ChannelProvider;
use crate::store::{ByteStore, Fix, Mode, RecordStore, StoredFix};
use crate::upload::{http, AttemptFailure, UploadClient, UploadSettings};

/// Sleep between GPS polls when no bytes arrived
const GPS_POLL_INTERVAL: Duration = Duration::from_millis(10);

const GPS_READ_CHUNK: usize = 64;

/// Agent timing and identity
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub device_id: String,
    pub max_retries: u32,
    pub precondition_retry_delay: Duration,
    pub retry_delay: Duration,
    pub acquisition_timeout: Duration,
    pub gps_settle: Duration,
    pub upload_settle: Duration,
    pub time_offset: TimeOffset,
    pub upload: UploadSettings,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device_id: config.upload.device_id.clone(),
            max_retries: config.upload.max_retries,
            precondition_retry_delay: Duration::from_millis(
                config.upload.precondition_retry_delay_ms,
            ),
            retry_delay: Duration::from_millis(config.upload.retry_delay_ms),
            acquisition_timeout: Duration::from_secs(config.gps.acquisition_timeout_s),
            gps_settle: Duration::from_millis(config.reset.gps_settle_ms),
            upload_settle: Duration::from_millis(config.reset.upload_settle_ms),
            time_offset: config.time.offset(),
            upload: UploadSettings::from_config(&config.modem, &config.upload),
        }
    }
}

/// What one boot cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// A fix was parsed and persisted for the next boot
    Acquired(Fix),
    /// No valid fix before the acquisition timeout; nothing persisted
    NoFix,
    /// The server accepted the fix
    Uploaded { attempts: u32, status: u16 },
    /// Every attempt failed; the fix was discarded
    UploadFailed {
        attempts: u32,
        last_failure: Option<AttemptFailure>,
    },
    /// The cycle could not run (channel or store failure)
    Abandoned { mode: Mode, reason: String },
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleReport::Acquired(_) | CycleReport::Uploaded { .. })
    }
}

/// The two-phase tracker agent
pub struct Agent<S: ByteStore, C: ChannelProvider, R: ResetTrigger> {
    store: RecordStore<S>,
    channels: C,
    reset: R,
    settings: AgentSettings,
}

impl<S: ByteStore, C: ChannelProvider, R: ResetTrigger> Agent<S, C, R> {
    pub fn new(store: RecordStore<S>, channels: C, reset: R, settings: AgentSettings) -> Self {
        Self {
            store,
            channels,
            reset,
            settings,
        }
    }

    pub fn store(&self) -> &RecordStore<S> {
        &self.store
    }

    /// Run one boot cycle and trigger the reset
    ///
    /// # Errors
    ///
    /// Returns error only if the reset trigger fails. Everything else is
    /// logged and reported through [`CycleReport`].
    pub async fn run(&mut self) -> Result<CycleReport> {
        let mode = self.store.mode();

        let (report, settle) = match mode {
            Mode::AcquireGps => {
                info!("Mode: GPS acquisition");
                (self.acquire().await, self.settings.gps_settle)
            }
            Mode::Upload => {
                info!("Mode: data upload");
                (self.upload().await, self.settings.upload_settle)
            }
        };

        log_summary(&report);

        sleep(settle).await;
        self.reset.trigger().await?;

        Ok(report)
    }

    async fn acquire(&mut self) -> CycleReport {
        let abandoned = |reason: String| CycleReport::Abandoned {
            mode: Mode::AcquireGps,
            reason,
        };

        let mut gps = match self.channels.open_gps() {
            Ok(gps) => gps,
            Err(e) => {
                error!("Cannot open GPS receiver: {}", e);
                return abandoned(e.to_string());
            }
        };

        info!("Waiting for GPS fix...");
        let fix = match self.read_fix(&mut gps).await {
            Ok(Some(fix)) => fix,
            Ok(None) => {
                warn!("GPS timeout, no valid fix");
                return CycleReport::NoFix;
            }
            Err(e) => {
                error!("GPS read failed: {}", e);
                return abandoned(e.to_string());
            }
        };

        info!(
            "GPS fix: lat {:.6}, lon {:.6} at {}",
            fix.latitude, fix.longitude, fix.timestamp
        );

        if let Err(e) = self.store.save_fix(&fix) {
            error!("Failed to persist fix: {}", e);
            return abandoned(e.to_string());
        }
        info!("Fix stored, upload on next boot");

        CycleReport::Acquired(fix)
    }

    /// Stream GPS bytes until a valid fix or the acquisition timeout
    async fn read_fix<P: SerialPortIO>(&self, gps: &mut P) -> Result<Option<Fix>> {
        let deadline = Instant::now() + self.settings.acquisition_timeout;
        let mut lines = LineBuffer::new();
        let mut chunk = [0u8; GPS_READ_CHUNK];

        while Instant::now() < deadline {
            let n = gps
                .read_available(&mut chunk)
                .await
                .map_err(|e| GeoLinkerError::Serial(format!("GPS read failed: {}", e)))?;

            for &byte in &chunk[..n] {
                let Some(line) = lines.push(byte) else {
                    continue;
                };
                if !is_candidate(&line) {
                    continue;
                }
                match parse_rmc(&line, self.settings.time_offset) {
                    Ok(fix) => return Ok(Some(fix)),
                    Err(e) => debug!("Skipping sentence: {}", e),
                }
            }

            if n == 0 {
                sleep(GPS_POLL_INTERVAL).await;
            }
        }

        Ok(None)
    }

    async fn upload(&mut self) -> CycleReport {
        let fix = self.store.load_fix();
        info!(
            "Stored fix: lat {}, lon {} at {}",
            fix.latitude, fix.longitude, fix.timestamp
        );

        let report = match self.channels.open_modem() {
            Ok(port) => self.deliver(port, &fix).await,
            Err(e) => {
                error!("Cannot open modem: {}", e);
                CycleReport::Abandoned {
                    mode: Mode::Upload,
                    reason: e.to_string(),
                }
            }
        };

        // The fix is never retried on a later boot
        match self.store.erase() {
            Ok(()) => info!("Store cleared"),
            Err(e) => error!("Failed to clear store: {}", e),
        }

        report
    }

    async fn deliver<P: SerialPortIO>(&self, port: P, fix: &StoredFix) -> CycleReport {
        let body = http::build_payload(&self.settings.device_id, fix);
        debug!("Payload: {}", body);

        let mut client = UploadClient::new(Modem::new(port), self.settings.upload.clone());
        let max_retries = self.settings.max_retries;
        let mut last_failure = None;

        for attempt in 1..=max_retries {
            info!("Upload attempt {}/{}", attempt, max_retries);

            let failure = match client.attempt(&body).await {
                Ok(status) => {
                    info!("Data sent successfully (HTTP {})", status);
                    return CycleReport::Uploaded { attempts: attempt, status };
                }
                Err(failure) => failure,
            };

            warn!("Attempt {} failed: {}", attempt, failure);

            let delay = match failure {
                AttemptFailure::NotRegistered(_) | AttemptFailure::NotAttached => {
                    self.settings.precondition_retry_delay
                }
                _ => self.settings.retry_delay,
            };
            last_failure = Some(failure);

            if attempt < max_retries {
                sleep(delay).await;
            }
        }

        CycleReport::UploadFailed {
            attempts: max_retries,
            last_failure,
        }
    }
}

fn log_summary(report: &CycleReport) {
    match report {
        CycleReport::Acquired(_) => info!("SUCCESS: fix acquired"),
        CycleReport::Uploaded { attempts, status } => {
            info!("SUCCESS: uploaded after {} attempt(s), HTTP {}", attempts, status)
        }
        CycleReport::NoFix => warn!("FAILED: no GPS fix"),
        CycleReport::UploadFailed { attempts, last_failure } => match last_failure {
            Some(failure) => warn!("FAILED: {} attempt(s), last error: {}", attempts, failure),
            None => warn!("FAILED: no upload attempted"),
        },
        CycleReport::Abandoned { mode, reason } => {
            error!("FAILED: {:?} cycle abandoned: {}", mode, reason)
        }
    }
}
