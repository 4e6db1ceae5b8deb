//! # Upload Protocol Client
//!
//! A minimal HTTP POST layered over the modem's AT command set.
//!
//! This module handles:
//! - Network registration and packet-data attach preconditions
//! - Bearer bring-up and the raw TCP connect handshake
//! - Writing the HTTP request in send mode and extracting the status code
//! - Classifying why an attempt failed
//!
//! ## Attempt Sequence
//!
//! ```text
//! CIPCLOSE, CIPSHUT, CREG?          registration (1 = home, 5 = roaming)
//! CGATT? [CGATT=1, CGATT?]          attach
//! CIPCLOSE, CIPSHUT                 stale session teardown
//! CGATT=1, CIPMUX=0, CSTT, CIICR, CIFSR
//! CIPSTART ... CONNECT OK           <= connect ceiling, else status 0
//! CIPSEND > request 0x1A
//! ... "HTTP/1.1 " NNN               <= response ceiling, else status 0
//! CIPCLOSE, CIPSHUT                 always
//! ```

pub mod http;

use thiserror::Error;
use tokio::time::{sleep, Duration, Instant};
use tracing::{info, warn};

use crate::config::{ModemConfig, UploadConfig};
use crate::error::Result;
use crate::modem::commands::{self, *};
use crate::modem::Modem;
use crate::serial::port_trait::SerialPortIO;

/// Why a single upload attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    #[error("Network not registered (status {0:?})")]
    NotRegistered(Option<u8>),

    #[error("GPRS context error")]
    NotAttached,

    #[error("TCP connection failed")]
    ConnectFailed,

    #[error("No HTTP status line received")]
    NoStatusLine,

    #[error("HTTP Error: {0}")]
    HttpStatus(u16),

    #[error("Modem channel error: {0}")]
    Transport(String),
}

/// Result of the POST phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// No connect confirmation; no request bytes were sent
    ConnectFailed,
    /// Request sent but no complete status code arrived
    NoStatusLine,
    /// Status code parsed from the reply
    Status(u16),
}

impl PostOutcome {
    /// HTTP status, `0` for connection or parse failure
    pub fn status(self) -> u16 {
        match self {
            PostOutcome::Status(code) => code,
            _ => 0,
        }
    }

    pub fn is_success(self) -> bool {
        is_success_status(self.status())
    }
}

pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Timing and credentials for the upload sequence
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub apn: String,
    pub api_key: String,
    /// Ceiling for ordinary command exchanges
    pub command_timeout: Duration,
    /// Ceiling for the connect confirmation
    pub connect_timeout: Duration,
    /// Ceiling for the status line, measured from the end of the request
    pub response_timeout: Duration,
    /// Pause after the send prompt before writing the request
    pub prompt_delay: Duration,
}

impl UploadSettings {
    pub fn from_config(modem: &ModemConfig, upload: &UploadConfig) -> Self {
        Self {
            apn: modem.apn.clone(),
            api_key: upload.api_key.clone(),
            command_timeout: Duration::from_millis(modem.command_timeout_ms),
            connect_timeout: Duration::from_millis(modem.connect_timeout_ms),
            response_timeout: Duration::from_millis(modem.response_timeout_ms),
            prompt_delay: Duration::from_millis(modem.prompt_delay_ms),
        }
    }
}

/// Drives the AT sequence for one POST
pub struct UploadClient<P: SerialPortIO> {
    modem: Modem<P>,
    settings: UploadSettings,
}

impl<P: SerialPortIO> UploadClient<P> {
    pub fn new(modem: Modem<P>, settings: UploadSettings) -> Self {
        Self { modem, settings }
    }

    /// One full attempt: registration, attach, POST
    ///
    /// # Returns
    ///
    /// * `Ok(status)` - A 2xx status code
    /// * `Err(AttemptFailure)` - Classified failure of this attempt
    pub async fn attempt(&mut self, body: &str) -> std::result::Result<u16, AttemptFailure> {
        let transport = |e: crate::error::GeoLinkerError| AttemptFailure::Transport(e.to_string());

        let registration = self.registration_status().await.map_err(transport)?;
        if !registration.map(commands::is_registered).unwrap_or(false) {
            return Err(AttemptFailure::NotRegistered(registration));
        }

        if !self.check_attach().await.map_err(transport)? {
            return Err(AttemptFailure::NotAttached);
        }

        match self.http_post(body).await.map_err(transport)? {
            PostOutcome::ConnectFailed => Err(AttemptFailure::ConnectFailed),
            PostOutcome::NoStatusLine => Err(AttemptFailure::NoStatusLine),
            PostOutcome::Status(code) if is_success_status(code) => Ok(code),
            PostOutcome::Status(code) => Err(AttemptFailure::HttpStatus(code)),
        }
    }

    /// Tear down any stale session, then query `+CREG`
    ///
    /// # Returns
    ///
    /// * `Option<u8>` - Registration status, `None` if the reply had none
    pub async fn registration_status(&mut self) -> Result<Option<u8>> {
        self.teardown().await?;

        let response = self
            .modem
            .exchange(CREG_QUERY, self.settings.command_timeout, Some(CREG_PREFIX))
            .await?;
        let status = commands::parse_registration(&response);

        info!("Network reg status: {}", status.map(i32::from).unwrap_or(-1));
        Ok(status)
    }

    /// Verify packet-data attach, attaching once if needed
    pub async fn check_attach(&mut self) -> Result<bool> {
        let timeout = self.settings.command_timeout;

        let response = self.modem.exchange(CGATT_QUERY, timeout, Some(CGATT_PREFIX)).await?;
        let mut attached = commands::parse_attach(&response).unwrap_or(false);

        if !attached {
            self.modem.exchange(CGATT_ATTACH, timeout, Some(OK)).await?;
            let response = self.modem.exchange(CGATT_QUERY, timeout, Some(CGATT_PREFIX)).await?;
            attached = commands::parse_attach(&response).unwrap_or(false);
        }

        info!("GPRS attached: {}", if attached { "Yes" } else { "No" });
        Ok(attached)
    }

    /// POST `body` to the GeoLinker endpoint
    ///
    /// The session is torn down afterwards whatever happened.
    pub async fn http_post(&mut self, body: &str) -> Result<PostOutcome> {
        info!("Sending data over GSM...");

        let outcome = self.post_inner(body).await;

        if let Err(e) = self.teardown().await {
            warn!("Session teardown failed: {}", e);
        }

        let outcome = outcome?;
        info!("HTTP status: {}", outcome.status());
        Ok(outcome)
    }

    async fn post_inner(&mut self, body: &str) -> Result<PostOutcome> {
        let timeout = self.settings.command_timeout;

        self.teardown().await?;

        self.modem.exchange(CGATT_ATTACH, timeout, Some(OK)).await?;
        self.modem.exchange(CIPMUX_SINGLE, timeout, Some(OK)).await?;
        let cstt = commands::cstt(&self.settings.apn);
        self.modem.exchange(&cstt, timeout, Some(OK)).await?;
        self.modem.exchange(CIICR, timeout, Some(OK)).await?;
        self.modem.exchange(CIFSR, timeout, Some(CIFSR_EXPECT)).await?;

        let cipstart = commands::cipstart(http::REMOTE_HOST, http::REMOTE_PORT);
        let response = self.modem.exchange(&cipstart, timeout, Some(OK)).await?;

        if !self.await_connect(&response).await? {
            warn!("TCP connection failed!");
            return Ok(PostOutcome::ConnectFailed);
        }
        info!("Connected!");

        self.modem.exchange(CIPSEND, timeout, Some(CIPSEND_PROMPT)).await?;
        sleep(self.settings.prompt_delay).await;

        let request = http::build_request(&self.settings.api_key, body);
        self.modem.write_raw(request.as_bytes()).await?;
        self.modem.write_raw(&[http::END_OF_DATA]).await?;

        self.read_status().await
    }

    /// Connect confirmation, either already in the `CIPSTART` reply or within
    /// the connect ceiling
    async fn await_connect(&mut self, cipstart_response: &str) -> Result<bool> {
        if cipstart_response.contains(CONNECT_FAIL) {
            return Ok(false);
        }
        if cipstart_response.contains(CONNECT_OK) || cipstart_response.contains(ALREADY_CONNECT) {
            return Ok(true);
        }

        let keywords = [CONNECT_OK, ALREADY_CONNECT, CONNECT_FAIL];
        let found = self
            .modem
            .wait_for_any(&keywords, self.settings.connect_timeout)
            .await?;

        Ok(matches!(found, Some(index) if keywords[index] != CONNECT_FAIL))
    }

    /// Scan for `HTTP/1.1 ` and read the 3-digit status under one ceiling
    async fn read_status(&mut self) -> Result<PostOutcome> {
        let deadline = Instant::now() + self.settings.response_timeout;

        let found = self
            .modem
            .wait_for_any(&[HTTP_STATUS_MARKER], self.settings.response_timeout)
            .await?;
        if found.is_none() {
            return Ok(PostOutcome::NoStatusLine);
        }

        let digits = match self.modem.read_exact_until(3, deadline).await? {
            Some(digits) => digits,
            None => return Ok(PostOutcome::NoStatusLine),
        };

        let code = std::str::from_utf8(&digits)
            .ok()
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<u16>().ok());

        Ok(match code {
            Some(code) => PostOutcome::Status(code),
            None => PostOutcome::NoStatusLine,
        })
    }

    /// Close the TCP session and the PDP context, ignoring the replies
    async fn teardown(&mut self) -> Result<()> {
        let timeout = self.settings.command_timeout;
        self.modem.exchange(CIPCLOSE, timeout, Some(CIPCLOSE_EXPECT)).await?;
        self.modem.exchange(CIPSHUT, timeout, Some(CIPSHUT_EXPECT)).await?;
        Ok(())
    }
}
