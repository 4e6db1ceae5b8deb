//! # Modem Command Driver
//!
//! Request/response exchanges against the modem's AT command interface.
//!
//! Every wait here is bounded: a timeout is a negative result (an empty or
//! partial response, `None`), never an error. Only channel I/O failures are
//! returned as errors.

pub mod commands;

use bytes::BytesMut;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::error::{GeoLinkerError, Result};
use crate::serial::port_trait::SerialPortIO;

/// Response buffer cap for a single exchange
pub const RESPONSE_CAP: usize = 512;

/// Trailing bytes kept when the cap is hit
pub const RESPONSE_KEEP: usize = 256;

/// Sleep between polls of the channel
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on stale bytes discarded before a command
const MAX_DRAIN_BYTES: usize = 4096;

const READ_CHUNK: usize = 64;

/// AT command driver over a raw serial channel
pub struct Modem<P: SerialPortIO> {
    port: P,
    /// Bytes received but not yet consumed by a stream search
    pending: BytesMut,
}

impl<P: SerialPortIO> std::fmt::Debug for Modem<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modem")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<P: SerialPortIO> Modem<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            pending: BytesMut::with_capacity(RESPONSE_CAP),
        }
    }

    /// Send a command and collect the reply
    ///
    /// Stale input is discarded first. When `command` is non-empty it is
    /// written followed by `\r\n`. Bytes are then collected until `expect`
    /// appears or `timeout` elapses; whatever was captured is returned.
    /// Bytes that arrived after the match stay buffered for
    /// [`Modem::wait_for_any`].
    ///
    /// # Errors
    ///
    /// Returns error only if the channel itself fails
    pub async fn exchange(
        &mut self,
        command: &str,
        timeout: Duration,
        expect: Option<&str>,
    ) -> Result<String> {
        self.drain_input().await?;

        if !command.is_empty() {
            let mut line = Vec::with_capacity(command.len() + 2);
            line.extend_from_slice(command.as_bytes());
            line.extend_from_slice(b"\r\n");
            self.send(&line).await?;
            debug!(">> {}", command);
        }

        let start = Instant::now();
        let mut response = BytesMut::new();
        let mut chunk = [0u8; READ_CHUNK];

        while start.elapsed() < timeout {
            let n = self.read_chunk(&mut chunk).await?;
            response.extend_from_slice(&chunk[..n]);

            if response.len() > RESPONSE_CAP {
                response = response.split_off(response.len() - RESPONSE_KEEP);
            }

            if let Some(end) = expect.and_then(|expect| match_end(&response, expect)) {
                self.pending.extend_from_slice(&response[end..]);
                break;
            }

            if n == 0 {
                sleep(POLL_INTERVAL).await;
            }
        }

        let response = String::from_utf8_lossy(&response).into_owned();
        debug!("<< {}", response.trim());
        Ok(response)
    }

    /// Write bytes as-is (send-mode payload, no line terminator)
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.send(data).await?;
        debug!(">> [{} raw bytes]", data.len());
        Ok(())
    }

    /// Consume input until one of `keywords` has been received
    ///
    /// Input up to the end of the match is consumed; anything after it stays
    /// buffered for [`Modem::read_exact_until`].
    ///
    /// # Returns
    ///
    /// * `Option<usize>` - Index into `keywords` of the earliest match, `None` on timeout
    pub async fn wait_for_any(
        &mut self,
        keywords: &[&str],
        timeout: Duration,
    ) -> Result<Option<usize>> {
        let deadline = Instant::now() + timeout;
        let longest = keywords.iter().map(|k| k.len()).max().unwrap_or(0);

        loop {
            self.fill().await?;

            let earliest = keywords
                .iter()
                .enumerate()
                .filter_map(|(index, keyword)| {
                    find(&self.pending, keyword.as_bytes())
                        .map(|pos| (pos, index, pos + keyword.len()))
                })
                .min();

            if let Some((_, index, end)) = earliest {
                let _ = self.pending.split_to(end);
                debug!("<< {}", keywords[index]);
                return Ok(Some(index));
            }

            // No match: only a possible keyword prefix needs to survive
            let keep = longest.saturating_sub(1);
            if self.pending.len() > keep {
                let _ = self.pending.split_to(self.pending.len() - keep);
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Read exactly `count` bytes, giving up at `deadline`
    pub async fn read_exact_until(
        &mut self,
        count: usize,
        deadline: Instant,
    ) -> Result<Option<Vec<u8>>> {
        loop {
            if self.pending.len() >= count {
                return Ok(Some(self.pending.split_to(count).to_vec()));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if self.fill().await? == 0 {
                sleep(Duration::from_millis(1)).await;
            }
        }
    }

    /// Discard everything buffered or waiting on the channel
    async fn drain_input(&mut self) -> Result<()> {
        self.pending.clear();

        let mut chunk = [0u8; READ_CHUNK];
        let mut drained = 0;
        while drained < MAX_DRAIN_BYTES {
            let n = self.read_chunk(&mut chunk).await?;
            if n == 0 {
                break;
            }
            drained += n;
        }

        if drained > 0 {
            debug!("Discarded {} stale bytes", drained);
        }
        Ok(())
    }

    /// Move one chunk of available input into `pending`
    async fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.read_chunk(&mut chunk).await?;
        self.pending.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    async fn read_chunk(&mut self, chunk: &mut [u8]) -> Result<usize> {
        self.port
            .read_available(chunk)
            .await
            .map_err(|e| GeoLinkerError::Serial(format!("Failed to read from modem: {}", e)))
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .await
            .map_err(|e| GeoLinkerError::Serial(format!("Failed to write to modem: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| GeoLinkerError::Serial(format!("Failed to flush modem port: {}", e)))
    }
}

/// Offset just past the first `expect` in `response`
fn match_end(response: &[u8], expect: &str) -> Option<usize> {
    find(response, expect.as_bytes()).map(|pos| pos + expect.len())
}

/// Position of `needle` in `haystack`
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
