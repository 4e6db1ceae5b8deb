//! # Sentence Line Buffer
//!
//! Assembles GPS receiver bytes into lines.

/// Line buffer size for GPS sentences (NMEA sentences are at most 82 chars)
pub const GPS_LINE_CAPACITY: usize = 100;

/// Fixed-capacity accumulator for one sentence
///
/// `\r` is dropped, `\n` completes a line. A line that fills the buffer is
/// discarded and accumulation restarts instead of overflowing.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_capacity(GPS_LINE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity: capacity.max(2),
        }
    }

    /// Feed one byte
    ///
    /// # Returns
    ///
    /// * `Option<String>` - The completed line when `byte` is `\n`
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\n' => {
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                Some(line)
            }
            b'\r' => None,
            _ => {
                self.buf.push(byte);
                if self.buf.len() >= self.capacity - 1 {
                    self.buf.clear();
                }
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
