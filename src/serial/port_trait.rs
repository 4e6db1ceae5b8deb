//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;
use tokio::time::{timeout, Duration};

/// How long a single poll waits for bytes before reporting none
const READ_POLL_WINDOW: Duration = Duration::from_millis(5);

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Read whatever bytes are available right now
    ///
    /// Returns `Ok(0)` when nothing arrived within a short poll window; never
    /// blocks indefinitely.
    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        match timeout(READ_POLL_WINDOW, self.port.read(buf)).await {
            Ok(result) => result,
            Err(_) => Ok(0),
        }
    }
}
