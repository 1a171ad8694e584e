//! Mock Transport for Testing
//!
//! An in-memory duplex pipe: the engine gets one end through [`MockTransport`],
//! the test drives the other end as the device through [`MockDevice`].

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tracing::debug;

use super::traits::{Transport, TransportError, TransportReader, TransportWriter};

/// Pipe capacity in bytes
const PIPE_CAPACITY: usize = 4096;

/// Mock transport implementation
#[derive(Debug)]
pub struct MockTransport {
    name: String,
    stream: Option<DuplexStream>,
    should_fail_connection: bool,
}

impl MockTransport {
    /// Create a connected transport/device pair
    pub fn pair() -> (Self, MockDevice) {
        let (engine_end, device_end) = tokio::io::duplex(PIPE_CAPACITY);
        (
            Self {
                name: "Mock Transport".to_string(),
                stream: Some(engine_end),
                should_fail_connection: false,
            },
            MockDevice {
                stream: BufReader::new(device_end),
            },
        )
    }

    /// A transport whose `connect` always fails
    pub fn failing() -> Self {
        Self {
            name: "Mock Transport".to_string(),
            stream: None,
            should_fail_connection: true,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn transport_type(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(TransportReader, TransportWriter), TransportError> {
        if self.should_fail_connection {
            return Err(TransportError::ConnectionFailed(
                "Mock connection failure".to_string(),
            ));
        }

        let stream = self.stream.take().ok_or_else(|| {
            TransportError::ConnectionFailed("Mock stream already connected".to_string())
        })?;

        debug!("Mock transport connected");
        let (reader, writer) = tokio::io::split(stream);
        Ok((Box::new(reader), Box::new(writer)))
    }
}

/// Device side of a [`MockTransport`]
#[derive(Debug)]
pub struct MockDevice {
    stream: BufReader<DuplexStream>,
}

impl MockDevice {
    /// Next text request without its trailing newline
    pub async fn read_line(&mut self) -> std::io::Result<String> {
        let mut line = Vec::new();
        let read = self.stream.read_until(b'\n', &mut line).await?;
        if read == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        Ok(String::from_utf8_lossy(&line).trim_end().to_string())
    }

    /// Next `len` raw bytes (binary requests)
    pub async fn read_bytes(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Send raw bytes to the engine
    pub async fn send(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    /// Send a text line terminated by `\n`
    pub async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.send(format!("{}\n", line).as_bytes()).await
    }
}
