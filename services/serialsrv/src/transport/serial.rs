//! Serial Transport Implementation
//!
//! Opens the device port with tokio-serial and splits the stream for the engine.

use std::time::Duration;

use async_trait::async_trait;
use bridge_config::{BridgeSettings, LineSettings, Parity};
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::{debug, error, info};

use super::traits::{Transport, TransportError, TransportReader, TransportWriter};

/// Serial port configuration
#[derive(Debug, Clone)]
pub struct SerialTransportConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    pub baud_rate: u32,
    pub line: LineSettings,
    /// Read timeout for individual operations
    pub read_timeout: Duration,
}

impl SerialTransportConfig {
    /// Port parameters from the settings snapshot
    ///
    /// `port` and `baud_rate` override the configured values when given
    /// (empty / zero means "use settings").
    pub fn from_settings(
        settings: &BridgeSettings,
        port: Option<&str>,
        baud_rate: Option<u32>,
    ) -> Result<Self, TransportError> {
        let line = settings
            .engine
            .line()
            .map_err(|e| TransportError::ConfigError(e.to_string()))?;

        let config = Self {
            port: port
                .filter(|p| !p.is_empty())
                .unwrap_or(settings.port_name.as_str())
                .to_string(),
            baud_rate: baud_rate
                .filter(|b| *b > 0)
                .unwrap_or(settings.baud_rate),
            line,
            read_timeout: Duration::from_millis(settings.engine.read_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::ConfigError(
                "Port path cannot be empty".to_string(),
            ));
        }

        if self.baud_rate == 0 {
            return Err(TransportError::ConfigError(
                "Baud rate must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn data_bits(&self) -> tokio_serial::DataBits {
        match self.line.data_bits {
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> tokio_serial::StopBits {
        match self.line.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.line.parity {
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::None => tokio_serial::Parity::None,
        }
    }
}

/// Serial transport implementation
#[derive(Debug)]
pub struct SerialTransport {
    config: SerialTransportConfig,
}

impl SerialTransport {
    pub fn new(config: SerialTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SerialTransportConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn transport_type(&self) -> &str {
        "serial"
    }

    fn name(&self) -> &str {
        &self.config.port
    }

    async fn connect(&mut self) -> Result<(TransportReader, TransportWriter), TransportError> {
        debug!(
            "Opening serial port: {} @ {} ({}-{}-{:?})",
            self.config.port,
            self.config.baud_rate,
            self.config.line.data_bits,
            self.config.line.stop_bits,
            self.config.line.parity
        );

        let port = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.config.data_bits())
            .parity(self.config.parity())
            .stop_bits(self.config.stop_bits())
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(self.config.read_timeout)
            .open_native_async()
            .map_err(|e| {
                let error_msg = format!("Failed to open serial port {}: {e}", self.config.port);
                error!("{error_msg}");
                TransportError::ConnectionFailed(error_msg)
            })?;

        // Drop whatever the device sent before we were listening
        port.clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to clear input: {e}")))?;

        info!("Successfully opened serial port: {}", self.config.port);

        let (reader, writer) = tokio::io::split(port);
        Ok((Box::new(reader), Box::new(writer)))
    }
}
