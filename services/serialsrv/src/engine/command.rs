//! Commands, send modes and response outcomes

use std::fmt;
use std::time::Duration;

use common::hex::describe_binary;
use errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

use crate::modbus::{decode_single_value, decode_values, ModbusCommand};

/// Marker the device puts in a failed command's response
pub const ERROR_MARKER: &str = "ERROR";

/// A request for the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Text line; the engine appends the `\n` terminator
    Text(String),
    /// Raw binary frame, usually a Modbus request
    Binary(Vec<u8>),
}

impl Command {
    pub fn text(line: impl Into<String>) -> Self {
        Self::Text(line.into())
    }

    /// Bytes written to the transport
    pub fn wire_bytes(&self) -> Vec<u8> {
        match self {
            Self::Text(line) => {
                let mut bytes = Vec::with_capacity(line.len() + 1);
                bytes.extend_from_slice(line.as_bytes());
                bytes.push(b'\n');
                bytes
            },
            Self::Binary(frame) => frame.clone(),
        }
    }

    /// Function code of a binary request, used to spot complete RTU responses
    pub fn binary_function(&self) -> Option<u8> {
        match self {
            Self::Text(_) => None,
            Self::Binary(frame) => frame.get(1).copied(),
        }
    }
}

impl From<ModbusCommand> for Command {
    fn from(command: ModbusCommand) -> Self {
        Self::Binary(command.as_bytes().to_vec())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(line) => f.write_str(line),
            Self::Binary(frame) => f.write_str(&describe_binary(frame)),
        }
    }
}

/// How the caller waits for the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Return right after the write
    NoWait,
    /// Wait for a complete response; `None` uses the engine's read timeout
    Wait(Option<Duration>),
}

impl SendMode {
    pub fn wait() -> Self {
        Self::Wait(None)
    }

    pub fn wait_for(timeout: Duration) -> Self {
        Self::Wait(Some(timeout))
    }

    pub fn is_wait(self) -> bool {
        matches!(self, Self::Wait(_))
    }
}

/// Outcome of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    Ok,
    /// Accepted by the command queue
    Queued,
    /// Another request is in flight
    Busy,
    QueueOverflow,
    Timeout,
    /// The device answered with an error marker
    Error,
}

/// Outcome code plus the raw response bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialResponse {
    pub code: ResponseCode,
    pub payload: Vec<u8>,
}

impl SerialResponse {
    pub fn new(code: ResponseCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(ResponseCode::Ok, payload)
    }

    /// Classify a complete device response
    pub fn from_device(payload: Vec<u8>) -> Self {
        let code = if String::from_utf8_lossy(&payload).contains(ERROR_MARKER) {
            ResponseCode::Error
        } else {
            ResponseCode::Ok
        };
        Self { code, payload }
    }

    pub fn queued() -> Self {
        Self::new(ResponseCode::Queued, b"OK".to_vec())
    }

    pub fn busy() -> Self {
        Self::new(ResponseCode::Busy, Vec::new())
    }

    pub fn queue_overflow() -> Self {
        Self::new(ResponseCode::QueueOverflow, b"Queue Exceed".to_vec())
    }

    pub fn timeout() -> Self {
        Self::new(ResponseCode::Timeout, b"Read Timeout.".to_vec())
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResponseCode::Ok
    }

    /// Payload as trimmed text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).trim().to_string()
    }

    /// Register values of a Modbus read response
    pub fn registers(&self) -> Option<Vec<u16>> {
        decode_values(&self.payload)
    }

    pub fn single_register(&self) -> Option<u16> {
        decode_single_value(&self.payload)
    }

    /// `Ok`/`Queued` pass through, everything else becomes an error
    pub fn into_result(self) -> BridgeResult<Self> {
        match self.code {
            ResponseCode::Ok | ResponseCode::Queued => Ok(self),
            ResponseCode::Busy => Err(BridgeError::Busy),
            ResponseCode::QueueOverflow => Err(BridgeError::QueueOverflow),
            ResponseCode::Timeout => Err(BridgeError::Timeout(self.text())),
            ResponseCode::Error => Err(BridgeError::Device(self.text())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::modbus::{ModbusFunction, RegisterType};

    #[test]
    fn test_command_wire_bytes() {
        assert_eq!(Command::text("STOP;X;").wire_bytes(), b"STOP;X;\n");

        let frame =
            ModbusCommand::build(1, RegisterType::Holding, ModbusFunction::ReadValue, 0, 2)
                .unwrap();
        let command = Command::from(frame);
        assert_eq!(command.wire_bytes().len(), 8);
        assert_eq!(command.binary_function(), Some(0x03));
        assert_eq!(command.to_string(), "010300000002C40B");
    }

    #[test]
    fn test_device_response_classification() {
        assert!(SerialResponse::from_device(b"OK\n".to_vec()).is_ok());

        let failed = SerialResponse::from_device(b"ERROR;limit\n".to_vec());
        assert_eq!(failed.code, ResponseCode::Error);
        assert!(matches!(failed.into_result(), Err(BridgeError::Device(m)) if m == "ERROR;limit"));
    }

    #[test]
    fn test_into_result() {
        assert!(SerialResponse::queued().into_result().is_ok());
        assert!(matches!(SerialResponse::busy().into_result(), Err(BridgeError::Busy)));
        assert!(matches!(
            SerialResponse::queue_overflow().into_result(),
            Err(BridgeError::QueueOverflow)
        ));
        assert!(matches!(
            SerialResponse::timeout().into_result(),
            Err(BridgeError::Timeout(_))
        ));
    }

    #[test]
    fn test_register_decoding() {
        let response = SerialResponse::ok(vec![0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02, 0x2A, 0x32]);
        assert_eq!(response.registers(), Some(vec![1, 2]));
        assert_eq!(response.single_register(), Some(1));
        assert_eq!(SerialResponse::ok(vec![0x01, 0x03]).registers(), None);
    }
}
