//! Transport Layer Traits
//!
//! A transport opens a byte stream to the device and hands back independent
//! read and write halves: the engine reads on a background task while callers
//! write requests from their own tasks.

use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;
use errors::BridgeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Transport layer error types
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection lost
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Send operation failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Receive operation failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

/// Connection state for transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Error,
}

/// Per-engine traffic statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Requests written to the device
    pub requests: u64,
    /// Responses delivered to a waiting caller
    pub responses: u64,
    /// Waits that ended without a response
    pub timeouts: u64,
    /// Complete responses nobody was waiting for
    pub discarded: u64,
    /// Last successful connection time
    pub last_connection: Option<SystemTime>,
    /// Current connection state
    pub connection_state: ConnectionState,
}

impl TransportStats {
    pub fn new() -> Self {
        Self {
            bytes_sent: 0,
            bytes_received: 0,
            requests: 0,
            responses: 0,
            timeouts: 0,
            discarded: 0,
            last_connection: None,
            connection_state: ConnectionState::Disconnected,
        }
    }

    pub fn record_successful_connection(&mut self) {
        self.last_connection = Some(SystemTime::now());
        self.connection_state = ConnectionState::Connected;
    }

    pub fn record_failed_connection(&mut self) {
        self.connection_state = ConnectionState::Error;
    }

    pub fn record_disconnection(&mut self) {
        self.connection_state = ConnectionState::Disconnected;
    }

    pub fn record_request(&mut self, bytes: usize) {
        self.requests += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    pub fn record_response(&mut self) {
        self.responses += 1;
    }

    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    pub fn record_discarded(&mut self) {
        self.discarded += 1;
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for TransportStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Read half handed to the engine's reader task
pub type TransportReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half used for requests
pub type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Core transport trait
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Get transport type identifier
    fn transport_type(&self) -> &str;

    /// Get human-readable transport name (port path for serial)
    fn name(&self) -> &str;

    /// Open the stream and split it into read and write halves
    async fn connect(&mut self) -> Result<(TransportReader, TransportWriter), TransportError>;
}
