//! Unified error handling for the serial bridge
//!
//! One error type shared by the configuration model, the serial command
//! engine and the GCode converter, so callers at the host-binding layer can
//! translate every failure without protocol knowledge.

use thiserror::Error;

// ============================================================================
// BridgeError - Main error type
// ============================================================================

/// Main error type for all bridge crates
#[derive(Debug, Error)]
pub enum BridgeError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration load error: {0}")]
    ConfigurationLoad(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Engine Errors
    // ======================================
    #[error("Serial port not open")]
    PortNotOpen,

    #[error("Axis not found: {0}")]
    AxisNotFound(char),

    #[error("Axis disabled: {0}")]
    AxisDisabled(char),

    #[error("Axis {axis}: new position {target} out of range [{min}, {max}]")]
    OutOfRange {
        axis: char,
        target: f64,
        min: f64,
        max: f64,
    },

    #[error("Axis {0}: move notification period not defined, use wait mode or the command queue")]
    InvalidMoveMode(char),

    #[error("Command queue exceeded")]
    QueueOverflow,

    #[error("Serial port busy")]
    Busy,

    #[error("Timeout waiting for response: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Device reported error: {0}")]
    Device(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // ======================================
    // Conversion Errors
    // ======================================
    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Line {line} exceeds maximum length of {max} bytes")]
    LineTooLong { line: usize, max: usize },

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using BridgeError
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    NotFound,
    ResourceBusy,
    ResourceExhausted,
    Timeout,
    Protocol,
    Connection,
    Internal,
}

impl BridgeError {
    /// Shorthand for an `InvalidConfig` error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code for logs and host-side signalling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigurationLoad(_) => "CONFIGURATION_LOAD",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::PortNotOpen => "PORT_NOT_OPEN",
            Self::AxisNotFound(_) => "AXIS_NOT_FOUND",
            Self::AxisDisabled(_) => "AXIS_DISABLED",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::InvalidMoveMode(_) => "INVALID_MOVE_MODE",
            Self::QueueOverflow => "QUEUE_OVERFLOW",
            Self::Busy => "BUSY",
            Self::Timeout(_) => "TIMEOUT",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::Device(_) => "DEVICE_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Conversion(_) => "CONVERSION_ERROR",
            Self::LineTooLong { .. } => "LINE_TOO_LONG",
            Self::Io(_) => "IO_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    /// Error category (for classification)
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationLoad(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,
            Self::OutOfRange { .. }
            | Self::InvalidMoveMode(_)
            | Self::AxisDisabled(_)
            | Self::Conversion(_)
            | Self::LineTooLong { .. } => ErrorCategory::Validation,
            Self::AxisNotFound(_) => ErrorCategory::NotFound,
            Self::Busy => ErrorCategory::ResourceBusy,
            Self::QueueOverflow => ErrorCategory::ResourceExhausted,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::MalformedResponse(_) | Self::Device(_) => ErrorCategory::Protocol,
            Self::PortNotOpen | Self::Transport(_) => ErrorCategory::Connection,
            Self::Io(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Timeout(_) | Self::Transport(_))
    }

    /// Get log level
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Connection => Level::ERROR,
            ErrorCategory::Timeout
            | ErrorCategory::Protocol
            | ErrorCategory::ResourceBusy
            | ErrorCategory::ResourceExhausted => Level::WARN,
            ErrorCategory::Validation | ErrorCategory::NotFound => Level::INFO,
            ErrorCategory::Configuration => Level::ERROR,
        }
    }

    /// Log `self` at [`Self::log_level`], tagged with its error code
    pub fn log(&self, context: &str) {
        use tracing::Level;
        let code = self.error_code();
        match self.log_level() {
            Level::ERROR => tracing::error!(code, "{}: {}", context, self),
            Level::WARN => tracing::warn!(code, "{}: {}", context, self),
            _ => tracing::info!(code, "{}: {}", context, self),
        }
    }
}

// Conversion traits for common error types
impl From<serde_yaml::Error> for BridgeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigurationLoad(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigurationLoad(err.to_string())
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::BridgeError::ConfigurationLoad($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::BridgeError::ConfigurationLoad(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! conversion_error {
    ($msg:expr) => {
        $crate::BridgeError::Conversion($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::BridgeError::Conversion(format!($fmt, $($arg)*))
    };
}
