//! Hex encoding utility
//! Used to log binary (Modbus) commands next to their text counterparts

use std::fmt::Write;

/// Binary payloads at or above this size are logged as a placeholder
pub const MAX_LOGGED_BINARY_LEN: usize = 256;

/// Encode bytes to uppercase hex string
/// Example: [0x12, 0x34, 0xAB] -> "1234AB"
pub fn encode_upper(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Loggable form of a binary command: hex when short, `[binary data]` otherwise
pub fn describe_binary(data: &[u8]) -> String {
    if data.len() < MAX_LOGGED_BINARY_LEN {
        encode_upper(data)
    } else {
        "[binary data]".to_string()
    }
}
