//! Modbus RTU response decoding
//!
//! Read responses are `slave | fc | byte count | data... | crc(2)`, write
//! echoes are 8 bytes and exceptions are `slave | fc|0x80 | code | crc(2)`.
//! Decoding never reads past the buffer: a payload too short for its
//! advertised register count yields no values.

use errors::{BridgeError, BridgeResult};

use super::frame::{is_read_function, FRAME_LEN};

/// Exception response length
pub const EXCEPTION_RESPONSE_LEN: usize = 5;

/// Minimum length that carries one register value
const MIN_VALUE_RESPONSE_LEN: usize = 5;

/// First 16-bit value of a read response (`256 * b[3] + b[4]`)
pub fn decode_single_value(response: &[u8]) -> Option<u16> {
    if response.len() < MIN_VALUE_RESPONSE_LEN {
        return None;
    }
    Some(u16::from_be_bytes([response[3], response[4]]))
}

/// All 16-bit values of a read response
///
/// The register count is `byte_count / 2`; the payload must hold that many pairs.
pub fn decode_values(response: &[u8]) -> Option<Vec<u16>> {
    if response.len() < MIN_VALUE_RESPONSE_LEN {
        return None;
    }

    let count = usize::from(response[2] / 2);
    if response.len() < 3 + count * 2 {
        return None;
    }

    Some(
        response[3..3 + count * 2]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect(),
    )
}

/// Like [`decode_values`] but as a `MalformedResponse` error
pub fn decode_values_checked(response: &[u8]) -> BridgeResult<Vec<u16>> {
    decode_values(response).ok_or_else(|| {
        BridgeError::MalformedResponse(format!(
            "Modbus response too short: {} bytes",
            response.len()
        ))
    })
}

/// Total response length once enough of the header has arrived
///
/// `None` while the length is still unknown.
pub fn expected_response_len(request_function: u8, received: &[u8]) -> Option<usize> {
    if received.len() < 2 {
        return None;
    }

    if received[1] & 0x80 != 0 {
        return Some(EXCEPTION_RESPONSE_LEN);
    }

    if is_read_function(request_function) {
        received.get(2).map(|&count| 3 + usize::from(count) + 2)
    } else {
        Some(FRAME_LEN)
    }
}

/// Whether `received` already holds a complete response to `request_function`
pub fn is_complete_response(request_function: u8, received: &[u8]) -> bool {
    expected_response_len(request_function, received).is_some_and(|len| received.len() >= len)
}
