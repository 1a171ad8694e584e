//! Modbus command codec
//!
//! Builds the 8-byte request frames sent as binary commands and decodes the
//! register values of their responses.

pub mod codec;
pub mod frame;

pub use codec::{decode_single_value, decode_values, decode_values_checked, is_complete_response};
pub use frame::{function_code, ModbusCommand, ModbusFunction, RegisterType, FRAME_LEN};
