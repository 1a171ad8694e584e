//! Fixed 8-byte Modbus RTU request frame
//!
//! Layout: slave (1) | function code (1) | register address (2, big-endian) |
//! data or count (2, big-endian) | CRC-16/MODBUS (2, low byte first).

use bytes::BufMut;
use crc::{Crc, CRC_16_MODBUS};
use errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

/// Request frame length including checksum
pub const FRAME_LEN: usize = 8;

/// Bytes covered by the checksum
pub const CHECKSUM_SPAN: usize = FRAME_LEN - 2;

/// Table-driven CRC-16/MODBUS (init 0xFFFF, reflected poly 0xA001)
const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterType {
    Holding,
    Input,
    Discrete,
    Coils,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusFunction {
    /// Read `data` registers
    ReadValue,
    /// Write one register
    SetValue,
    /// Write many registers
    SetValues,
}

/// Function code for a register type and operation
///
/// Input and discrete registers are read-only; asking to write them fails.
pub fn function_code(register_type: RegisterType, function: ModbusFunction) -> BridgeResult<u8> {
    use ModbusFunction::*;
    use RegisterType::*;

    match (register_type, function) {
        (Input, ReadValue) => Ok(0x04),
        (Discrete, ReadValue) => Ok(0x02),
        (Holding, ReadValue) => Ok(0x03),
        (Holding, SetValue) => Ok(0x06),
        (Holding, SetValues) => Ok(0x10),
        (Coils, ReadValue) => Ok(0x01),
        (Coils, SetValue) => Ok(0x05),
        (Coils, SetValues) => Ok(0x0F),
        (Input | Discrete, _) => Err(BridgeError::invalid_config(
            "register_type",
            format!("{:?} registers are read-only", register_type),
        )),
    }
}

/// Whether a function code reads registers (1-4)
pub fn is_read_function(code: u8) -> bool {
    matches!(code, 0x01..=0x04)
}

/// Human-readable function code name
pub fn function_code_description(code: u8) -> &'static str {
    match code {
        0x01 => "Read Coils",
        0x02 => "Read Discrete Inputs",
        0x03 => "Read Holding Registers",
        0x04 => "Read Input Registers",
        0x05 => "Write Single Coil",
        0x06 => "Write Single Register",
        0x0F => "Write Multiple Coils",
        0x10 => "Write Multiple Registers",
        _ => "Unknown",
    }
}

/// CRC-16/MODBUS of `data`
pub fn checksum(data: &[u8]) -> u16 {
    MODBUS_CRC.checksum(data)
}

/// Complete request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusCommand {
    bytes: [u8; FRAME_LEN],
}

impl ModbusCommand {
    /// Build a frame; `data` is the read count for reads, the value for writes
    pub fn build(
        slave: u8,
        register_type: RegisterType,
        function: ModbusFunction,
        address: u16,
        data: u16,
    ) -> BridgeResult<Self> {
        let code = function_code(register_type, function)?;

        let mut buf = Vec::with_capacity(FRAME_LEN);
        buf.put_u8(slave);
        buf.put_u8(code);
        buf.put_u16(address);
        buf.put_u16(data);
        buf.put_u16_le(checksum(&buf));

        let mut bytes = [0u8; FRAME_LEN];
        bytes.copy_from_slice(&buf);
        Ok(Self { bytes })
    }

    /// Take a caller-supplied frame; a zero checksum field is filled in
    pub fn from_bytes(frame: &[u8]) -> BridgeResult<Self> {
        if frame.len() != FRAME_LEN {
            return Err(BridgeError::MalformedResponse(format!(
                "Modbus frame must be {} bytes, got {}",
                FRAME_LEN,
                frame.len()
            )));
        }

        let mut bytes = [0u8; FRAME_LEN];
        bytes.copy_from_slice(frame);
        if bytes[CHECKSUM_SPAN..] == [0, 0] {
            let crc = checksum(&bytes[..CHECKSUM_SPAN]);
            bytes[CHECKSUM_SPAN..].copy_from_slice(&crc.to_le_bytes());
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn slave(&self) -> u8 {
        self.bytes[0]
    }

    pub fn function_code(&self) -> u8 {
        self.bytes[1]
    }

    pub fn address(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    pub fn data(&self) -> u16 {
        u16::from_be_bytes([self.bytes[4], self.bytes[5]])
    }

    /// Recompute the checksum over the first 6 bytes and compare with the trailer
    pub fn checksum_matches(&self) -> bool {
        checksum(&self.bytes[..CHECKSUM_SPAN]).to_le_bytes() == [self.bytes[6], self.bytes[7]]
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_holding_write_one_frame() {
        let cmd =
            ModbusCommand::build(1, RegisterType::Holding, ModbusFunction::SetValue, 0, 20000)
                .unwrap();
        assert_eq!(
            cmd.as_bytes(),
            &[0x01, 0x06, 0x00, 0x00, 0x4E, 0x20, 0xBD, 0xB2]
        );
        assert!(cmd.checksum_matches());

        let again = ModbusCommand::from_bytes(cmd.as_bytes()).unwrap();
        assert_eq!(again, cmd);
        assert_eq!(again.data(), 20000);
    }

    #[test]
    fn test_function_code_mapping() {
        use ModbusFunction::*;
        use RegisterType::*;
        assert_eq!(function_code(Input, ReadValue).unwrap(), 4);
        assert_eq!(function_code(Discrete, ReadValue).unwrap(), 2);
        assert_eq!(function_code(Holding, SetValues).unwrap(), 16);
        assert_eq!(function_code(Coils, ReadValue).unwrap(), 1);
        assert_eq!(function_code(Coils, SetValue).unwrap(), 5);
        assert_eq!(function_code(Coils, SetValues).unwrap(), 15);
        assert!(function_code(Input, SetValue).is_err());
        assert!(function_code(Discrete, SetValues).is_err());
    }

    #[test]
    fn test_zero_checksum_is_filled() {
        let cmd = ModbusCommand::from_bytes(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0, 0]).unwrap();
        assert_eq!(&cmd.as_bytes()[6..], &[0x84, 0x0A]);
        assert!(is_read_function(cmd.function_code()));

        // A non-zero trailer is taken as given
        let raw = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x12, 0x34];
        let cmd = ModbusCommand::from_bytes(&raw).unwrap();
        assert!(!cmd.checksum_matches());
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(ModbusCommand::from_bytes(&[1, 3, 0]).is_err());
    }
}
