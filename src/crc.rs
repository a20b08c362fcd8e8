//! CRC-16/MODBUS
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF, processed
//! least-significant bit first. The CRC travels low byte first.

use crc::{Crc, CRC_16_MODBUS};
use tracing::trace;

use crate::constants::CRC_LEN;
use crate::error::{ModbusError, ModbusResult};

/// CRC calculator for RTU frames
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the Modbus CRC of `data`.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Write the CRC of `buffer[..length]` into `buffer[length..length + 2]`.
///
/// Returns the frame length including the CRC.
pub fn append_crc(buffer: &mut [u8], length: usize) -> ModbusResult<usize> {
    if length + CRC_LEN > buffer.len() {
        return Err(ModbusError::frame(format!(
            "No room for CRC: {} + {} > {}",
            length,
            CRC_LEN,
            buffer.len()
        )));
    }
    let crc = crc16(&buffer[..length]);
    buffer[length..length + CRC_LEN].copy_from_slice(&crc.to_le_bytes());
    Ok(length + CRC_LEN)
}

/// Check the trailing CRC of `buffer[..length]`.
///
/// Frames shorter than 3 bytes never verify.
pub fn verify_crc(buffer: &[u8], length: usize) -> bool {
    if length < 3 || length > buffer.len() {
        return false;
    }
    let data_len = length - CRC_LEN;
    let received = u16::from_le_bytes([buffer[data_len], buffer[data_len + 1]]);
    let calculated = crc16(&buffer[..data_len]);
    if received != calculated {
        trace!(
            "CRC mismatch: calculated 0x{:04X}, received 0x{:04X}",
            calculated,
            received
        );
    }
    received == calculated
}

/// The CRC carried by the last two bytes of `frame`, if present.
pub(crate) fn trailing_crc(frame: &[u8]) -> Option<u16> {
    let len = frame.len();
    (len >= CRC_LEN).then(|| u16::from_le_bytes([frame[len - 2], frame[len - 1]]))
}
