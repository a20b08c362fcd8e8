//! # RTU Payload Codec
//!
//! Pure packing functions for Modbus payloads, independent of any I/O.
//!
//! | Data | Wire layout |
//! |------|-------------|
//! | coils / discrete inputs | bit `i` → bit `i % 8` of byte `i / 8`, LSB first |
//! | registers | 16-bit big-endian, sequential |
//! | single coil | `0xFF00` = ON, `0x0000` = OFF |
//!
//! Every function checks its slice bounds and reports a
//! [`ModbusError::InvalidData`] instead of panicking.

use crate::constants::{COIL_OFF, COIL_ON};
use crate::error::{ModbusError, ModbusResult};

/// Number of payload bytes needed for `quantity` bits.
#[inline]
pub fn bit_byte_count(quantity: usize) -> usize {
    quantity.div_ceil(8)
}

/// Number of payload bytes needed for `quantity` registers.
#[inline]
pub fn register_byte_count(quantity: usize) -> usize {
    quantity * 2
}

/// Pack `bits` LSB-first into `out`, zeroing unused high bits.
///
/// Returns the number of bytes written.
///
/// # Example
///
/// ```rust
/// use voltage_rtu::codec::pack_bits;
///
/// let mut out = [0u8; 2];
/// let bits = [true, false, true, true, false, false, false, false, true];
/// let n = pack_bits(&bits, &mut out).unwrap();
/// assert_eq!(n, 2);
/// assert_eq!(out, [0x0D, 0x01]);
/// ```
pub fn pack_bits(bits: &[bool], out: &mut [u8]) -> ModbusResult<usize> {
    let byte_count = bit_byte_count(bits.len());
    if out.len() < byte_count {
        return Err(ModbusError::invalid_data(format!(
            "Bit buffer too small: need {} bytes, have {}",
            byte_count,
            out.len()
        )));
    }

    out[..byte_count].fill(0);
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    Ok(byte_count)
}

/// Unpack `quantity` LSB-first bits from `bytes` into `out[..quantity]`.
pub fn unpack_bits(bytes: &[u8], quantity: usize, out: &mut [bool]) -> ModbusResult<()> {
    let byte_count = bit_byte_count(quantity);
    if bytes.len() < byte_count {
        return Err(ModbusError::invalid_data(format!(
            "Bit payload too short: {} bytes for {} bits",
            bytes.len(),
            quantity
        )));
    }
    if out.len() < quantity {
        return Err(ModbusError::invalid_data(format!(
            "Output holds {} values, {} requested",
            out.len(),
            quantity
        )));
    }

    for (i, slot) in out[..quantity].iter_mut().enumerate() {
        *slot = (bytes[i / 8] >> (i % 8)) & 0x01 != 0;
    }
    Ok(())
}

/// Pack registers big-endian into `out`. Returns the number of bytes written.
pub fn pack_registers(values: &[u16], out: &mut [u8]) -> ModbusResult<usize> {
    let byte_count = register_byte_count(values.len());
    if out.len() < byte_count {
        return Err(ModbusError::invalid_data(format!(
            "Register buffer too small: need {} bytes, have {}",
            byte_count,
            out.len()
        )));
    }

    for (chunk, value) in out.chunks_exact_mut(2).zip(values) {
        chunk.copy_from_slice(&value.to_be_bytes());
    }
    Ok(byte_count)
}

/// Unpack `quantity` big-endian registers from `bytes` into `out[..quantity]`.
pub fn unpack_registers(bytes: &[u8], quantity: usize, out: &mut [u16]) -> ModbusResult<()> {
    let byte_count = register_byte_count(quantity);
    if bytes.len() < byte_count {
        return Err(ModbusError::invalid_data(format!(
            "Register payload too short: {} bytes for {} registers",
            bytes.len(),
            quantity
        )));
    }
    if out.len() < quantity {
        return Err(ModbusError::invalid_data(format!(
            "Output holds {} values, {} requested",
            out.len(),
            quantity
        )));
    }

    for (slot, chunk) in out[..quantity].iter_mut().zip(bytes.chunks_exact(2)) {
        *slot = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(())
}

/// Wire value of a single coil write.
#[inline]
pub fn encode_coil_value(value: bool) -> u16 {
    if value {
        COIL_ON
    } else {
        COIL_OFF
    }
}

/// Decode a single coil wire value; anything but `0xFF00`/`0x0000` is invalid.
#[inline]
pub fn decode_coil_value(raw: u16) -> Option<bool> {
    match raw {
        COIL_ON => Some(true),
        COIL_OFF => Some(false),
        _ => None,
    }
}

/// Big-endian u16 at `offset`, if the slice is long enough.
#[inline]
pub fn read_u16_be(bytes: &[u8], offset: usize) -> Option<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_bits_lsb_first() {
        let mut out = [0xFFu8; 3];
        let n = pack_bits(&[true, false, false, false, false, false, false, true, true], &mut out)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(&out[..2], &[0x81, 0x01]);
        // Untouched beyond the byte count
        assert_eq!(out[2], 0xFF);
    }

    #[test]
    fn test_unpack_bits() {
        let mut out = [false; 10];
        unpack_bits(&[0xCD, 0x01], 10, &mut out).unwrap();
        assert_eq!(
            out,
            [true, false, true, true, false, false, true, true, true, false]
        );
    }

    #[test]
    fn test_unpack_bits_ignores_padding() {
        let mut out = [false; 3];
        unpack_bits(&[0xFF], 3, &mut out).unwrap();
        assert_eq!(out, [true, true, true]);
    }

    #[test]
    fn test_bit_boundaries() {
        for quantity in [1usize, 7, 8, 9, 15, 16, 17, 256, 2000] {
            let bits: Vec<bool> = (0..quantity).map(|i| i % 3 == 0).collect();
            let mut packed = vec![0u8; bit_byte_count(quantity)];
            assert_eq!(pack_bits(&bits, &mut packed).unwrap(), packed.len());

            let mut unpacked = vec![false; quantity];
            unpack_bits(&packed, quantity, &mut unpacked).unwrap();
            assert_eq!(unpacked, bits, "quantity {}", quantity);
        }
    }

    #[test]
    fn test_short_buffers_are_errors() {
        let mut small = [0u8; 1];
        assert!(pack_bits(&[false; 9], &mut small).is_err());
        assert!(pack_registers(&[1], &mut small).is_err());

        let mut out = [false; 4];
        assert!(unpack_bits(&[], 1, &mut out).is_err());
        assert!(unpack_bits(&[0xFF], 8, &mut out).is_err());

        let mut regs = [0u16; 1];
        assert!(unpack_registers(&[0x00, 0x01, 0x02], 2, &mut [0u16; 2]).is_err());
        assert!(unpack_registers(&[0x00, 0x01, 0x02, 0x03], 2, &mut regs).is_err());
    }

    #[test]
    fn test_registers_big_endian() {
        let mut out = [0u8; 4];
        assert_eq!(pack_registers(&[0x1234, 0xABCD], &mut out).unwrap(), 4);
        assert_eq!(out, [0x12, 0x34, 0xAB, 0xCD]);

        let mut values = [0u16; 2];
        unpack_registers(&out, 2, &mut values).unwrap();
        assert_eq!(values, [0x1234, 0xABCD]);
    }

    #[test]
    fn test_coil_values() {
        assert_eq!(encode_coil_value(true), 0xFF00);
        assert_eq!(encode_coil_value(false), 0x0000);
        assert_eq!(decode_coil_value(0xFF00), Some(true));
        assert_eq!(decode_coil_value(0x0000), Some(false));
        assert_eq!(decode_coil_value(0x00FF), None);
        assert_eq!(decode_coil_value(0x0001), None);
    }

    #[test]
    fn test_read_u16_be() {
        assert_eq!(read_u16_be(&[0x00, 0x6B, 0x00], 0), Some(0x006B));
        assert_eq!(read_u16_be(&[0x00, 0x6B, 0x00], 2), None);
    }
}
