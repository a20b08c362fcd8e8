//! RTU frame buffer
//!
//! Fixed-size stack buffer sized for the largest RTU frame, so the master and
//! slave can each own one transmit and one receive buffer and reuse them for
//! every exchange without heap allocation.

use tracing::debug;

use crate::codec;
use crate::constants::{CRC_LEN, MAX_RTU_FRAME_SIZE, MAX_WRITE_COILS, MAX_WRITE_REGISTERS};
use crate::crc;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{is_exception_code, ModbusFunction, SlaveId};

/// Stack-allocated RTU frame: `[unit][function][payload...][crc_lo][crc_hi]`
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    data: [u8; MAX_RTU_FRAME_SIZE],
    len: usize,
}

impl FrameBuffer {
    /// Create an empty frame
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_RTU_FRAME_SIZE],
            len: 0,
        }
    }

    /// Create a frame from raw bytes
    pub fn from_slice(data: &[u8]) -> ModbusResult<Self> {
        let mut frame = Self::new();
        frame.extend(data)?;
        Ok(frame)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        if self.is_full() {
            return Err(ModbusError::frame("RTU frame buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        self.extend(&value.to_be_bytes())
    }

    /// Extend with a byte slice
    pub fn extend(&mut self, data: &[u8]) -> ModbusResult<()> {
        if self.len + data.len() > MAX_RTU_FRAME_SIZE {
            return Err(ModbusError::frame(format!(
                "RTU frame would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_RTU_FRAME_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Append the CRC of the current contents
    pub fn append_crc(&mut self) -> ModbusResult<()> {
        self.len = crc::append_crc(&mut self.data, self.len)?;
        Ok(())
    }

    /// Verify the trailing CRC
    #[inline]
    pub fn verify_crc(&self) -> bool {
        crc::verify_crc(&self.data, self.len)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len >= MAX_RTU_FRAME_SIZE
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Unit address (first byte)
    #[inline]
    pub fn unit(&self) -> Option<SlaveId> {
        self.as_slice().first().copied()
    }

    /// Function code byte, including the exception flag
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().get(1).copied()
    }

    /// Check if exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code().map(is_exception_code).unwrap_or(false)
    }

    /// Exception code of an exception response
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() {
            self.as_slice().get(2).copied()
        } else {
            None
        }
    }

    /// Frame without its trailing CRC
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.data[..self.len.saturating_sub(CRC_LEN)]
    }

    /// Bytes between the function code and the CRC
    #[inline]
    pub fn payload(&self) -> &[u8] {
        self.body().get(2..).unwrap_or(&[])
    }

    /// Space-separated hex dump for packet logging
    pub fn to_hex(&self) -> String {
        format_hex(self.as_slice())
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Format raw bytes as a hex string
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Frame builder - fluent API over a borrowed [`FrameBuffer`]
///
/// The buffer is cleared on creation and the CRC is appended by
/// [`FrameBuilder::finish`].
pub struct FrameBuilder<'a> {
    frame: &'a mut FrameBuffer,
}

impl<'a> FrameBuilder<'a> {
    /// Start a new frame addressed to `unit`
    pub fn new(frame: &'a mut FrameBuffer, unit: SlaveId) -> ModbusResult<Self> {
        frame.clear();
        frame.push(unit)?;
        Ok(Self { frame })
    }

    /// Set function code
    #[inline]
    pub fn function_code(self, fc: u8) -> ModbusResult<Self> {
        self.frame.push(fc)?;
        Ok(self)
    }

    /// Add address
    #[inline]
    pub fn address(self, addr: u16) -> ModbusResult<Self> {
        self.frame.push_u16(addr)?;
        Ok(self)
    }

    /// Add quantity (or single write value)
    #[inline]
    pub fn quantity(self, qty: u16) -> ModbusResult<Self> {
        self.frame.push_u16(qty)?;
        Ok(self)
    }

    /// Add a byte
    #[inline]
    pub fn byte(self, b: u8) -> ModbusResult<Self> {
        self.frame.push(b)?;
        Ok(self)
    }

    /// Add data
    #[inline]
    pub fn data(self, data: &[u8]) -> ModbusResult<Self> {
        self.frame.extend(data)?;
        Ok(self)
    }

    /// Append the CRC and return the total frame length
    pub fn finish(self) -> ModbusResult<usize> {
        self.frame.append_crc()?;
        debug!("RTU frame built: {}", self.frame.to_hex());
        Ok(self.frame.len())
    }

    /// Build a read request frame for FC01-04
    pub fn read_request(
        frame: &mut FrameBuffer,
        unit: SlaveId,
        function: ModbusFunction,
        start_address: u16,
        quantity: u16,
    ) -> ModbusResult<usize> {
        if !function.is_read() {
            return Err(ModbusError::invalid_function(function.to_u8()));
        }
        FrameBuilder::new(frame, unit)?
            .function_code(function.to_u8())?
            .address(start_address)?
            .quantity(quantity)?
            .finish()
    }

    /// Build a write single coil frame (FC05)
    pub fn write_single_coil(
        frame: &mut FrameBuffer,
        unit: SlaveId,
        address: u16,
        value: bool,
    ) -> ModbusResult<usize> {
        FrameBuilder::new(frame, unit)?
            .function_code(ModbusFunction::WriteSingleCoil.to_u8())?
            .address(address)?
            .quantity(codec::encode_coil_value(value))?
            .finish()
    }

    /// Build a write single register frame (FC06)
    pub fn write_single_register(
        frame: &mut FrameBuffer,
        unit: SlaveId,
        address: u16,
        value: u16,
    ) -> ModbusResult<usize> {
        FrameBuilder::new(frame, unit)?
            .function_code(ModbusFunction::WriteSingleRegister.to_u8())?
            .address(address)?
            .quantity(value)?
            .finish()
    }

    /// Build a write multiple coils frame (FC15)
    pub fn write_multiple_coils(
        frame: &mut FrameBuffer,
        unit: SlaveId,
        address: u16,
        values: &[bool],
    ) -> ModbusResult<usize> {
        let mut packed = [0u8; (MAX_WRITE_COILS as usize).div_ceil(8)];
        if values.len() > MAX_WRITE_COILS as usize {
            return Err(ModbusError::invalid_data(format!(
                "Too many coils: {} (max {})",
                values.len(),
                MAX_WRITE_COILS
            )));
        }
        let byte_count = codec::pack_bits(values, &mut packed)?;

        FrameBuilder::new(frame, unit)?
            .function_code(ModbusFunction::WriteMultipleCoils.to_u8())?
            .address(address)?
            .quantity(values.len() as u16)?
            .byte(byte_count as u8)?
            .data(&packed[..byte_count])?
            .finish()
    }

    /// Build a write multiple registers frame (FC16)
    pub fn write_multiple_registers(
        frame: &mut FrameBuffer,
        unit: SlaveId,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<usize> {
        let mut packed = [0u8; MAX_WRITE_REGISTERS as usize * 2];
        if values.len() > MAX_WRITE_REGISTERS as usize {
            return Err(ModbusError::invalid_data(format!(
                "Too many registers: {} (max {})",
                values.len(),
                MAX_WRITE_REGISTERS
            )));
        }
        let byte_count = codec::pack_registers(values, &mut packed)?;

        FrameBuilder::new(frame, unit)?
            .function_code(ModbusFunction::WriteMultipleRegisters.to_u8())?
            .address(address)?
            .quantity(values.len() as u16)?
            .byte(byte_count as u8)?
            .data(&packed[..byte_count])?
            .finish()
    }

    /// Build an exception response `[unit][fc|0x80][code][crc]`
    pub fn exception(
        frame: &mut FrameBuffer,
        unit: SlaveId,
        function_code: u8,
        exception_code: u8,
    ) -> ModbusResult<usize> {
        FrameBuilder::new(frame, unit)?
            .function_code(function_code | crate::constants::EXCEPTION_FLAG)?
            .byte(exception_code)?
            .finish()
    }
}
