//! Modbus RTU master
//!
//! [`ModbusMaster`] issues one request at a time and blocks until the
//! response arrives, the response timeout expires or the link fails.
//!
//! | Function Code | Method | Quantity |
//! |---------------|--------|----------|
//! | 0x01 | [`ModbusMaster::read_coils`] | 1-2000 |
//! | 0x02 | [`ModbusMaster::read_discrete_inputs`] | 1-2000 |
//! | 0x03 | [`ModbusMaster::read_holding_registers`] | 1-125 |
//! | 0x04 | [`ModbusMaster::read_input_registers`] | 1-125 |
//! | 0x05 | [`ModbusMaster::write_single_coil`] | - |
//! | 0x06 | [`ModbusMaster::write_single_register`] | - |
//! | 0x0F | [`ModbusMaster::write_multiple_coils`] | 1-1968 |
//! | 0x10 | [`ModbusMaster::write_multiple_registers`] | 1-123 |
//!
//! Every call clears [`ModbusMaster::last_exception`] first. When the slave
//! answers with an exception response the call fails with
//! [`ModbusError::Exception`] and the code stays readable until the next
//! call.
//!
//! # Example
//!
//! ```rust
//! use voltage_rtu::memory::MemoryLink;
//! use voltage_rtu::{crc16, ModbusMaster};
//!
//! // A canned slave answering two holding registers
//! let mut reply = vec![0x01, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02];
//! let crc = crc16(&reply);
//! reply.extend_from_slice(&crc.to_le_bytes());
//!
//! let mut link = MemoryLink::new();
//! link.set_responder(move |_| reply.clone());
//!
//! let mut master = ModbusMaster::new(link);
//! let mut registers = [0u16; 2];
//! master.read_holding_registers(1, 0, 2, &mut registers).unwrap();
//! assert_eq!(registers, [10, 258]);
//! ```

use std::time::Duration;

use tracing::{debug, warn};

use crate::codec;
use crate::config::{ResponseValidation, RtuConfig};
use crate::constants::{MIN_RTU_FRAME_SIZE, REQUEST_HEADER_LEN};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{FrameBuffer, FrameBuilder};
use crate::protocol::{ModbusFunction, SlaveId, BROADCAST_ADDRESS};
use crate::rtu_core::RtuCore;
use crate::transport::{Clock, SerialLink, SystemClock, TransportStats};

/// Blocking Modbus RTU master
pub struct ModbusMaster<L, C = SystemClock> {
    core: RtuCore<L, C>,
    tx: FrameBuffer,
    rx: FrameBuffer,
    last_exception: u8,
}

impl<L: SerialLink> ModbusMaster<L, SystemClock> {
    /// Master with default timing and the system clock
    pub fn new(link: L) -> Self {
        Self::from_core(RtuCore::new(link, SystemClock::new(), RtuConfig::default()))
    }
}

impl<L: SerialLink, C: Clock> ModbusMaster<L, C> {
    /// Master with explicit clock and configuration
    pub fn with_config(link: L, clock: C, config: RtuConfig) -> ModbusResult<Self> {
        config.validate()?;
        Ok(Self::from_core(RtuCore::new(link, clock, config)))
    }

    fn from_core(core: RtuCore<L, C>) -> Self {
        Self {
            core,
            tx: FrameBuffer::new(),
            rx: FrameBuffer::new(),
            last_exception: 0,
        }
    }

    /// Exception code of the most recent call, 0 if it raised none
    #[inline]
    pub fn last_exception(&self) -> u8 {
        self.last_exception
    }

    /// Default unit address from the configuration
    pub fn address(&self) -> SlaveId {
        self.core.address()
    }

    pub fn set_address(&mut self, unit: SlaveId) {
        self.core.set_address(unit);
    }

    pub fn timeout(&self) -> Duration {
        self.core.timeout()
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.core.set_timeout(timeout);
    }

    pub fn config(&self) -> &RtuConfig {
        self.core.config()
    }

    pub fn set_config(&mut self, config: RtuConfig) -> ModbusResult<()> {
        self.core.set_config(config)
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.core.set_packet_logging(enabled);
    }

    pub fn stats(&self) -> &TransportStats {
        self.core.stats()
    }

    pub fn link(&self) -> &L {
        self.core.link()
    }

    pub fn link_mut(&mut self) -> &mut L {
        self.core.link_mut()
    }

    /// Release the link and clock
    pub fn into_parts(self) -> (L, C) {
        self.core.into_parts()
    }

    /// Read coils (function code 0x01).
    ///
    /// # Arguments
    ///
    /// * `unit` - Slave address (1-247)
    /// * `start` - First coil address
    /// * `quantity` - Number of coils (1-2000)
    /// * `out` - Receives coil `start + i` at index `i`
    pub fn read_coils(
        &mut self,
        unit: SlaveId,
        start: u16,
        quantity: u16,
        out: &mut [bool],
    ) -> ModbusResult<()> {
        self.read_bits(ModbusFunction::ReadCoils, unit, start, quantity, out)
    }

    /// Read discrete inputs (function code 0x02).
    pub fn read_discrete_inputs(
        &mut self,
        unit: SlaveId,
        start: u16,
        quantity: u16,
        out: &mut [bool],
    ) -> ModbusResult<()> {
        self.read_bits(ModbusFunction::ReadDiscreteInputs, unit, start, quantity, out)
    }

    /// Read holding registers (function code 0x03).
    ///
    /// # Arguments
    ///
    /// * `unit` - Slave address (1-247)
    /// * `start` - First register address
    /// * `quantity` - Number of registers (1-125)
    /// * `out` - Receives register `start + i` at index `i`
    pub fn read_holding_registers(
        &mut self,
        unit: SlaveId,
        start: u16,
        quantity: u16,
        out: &mut [u16],
    ) -> ModbusResult<()> {
        self.read_words(ModbusFunction::ReadHoldingRegisters, unit, start, quantity, out)
    }

    /// Read input registers (function code 0x04).
    pub fn read_input_registers(
        &mut self,
        unit: SlaveId,
        start: u16,
        quantity: u16,
        out: &mut [u16],
    ) -> ModbusResult<()> {
        self.read_words(ModbusFunction::ReadInputRegisters, unit, start, quantity, out)
    }

    /// Write single coil (function code 0x05).
    ///
    /// `true` is sent as 0xFF00, `false` as 0x0000.
    pub fn write_single_coil(
        &mut self,
        unit: SlaveId,
        address: u16,
        value: bool,
    ) -> ModbusResult<()> {
        self.last_exception = 0;
        FrameBuilder::write_single_coil(&mut self.tx, unit, address, value)?;
        self.transact(unit, ModbusFunction::WriteSingleCoil)
    }

    /// Write single register (function code 0x06).
    pub fn write_single_register(
        &mut self,
        unit: SlaveId,
        address: u16,
        value: u16,
    ) -> ModbusResult<()> {
        self.last_exception = 0;
        FrameBuilder::write_single_register(&mut self.tx, unit, address, value)?;
        self.transact(unit, ModbusFunction::WriteSingleRegister)
    }

    /// Write multiple coils (function code 0x0F).
    ///
    /// The quantity is `values.len()`, which must be 1-1968.
    pub fn write_multiple_coils(
        &mut self,
        unit: SlaveId,
        start: u16,
        values: &[bool],
    ) -> ModbusResult<()> {
        self.last_exception = 0;
        let function = ModbusFunction::WriteMultipleCoils;
        check_quantity(function, values.len())?;
        FrameBuilder::write_multiple_coils(&mut self.tx, unit, start, values)?;
        self.transact(unit, function)
    }

    /// Write multiple registers (function code 0x10).
    ///
    /// The quantity is `values.len()`, which must be 1-123.
    pub fn write_multiple_registers(
        &mut self,
        unit: SlaveId,
        start: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        self.last_exception = 0;
        let function = ModbusFunction::WriteMultipleRegisters;
        check_quantity(function, values.len())?;
        FrameBuilder::write_multiple_registers(&mut self.tx, unit, start, values)?;
        self.transact(unit, function)
    }

    fn read_bits(
        &mut self,
        function: ModbusFunction,
        unit: SlaveId,
        start: u16,
        quantity: u16,
        out: &mut [bool],
    ) -> ModbusResult<()> {
        self.last_exception = 0;
        check_read(function, quantity, out.len())?;
        self.check_broadcast_read(function, unit)?;
        FrameBuilder::read_request(&mut self.tx, unit, function, start, quantity)?;
        self.transact(unit, function)?;

        let data = self.rx.payload().get(1..).unwrap_or(&[]);
        codec::unpack_bits(data, quantity as usize, out)
            .map_err(|_| truncated(function, data.len()))
    }

    fn read_words(
        &mut self,
        function: ModbusFunction,
        unit: SlaveId,
        start: u16,
        quantity: u16,
        out: &mut [u16],
    ) -> ModbusResult<()> {
        self.last_exception = 0;
        check_read(function, quantity, out.len())?;
        self.check_broadcast_read(function, unit)?;
        FrameBuilder::read_request(&mut self.tx, unit, function, start, quantity)?;
        self.transact(unit, function)?;

        let data = self.rx.payload().get(1..).unwrap_or(&[]);
        codec::unpack_registers(data, quantity as usize, out)
            .map_err(|_| truncated(function, data.len()))
    }

    /// A broadcast read has nothing to return when slaves stay silent
    fn check_broadcast_read(&self, function: ModbusFunction, unit: SlaveId) -> ModbusResult<()> {
        if unit == BROADCAST_ADDRESS && !self.core.config().broadcast_replies {
            return Err(ModbusError::invalid_data(format!(
                "{} cannot be broadcast without replies",
                function.description()
            )));
        }
        Ok(())
    }

    /// Send the frame in `tx` and leave a validated normal response in `rx`.
    ///
    /// A broadcast returns right after sending when `broadcast_replies` is
    /// off; otherwise it waits like any other request.
    fn transact(&mut self, unit: SlaveId, function: ModbusFunction) -> ModbusResult<()> {
        self.core.send_frame(&self.tx)?;
        if unit == BROADCAST_ADDRESS && !self.core.config().broadcast_replies {
            debug!("Broadcast {} sent, no response expected", function);
            return Ok(());
        }

        let timeout = self.core.timeout();
        let received = self.core.receive_frame(timeout, &mut self.rx)?;
        if received == 0 {
            debug!("No response from unit {} to {}", unit, function);
            return Err(ModbusError::timeout(
                function.description(),
                timeout.as_millis() as u64,
            ));
        }
        if received < MIN_RTU_FRAME_SIZE {
            return Err(ModbusError::frame(format!(
                "Response too short: {} bytes",
                received
            )));
        }
        self.core.check_crc(&self.rx)?;

        let strict = self.core.config().response_validation == ResponseValidation::Strict;
        if strict {
            self.check_header()?;
        }

        if let Some(code) = self.rx.exception_code() {
            self.last_exception = code;
            warn!(
                "Unit {} answered {} with exception 0x{:02X}",
                unit, function, code
            );
            return Err(ModbusError::exception(function.to_u8(), code));
        }

        if strict {
            self.check_echo(function)?;
        }
        Ok(())
    }

    /// Unit and function code of the response must match the request.
    /// A broadcast may be answered from any unit.
    fn check_header(&self) -> ModbusResult<()> {
        let request = self.tx.body();
        let response = self.rx.body();
        if request[0] != BROADCAST_ADDRESS && response[0] != request[0] {
            return Err(ModbusError::protocol(format!(
                "Response from unit {}, expected {}",
                response[0], request[0]
            )));
        }
        if response[1] & 0x7F != request[1] {
            return Err(ModbusError::protocol(format!(
                "Response function 0x{:02X}, expected 0x{:02X}",
                response[1], request[1]
            )));
        }
        Ok(())
    }

    /// Byte count of a read, or the echoed header of a write, must match
    fn check_echo(&self, function: ModbusFunction) -> ModbusResult<()> {
        let request = self.tx.body();
        let response = self.rx.body();

        if function.is_read() {
            let quantity = codec::read_u16_be(request, 4).unwrap_or(0) as usize;
            let expected = match function {
                ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs => {
                    codec::bit_byte_count(quantity)
                }
                _ => codec::register_byte_count(quantity),
            };
            let payload = self.rx.payload();
            let byte_count = payload.first().copied().unwrap_or(0) as usize;
            if byte_count != expected || payload.len() != expected + 1 {
                return Err(ModbusError::protocol(format!(
                    "Byte count {} with {} data bytes, expected {}",
                    byte_count,
                    payload.len().saturating_sub(1),
                    expected
                )));
            }
        } else if response[1..] != request[1..REQUEST_HEADER_LEN] {
            return Err(ModbusError::protocol(format!(
                "{} echo does not match the request",
                function.description()
            )));
        }
        Ok(())
    }
}

fn check_quantity(function: ModbusFunction, quantity: usize) -> ModbusResult<()> {
    let max = function.max_quantity().unwrap_or(1) as usize;
    if quantity == 0 || quantity > max {
        return Err(ModbusError::invalid_data(format!(
            "{}: quantity {} outside 1-{}",
            function.description(),
            quantity,
            max
        )));
    }
    Ok(())
}

fn check_read(function: ModbusFunction, quantity: u16, capacity: usize) -> ModbusResult<()> {
    check_quantity(function, quantity as usize)?;
    if capacity < quantity as usize {
        return Err(ModbusError::invalid_data(format!(
            "Output holds {} values, {} requested",
            capacity, quantity
        )));
    }
    Ok(())
}

fn truncated(function: ModbusFunction, available: usize) -> ModbusError {
    ModbusError::frame(format!(
        "{} response truncated: {} data bytes",
        function.description(),
        available
    ))
}
