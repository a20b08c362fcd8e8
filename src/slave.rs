//! Modbus RTU slave
//!
//! [`ModbusSlave`] answers requests addressed to its unit from a
//! [`MemoryMap`]. The application calls [`ModbusSlave::process`] from its
//! main loop; each call handles at most one frame and returns immediately
//! when the line is idle.
//!
//! Request validation, in order:
//!
//! | Check | Exception |
//! |-------|-----------|
//! | unknown function code | Illegal Function (0x01) |
//! | body shorter than address + quantity | Illegal Data Value (0x03) |
//! | quantity 0 or above the function's ceiling | Illegal Data Value (0x03) |
//! | `start + quantity` beyond the table | Illegal Data Address (0x02) |
//! | single write address beyond the table | Illegal Data Address (0x02) |
//! | coil value other than 0xFF00 / 0x0000 | Illegal Data Value (0x03) |
//! | byte count disagreeing with quantity or frame | Illegal Data Value (0x03) |
//!
//! A rejected request never touches the memory map.

use std::ops::Range;

use tracing::{debug, trace, warn};

use crate::codec;
use crate::config::RtuConfig;
use crate::constants::{
    MAX_READ_COILS, MAX_READ_REGISTERS, MEMORY_MAP_SIZE, MIN_RTU_FRAME_SIZE, REQUEST_HEADER_LEN,
};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{FrameBuffer, FrameBuilder};
use crate::memory_map::MemoryMap;
use crate::protocol::{ModbusException, ModbusFunction, SlaveId, BROADCAST_ADDRESS};
use crate::rtu_core::RtuCore;
use crate::transport::{Clock, SerialLink, SystemClock, TransportStats};

/// Why a received frame was dropped without reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Fewer bytes than the smallest valid frame
    TooShort(usize),
    /// Addressed to another unit
    OtherUnit(SlaveId),
    CrcMismatch,
}

/// Result of one [`ModbusSlave::process`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was pending on the line
    Idle,
    /// A frame arrived and was discarded
    Ignored(IgnoreReason),
    /// A normal response was sent
    Responded { function: u8 },
    /// An exception response was sent
    Exception {
        function: u8,
        exception: ModbusException,
    },
    /// A broadcast request was executed without reply (`broadcast_replies`
    /// off)
    Broadcast {
        function: u8,
        exception: Option<ModbusException>,
    },
}

/// Slave request counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlaveStats {
    /// Frames accepted for processing
    pub requests: u64,
    pub responses: u64,
    pub exceptions: u64,
    /// Frames dropped as too short or for another unit
    pub ignored: u64,
    pub crc_errors: u64,
    pub broadcasts: u64,
}

/// Blocking Modbus RTU slave
pub struct ModbusSlave<L, C = SystemClock> {
    core: RtuCore<L, C>,
    map: MemoryMap,
    tx: FrameBuffer,
    rx: FrameBuffer,
    stats: SlaveStats,
}

impl<L: SerialLink> ModbusSlave<L, SystemClock> {
    /// Slave at `unit` with default timing and the system clock
    pub fn new(link: L, unit: SlaveId) -> ModbusResult<Self> {
        Self::with_config(
            link,
            SystemClock::new(),
            RtuConfig::default().with_unit_address(unit),
        )
    }
}

impl<L: SerialLink, C: Clock> ModbusSlave<L, C> {
    /// Slave with explicit clock and configuration.
    ///
    /// The configured unit address must not be the broadcast address.
    pub fn with_config(link: L, clock: C, config: RtuConfig) -> ModbusResult<Self> {
        config.validate()?;
        check_unit_address(config.unit_address)?;
        Ok(Self {
            core: RtuCore::new(link, clock, config),
            map: MemoryMap::new(),
            tx: FrameBuffer::new(),
            rx: FrameBuffer::new(),
            stats: SlaveStats::default(),
        })
    }

    /// Handle at most one pending request.
    ///
    /// Returns [`PollOutcome::Idle`] at once if no byte is waiting. Otherwise
    /// receives one frame within the slave receive window, filters it by
    /// length, unit address and CRC, executes it against the memory map and
    /// sends the response. Only link failures are errors.
    pub fn process(&mut self) -> ModbusResult<PollOutcome> {
        if self.core.link_mut().bytes_available()? == 0 {
            return Ok(PollOutcome::Idle);
        }

        let window = self.core.config().slave_receive_window;
        let received = self.core.receive_frame(window, &mut self.rx)?;
        if received < MIN_RTU_FRAME_SIZE {
            trace!("Dropping {} byte fragment", received);
            self.stats.ignored += 1;
            return Ok(PollOutcome::Ignored(IgnoreReason::TooShort(received)));
        }

        let own = self.core.address();
        let unit = self.rx.unit().unwrap_or(BROADCAST_ADDRESS);
        if unit != own && unit != BROADCAST_ADDRESS {
            trace!("Frame for unit {} ignored by unit {}", unit, own);
            self.stats.ignored += 1;
            return Ok(PollOutcome::Ignored(IgnoreReason::OtherUnit(unit)));
        }

        if self.core.check_crc(&self.rx).is_err() {
            self.stats.crc_errors += 1;
            return Ok(PollOutcome::Ignored(IgnoreReason::CrcMismatch));
        }

        self.stats.requests += 1;
        let function = self.rx.function_code().unwrap_or(0);
        let result = handle_request(&mut self.map, self.rx.body(), own, &mut self.tx);
        let exception = result.err();
        if let Some(exception) = exception {
            debug!("Unit {} rejects function 0x{:02X}: {}", own, function, exception);
            FrameBuilder::exception(&mut self.tx, own, function, exception.to_u8())?;
        }

        if unit == BROADCAST_ADDRESS {
            self.stats.broadcasts += 1;
            if !self.core.config().broadcast_replies {
                return Ok(PollOutcome::Broadcast {
                    function,
                    exception,
                });
            }
        }

        self.core.send_frame(&self.tx)?;
        Ok(match exception {
            Some(exception) => {
                self.stats.exceptions += 1;
                PollOutcome::Exception {
                    function,
                    exception,
                }
            }
            None => {
                self.stats.responses += 1;
                PollOutcome::Responded { function }
            }
        })
    }

    pub fn address(&self) -> SlaveId {
        self.core.address()
    }

    /// Change the unit address; the broadcast address is rejected
    pub fn set_address(&mut self, unit: SlaveId) -> ModbusResult<()> {
        check_unit_address(unit)?;
        self.core.set_address(unit);
        Ok(())
    }

    pub fn config(&self) -> &RtuConfig {
        self.core.config()
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.core.set_packet_logging(enabled);
    }

    pub fn memory(&self) -> &MemoryMap {
        &self.map
    }

    pub fn memory_mut(&mut self) -> &mut MemoryMap {
        &mut self.map
    }

    pub fn set_coil(&mut self, address: u16, value: bool) {
        self.map.set_coil(address, value);
    }

    pub fn get_coil(&self, address: u16) -> bool {
        self.map.get_coil(address)
    }

    pub fn set_discrete_input(&mut self, address: u16, value: bool) {
        self.map.set_discrete_input(address, value);
    }

    pub fn get_discrete_input(&self, address: u16) -> bool {
        self.map.get_discrete_input(address)
    }

    pub fn set_holding_register(&mut self, address: u16, value: u16) {
        self.map.set_holding_register(address, value);
    }

    pub fn get_holding_register(&self, address: u16) -> u16 {
        self.map.get_holding_register(address)
    }

    pub fn set_input_register(&mut self, address: u16, value: u16) {
        self.map.set_input_register(address, value);
    }

    pub fn get_input_register(&self, address: u16) -> u16 {
        self.map.get_input_register(address)
    }

    pub fn stats(&self) -> &SlaveStats {
        &self.stats
    }

    pub fn transport_stats(&self) -> &TransportStats {
        self.core.stats()
    }

    pub fn link(&self) -> &L {
        self.core.link()
    }

    pub fn link_mut(&mut self) -> &mut L {
        self.core.link_mut()
    }

    pub fn into_parts(self) -> (L, C) {
        self.core.into_parts()
    }
}

fn check_unit_address(unit: SlaveId) -> ModbusResult<()> {
    if unit == BROADCAST_ADDRESS {
        return Err(ModbusError::configuration(
            "Slave address 0 is reserved for broadcast",
        ));
    }
    Ok(())
}

/// Execute one request against `map` and build the response in `response`.
///
/// `request` is the frame without its CRC, starting with the unit byte.
/// The response is addressed from `unit` and carries its CRC. On error the
/// map is untouched and the caller answers with the returned exception.
pub fn handle_request(
    map: &mut MemoryMap,
    request: &[u8],
    unit: SlaveId,
    response: &mut FrameBuffer,
) -> Result<usize, ModbusException> {
    let fc = request
        .get(1)
        .copied()
        .ok_or(ModbusException::IllegalFunction)?;
    let function = ModbusFunction::from_u8(fc).map_err(|_| ModbusException::IllegalFunction)?;

    let (Some(address), Some(value)) = (
        codec::read_u16_be(request, 2),
        codec::read_u16_be(request, 4),
    ) else {
        return Err(ModbusException::IllegalDataValue);
    };
    let data = &request[REQUEST_HEADER_LEN..];

    match function {
        ModbusFunction::ReadCoils => {
            handle_read_bits(map.coils(), function, address, value, unit, response)
        }
        ModbusFunction::ReadDiscreteInputs => handle_read_bits(
            map.discrete_inputs(),
            function,
            address,
            value,
            unit,
            response,
        ),
        ModbusFunction::ReadHoldingRegisters => handle_read_registers(
            map.holding_registers(),
            function,
            address,
            value,
            unit,
            response,
        ),
        ModbusFunction::ReadInputRegisters => handle_read_registers(
            map.input_registers(),
            function,
            address,
            value,
            unit,
            response,
        ),
        ModbusFunction::WriteSingleCoil => {
            let slot = check_address(address)?;
            let state =
                codec::decode_coil_value(value).ok_or(ModbusException::IllegalDataValue)?;
            map.coils_mut()[slot] = state;
            echo_header(request, unit, response)
        }
        ModbusFunction::WriteSingleRegister => {
            let slot = check_address(address)?;
            map.holding_registers_mut()[slot] = value;
            echo_header(request, unit, response)
        }
        ModbusFunction::WriteMultipleCoils => {
            let range = check_range(function, address, value)?;
            let values = write_payload(data, codec::bit_byte_count(range.len()))?;
            codec::unpack_bits(values, range.len(), &mut map.coils_mut()[range])
                .map_err(|_| ModbusException::IllegalDataValue)?;
            echo_header(request, unit, response)
        }
        ModbusFunction::WriteMultipleRegisters => {
            let range = check_range(function, address, value)?;
            let values = write_payload(data, codec::register_byte_count(range.len()))?;
            let registers = &mut map.holding_registers_mut()[range.clone()];
            codec::unpack_registers(values, range.len(), registers)
                .map_err(|_| ModbusException::IllegalDataValue)?;
            echo_header(request, unit, response)
        }
    }
}

/// Quantity against the function ceiling, then the span against the table
fn check_range(
    function: ModbusFunction,
    start: u16,
    quantity: u16,
) -> Result<Range<usize>, ModbusException> {
    let max = function.max_quantity().unwrap_or(1);
    if quantity == 0 || quantity > max {
        return Err(ModbusException::IllegalDataValue);
    }
    if start as u32 + quantity as u32 > MEMORY_MAP_SIZE as u32 {
        return Err(ModbusException::IllegalDataAddress);
    }
    let start = start as usize;
    Ok(start..start + quantity as usize)
}

fn check_address(address: u16) -> Result<usize, ModbusException> {
    if address as usize >= MEMORY_MAP_SIZE {
        return Err(ModbusException::IllegalDataAddress);
    }
    Ok(address as usize)
}

/// Data of a multiple write: `[byte_count][byte_count bytes]`, nothing more
fn write_payload(data: &[u8], expected: usize) -> Result<&[u8], ModbusException> {
    match data.split_first() {
        Some((&byte_count, values))
            if byte_count as usize == expected && values.len() == expected =>
        {
            Ok(values)
        }
        _ => Err(ModbusException::IllegalDataValue),
    }
}

fn handle_read_bits(
    table: &[bool],
    function: ModbusFunction,
    start: u16,
    quantity: u16,
    unit: SlaveId,
    response: &mut FrameBuffer,
) -> Result<usize, ModbusException> {
    let range = check_range(function, start, quantity)?;
    let mut packed = [0u8; (MAX_READ_COILS as usize).div_ceil(8)];
    let byte_count = codec::pack_bits(&table[range], &mut packed).map_err(device_failure)?;

    FrameBuilder::new(response, unit)
        .and_then(|b| b.function_code(function.to_u8()))
        .and_then(|b| b.byte(byte_count as u8))
        .and_then(|b| b.data(&packed[..byte_count]))
        .and_then(|b| b.finish())
        .map_err(device_failure)
}

fn handle_read_registers(
    table: &[u16],
    function: ModbusFunction,
    start: u16,
    quantity: u16,
    unit: SlaveId,
    response: &mut FrameBuffer,
) -> Result<usize, ModbusException> {
    let range = check_range(function, start, quantity)?;
    let mut packed = [0u8; MAX_READ_REGISTERS as usize * 2];
    let byte_count =
        codec::pack_registers(&table[range], &mut packed).map_err(device_failure)?;

    FrameBuilder::new(response, unit)
        .and_then(|b| b.function_code(function.to_u8()))
        .and_then(|b| b.byte(byte_count as u8))
        .and_then(|b| b.data(&packed[..byte_count]))
        .and_then(|b| b.finish())
        .map_err(device_failure)
}

/// Function code, address and value/quantity of the request, from `unit`
fn echo_header(
    request: &[u8],
    unit: SlaveId,
    response: &mut FrameBuffer,
) -> Result<usize, ModbusException> {
    FrameBuilder::new(response, unit)
        .and_then(|b| b.data(&request[1..REQUEST_HEADER_LEN]))
        .and_then(|b| b.finish())
        .map_err(device_failure)
}

fn device_failure(err: ModbusError) -> ModbusException {
    warn!("Slave failed to build response: {}", err);
    ModbusException::SlaveDeviceFailure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;
    use crate::memory::{ManualClock, MemoryLink};

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16(body).to_le_bytes());
        frame
    }

    fn slave(config: RtuConfig) -> TestSlave {
        let clock = ManualClock::new();
        ModbusSlave::with_config(MemoryLink::with_clock(clock.clone()), clock, config).unwrap()
    }

    type TestSlave = ModbusSlave<MemoryLink, ManualClock>;

    fn exchange(slave: &mut TestSlave, request: &[u8]) -> (PollOutcome, Vec<u8>) {
        slave.link_mut().inject(&with_crc(request));
        let outcome = slave.process().unwrap();
        (outcome, slave.link_mut().take_sent())
    }

    fn handle(map: &mut MemoryMap, request: &[u8]) -> Result<Vec<u8>, ModbusException> {
        let mut response = FrameBuffer::new();
        handle_request(map, request, 1, &mut response)?;
        assert!(response.verify_crc());
        Ok(response.body().to_vec())
    }

    #[test]
    fn test_idle_when_nothing_pending() {
        let mut slave = slave(RtuConfig::default());
        assert_eq!(slave.process().unwrap(), PollOutcome::Idle);
        assert!(slave.link().sent().is_empty());
    }

    #[test]
    fn test_read_holding_registers_response() {
        let mut slave = slave(RtuConfig::default());
        slave.set_holding_register(0, 10);
        slave.set_holding_register(1, 258);

        let (outcome, sent) = exchange(&mut slave, &[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(outcome, PollOutcome::Responded { function: 0x03 });
        assert_eq!(sent, with_crc(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]));
        assert_eq!(slave.stats().responses, 1);
    }

    #[test]
    fn test_read_coils_packing() {
        let mut map = MemoryMap::new();
        for (i, on) in [true, false, true, true, false, false, true, true, true, false]
            .into_iter()
            .enumerate()
        {
            map.set_coil(0x13 + i as u16, on);
        }
        let body = handle(&mut map, &[0x01, 0x01, 0x00, 0x13, 0x00, 0x0A]).unwrap();
        assert_eq!(body, [0x01, 0x01, 0x02, 0xCD, 0x01]);
    }

    #[test]
    fn test_read_inputs() {
        let mut map = MemoryMap::new();
        map.set_discrete_input(2, true);
        map.set_input_register(7, 0xABCD);

        assert_eq!(
            handle(&mut map, &[0x01, 0x02, 0x00, 0x00, 0x00, 0x03]).unwrap(),
            [0x01, 0x02, 0x01, 0x04]
        );
        assert_eq!(
            handle(&mut map, &[0x01, 0x04, 0x00, 0x07, 0x00, 0x01]).unwrap(),
            [0x01, 0x04, 0x02, 0xAB, 0xCD]
        );
    }

    #[test]
    fn test_write_single_coil_echo() {
        let mut slave = slave(RtuConfig::default());
        let request = [0x01, 0x05, 0x00, 0x05, 0xFF, 0x00];
        let (outcome, sent) = exchange(&mut slave, &request);

        assert_eq!(outcome, PollOutcome::Responded { function: 0x05 });
        assert_eq!(sent, with_crc(&request));
        assert!(slave.get_coil(5));
    }

    #[test]
    fn test_write_single_coil_bad_value() {
        let mut map = MemoryMap::new();
        let err = handle(&mut map, &[0x01, 0x05, 0x00, 0x05, 0x12, 0x34]).unwrap_err();
        assert_eq!(err, ModbusException::IllegalDataValue);
        assert!(!map.get_coil(5));
    }

    #[test]
    fn test_write_single_register_bounds() {
        let mut map = MemoryMap::new();
        assert_eq!(
            handle(&mut map, &[0x01, 0x06, 0x01, 0x00, 0x00, 0x01]).unwrap_err(),
            ModbusException::IllegalDataAddress
        );
        handle(&mut map, &[0x01, 0x06, 0x00, 0xFF, 0x12, 0x34]).unwrap();
        assert_eq!(map.get_holding_register(255), 0x1234);
    }

    #[test]
    fn test_write_multiple_coils() {
        let mut map = MemoryMap::new();
        let body = handle(
            &mut map,
            &[0x01, 0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01],
        )
        .unwrap();
        assert_eq!(body, [0x01, 0x0F, 0x00, 0x13, 0x00, 0x0A]);
        assert_eq!(
            &map.coils()[0x13..0x1D],
            &[true, false, true, true, false, false, true, true, true, false]
        );
    }

    #[test]
    fn test_write_multiple_registers() {
        let mut map = MemoryMap::new();
        let body = handle(
            &mut map,
            &[0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02],
        )
        .unwrap();
        assert_eq!(body, [0x01, 0x10, 0x00, 0x01, 0x00, 0x02]);
        assert_eq!(&map.holding_registers()[1..3], &[0x000A, 0x0102]);
    }

    #[test]
    fn test_range_overflow_is_address_error() {
        let mut map = MemoryMap::new();
        // start 250, quantity 10
        for request in [
            [0x01, 0x03, 0x00, 0xFA, 0x00, 0x0A],
            [0x01, 0x01, 0x00, 0xFA, 0x00, 0x0A],
        ] {
            assert_eq!(
                handle(&mut map, &request).unwrap_err(),
                ModbusException::IllegalDataAddress
            );
        }

        let mut write = vec![0x01, 0x10, 0x00, 0xFA, 0x00, 0x0A, 0x14];
        write.extend_from_slice(&[0xFF; 20]);
        assert_eq!(
            handle(&mut map, &write).unwrap_err(),
            ModbusException::IllegalDataAddress
        );
        assert_eq!(map, MemoryMap::new());
    }

    #[test]
    fn test_range_check_does_not_wrap() {
        let mut map = MemoryMap::new();
        let err = handle(&mut map, &[0x01, 0x03, 0xFF, 0xFF, 0x00, 0x02]).unwrap_err();
        assert_eq!(err, ModbusException::IllegalDataAddress);
    }

    #[test]
    fn test_quantity_limits_are_value_errors() {
        let mut map = MemoryMap::new();
        let cases: [[u8; 6]; 4] = [
            [0x01, 0x03, 0x00, 0x00, 0x00, 0x00],
            [0x01, 0x03, 0x00, 0x00, 0x00, 0x7E],
            [0x01, 0x01, 0x00, 0x00, 0x07, 0xD1],
            [0x01, 0x02, 0x00, 0x00, 0x00, 0x00],
        ];
        for request in cases {
            assert_eq!(
                handle(&mut map, &request).unwrap_err(),
                ModbusException::IllegalDataValue,
                "{:02X?}",
                request
            );
        }
    }

    #[test]
    fn test_write_multiple_ceilings_are_value_errors() {
        let mut map = MemoryMap::new();

        // 1969 coils, 247 data bytes
        let mut coils = vec![0x01, 0x0F, 0x00, 0x00, 0x07, 0xB1, 247];
        coils.extend_from_slice(&[0xFF; 247]);
        assert_eq!(
            handle(&mut map, &coils).unwrap_err(),
            ModbusException::IllegalDataValue
        );

        // 124 registers, 248 data bytes
        let mut registers = vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x7C, 248];
        registers.extend_from_slice(&[0xAA; 248]);
        assert_eq!(
            handle(&mut map, &registers).unwrap_err(),
            ModbusException::IllegalDataValue
        );

        assert_eq!(map, MemoryMap::new());
    }

    #[test]
    fn test_inconsistent_byte_count() {
        let mut map = MemoryMap::new();
        // Byte count 1 for 10 coils
        assert_eq!(
            handle(&mut map, &[0x01, 0x0F, 0x00, 0x00, 0x00, 0x0A, 0x01, 0xFF]).unwrap_err(),
            ModbusException::IllegalDataValue
        );
        // Byte count right, data missing
        assert_eq!(
            handle(&mut map, &[0x01, 0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x01]).unwrap_err(),
            ModbusException::IllegalDataValue
        );
        // Header only
        assert_eq!(
            handle(&mut map, &[0x01, 0x10, 0x00, 0x00, 0x00, 0x01]).unwrap_err(),
            ModbusException::IllegalDataValue
        );
        assert_eq!(map, MemoryMap::new());
    }

    #[test]
    fn test_short_body_is_value_error() {
        let mut map = MemoryMap::new();
        assert_eq!(
            handle(&mut map, &[0x01, 0x03, 0x00]).unwrap_err(),
            ModbusException::IllegalDataValue
        );
    }

    #[test]
    fn test_unknown_function_exception_frame() {
        let mut slave = slave(RtuConfig::default());
        let (outcome, sent) = exchange(&mut slave, &[0x01, 0x2B, 0x0E, 0x01, 0x00]);

        assert_eq!(
            outcome,
            PollOutcome::Exception {
                function: 0x2B,
                exception: ModbusException::IllegalFunction
            }
        );
        assert_eq!(sent, with_crc(&[0x01, 0xAB, 0x01]));
        assert_eq!(slave.stats().exceptions, 1);
    }

    #[test]
    fn test_other_unit_ignored() {
        let mut slave = slave(RtuConfig::default());
        let (outcome, sent) = exchange(&mut slave, &[0x02, 0x03, 0x00, 0x00, 0x00, 0x01]);

        assert_eq!(outcome, PollOutcome::Ignored(IgnoreReason::OtherUnit(2)));
        assert!(sent.is_empty());
        assert_eq!(slave.stats().ignored, 1);
    }

    #[test]
    fn test_bad_crc_ignored() {
        let mut slave = slave(RtuConfig::default());
        let mut frame = with_crc(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03]);
        frame[7] ^= 0x01;
        slave.link_mut().inject(&frame);

        assert_eq!(
            slave.process().unwrap(),
            PollOutcome::Ignored(IgnoreReason::CrcMismatch)
        );
        assert!(slave.link().sent().is_empty());
        assert_eq!(slave.get_holding_register(1), 0);
        assert_eq!(slave.stats().crc_errors, 1);
    }

    #[test]
    fn test_fragment_ignored() {
        let mut slave = slave(RtuConfig::default());
        slave.link_mut().inject(&[0x01, 0x03, 0x00]);
        assert_eq!(
            slave.process().unwrap(),
            PollOutcome::Ignored(IgnoreReason::TooShort(3))
        );
    }

    #[test]
    fn test_broadcast_answered_by_default() {
        let mut slave = slave(RtuConfig::default());
        let (outcome, sent) = exchange(&mut slave, &[0x00, 0x06, 0x00, 0x04, 0x00, 0x63]);

        assert_eq!(outcome, PollOutcome::Responded { function: 0x06 });
        assert_eq!(sent, with_crc(&[0x01, 0x06, 0x00, 0x04, 0x00, 0x63]));
        assert_eq!(slave.get_holding_register(4), 99);
        assert_eq!(slave.stats().broadcasts, 1);

        let (outcome, sent) = exchange(&mut slave, &[0x00, 0x05, 0x00, 0x05, 0xFF, 0x00]);
        assert_eq!(outcome, PollOutcome::Responded { function: 0x05 });
        assert_eq!(sent, with_crc(&[0x01, 0x05, 0x00, 0x05, 0xFF, 0x00]));
    }

    #[test]
    fn test_broadcast_validation_failure_answered() {
        let mut slave = slave(RtuConfig::default());
        let (outcome, sent) = exchange(&mut slave, &[0x00, 0x03, 0x00, 0x00, 0x00, 0x00]);

        assert_eq!(
            outcome,
            PollOutcome::Exception {
                function: 0x03,
                exception: ModbusException::IllegalDataValue
            }
        );
        assert_eq!(sent, with_crc(&[0x01, 0x83, 0x03]));
    }

    #[test]
    fn test_broadcast_silent_when_disabled() {
        let mut slave = slave(RtuConfig::default().with_broadcast_replies(false));
        let (outcome, sent) = exchange(&mut slave, &[0x00, 0x06, 0x00, 0x04, 0x00, 0x63]);

        assert_eq!(
            outcome,
            PollOutcome::Broadcast {
                function: 0x06,
                exception: None
            }
        );
        assert!(sent.is_empty());
        assert_eq!(slave.get_holding_register(4), 99);

        let (outcome, sent) = exchange(&mut slave, &[0x00, 0x03, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(
            outcome,
            PollOutcome::Broadcast {
                function: 0x03,
                exception: Some(ModbusException::IllegalDataValue)
            }
        );
        assert!(sent.is_empty());
        assert_eq!(slave.stats().broadcasts, 2);
    }

    #[test]
    fn test_broadcast_address_rejected_for_slave() {
        let clock = ManualClock::new();
        let result = ModbusSlave::with_config(
            MemoryLink::new(),
            clock,
            RtuConfig::default().with_unit_address(0),
        );
        assert!(matches!(result, Err(ModbusError::Configuration { .. })));
    }

    #[test]
    fn test_set_address_rejects_broadcast() {
        let mut slave = slave(RtuConfig::default());
        let err = slave.set_address(BROADCAST_ADDRESS).unwrap_err();
        assert!(matches!(err, ModbusError::Configuration { .. }));
        assert_eq!(slave.address(), 1);

        slave.set_address(17).unwrap();
        assert_eq!(slave.address(), 17);
    }
}
