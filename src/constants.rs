//! Modbus RTU protocol constants
//!
//! Frame limits come from the Modbus over serial line specification:
//! - Maximum RTU ADU: 256 bytes (address + PDU + CRC)
//! - Maximum PDU: 253 bytes, which bounds every quantity ceiling below

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum RTU frame size: Address(1) + PDU(253) + CRC(2)
pub const MAX_RTU_FRAME_SIZE: usize = 256;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
pub const MAX_PDU_SIZE: usize = 253;

/// Smallest frame either role will interpret.
///
/// An exception response is `[unit][fc|0x80][code][crc_lo][crc_hi]`, and no
/// valid request or response is shorter than that.
pub const MIN_RTU_FRAME_SIZE: usize = 5;

/// Length of the fixed request header: unit, function, address(2), quantity/value(2)
pub const REQUEST_HEADER_LEN: usize = 6;

/// Number of trailing CRC bytes
pub const CRC_LEN: usize = 2;

// ============================================================================
// Slave Memory Map
// ============================================================================

/// Number of addressable slots in each slave memory table
pub const MEMORY_MAP_SIZE: usize = 256;

// ============================================================================
// Quantity Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// 1 (FC) + 1 (byte count) + N × 2 ≤ 253 → N ≤ 125
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// 1 (FC) + 2 (addr) + 2 (qty) + 1 (byte count) + N × 2 ≤ 253 → N ≤ 123
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum number of coils for FC01/FC02 (Read Coils/Discrete Inputs)
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum number of coils for FC15 (Write Multiple Coils), 0x7B0
pub const MAX_WRITE_COILS: u16 = 1968;

// ============================================================================
// Wire Values
// ============================================================================

/// Single coil ON value (FC05)
pub const COIL_ON: u16 = 0xFF00;

/// Single coil OFF value (FC05)
pub const COIL_OFF: u16 = 0x0000;

/// High bit marking an exception response function code
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Slave Device Failure
pub const EXCEPTION_SLAVE_DEVICE_FAILURE: u8 = 0x04;

// ============================================================================
// Timing Defaults
// ============================================================================

/// Default master response timeout (ms)
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

/// Pre-send inter-frame delay (ms), ~3.5 character times at 9600 baud
pub const DEFAULT_FRAME_DELAY_MS: u64 = 4;

/// Silence after the last byte that terminates a frame (ms)
pub const DEFAULT_SILENCE_MS: u64 = 4;

/// Bounded receive window used by the slave once bytes are pending (ms)
pub const DEFAULT_SLAVE_RECEIVE_WINDOW_MS: u64 = 100;

/// Sleep between polls of an idle link (ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Above this baud rate the inter-character timing is fixed (Modbus serial line guide)
pub const FIXED_TIMING_BAUD_THRESHOLD: u32 = 19_200;

/// Fixed 3.5 character silence used above [`FIXED_TIMING_BAUD_THRESHOLD`] (µs)
pub const FIXED_SILENCE_US: u64 = 1_750;

/// Bits per RTU character: start + 8 data + parity/stop + stop
pub const BITS_PER_CHAR: u64 = 11;
