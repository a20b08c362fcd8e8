//! # Voltage RTU - Blocking Modbus RTU Master/Slave Engine
//!
//! A Modbus RTU implementation for serial lines, built around a byte-level
//! [`SerialLink`] and a [`Clock`] so it runs the same on a real UART, an
//! in-memory test link or a simulated timeline.
//!
//! ## Features
//!
//! - **Master and Slave**: both roles over the same framing core
//! - **Silence-Delimited Framing**: inter-frame gap derived from the baud rate
//! - **Fixed Buffers**: one 256-byte transmit and receive frame per engine
//! - **Deterministic Testing**: [`memory::MemoryLink`] + [`memory::ManualClock`]
//! - **Serial Ports**: [`serial::SerialPortLink`] behind the `rtu` feature
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Master | Slave |
//! |------|----------|--------|-------|
//! | 0x01 | Read Coils | ✅ | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ | ✅ |
//! | 0x03 | Read Holding Registers | ✅ | ✅ |
//! | 0x04 | Read Input Registers | ✅ | ✅ |
//! | 0x05 | Write Single Coil | ✅ | ✅ |
//! | 0x06 | Write Single Register | ✅ | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ | ✅ |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voltage_rtu::serial::SerialPortLink;
//! use voltage_rtu::{ModbusMaster, ModbusResult};
//!
//! fn main() -> ModbusResult<()> {
//!     let link = SerialPortLink::open("/dev/ttyUSB0", 9600)?;
//!     let mut master = ModbusMaster::new(link);
//!
//!     // Read 10 holding registers from unit 1, starting at address 0
//!     let mut registers = [0u16; 10];
//!     master.read_holding_registers(1, 0, 10, &mut registers)?;
//!     println!("Registers: {:?}", registers);
//!
//!     // Write a value to register 100
//!     master.write_single_register(1, 100, 0x1234)?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants
pub mod constants;

/// Function and exception code types
pub mod protocol;

/// CRC-16/MODBUS
pub mod crc;

/// Stack-allocated RTU frame buffer and builder
pub mod frame;

/// Bit and register payload packing
pub mod codec;

/// Engine configuration
pub mod config;

/// Serial link, clock and silence-delimited framing
pub mod transport;

/// Framing core shared by master and slave
pub mod rtu_core;

// ============================================================================
// Roles
// ============================================================================

/// Modbus RTU master
pub mod master;

/// Modbus RTU slave
pub mod slave;

/// Slave data tables
pub mod memory_map;

// ============================================================================
// Links
// ============================================================================

/// In-memory link and manual clock
pub mod memory;

/// OS serial port link
#[cfg(feature = "rtu")]
pub mod serial;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use config::{ResponseValidation, RtuConfig};
pub use frame::{FrameBuffer, FrameBuilder};
pub use protocol::{ModbusException, ModbusFunction, SlaveId, BROADCAST_ADDRESS};

// === Roles ===
pub use master::ModbusMaster;
pub use memory_map::MemoryMap;
pub use slave::{handle_request, IgnoreReason, ModbusSlave, PollOutcome, SlaveStats};

// === Transport ===
pub use transport::{Clock, FrameTransport, SerialLink, SystemClock, TransportStats};

// === CRC ===
pub use crate::crc::{append_crc, crc16, verify_crc};

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    MAX_READ_COILS, MAX_READ_REGISTERS, MAX_RTU_FRAME_SIZE, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
    MEMORY_MAP_SIZE,
};

#[cfg(feature = "rtu")]
pub use serial::SerialPortLink;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Voltage RTU v{} - Modbus RTU master/slave engine", VERSION)
}
