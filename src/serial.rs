//! Serial port link
//!
//! [`SerialPortLink`] drives an OS serial port through the blocking
//! `serialport` API that `tokio-serial` re-exports.

use std::io::{self, Read, Write};
use std::time::Duration;

use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::{ModbusError, ModbusResult};
use crate::transport::SerialLink;

/// Read timeout of the underlying port; the engine does its own timing
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// [`SerialLink`] over a real serial port
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    port_name: String,
}

impl SerialPortLink {
    /// Open `port` at `baud_rate`, 8N1
    pub fn open(port: &str, baud_rate: u32) -> ModbusResult<Self> {
        Self::open_with_config(port, baud_rate, DataBits::Eight, StopBits::One, Parity::None)
    }

    /// Open `port` with explicit character framing
    pub fn open_with_config(
        port: &str,
        baud_rate: u32,
        data_bits: DataBits,
        stop_bits: StopBits,
        parity: Parity,
    ) -> ModbusResult<Self> {
        let serial = tokio_serial::new(port, baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(PORT_READ_TIMEOUT)
            .open()
            .map_err(|e| ModbusError::Io(e.into()))?;

        debug!("Opened serial port {} at {} baud", port, baud_rate);
        Ok(Self {
            port: serial,
            port_name: port.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl SerialLink for SerialPortLink {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        self.send_buffer(&[byte])
    }

    fn send_buffer(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        Write::flush(&mut self.port)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
