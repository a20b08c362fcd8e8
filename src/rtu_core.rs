//! Protocol core shared by the master and slave roles

use std::time::Duration;

use tracing::warn;

use crate::config::RtuConfig;
use crate::crc;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::FrameBuffer;
use crate::protocol::SlaveId;
use crate::transport::{Clock, FrameTransport, SerialLink, TransportStats};

/// Unit address, response timeout and framed transport
pub struct RtuCore<L, C> {
    transport: FrameTransport<L, C>,
    config: RtuConfig,
}

impl<L: SerialLink, C: Clock> RtuCore<L, C> {
    pub fn new(link: L, clock: C, config: RtuConfig) -> Self {
        Self {
            transport: FrameTransport::new(link, clock, &config),
            config,
        }
    }

    #[inline]
    pub fn address(&self) -> SlaveId {
        self.config.unit_address
    }

    #[inline]
    pub fn set_address(&mut self, unit: SlaveId) {
        self.config.unit_address = unit;
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.config.response_timeout
    }

    #[inline]
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.response_timeout = timeout;
    }

    pub fn config(&self) -> &RtuConfig {
        &self.config
    }

    /// Replace the configuration after validating it
    pub fn set_config(&mut self, config: RtuConfig) -> ModbusResult<()> {
        config.validate()?;
        self.transport.apply_config(&config);
        self.config = config;
        Ok(())
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.config.packet_logging = enabled;
        self.transport.set_packet_logging(enabled);
    }

    /// Transmit a complete frame
    pub fn send_frame(&mut self, frame: &FrameBuffer) -> ModbusResult<()> {
        self.transport.send_frame(frame.as_slice())
    }

    /// Receive one frame within `timeout`; 0 means nothing arrived
    pub fn receive_frame(
        &mut self,
        timeout: Duration,
        rx: &mut FrameBuffer,
    ) -> ModbusResult<usize> {
        self.transport.receive_frame(timeout, rx)
    }

    /// Verify the trailing CRC of `frame`, counting failures
    pub fn check_crc(&mut self, frame: &FrameBuffer) -> ModbusResult<()> {
        if frame.verify_crc() {
            return Ok(());
        }
        self.transport.record_crc_error();

        let expected = crc::crc16(frame.body());
        let actual = crc::trailing_crc(frame.as_slice()).unwrap_or(0);
        warn!(
            "CRC error from unit {}: expected 0x{:04X}, got 0x{:04X}",
            frame.unit().unwrap_or(0),
            expected,
            actual
        );
        Err(ModbusError::Crc { expected, actual })
    }

    pub fn stats(&self) -> &TransportStats {
        self.transport.stats()
    }

    pub fn reset_stats(&mut self) {
        self.transport.reset_stats();
    }

    pub fn link(&self) -> &L {
        self.transport.link()
    }

    pub fn link_mut(&mut self) -> &mut L {
        self.transport.link_mut()
    }

    pub fn clock(&self) -> &C {
        self.transport.clock()
    }

    pub fn into_parts(self) -> (L, C) {
        self.transport.into_parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ManualClock, MemoryLink};

    fn core() -> RtuCore<MemoryLink, ManualClock> {
        let clock = ManualClock::new();
        RtuCore::new(MemoryLink::with_clock(clock.clone()), clock, RtuConfig::default())
    }

    #[test]
    fn test_address_and_timeout_accessors() {
        let mut core = core();
        assert_eq!(core.address(), 1);
        core.set_address(42);
        assert_eq!(core.address(), 42);

        core.set_timeout(Duration::from_millis(250));
        assert_eq!(core.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_check_crc_counts_errors() {
        let mut core = core();
        let good =
            FrameBuffer::from_slice(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0B]).unwrap();
        assert!(core.check_crc(&good).is_ok());

        let bad =
            FrameBuffer::from_slice(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0C]).unwrap();
        let err = core.check_crc(&bad).unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Crc {
                expected: 0x0B98,
                actual: 0x0C98
            }
        ));
        assert_eq!(core.stats().crc_errors, 1);
    }

    #[test]
    fn test_set_config_validates() {
        let mut core = core();
        let bad = RtuConfig::default().with_poll_interval(Duration::ZERO);
        assert!(core.set_config(bad).is_err());
        assert_eq!(core.config().poll_interval, Duration::from_millis(1));

        let good = RtuConfig::default().with_unit_address(9);
        core.set_config(good).unwrap();
        assert_eq!(core.address(), 9);
    }

    #[test]
    fn test_send_and_receive_counted() {
        let mut core = core();
        let frame =
            FrameBuffer::from_slice(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]).unwrap();
        core.send_frame(&frame).unwrap();
        assert_eq!(core.link().sent(), frame.as_slice());

        core.link_mut().inject(&[0x01, 0x83, 0x02, 0xC0, 0xF1]);
        let mut rx = FrameBuffer::new();
        assert_eq!(core.receive_frame(Duration::from_millis(100), &mut rx).unwrap(), 5);

        let stats = core.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.bytes_sent, 8);
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.bytes_received, 5);
    }
}
