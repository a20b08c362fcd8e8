//! Serial transport layer for Modbus RTU
//!
//! RTU frames carry no length field and no terminator: a frame ends when the
//! line has been silent for roughly 3.5 character times. This module owns
//! that timing discipline on top of two collaborators:
//!
//! - [`SerialLink`] - byte-oriented access to the serial line
//! - [`Clock`] - a monotonic time source that can also sleep
//!
//! [`FrameTransport`] combines them into `send_frame` / `receive_frame`.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::RtuConfig;
use crate::error::ModbusResult;
use crate::frame::{format_hex, FrameBuffer};

/// Byte-level access to a serial line.
///
/// The engine borrows the link for the duration of each exchange; `&mut T`
/// implements the trait too, so a link can be lent to a master or slave and
/// used again once the protocol object is dropped.
pub trait SerialLink {
    /// Queue one byte for transmission
    fn send_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Queue a sequence of bytes for transmission, in order
    fn send_buffer(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            self.send_byte(byte)?;
        }
        Ok(())
    }

    /// Number of received bytes ready to read
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one received byte, `None` if nothing is pending
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Discard any stale received input
    fn flush(&mut self) -> io::Result<()>;
}

impl<T: SerialLink + ?Sized> SerialLink for &mut T {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        (**self).send_byte(byte)
    }

    fn send_buffer(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send_buffer(bytes)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        (**self).send_byte(byte)
    }

    fn send_buffer(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send_buffer(bytes)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Monotonic time source used for silence detection and timeouts
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed origin
    fn now(&self) -> Duration;

    /// Block the caller for `duration`
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall-clock [`Clock`] backed by [`Instant`] and [`std::thread::sleep`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Receives that ended with no byte at all
    pub timeouts: u64,
    /// Frames whose CRC did not verify
    pub crc_errors: u64,
    /// Bytes dropped because a frame exceeded the RTU maximum
    pub overflow_bytes: u64,
}

/// Log packet with direction and format
fn log_packet(direction: &str, data: &[u8]) {
    let unit = data.first().copied().unwrap_or(0);
    info!("[MODBUS-RTU] {} slave:{} {}", direction, unit, format_hex(data));
}

/// Silence-delimited frame I/O over a [`SerialLink`]
pub struct FrameTransport<L, C> {
    link: L,
    clock: C,
    /// Delay before every transmission (inter-frame gap)
    frame_delay: Duration,
    /// Silence after the last byte that ends a frame
    silence: Duration,
    /// Sleep between polls when the line is idle
    poll_interval: Duration,
    packet_logging: bool,
    stats: TransportStats,
}

impl<L: SerialLink, C: Clock> FrameTransport<L, C> {
    /// Create a transport using the timing of `config`
    pub fn new(link: L, clock: C, config: &RtuConfig) -> Self {
        Self {
            link,
            clock,
            frame_delay: config.frame_delay,
            silence: config.silence_threshold,
            poll_interval: config.poll_interval,
            packet_logging: config.packet_logging,
            stats: TransportStats::default(),
        }
    }

    /// Apply new timing values
    pub fn apply_config(&mut self, config: &RtuConfig) {
        self.frame_delay = config.frame_delay;
        self.silence = config.silence_threshold;
        self.poll_interval = config.poll_interval;
        self.packet_logging = config.packet_logging;
    }

    /// Enable or disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// Send one frame.
    ///
    /// Stale input is discarded first, then the line is left silent for the
    /// inter-frame delay before the bytes go out.
    pub fn send_frame(&mut self, frame: &[u8]) -> ModbusResult<()> {
        self.link.flush()?;
        self.clock.sleep(self.frame_delay);

        if self.packet_logging {
            log_packet("send", frame);
        }
        self.link.send_buffer(frame)?;

        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        debug!("RTU frame sent: {} bytes", frame.len());
        Ok(())
    }

    /// Receive one frame into `rx`, returning the number of bytes captured.
    ///
    /// Completes when, after at least one byte, the line stays silent for
    /// longer than the silence threshold, or when `timeout` has elapsed.
    /// Returns 0 if nothing arrived. Bytes past the RTU maximum are drained
    /// and dropped.
    pub fn receive_frame(
        &mut self,
        timeout: Duration,
        rx: &mut FrameBuffer,
    ) -> ModbusResult<usize> {
        rx.clear();
        let start = self.clock.now();
        let mut last_byte_at: Option<Duration> = None;
        let mut dropped: u64 = 0;

        loop {
            let mut received_any = false;
            while self.link.bytes_available()? > 0 {
                let Some(byte) = self.link.read_byte()? else {
                    break;
                };
                received_any = true;
                last_byte_at = Some(self.clock.now());
                if rx.is_full() {
                    dropped += 1;
                } else {
                    rx.push(byte)?;
                }
            }

            let now = self.clock.now();
            if let Some(last) = last_byte_at {
                if now.saturating_sub(last) > self.silence {
                    trace!("Frame delimited by silence after {} bytes", rx.len());
                    break;
                }
            }
            if now.saturating_sub(start) >= timeout {
                trace!("Receive window of {:?} elapsed", timeout);
                break;
            }
            if !received_any {
                self.clock.sleep(self.poll_interval);
            }
        }

        if dropped > 0 {
            warn!(
                "RTU frame exceeded {} bytes, dropped {} trailing bytes",
                rx.len(),
                dropped
            );
            self.stats.overflow_bytes += dropped;
        }

        if rx.is_empty() {
            self.stats.timeouts += 1;
            return Ok(0);
        }

        if self.packet_logging {
            log_packet("receive", rx.as_slice());
        }
        self.stats.frames_received += 1;
        self.stats.bytes_received += rx.len() as u64;
        debug!("RTU frame received: {}", rx.to_hex());
        Ok(rx.len())
    }

    /// Record a CRC failure
    pub(crate) fn record_crc_error(&mut self) {
        self.stats.crc_errors += 1;
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = TransportStats::default();
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Give back the link and clock
    pub fn into_parts(self) -> (L, C) {
        (self.link, self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_RTU_FRAME_SIZE;
    use crate::memory::{ManualClock, MemoryLink};

    fn transport(link: MemoryLink, clock: ManualClock) -> FrameTransport<MemoryLink, ManualClock> {
        FrameTransport::new(link, clock, &RtuConfig::default())
    }

    #[test]
    fn test_send_frame_flushes_and_waits() {
        let clock = ManualClock::new();
        let mut link = MemoryLink::with_clock(clock.clone());
        link.inject(&[0xAA, 0xBB]);

        let mut transport = transport(link, clock.clone());
        transport.send_frame(&[0x01, 0x03, 0x00]).unwrap();

        assert_eq!(clock.now(), Duration::from_millis(4));
        assert_eq!(transport.link().sent(), &[0x01, 0x03, 0x00]);
        assert_eq!(transport.link().pending_input(), 0);
        assert_eq!(transport.link().flush_count(), 1);
        assert_eq!(transport.stats().frames_sent, 1);
    }

    #[test]
    fn test_receive_frame_ends_on_silence() {
        let clock = ManualClock::new();
        let mut link = MemoryLink::with_clock(clock.clone());
        link.inject(&[0x01, 0x02, 0x03, 0x04, 0x05]);

        let mut transport = transport(link, clock.clone());
        let mut rx = FrameBuffer::new();
        let len = transport.receive_frame(Duration::from_millis(1000), &mut rx).unwrap();

        assert_eq!(len, 5);
        assert_eq!(rx.as_slice(), &[0x01, 0x02, 0x03, 0x04, 0x05]);
        // Returned as soon as the gap exceeded 4ms, not at the timeout
        assert_eq!(clock.now(), Duration::from_millis(5));
    }

    #[test]
    fn test_receive_frame_splits_on_gap() {
        let clock = ManualClock::new();
        let mut link = MemoryLink::with_clock(clock.clone());
        link.inject(&[0x01, 0x02]);
        link.schedule(Duration::from_millis(20), &[0x03, 0x04]);

        let mut transport = transport(link, clock.clone());
        let mut rx = FrameBuffer::new();

        transport.receive_frame(Duration::from_millis(1000), &mut rx).unwrap();
        assert_eq!(rx.as_slice(), &[0x01, 0x02]);

        transport.receive_frame(Duration::from_millis(1000), &mut rx).unwrap();
        assert_eq!(rx.as_slice(), &[0x03, 0x04]);
    }

    #[test]
    fn test_receive_frame_joins_bytes_within_silence() {
        let clock = ManualClock::new();
        let mut link = MemoryLink::with_clock(clock.clone());
        link.inject(&[0x01, 0x02]);
        link.schedule(Duration::from_millis(3), &[0x03]);

        let mut transport = transport(link, clock);
        let mut rx = FrameBuffer::new();
        transport.receive_frame(Duration::from_millis(1000), &mut rx).unwrap();
        assert_eq!(rx.as_slice(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_receive_frame_timeout_returns_empty() {
        let clock = ManualClock::new();
        let link = MemoryLink::with_clock(clock.clone());

        let mut transport = transport(link, clock.clone());
        let mut rx = FrameBuffer::new();
        let len = transport.receive_frame(Duration::from_millis(50), &mut rx).unwrap();

        assert_eq!(len, 0);
        assert!(rx.is_empty());
        assert_eq!(clock.now(), Duration::from_millis(50));
        assert_eq!(transport.stats().timeouts, 1);
    }

    #[test]
    fn test_receive_frame_drains_overflow() {
        let clock = ManualClock::new();
        let mut link = MemoryLink::with_clock(clock.clone());
        link.inject(&[0x5A; MAX_RTU_FRAME_SIZE + 10]);

        let mut transport = transport(link, clock);
        let mut rx = FrameBuffer::new();
        let len = transport.receive_frame(Duration::from_millis(1000), &mut rx).unwrap();

        assert_eq!(len, MAX_RTU_FRAME_SIZE);
        assert_eq!(transport.link().pending_input(), 0);
        assert_eq!(transport.stats().overflow_bytes, 10);
    }

    #[test]
    fn test_link_io_error_propagates() {
        let clock = ManualClock::new();
        let mut link = MemoryLink::with_clock(clock.clone());
        link.fail_sends(io::ErrorKind::BrokenPipe);

        let mut transport = transport(link, clock);
        let err = transport.send_frame(&[0x01]).unwrap_err();
        assert!(matches!(err, crate::error::ModbusError::Io(_)));
        assert_eq!(transport.stats().frames_sent, 0);
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now() >= before + Duration::from_millis(2));
    }
}
