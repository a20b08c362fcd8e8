//! Engine configuration
//!
//! [`RtuConfig`] carries the unit address, the response timeout and the
//! silence timing shared by the master and slave roles. Defaults match a
//! 9600 baud line; [`RtuConfig::for_baud_rate`] derives the timing for
//! other speeds.

use std::time::Duration;

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::SlaveId;

/// How closely the master checks a normal response against its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseValidation {
    /// Accept any CRC-valid, non-exception response and decode it per the
    /// requested function code
    #[default]
    Lenient,
    /// Also require the unit, function code, byte count and echoed fields
    /// to match the request
    Strict,
}

/// RTU engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtuConfig {
    /// Own address (slave) or default target (master)
    pub unit_address: SlaveId,
    /// How long the master waits for a response
    pub response_timeout: Duration,
    /// Idle time before each transmission
    pub frame_delay: Duration,
    /// Silence after the last byte that ends a frame
    pub silence_threshold: Duration,
    /// Upper bound on a single slave receive
    pub slave_receive_window: Duration,
    /// Sleep between link polls while idle
    pub poll_interval: Duration,
    pub response_validation: ResponseValidation,
    /// Broadcast requests (unit 0) are answered and awaited like addressed
    /// ones. Off gives standard Modbus behavior: slaves execute broadcasts
    /// silently and the master does not wait.
    pub broadcast_replies: bool,
    /// Emit `[MODBUS-RTU]` hex lines for every frame
    pub packet_logging: bool,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            unit_address: 1,
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            frame_delay: Duration::from_millis(DEFAULT_FRAME_DELAY_MS),
            silence_threshold: Duration::from_millis(DEFAULT_SILENCE_MS),
            slave_receive_window: Duration::from_millis(DEFAULT_SLAVE_RECEIVE_WINDOW_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            response_validation: ResponseValidation::Lenient,
            broadcast_replies: true,
            packet_logging: false,
        }
    }
}

impl RtuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with frame delay and silence gap set to 3.5
    /// character times at `baud_rate`.
    ///
    /// Above 19200 baud the gap is fixed at 1750 µs, as the serial line
    /// guide recommends.
    pub fn for_baud_rate(baud_rate: u32) -> ModbusResult<Self> {
        let gap = silence_for_baud_rate(baud_rate)?;
        Ok(Self {
            frame_delay: gap,
            silence_threshold: gap,
            ..Self::default()
        })
    }

    pub fn with_unit_address(mut self, unit: SlaveId) -> Self {
        self.unit_address = unit;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn with_silence_threshold(mut self, silence: Duration) -> Self {
        self.silence_threshold = silence;
        self
    }

    pub fn with_slave_receive_window(mut self, window: Duration) -> Self {
        self.slave_receive_window = window;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_response_validation(mut self, validation: ResponseValidation) -> Self {
        self.response_validation = validation;
        self
    }

    pub fn with_broadcast_replies(mut self, enabled: bool) -> Self {
        self.broadcast_replies = enabled;
        self
    }

    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Reject configurations the receive loop cannot run with
    pub fn validate(&self) -> ModbusResult<()> {
        if self.response_timeout.is_zero() {
            return Err(ModbusError::configuration("Response timeout must be non-zero"));
        }
        if self.slave_receive_window.is_zero() {
            return Err(ModbusError::configuration(
                "Slave receive window must be non-zero",
            ));
        }
        if self.silence_threshold.is_zero() {
            return Err(ModbusError::configuration("Silence threshold must be non-zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(ModbusError::configuration("Poll interval must be non-zero"));
        }
        Ok(())
    }
}

/// 3.5 character times of 11 bits at `baud_rate`
fn silence_for_baud_rate(baud_rate: u32) -> ModbusResult<Duration> {
    if baud_rate == 0 {
        return Err(ModbusError::configuration("Baud rate must be non-zero"));
    }
    if baud_rate > FIXED_TIMING_BAUD_THRESHOLD {
        return Ok(Duration::from_micros(FIXED_SILENCE_US));
    }
    let char_time_us = (BITS_PER_CHAR * 1_000_000) / baud_rate as u64;
    Ok(Duration::from_micros(char_time_us * 35 / 10))
}
