//! In-memory serial link and manual clock
//!
//! [`MemoryLink`] stands in for a UART: bytes written by the engine are
//! captured, and received bytes are queued by the caller, by a responder
//! closure, or by a connected peer link. Each queued byte carries an
//! arrival time so silence gaps can be reproduced exactly with a
//! [`ManualClock`].

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::transport::{Clock, SerialLink};

/// Deterministic [`Clock`]; `sleep` advances time instead of blocking.
///
/// Clones share the same time, so a link and an engine can observe one
/// timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `duration`
    pub fn advance(&self, duration: Duration) {
        self.now_us
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Byte queue with arrival timestamps
type RxQueue = Arc<Mutex<VecDeque<(Duration, u8)>>>;

/// Closure answering each transmitted frame
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

fn lock(queue: &RxQueue) -> io::Result<std::sync::MutexGuard<'_, VecDeque<(Duration, u8)>>> {
    queue
        .lock()
        .map_err(|_| io::Error::other("memory link queue poisoned"))
}

/// In-memory [`SerialLink`]
pub struct MemoryLink {
    rx: RxQueue,
    peer: Option<RxQueue>,
    sent: Vec<u8>,
    frames: Vec<Vec<u8>>,
    flushes: usize,
    clock: Option<ManualClock>,
    responder: Option<Responder>,
    response_delay: Duration,
    send_failure: Option<io::ErrorKind>,
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLink {
    /// Link whose queued bytes are available immediately
    pub fn new() -> Self {
        Self {
            rx: Arc::new(Mutex::new(VecDeque::new())),
            peer: None,
            sent: Vec::new(),
            frames: Vec::new(),
            flushes: 0,
            clock: None,
            responder: None,
            response_delay: Duration::ZERO,
            send_failure: None,
        }
    }

    /// Link whose bytes become available according to `clock`
    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            clock: Some(clock),
            ..Self::new()
        }
    }

    /// Two links wired back to back: what one sends, the other receives
    pub fn pair() -> (Self, Self) {
        let mut a = Self::new();
        let mut b = Self::new();
        a.peer = Some(Arc::clone(&b.rx));
        b.peer = Some(Arc::clone(&a.rx));
        (a, b)
    }

    /// Answer every transmitted frame with the bytes `responder` returns
    pub fn set_responder<F>(&mut self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
    }

    /// Delay between a transmission and the responder's reply
    pub fn set_response_delay(&mut self, delay: Duration) {
        self.response_delay = delay;
    }

    /// Make every subsequent send fail with `kind`
    pub fn fail_sends(&mut self, kind: io::ErrorKind) {
        self.send_failure = Some(kind);
    }

    fn now(&self) -> Duration {
        self.clock.as_ref().map(|c| c.now()).unwrap_or(Duration::ZERO)
    }

    /// Queue bytes that have already arrived
    pub fn inject(&mut self, bytes: &[u8]) {
        let now = self.now();
        self.schedule(now, bytes);
    }

    /// Queue bytes arriving at time `at`
    pub fn schedule(&mut self, at: Duration, bytes: &[u8]) {
        if let Ok(mut rx) = self.rx.lock() {
            rx.extend(bytes.iter().map(|&b| (at, b)));
        }
    }

    /// Everything transmitted so far
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Drain the transmitted bytes
    pub fn take_sent(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sent)
    }

    /// Transmitted frames, one entry per `send_buffer` call
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Bytes queued for reception, arrived or not
    pub fn pending_input(&self) -> usize {
        self.rx.lock().map(|rx| rx.len()).unwrap_or(0)
    }

    /// Number of input flushes requested by the engine
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    fn check_send(&self) -> io::Result<()> {
        match self.send_failure {
            Some(kind) => Err(io::Error::new(kind, "memory link send failure")),
            None => Ok(()),
        }
    }

    fn deliver(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(peer) = &self.peer {
            lock(peer)?.extend(bytes.iter().map(|&b| (Duration::ZERO, b)));
        }
        Ok(())
    }
}

impl SerialLink for MemoryLink {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        self.check_send()?;
        self.sent.push(byte);
        self.deliver(&[byte])
    }

    fn send_buffer(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.check_send()?;
        self.sent.extend_from_slice(bytes);
        self.frames.push(bytes.to_vec());
        self.deliver(bytes)?;

        if let Some(responder) = self.responder.as_mut() {
            let reply = responder(bytes);
            let at = self.now() + self.response_delay;
            self.schedule(at, &reply);
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let now = self.now();
        Ok(lock(&self.rx)?
            .iter()
            .take_while(|(at, _)| *at <= now)
            .count())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let now = self.now();
        let mut rx = lock(&self.rx)?;
        match rx.front() {
            Some(&(at, byte)) if at <= now => {
                rx.pop_front();
                Ok(Some(byte))
            }
            _ => Ok(None),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        lock(&self.rx)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.sleep(Duration::from_millis(3));
        other.advance(Duration::from_micros(500));
        assert_eq!(clock.now(), Duration::from_micros(3500));
    }

    #[test]
    fn test_scheduled_bytes_wait_for_clock() {
        let clock = ManualClock::new();
        let mut link = MemoryLink::with_clock(clock.clone());
        link.schedule(Duration::from_millis(10), &[0x42]);

        assert_eq!(link.bytes_available().unwrap(), 0);
        assert_eq!(link.read_byte().unwrap(), None);

        clock.advance(Duration::from_millis(10));
        assert_eq!(link.bytes_available().unwrap(), 1);
        assert_eq!(link.read_byte().unwrap(), Some(0x42));
    }

    #[test]
    fn test_responder_replies() {
        let mut link = MemoryLink::new();
        link.set_responder(|request| request.iter().rev().copied().collect());

        link.send_buffer(&[1, 2, 3]).unwrap();
        assert_eq!(link.frames(), &[vec![1, 2, 3]]);
        assert_eq!(link.bytes_available().unwrap(), 3);
        assert_eq!(link.read_byte().unwrap(), Some(3));
    }

    #[test]
    fn test_pair_delivers_to_peer() {
        let (mut a, mut b) = MemoryLink::pair();
        a.send_buffer(&[0x01, 0x02]).unwrap();
        assert_eq!(b.bytes_available().unwrap(), 2);
        assert_eq!(a.bytes_available().unwrap(), 0);

        b.flush().unwrap();
        assert_eq!(b.pending_input(), 0);
        assert_eq!(b.flush_count(), 1);
    }

    #[test]
    fn test_send_failure() {
        let mut link = MemoryLink::new();
        link.fail_sends(io::ErrorKind::TimedOut);
        assert_eq!(
            link.send_byte(0).unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
        assert!(link.sent().is_empty());
    }
}
