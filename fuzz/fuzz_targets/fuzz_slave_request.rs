#![no_main]

use libfuzzer_sys::fuzz_target;
use voltage_rtu::memory::{ManualClock, MemoryLink};
use voltage_rtu::{verify_crc, ModbusSlave, RtuConfig};

// Any byte sequence on the line: the slave must stay up and only ever
// transmit well-formed frames.
fuzz_target!(|data: &[u8]| {
    let clock = ManualClock::new();
    let mut slave = ModbusSlave::with_config(
        MemoryLink::with_clock(clock.clone()),
        clock,
        RtuConfig::default(),
    )
    .expect("default config is valid");

    slave.link_mut().inject(data);
    slave.process().expect("memory link never fails");

    let sent = slave.link().sent();
    if !sent.is_empty() {
        assert!(verify_crc(sent, sent.len()));
        assert_eq!(sent[0], 1);
    }
});
