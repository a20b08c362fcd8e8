#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use voltage_rtu::memory::{ManualClock, MemoryLink};
use voltage_rtu::{crc16, ModbusMaster, ResponseValidation, RtuConfig};

#[derive(Debug, Arbitrary)]
struct Exchange {
    function: u8,
    start: u16,
    quantity: u16,
    strict: bool,
    fix_crc: bool,
    reply: Vec<u8>,
}

// Arbitrary replies to every request type: decoding must fail cleanly,
// never panic or read past the frame.
fuzz_target!(|input: Exchange| {
    let mut reply = input.reply;
    if input.fix_crc && !reply.is_empty() {
        let crc = crc16(&reply);
        reply.extend_from_slice(&crc.to_le_bytes());
    }

    let clock = ManualClock::new();
    let mut link = MemoryLink::with_clock(clock.clone());
    link.set_responder(move |_| reply.clone());

    let validation = if input.strict {
        ResponseValidation::Strict
    } else {
        ResponseValidation::Lenient
    };
    let config = RtuConfig::default().with_response_validation(validation);
    let mut master = ModbusMaster::with_config(link, clock, config).expect("valid config");

    let quantity = input.quantity % 2001;
    let mut bits = vec![false; 2000];
    let mut words = vec![0u16; 125];
    let _ = match input.function % 8 {
        0 => master.read_coils(1, input.start, quantity, &mut bits),
        1 => master.read_discrete_inputs(1, input.start, quantity, &mut bits),
        2 => master.read_holding_registers(1, input.start, quantity % 126, &mut words),
        3 => master.read_input_registers(1, input.start, quantity % 126, &mut words),
        4 => master.write_single_coil(1, input.start, quantity & 1 == 1),
        5 => master.write_single_register(1, input.start, quantity),
        6 => {
            let count = (quantity as usize).min(1968);
            master.write_multiple_coils(1, input.start, &bits[..count])
        }
        _ => {
            let count = (quantity as usize).min(123);
            master.write_multiple_registers(1, input.start, &words[..count])
        }
    };
});
