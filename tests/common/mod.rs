//! Master wired to a slave through an in-memory link on one manual timeline

use std::sync::{Arc, Mutex};

use voltage_rtu::memory::{ManualClock, MemoryLink};
use voltage_rtu::{ModbusMaster, ModbusSlave, RtuConfig};

pub type TestMaster = ModbusMaster<MemoryLink, ManualClock>;
pub type SharedSlave = Arc<Mutex<ModbusSlave<MemoryLink, ManualClock>>>;

pub const SLAVE_UNIT: u8 = 1;

pub fn connect(
    master_config: RtuConfig,
    slave_config: RtuConfig,
) -> (TestMaster, SharedSlave, ManualClock) {
    let clock = ManualClock::new();

    let slave = ModbusSlave::with_config(
        MemoryLink::with_clock(clock.clone()),
        clock.clone(),
        slave_config.with_unit_address(SLAVE_UNIT),
    )
    .unwrap();
    let slave = Arc::new(Mutex::new(slave));

    let bus = Arc::clone(&slave);
    let mut link = MemoryLink::with_clock(clock.clone());
    link.set_responder(move |request| {
        let mut slave = bus.lock().unwrap();
        slave.link_mut().inject(request);
        slave.process().unwrap();
        slave.link_mut().take_sent()
    });

    let master = ModbusMaster::with_config(link, clock.clone(), master_config).unwrap();
    (master, slave, clock)
}

pub fn connect_default() -> (TestMaster, SharedSlave, ManualClock) {
    connect(RtuConfig::default(), RtuConfig::default())
}
