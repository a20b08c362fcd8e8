//! Voltage RTU Demo
//!
//! Runs a slave and a master on two tokio blocking tasks, connected by a
//! pair of in-memory links, and walks through every supported function code.
//!
//! Usage: cargo run --features demo --bin demo
//! Verbose frames: RUST_LOG=voltage_rtu=debug cargo run --features demo --bin demo

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voltage_rtu::memory::MemoryLink;
use voltage_rtu::{
    ModbusMaster, ModbusResult, ModbusSlave, PollOutcome, RtuConfig, SlaveStats, SystemClock,
};

const SLAVE_UNIT: u8 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🚀 {}", voltage_rtu::info());
    println!("==========================================\n");

    let (master_link, slave_link) = MemoryLink::pair();
    let running = Arc::new(AtomicBool::new(true));

    let slave_task = {
        let running = Arc::clone(&running);
        tokio::task::spawn_blocking(move || run_slave(slave_link, running))
    };
    let master_result = tokio::task::spawn_blocking(move || run_master(master_link)).await?;

    running.store(false, Ordering::SeqCst);
    let stats = slave_task.await??;
    master_result?;

    println!("\n📊 Slave statistics");
    println!("  Requests:   {}", stats.requests);
    println!("  Responses:  {}", stats.responses);
    println!("  Exceptions: {}", stats.exceptions);
    println!("  Ignored:    {}", stats.ignored);
    println!("  CRC errors: {}", stats.crc_errors);
    Ok(())
}

fn run_slave(link: MemoryLink, running: Arc<AtomicBool>) -> ModbusResult<SlaveStats> {
    let mut slave = ModbusSlave::new(link, SLAVE_UNIT)?;
    slave.set_discrete_input(0, true);
    slave.set_discrete_input(2, true);
    for address in 0..8 {
        slave.set_input_register(address, 2300 + address * 10);
    }
    info!("Slave {} ready", SLAVE_UNIT);

    while running.load(Ordering::SeqCst) {
        match slave.process()? {
            PollOutcome::Idle => std::thread::sleep(Duration::from_millis(1)),
            PollOutcome::Exception {
                function,
                exception,
            } => warn!("Slave answered 0x{:02X} with {}", function, exception),
            outcome => info!("Slave: {:?}", outcome),
        }
    }
    Ok(slave.stats().clone())
}

fn run_master(link: MemoryLink) -> ModbusResult<()> {
    let config = RtuConfig::for_baud_rate(19_200)?.with_packet_logging(true);
    let mut master = ModbusMaster::with_config(link, SystemClock::new(), config)?;

    println!("✍️  Writes");
    master.write_single_coil(SLAVE_UNIT, 5, true)?;
    println!("  FC05 coil 5 = ON");
    master.write_multiple_coils(SLAVE_UNIT, 8, &[true, false, true, true])?;
    println!("  FC0F coils 8..12 = [1, 0, 1, 1]");
    master.write_single_register(SLAVE_UNIT, 0, 0x1234)?;
    println!("  FC06 register 0 = 0x1234");
    master.write_multiple_registers(SLAVE_UNIT, 1, &[100, 200, 300])?;
    println!("  FC10 registers 1..4 = [100, 200, 300]");

    println!("\n📖 Reads");
    let mut coils = [false; 12];
    master.read_coils(SLAVE_UNIT, 0, 12, &mut coils)?;
    println!("  FC01 coils 0..12: {:?}", coils);

    let mut inputs = [false; 4];
    master.read_discrete_inputs(SLAVE_UNIT, 0, 4, &mut inputs)?;
    println!("  FC02 inputs 0..4: {:?}", inputs);

    let mut holding = [0u16; 4];
    master.read_holding_registers(SLAVE_UNIT, 0, 4, &mut holding)?;
    println!("  FC03 registers 0..4: {:04X?}", holding);

    let mut input_registers = [0u16; 8];
    master.read_input_registers(SLAVE_UNIT, 0, 8, &mut input_registers)?;
    println!("  FC04 input registers 0..8: {:?}", input_registers);

    println!("\n⚠️  Errors");
    let mut out = [0u16; 10];
    match master.read_holding_registers(SLAVE_UNIT, 250, 10, &mut out) {
        Ok(()) => println!("  Unexpected success"),
        Err(e) => println!(
            "  Read past the table: {} (last exception {})",
            e,
            master.last_exception()
        ),
    }

    master.set_timeout(Duration::from_millis(200));
    match master.read_holding_registers(SLAVE_UNIT + 1, 0, 1, &mut out) {
        Ok(()) => println!("  Unexpected success"),
        Err(e) => println!("  Absent unit: {}", e),
    }

    let stats = master.stats();
    println!(
        "\n  Master sent {} frames, received {}, {} timeouts",
        stats.frames_sent, stats.frames_received, stats.timeouts
    );
    Ok(())
}
