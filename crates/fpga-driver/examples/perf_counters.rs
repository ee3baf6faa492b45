//! Sample the global performance counters of the first device
//!
//! Usage: `cargo run --example perf_counters [interval-ms]`

use fpga_driver::perf::PerfCounter;
use fpga_driver::{AccessMode, FpgaError, FpgaManager, ObjectType, Properties, Result};
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("fpga_driver=info")
        .init();

    let interval = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .map_or(Duration::from_millis(100), Duration::from_millis);

    let manager = FpgaManager::system()?;
    let devices = manager.enumerate(&[Properties::new().with_object_type(ObjectType::Device)], 1)?;
    let token = devices
        .tokens
        .first()
        .ok_or_else(|| FpgaError::invalid_state("No FPGA device found"))?;

    let handle = manager.open(token, AccessMode::Shared)?;
    let counters = PerfCounter::new(&handle);

    counters.init()?;
    counters.start()?;
    std::thread::sleep(interval);
    counters.stop()?;

    println!("Counters over {interval:?} on {}:\n", handle.resource_id());
    counters.print(&mut std::io::stdout())?;

    counters.destroy()?;
    handle.close()?;
    Ok(())
}
