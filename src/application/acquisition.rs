// Sample acquisition loop - polls the hardware into the shared buffer
use crate::application::bench::Bench;
use crate::domain::error::HardwareFault;
use crate::domain::sample::MeasurementSample;
use std::sync::Arc;

/// Ticks between two reads of the adapter-present input.
pub const CONNECTION_CHECK_TICKS: u64 = 10;

/// Runs until shutdown is requested. A hardware fault marks the bench faulted
/// and ends the loop.
pub async fn run_acquisition(bench: Arc<Bench>) -> Result<(), HardwareFault> {
    let mut shutdown = bench.shutdown_signal();
    let mut tick: u64 = 0;

    while !*shutdown.borrow() {
        if let Err(fault) = acquire_once(&bench, tick) {
            bench.raise_fault(fault.clone());
            return Err(fault);
        }
        tick += 1;

        tokio::select! {
            _ = tokio::time::sleep(bench.sample_interval()) => {}
            _ = shutdown.changed() => {}
        }
    }

    tracing::debug!("acquisition stopped after {} ticks", tick);
    Ok(())
}

fn acquire_once(bench: &Bench, tick: u64) -> Result<(), HardwareFault> {
    let hardware = bench.hardware();

    if tick % CONNECTION_CHECK_TICKS == 0 {
        let connected = hardware.read_connected()?;
        if connected != bench.is_connected() {
            if connected {
                bench.feed().info("Adapter connected");
            } else {
                bench.feed().warn("Adapter disconnected");
            }
            bench.set_connected(connected);
        }
    }

    let voltage = hardware.read_voltage()?;
    let current = hardware.read_current()?;
    let sample = MeasurementSample::new(voltage, current, bench.applied_load(), bench.is_connected());

    if bench.buffer().push(sample) {
        tracing::debug!("idle buffer trimmed");
    }
    Ok(())
}
