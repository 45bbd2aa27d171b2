// Load actuation controller - turns commanded load into a duty cycle
use crate::application::bench::Bench;
use crate::application::run_control::RunControl;
use crate::domain::calibration::{CalibrationTable, OVER_RANGE_WINDOW, ResolutionKind};
use crate::domain::error::HardwareFault;
use crate::domain::sample::LoadCommand;
use std::sync::Arc;
use std::time::Duration;

pub const ACTUATOR_POLL: Duration = Duration::from_millis(100);

/// Applies the commanded load whenever it changes, until the run finishes.
///
/// An unresolvable target or a failed write is recorded on `control` so the
/// sequencer unwinds with a fault. The duty is always zeroed on exit.
pub async fn run_actuator(
    bench: Arc<Bench>,
    table: Arc<CalibrationTable>,
    max_current: f64,
    control: Arc<RunControl>,
) -> Result<(), HardwareFault> {
    let mut commanded = bench.subscribe_commanded();
    let mut last_applied: Option<LoadCommand> = None;

    let result = loop {
        if control.is_finished() {
            break Ok(());
        }

        let command = *commanded.borrow_and_update();
        if last_applied != Some(command) {
            match apply(&bench, &table, max_current, command) {
                Ok(()) => last_applied = Some(command),
                Err(fault) => {
                    bench.feed().error(format!("Load can't be applied: {fault}"));
                    control.record_fault(fault.clone());
                    break Err(fault);
                }
            }
        }

        tokio::select! {
            _ = commanded.changed() => {}
            _ = tokio::time::sleep(ACTUATOR_POLL) => {}
        }
    };

    if let Err(fault) = bench.hardware().set_duty_cycle(0.0) {
        tracing::error!("could not zero the duty cycle: {}", fault);
    }
    bench.mark_applied(LoadCommand::OFF);
    result
}

fn apply(
    bench: &Bench,
    table: &CalibrationTable,
    max_current: f64,
    command: LoadCommand,
) -> Result<(), HardwareFault> {
    let resolution = table.resolve(command, max_current)?;
    if resolution.kind == ResolutionKind::OverRangeFallback {
        bench.feed().warn(format!(
            "Reached max current of {}A, using {}% duty",
            OVER_RANGE_WINDOW.0, resolution.duty
        ));
    }

    bench.hardware().set_duty_cycle(resolution.duty)?;
    bench.mark_applied(command);

    match resolution.target_current {
        Some(target) => bench.feed().debug(format!(
            "Expected current: {:.3}A; selected duty: {:.2}%",
            target, resolution.duty
        )),
        None => bench.feed().debug("Short circuit: duty 100%"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::simulated_hardware::SimulatedHardware;

    struct Rig {
        hardware: Arc<SimulatedHardware>,
        bench: Arc<Bench>,
        control: Arc<RunControl>,
        task: tokio::task::JoinHandle<Result<(), HardwareFault>>,
    }

    fn rig(max_current: f64) -> Rig {
        let hardware = Arc::new(SimulatedHardware::default());
        let bench = Arc::new(Bench::new(hardware.clone(), Duration::from_millis(100)));
        let table = Arc::new(hardware.ideal_calibration());
        let control = Arc::new(RunControl::default());
        let task = tokio::spawn(run_actuator(
            bench.clone(),
            table,
            max_current,
            control.clone(),
        ));
        Rig {
            hardware,
            bench,
            control,
            task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_applies_interpolated_duty() {
        let rig = rig(2.0);
        rig.bench.command_load(LoadCommand::Percent(50.0));
        tokio::time::sleep(Duration::from_millis(150)).await;

        // 1.0A on a 0.2A-per-duty load conducting from 4%
        assert!((rig.hardware.duty() - 9.0).abs() < 1e-6);
        assert_eq!(rig.bench.applied_load(), LoadCommand::Percent(50.0));

        rig.control.finish();
        rig.task.await.unwrap().unwrap();
        assert_eq!(rig.hardware.duty(), 0.0);
        assert!(rig.bench.applied_load().is_off());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_circuit_drives_full_duty() {
        let rig = rig(2.0);
        rig.bench.command_load(LoadCommand::ShortCircuit);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rig.hardware.duty(), 100.0);

        rig.control.finish();
        rig.task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncalibrated_target_is_recorded_as_fault() {
        let rig = rig(3.2);
        rig.bench.command_load(LoadCommand::Percent(150.0));

        let result = rig.task.await.unwrap();
        assert!(matches!(result, Err(HardwareFault::Uncalibrated { .. })));
        assert!(matches!(rig.control.fault(), Some(HardwareFault::Uncalibrated { .. })));
        assert_eq!(rig.hardware.duty(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actuator_write_failure_is_recorded() {
        let rig = rig(2.0);
        rig.hardware.fail_actuator_writes(true);
        rig.bench.command_load(LoadCommand::Percent(20.0));

        let result = rig.task.await.unwrap();
        assert!(matches!(result, Err(HardwareFault::Actuator(_))));
        assert!(rig.control.fault().is_some());
    }
}
