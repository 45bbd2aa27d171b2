// Calibration procedure - duty sweep that builds the calibration table
use crate::application::bench::Bench;
use crate::application::hardware::StatusPin;
use crate::application::run_control::{Interrupt, RunControl};
use crate::domain::calibration::CalibrationTable;
use std::time::Duration;

/// Duty the load idles at while the adapter settles before the sweep.
pub const SETTLE_DUTY: f64 = 10.0;

/// Ascending sweep: 4.0..=10.0 in 0.5 steps, then 10.2..=20.0 in 0.2 steps.
pub fn calibration_duty_steps() -> Vec<f64> {
    let coarse = (0..=12).map(|i| 4.0 + 0.5 * f64::from(i));
    let fine = (1..=50).map(|i| 10.0 + 0.2 * f64::from(i));
    coarse
        .chain(fine)
        .map(|duty| (duty * 10.0).round() / 10.0)
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct SweepTiming {
    pub settle: Duration,
    pub dwell: Duration,
}

impl Default for SweepTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            dwell: Duration::from_millis(200),
        }
    }
}

/// Sweeps the duty cycle and records the current drawn at each step.
///
/// The caller owns the bench lease; the duty is left at zero on success.
pub async fn sweep(
    bench: &Bench,
    control: &RunControl,
    timing: SweepTiming,
) -> Result<CalibrationTable, Interrupt> {
    let hardware = bench.hardware();
    let steps = calibration_duty_steps();

    hardware.set_duty_cycle(SETTLE_DUTY)?;
    control.pause(bench, timing.settle).await?;
    hardware.set_status_output(StatusPin::Led, true)?;
    bench
        .feed()
        .warn("Calibration in progress, DO NOT UNPLUG THE ADAPTER");

    let mut readings = Vec::with_capacity(steps.len());
    for (done, &duty) in steps.iter().enumerate() {
        hardware.set_duty_cycle(duty)?;
        control.pause(bench, timing.dwell).await?;
        readings.push((duty, hardware.read_current()?));
        tracing::debug!(
            "calibration {:.0}% done",
            (done + 1) as f64 * 100.0 / steps.len() as f64
        );
    }

    hardware.set_duty_cycle(0.0)?;
    hardware.set_status_output(StatusPin::Led, false)?;
    Ok(CalibrationTable::from_sweep(readings))
}
