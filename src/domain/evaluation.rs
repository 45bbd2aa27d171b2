// Results evaluator - judges a finished run against the adapter profile
use super::adapter::AdapterProfile;
use super::phase::{Phase, TestRun};
use super::record::{EvaluatedTrip, MeasurementRow, OutOfBandSample};
use super::sample::MeasurementSample;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub phase1_pass: bool,
    pub phase2_pass: bool,
    pub phase3_pass: bool,
    pub short_circuit_pass: bool,
    pub valid: bool,
    pub opp_trips: Vec<EvaluatedTrip>,
    pub out_of_band: Vec<OutOfBandSample>,
    pub rows: Vec<MeasurementRow>,
}

/// Evaluates `samples` (the buffer from index 0) for one completed run.
pub fn evaluate(
    samples: &[MeasurementSample],
    run: &TestRun,
    adapter: &AdapterProfile,
    sample_interval: Duration,
) -> Evaluation {
    let voltage_band = adapter.voltage_band();
    let end = run.end_index.min(samples.len());

    let mut phase1_pass = true;
    let mut phase2_pass = true;
    let mut valid = true;
    let mut out_of_band = Vec::new();
    let mut rows = Vec::with_capacity(end);

    for (index, sample) in samples[..end].iter().enumerate() {
        let phase = if run.standard.contains(index) {
            Some(Phase::Standard)
        } else if run.transient.contains(index) {
            Some(Phase::Transient)
        } else {
            None
        };

        if let Some(phase) = phase {
            let load_percent = sample.load.percent().unwrap_or(0.0);
            let current_band = adapter.current_band(load_percent);
            let current_ok = current_band.contains(sample.current);
            let voltage_ok = voltage_band.contains(sample.voltage);

            if !current_ok {
                // Measurement can't be trusted, pass/fail still stands
                valid = false;
            }
            if !voltage_ok {
                match phase {
                    Phase::Standard => phase1_pass = false,
                    _ => phase2_pass = false,
                }
            }
            if !current_ok || !voltage_ok {
                out_of_band.push(OutOfBandSample {
                    index,
                    voltage: sample.voltage,
                    current: sample.current,
                    load_percent,
                    expected_voltage: voltage_band,
                    expected_current: current_band,
                });
            }
        }

        let bounded = phase.is_some();
        rows.push(MeasurementRow {
            voltage_bottom_bound: bounded.then_some(voltage_band.low),
            voltage: sample.voltage,
            voltage_top_bound: bounded.then_some(voltage_band.high),
            current: sample.current,
            load: sample.load,
            time_sec: index as f64 * sample_interval.as_secs_f64(),
            phase: run.phase_of(index).number(),
        });
    }

    let opp_trips: Vec<EvaluatedTrip> = run
        .trips
        .iter()
        .map(|trip| EvaluatedTrip {
            trip: *trip,
            within_spec: adapter.opp_within_spec(trip.load_percent),
        })
        .collect();
    let phase3_pass = !opp_trips.is_empty() && opp_trips.iter().all(|t| t.within_spec);

    Evaluation {
        phase1_pass,
        phase2_pass,
        phase3_pass,
        short_circuit_pass: run.short_circuit_passed,
        valid,
        opp_trips,
        out_of_band,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::phase::{OppTrip, PhaseWindow};
    use crate::domain::sample::LoadCommand;

    fn adapter() -> AdapterProfile {
        AdapterProfile {
            name: "ACME-12V".to_string(),
            max_current: 2.0,
            max_voltage: 12.0,
            min_voltage: 10.0,
            voltage_tolerance_percent: 5.0,
            opp_min: 120,
            opp_max: 200,
        }
    }

    fn at(voltage: f64, load: f64) -> MeasurementSample {
        MeasurementSample::new(voltage, load / 100.0 * 2.0, LoadCommand::Percent(load), true)
    }

    fn trip(load_percent: f64) -> OppTrip {
        OppTrip {
            sample_index: 0,
            voltage: 0.5,
            current: 0.0,
            load_percent,
            measured_load_percent: 0.0,
        }
    }

    fn run(samples: usize, trips: Vec<OppTrip>) -> TestRun {
        TestRun {
            standard: PhaseWindow::new(0, samples),
            transient: PhaseWindow::empty_at(samples),
            opp: PhaseWindow::empty_at(samples),
            trips,
            short_circuit_passed: true,
            end_index: samples,
        }
    }

    #[test]
    fn test_voltage_dip_fails_phase1() {
        let samples = vec![at(12.0, 50.0), at(12.0, 50.0), at(8.0, 50.0), at(12.0, 50.0)];
        let eval = evaluate(&samples, &run(4, vec![trip(150.0)]), &adapter(), Duration::from_millis(100));

        assert!(!eval.phase1_pass);
        assert!(eval.phase2_pass);
        assert!(eval.valid);
        assert_eq!(eval.out_of_band.len(), 1);
        assert_eq!(eval.out_of_band[0].index, 2);
    }

    #[test]
    fn test_voltage_dip_in_transient_window_fails_phase2() {
        let samples = vec![at(12.0, 100.0), at(8.0, 100.0), at(12.0, 0.0)];
        let run = TestRun {
            standard: PhaseWindow::empty_at(0),
            transient: PhaseWindow::new(0, 3),
            opp: PhaseWindow::empty_at(3),
            trips: vec![trip(150.0)],
            short_circuit_passed: true,
            end_index: 3,
        };
        let eval = evaluate(&samples, &run, &adapter(), Duration::from_millis(100));
        assert!(eval.phase1_pass);
        assert!(!eval.phase2_pass);
    }

    #[test]
    fn test_current_outside_band_marks_run_invalid() {
        let mut samples = vec![at(12.0, 50.0); 3];
        samples[1].current = 1.5;
        let eval = evaluate(&samples, &run(3, vec![trip(150.0)]), &adapter(), Duration::from_millis(100));
        assert!(!eval.valid);
        assert!(eval.phase1_pass);
    }

    #[test]
    fn test_samples_outside_windows_are_not_judged() {
        let samples = vec![at(12.0, 50.0), at(3.0, 170.0)];
        let eval = evaluate(&samples, &run(1, vec![trip(150.0)]), &adapter(), Duration::from_millis(100));
        assert!(eval.phase1_pass);
        assert!(eval.valid);
        assert_eq!(eval.rows.len(), 1);
    }

    #[test]
    fn test_opp_trip_limits() {
        let samples = vec![at(12.0, 50.0)];

        let eval = evaluate(&samples, &run(1, vec![trip(150.0)]), &adapter(), Duration::ZERO);
        assert!(eval.phase3_pass);
        assert!(eval.opp_trips[0].within_spec);

        let eval = evaluate(
            &samples,
            &run(1, vec![trip(150.0), trip(250.0)]),
            &adapter(),
            Duration::ZERO,
        );
        assert!(!eval.phase3_pass);
        assert!(eval.opp_trips[0].within_spec);
        assert!(!eval.opp_trips[1].within_spec);

        let eval = evaluate(&samples, &run(1, vec![]), &adapter(), Duration::ZERO);
        assert!(!eval.phase3_pass);
    }

    #[test]
    fn test_rows_carry_bounds_time_and_phase() {
        let samples = vec![at(12.0, 10.0), at(12.0, 20.0), at(12.0, 0.0)];
        let run = TestRun {
            standard: PhaseWindow::new(0, 2),
            transient: PhaseWindow::empty_at(2),
            opp: PhaseWindow::new(2, 3),
            trips: vec![],
            short_circuit_passed: false,
            end_index: 3,
        };
        let eval = evaluate(&samples, &run, &adapter(), Duration::from_millis(500));

        assert_eq!(eval.rows.len(), 3);
        assert_eq!(eval.rows[0].phase, 1);
        assert_eq!(eval.rows[2].phase, 3);
        assert!(eval.rows[0].voltage_bottom_bound.is_some());
        assert!(eval.rows[2].voltage_top_bound.is_none());
        assert!((eval.rows[1].time_sec - 0.5).abs() < 1e-9);
        assert!(!eval.short_circuit_pass);
    }
}
