// Calibration table and load-to-duty interpolation
use super::error::HardwareFault;
use super::sample::LoadCommand;
use serde::{Deserialize, Serialize};

/// Duty applied for the short-circuit command.
pub const SHORT_CIRCUIT_DUTY: f64 = 100.0;
/// Duty applied above the calibrated range but below hard shutdown.
pub const OVER_RANGE_FALLBACK_DUTY: f64 = 75.0;
/// Targets strictly inside this window fall back to [`OVER_RANGE_FALLBACK_DUTY`].
pub const OVER_RANGE_WINDOW: (f64, f64) = (3.2, 3.5);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub duty_cycle: f64,
    pub current: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Off,
    Exact,
    Interpolated,
    ShortCircuit,
    OverRangeFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyResolution {
    pub duty: f64,
    pub target_current: Option<f64>,
    pub kind: ResolutionKind,
}

/// Duty/current pairs ordered ascending by current.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl CalibrationTable {
    pub fn new(mut points: Vec<CalibrationPoint>) -> Self {
        points.retain(|p| p.current.is_finite() && p.duty_cycle.is_finite());
        points.sort_by(|a, b| a.current.total_cmp(&b.current));
        Self { points }
    }

    /// Builds a table from a duty sweep, keyed by current rounded to 10 mA.
    /// The last duty recorded for a current wins.
    pub fn from_sweep<I>(readings: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut points: Vec<CalibrationPoint> = Vec::new();
        for (duty_cycle, current) in readings {
            let current = (current * 100.0).round() / 100.0;
            match points.iter_mut().find(|p| p.current == current) {
                Some(existing) => existing.duty_cycle = duty_cycle,
                None => points.push(CalibrationPoint {
                    duty_cycle,
                    current,
                }),
            }
        }
        Self::new(points)
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Resolves the duty cycle for a load command against an adapter rating.
    pub fn resolve(
        &self,
        command: LoadCommand,
        max_current: f64,
    ) -> Result<DutyResolution, HardwareFault> {
        let target = match command.target_current(max_current) {
            None => {
                return Ok(DutyResolution {
                    duty: SHORT_CIRCUIT_DUTY,
                    target_current: None,
                    kind: ResolutionKind::ShortCircuit,
                });
            }
            Some(target) => target,
        };

        if command.is_off() {
            return Ok(DutyResolution {
                duty: 0.0,
                target_current: Some(0.0),
                kind: ResolutionKind::Off,
            });
        }

        match self.duty_for_current(target) {
            Some((duty, kind)) => Ok(DutyResolution {
                duty,
                target_current: Some(target),
                kind,
            }),
            None => Err(HardwareFault::Uncalibrated { target }),
        }
    }

    /// Scans adjacent pairs for an exact match or a bracket around `target`.
    pub fn duty_for_current(&self, target: f64) -> Option<(f64, ResolutionKind)> {
        for pair in self.points.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if lo.current == target {
                return Some((lo.duty_cycle, ResolutionKind::Exact));
            }
            if hi.current == target {
                return Some((hi.duty_cycle, ResolutionKind::Exact));
            }
            if lo.current < target && target < hi.current {
                let ratio = (target - lo.current) / (hi.current - lo.current);
                let duty = lo.duty_cycle + ratio * (hi.duty_cycle - lo.duty_cycle);
                return Some((duty.min(100.0), ResolutionKind::Interpolated));
            }
        }

        if let [only] = self.points.as_slice() {
            if only.current == target {
                return Some((only.duty_cycle, ResolutionKind::Exact));
            }
        }

        let (low, high) = OVER_RANGE_WINDOW;
        if low < target && target < high {
            return Some((OVER_RANGE_FALLBACK_DUTY, ResolutionKind::OverRangeFallback));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CalibrationTable {
        CalibrationTable::new(vec![
            CalibrationPoint { duty_cycle: 12.0, current: 1.0 },
            CalibrationPoint { duty_cycle: 4.0, current: 0.0 },
            CalibrationPoint { duty_cycle: 20.0, current: 3.0 },
        ])
    }

    #[test]
    fn test_points_are_sorted_by_current() {
        let currents: Vec<f64> = table().points().iter().map(|p| p.current).collect();
        assert_eq!(currents, vec![0.0, 1.0, 3.0]);
    }

    #[test]
    fn test_exact_entries_resolve_to_their_duty() {
        let t = table();
        for point in t.points() {
            let (duty, kind) = t.duty_for_current(point.current).unwrap();
            assert_eq!(duty, point.duty_cycle);
            assert_eq!(kind, ResolutionKind::Exact);
        }
    }

    #[test]
    fn test_interpolation_between_entries() {
        let (duty, kind) = table().duty_for_current(2.0).unwrap();
        assert_eq!(kind, ResolutionKind::Interpolated);
        assert!((duty - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolation_is_monotonic() {
        let t = table();
        let mut last = f64::MIN;
        for step in 0..=300 {
            let target = step as f64 / 100.0;
            let (duty, _) = t.duty_for_current(target).unwrap();
            assert!(duty >= last, "duty decreased at {target}A");
            last = duty;
        }
    }

    #[test]
    fn test_interpolated_duty_is_clamped() {
        let t = CalibrationTable::new(vec![
            CalibrationPoint { duty_cycle: 90.0, current: 1.0 },
            CalibrationPoint { duty_cycle: 140.0, current: 2.0 },
        ]);
        let (duty, _) = t.duty_for_current(1.9).unwrap();
        assert_eq!(duty, 100.0);
    }

    #[test]
    fn test_short_circuit_ignores_calibration() {
        let empty = CalibrationTable::default();
        let res = empty.resolve(LoadCommand::ShortCircuit, 2.0).unwrap();
        assert_eq!(res.duty, 100.0);
        assert_eq!(res.kind, ResolutionKind::ShortCircuit);
    }

    #[test]
    fn test_over_range_fallback() {
        let res = table().resolve(LoadCommand::Percent(110.0), 3.0).unwrap();
        assert_eq!(res.kind, ResolutionKind::OverRangeFallback);
        assert_eq!(res.duty, 75.0);
    }

    #[test]
    fn test_unbracketed_target_is_a_fault() {
        let err = table().resolve(LoadCommand::Percent(200.0), 2.0).unwrap_err();
        assert_eq!(err, HardwareFault::Uncalibrated { target: 4.0 });
    }

    #[test]
    fn test_sweep_keeps_last_duty_for_duplicate_current() {
        let t = CalibrationTable::from_sweep([(4.0, 0.0), (4.5, 0.001), (5.0, 0.22), (5.5, 0.221)]);
        assert_eq!(
            t.points(),
            &[
                CalibrationPoint { duty_cycle: 4.5, current: 0.0 },
                CalibrationPoint { duty_cycle: 5.5, current: 0.22 },
            ]
        );
    }
}
