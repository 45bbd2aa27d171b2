// Phase windows and OPP trips recorded by the sequencer
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Standard,
    Transient,
    Opp,
}

impl Phase {
    pub fn number(self) -> u8 {
        match self {
            Phase::Standard => 1,
            Phase::Transient => 2,
            Phase::Opp => 3,
        }
    }
}

/// Half-open range `[start, stop)` of buffer indices covered by a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseWindow {
    pub start: usize,
    pub stop: usize,
}

impl PhaseWindow {
    pub fn new(start: usize, stop: usize) -> Self {
        Self {
            start,
            stop: stop.max(start),
        }
    }

    /// Zero-length window left behind by a skipped phase.
    pub fn empty_at(index: usize) -> Self {
        Self::new(index, index)
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.stop
    }

    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }
}

/// Moment the adapter's over-power protection engaged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OppTrip {
    pub sample_index: usize,
    pub voltage: f64,
    pub current: f64,
    /// Load commanded when the collapse was sampled.
    pub load_percent: f64,
    /// Load implied by the measured current.
    pub measured_load_percent: f64,
}

/// Everything the sequencer hands to the evaluator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestRun {
    pub standard: PhaseWindow,
    pub transient: PhaseWindow,
    pub opp: PhaseWindow,
    pub trips: Vec<OppTrip>,
    pub short_circuit_passed: bool,
    /// Buffer length when the run finished.
    pub end_index: usize,
}

impl TestRun {
    /// Phase label of a buffer index, by window order.
    pub fn phase_of(&self, index: usize) -> Phase {
        if index < self.standard.stop {
            Phase::Standard
        } else if index < self.transient.stop {
            Phase::Transient
        } else {
            Phase::Opp
        }
    }
}

/// Reason the OPP hunt stopped ramping before its trip target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SafetyTrip {
    OverCurrent { target_current: f64, threshold: f64 },
    Stuck { elapsed_secs: f64 },
}

impl fmt::Display for SafetyTrip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyTrip::OverCurrent {
                target_current,
                threshold,
            } => write!(
                f,
                "target current {target_current:.2}A exceeded the safe limit of {threshold:.2}A"
            ),
            SafetyTrip::Stuck { elapsed_secs } => {
                write!(f, "OPP hunt is stuck after {elapsed_secs:.0}s")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_never_inverts() {
        let window = PhaseWindow::new(10, 4);
        assert_eq!(window.stop, 10);
        assert!(window.is_empty());
        assert!(!window.contains(10));
    }

    #[test]
    fn test_phase_of_uses_window_order() {
        let run = TestRun {
            standard: PhaseWindow::new(2, 10),
            transient: PhaseWindow::new(12, 20),
            opp: PhaseWindow::new(20, 30),
            ..TestRun::default()
        };
        assert_eq!(run.phase_of(0), Phase::Standard);
        assert_eq!(run.phase_of(11), Phase::Transient);
        assert_eq!(run.phase_of(25), Phase::Opp);
    }
}
