// Test configuration domain model
use super::adapter::MAX_ADAPTER_CURRENT;
use super::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MAX_PHASE_REPEATS: u32 = 5;
pub const OPP_TRIP_TARGET_RANGE: (u32, u32) = (3, 10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSettings {
    pub include: bool,
    pub repeat: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OppPhaseSettings {
    pub include: bool,
    pub repeat: u32,
    pub opp_trip_target: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestSettings {
    pub max_current_shutdown: f64,
    pub graph_sampling_per_second: bool,
    pub high_resolution: bool,
    pub exit_at_safety: bool,
    pub phase1: PhaseSettings,
    pub phase2: PhaseSettings,
    pub phase3: OppPhaseSettings,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            max_current_shutdown: MAX_ADAPTER_CURRENT,
            graph_sampling_per_second: false,
            high_resolution: false,
            exit_at_safety: true,
            phase1: PhaseSettings {
                include: true,
                repeat: 1,
            },
            phase2: PhaseSettings {
                include: true,
                repeat: 1,
            },
            phase3: OppPhaseSettings {
                include: true,
                repeat: 1,
                opp_trip_target: 3,
            },
        }
    }
}

impl TestSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.max_current_shutdown > 0.0 && self.max_current_shutdown <= MAX_ADAPTER_CURRENT) {
            return Err(ValidationError::out_of_range(
                "max current shutdown",
                "in (0, 3.2] A",
                self.max_current_shutdown,
            ));
        }
        for (field, repeat) in [
            ("phase 1 repeats", self.phase1.repeat),
            ("phase 2 repeats", self.phase2.repeat),
            ("phase 3 repeats", self.phase3.repeat),
        ] {
            if !(1..=MAX_PHASE_REPEATS).contains(&repeat) {
                return Err(ValidationError::out_of_range(
                    field,
                    "between 1 and 5",
                    repeat as f64,
                ));
            }
        }
        let (low, high) = OPP_TRIP_TARGET_RANGE;
        if !(low..=high).contains(&self.phase3.opp_trip_target) {
            return Err(ValidationError::out_of_range(
                "OPP trip target",
                "between 3 and 10",
                self.phase3.opp_trip_target as f64,
            ));
        }
        Ok(())
    }

    /// Acquisition cadence implied by the resolution and graphing options.
    pub fn sample_interval(&self) -> Duration {
        if self.high_resolution {
            Duration::from_millis(500)
        } else if self.graph_sampling_per_second {
            Duration::from_secs(1)
        } else {
            Duration::from_millis(100)
        }
    }
}
