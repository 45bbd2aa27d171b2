// Measurement sample domain model
use serde::{Deserialize, Serialize};

/// Load requested from the electronic load.
///
/// `ShortCircuit` is the reserved command that drives the actuator fully on
/// regardless of calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadCommand {
    Percent(f64),
    ShortCircuit,
}

impl LoadCommand {
    pub const OFF: LoadCommand = LoadCommand::Percent(0.0);

    pub fn percent(self) -> Option<f64> {
        match self {
            LoadCommand::Percent(p) => Some(p),
            LoadCommand::ShortCircuit => None,
        }
    }

    pub fn is_off(self) -> bool {
        matches!(self, LoadCommand::Percent(p) if p == 0.0)
    }

    pub fn is_level(self, level: f64) -> bool {
        matches!(self, LoadCommand::Percent(p) if p == level)
    }

    /// Current the adapter should deliver under this command.
    pub fn target_current(self, max_current: f64) -> Option<f64> {
        self.percent().map(|p| (p / 100.0) * max_current)
    }
}

impl Default for LoadCommand {
    fn default() -> Self {
        LoadCommand::OFF
    }
}

/// One acquisition tick. The index in the buffer is the implicit timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSample {
    pub voltage: f64,
    pub current: f64,
    pub load: LoadCommand,
    pub connected: bool,
}

impl MeasurementSample {
    /// Builds a sample; readings taken without an adapter present are zeroed.
    pub fn new(voltage: f64, current: f64, load: LoadCommand, connected: bool) -> Self {
        if connected {
            Self {
                voltage,
                current,
                load,
                connected,
            }
        } else {
            Self {
                voltage: 0.0,
                current: 0.0,
                load: LoadCommand::OFF,
                connected,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_sample_is_zeroed() {
        let sample = MeasurementSample::new(12.1, 0.8, LoadCommand::Percent(40.0), false);
        assert_eq!(sample.voltage, 0.0);
        assert_eq!(sample.current, 0.0);
        assert!(sample.load.is_off());
    }

    #[test]
    fn test_short_circuit_has_no_percent() {
        assert_eq!(LoadCommand::ShortCircuit.percent(), None);
        assert_eq!(LoadCommand::ShortCircuit.target_current(2.0), None);
        assert_eq!(LoadCommand::Percent(50.0).target_current(2.0), Some(1.0));
        assert!(LoadCommand::Percent(30.0).is_level(30.0));
        assert!(!LoadCommand::ShortCircuit.is_level(100.0));
    }
}
