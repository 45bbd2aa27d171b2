// Hardware abstraction consumed by the engine
use crate::domain::error::HardwareFault;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPin {
    Led,
    RunningSignal,
}

/// Sensor, digital I/O and actuator access for the bench.
///
/// Implementations use interior mutability; every call may be issued from any
/// task.
pub trait Hardware: Send + Sync {
    fn read_voltage(&self) -> Result<f64, HardwareFault>;

    fn read_current(&self) -> Result<f64, HardwareFault>;

    /// Digital "adapter present" input.
    fn read_connected(&self) -> Result<bool, HardwareFault>;

    /// Actuator duty cycle, 0..=100.
    fn set_duty_cycle(&self, percent: f64) -> Result<(), HardwareFault>;

    fn set_status_output(&self, pin: StatusPin, on: bool) -> Result<(), HardwareFault>;

    /// Switch the sensor between fast/coarse and slow/fine conversion.
    fn set_high_resolution(&self, _enabled: bool) -> Result<(), HardwareFault> {
        Ok(())
    }
}
