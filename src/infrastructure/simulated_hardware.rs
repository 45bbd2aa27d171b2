// Simulated adapter and electronic load
use crate::application::calibration_service::calibration_duty_steps;
use crate::application::hardware::{Hardware, StatusPin};
use crate::domain::calibration::CalibrationTable;
use crate::domain::error::HardwareFault;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;

/// Electrical model of the simulated adapter + load.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub nominal_voltage: f64,
    /// Duty below which the load does not conduct.
    pub conduction_duty: f64,
    pub amps_per_duty: f64,
    pub droop_ohms: f64,
    /// Demand above which the adapter's OPP collapses the output.
    pub opp_trip_current: f64,
    pub short_circuit_protected: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            nominal_voltage: 12.0,
            conduction_duty: 4.0,
            amps_per_duty: 0.2,
            droop_ohms: 0.05,
            opp_trip_current: 3.3,
            short_circuit_protected: true,
        }
    }
}

// Output while OPP or short-circuit protection holds the adapter off
const COLLAPSED_VOLTAGE: f64 = 0.4;
const COLLAPSED_CURRENT: f64 = 0.02;

#[derive(Debug, Default)]
struct State {
    duty: f64,
    connected: bool,
    high_resolution: bool,
    outputs: HashMap<StatusPin, bool>,
    fail_sensor: bool,
    fail_actuator: bool,
}

pub struct SimulatedHardware {
    settings: SimulatorSettings,
    state: Mutex<State>,
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new(SimulatorSettings::default())
    }
}

impl SimulatedHardware {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(State {
                connected: true,
                ..State::default()
            }),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    pub fn fail_sensor_reads(&self, fail: bool) {
        self.state.lock().fail_sensor = fail;
    }

    pub fn fail_actuator_writes(&self, fail: bool) {
        self.state.lock().fail_actuator = fail;
    }

    pub fn duty(&self) -> f64 {
        self.state.lock().duty
    }

    pub fn output(&self, pin: StatusPin) -> bool {
        self.state.lock().outputs.get(&pin).copied().unwrap_or(false)
    }

    pub fn is_high_resolution(&self) -> bool {
        self.state.lock().high_resolution
    }

    /// Current the load would draw at `duty` if the adapter kept up.
    pub fn demanded_current(&self, duty: f64) -> f64 {
        ((duty - self.settings.conduction_duty) * self.settings.amps_per_duty).max(0.0)
    }

    /// Table an ideal calibration sweep would produce for this model.
    pub fn ideal_calibration(&self) -> CalibrationTable {
        CalibrationTable::from_sweep(
            calibration_duty_steps()
                .into_iter()
                .map(|duty| (duty, self.demanded_current(duty))),
        )
    }

    fn operating_point(&self) -> Result<(f64, f64), HardwareFault> {
        let state = self.state.lock();
        if state.fail_sensor {
            return Err(HardwareFault::Sensor("INA219 did not acknowledge".to_string()));
        }
        if !state.connected {
            return Ok((0.0, 0.0));
        }
        if state.duty >= 100.0 {
            return Ok(if self.settings.short_circuit_protected {
                (COLLAPSED_VOLTAGE, COLLAPSED_CURRENT)
            } else {
                (0.3, 5.0)
            });
        }

        let demand = self.demanded_current(state.duty);
        if demand > self.settings.opp_trip_current {
            return Ok((COLLAPSED_VOLTAGE, COLLAPSED_CURRENT));
        }
        Ok((self.settings.nominal_voltage - self.settings.droop_ohms * demand, demand))
    }
}

impl Hardware for SimulatedHardware {
    fn read_voltage(&self) -> Result<f64, HardwareFault> {
        self.operating_point().map(|(v, _)| v)
    }

    fn read_current(&self) -> Result<f64, HardwareFault> {
        self.operating_point().map(|(_, i)| i)
    }

    fn read_connected(&self) -> Result<bool, HardwareFault> {
        Ok(self.state.lock().connected)
    }

    fn set_duty_cycle(&self, percent: f64) -> Result<(), HardwareFault> {
        let mut state = self.state.lock();
        if state.fail_actuator {
            return Err(HardwareFault::Actuator(format!(
                "PWM duty can't be changed to {percent:.2}"
            )));
        }
        if !(0.0..=100.0).contains(&percent) {
            return Err(HardwareFault::Actuator(format!(
                "duty {percent:.2} is outside 0..=100"
            )));
        }
        state.duty = percent;
        Ok(())
    }

    fn set_status_output(&self, pin: StatusPin, on: bool) -> Result<(), HardwareFault> {
        self.state.lock().outputs.insert(pin, on);
        Ok(())
    }

    fn set_high_resolution(&self, enabled: bool) -> Result<(), HardwareFault> {
        self.state.lock().high_resolution = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_load_with_droop() {
        let hw = SimulatedHardware::default();
        hw.set_duty_cycle(9.0).unwrap();
        assert!((hw.read_current().unwrap() - 1.0).abs() < 1e-9);
        assert!((hw.read_voltage().unwrap() - 11.95).abs() < 1e-9);
    }

    #[test]
    fn test_opp_collapses_output() {
        let hw = SimulatedHardware::default();
        hw.set_duty_cycle(30.0).unwrap();
        assert!(hw.read_voltage().unwrap() < 1.0);
        hw.set_duty_cycle(10.0).unwrap();
        assert!(hw.read_voltage().unwrap() > 11.0);
    }

    #[test]
    fn test_protected_short_circuit() {
        let hw = SimulatedHardware::default();
        hw.set_duty_cycle(100.0).unwrap();
        assert!(hw.read_voltage().unwrap() < 1.5);
        assert!(hw.read_current().unwrap() < 0.1);
    }

    #[test]
    fn test_fault_injection() {
        let hw = SimulatedHardware::default();
        hw.fail_sensor_reads(true);
        assert!(hw.read_voltage().is_err());
        hw.fail_actuator_writes(true);
        assert!(matches!(hw.set_duty_cycle(5.0), Err(HardwareFault::Actuator(_))));
    }

    #[test]
    fn test_disconnected_reads_zero() {
        let hw = SimulatedHardware::default();
        hw.set_duty_cycle(9.0).unwrap();
        hw.set_connected(false);
        assert_eq!(hw.read_current().unwrap(), 0.0);
        assert!(!hw.read_connected().unwrap());
    }
}
