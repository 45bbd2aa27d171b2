// Shared bench state - buffer, load handoff and mutual exclusion
use crate::application::hardware::{Hardware, StatusPin};
use crate::application::messages::MessageFeed;
use crate::domain::buffer::TimeSeriesBuffer;
use crate::domain::error::HardwareFault;
use crate::domain::sample::{LoadCommand, MeasurementSample};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Who currently owns the load and the buffer indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchUser {
    LoadTest,
    ConstantLoad,
    Calibration,
    Ripple,
    Settings,
}

impl fmt::Display for BenchUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BenchUser::LoadTest => "a load test",
            BenchUser::ConstantLoad => "a constant-load run",
            BenchUser::Calibration => "calibration",
            BenchUser::Ripple => "a ripple test",
            BenchUser::Settings => "a settings update",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bench is in use by {0}")]
pub struct BenchBusy(pub BenchUser);

/// State shared by the acquisition loop, the actuator and both sequencers.
///
/// The acquisition loop is the only writer of the buffer; the active run is the
/// only writer of the commanded load.
pub struct Bench {
    hardware: Arc<dyn Hardware>,
    buffer: Mutex<TimeSeriesBuffer>,
    commanded: watch::Sender<LoadCommand>,
    applied: watch::Sender<LoadCommand>,
    feed: MessageFeed,
    connected: AtomicBool,
    sample_interval: Mutex<Duration>,
    occupant: Mutex<Option<BenchUser>>,
    fault: Mutex<Option<HardwareFault>>,
    shutdown: watch::Sender<bool>,
}

impl Bench {
    pub fn new(hardware: Arc<dyn Hardware>, sample_interval: Duration) -> Self {
        let (commanded, _) = watch::channel(LoadCommand::OFF);
        let (applied, _) = watch::channel(LoadCommand::OFF);
        let (shutdown, _) = watch::channel(false);
        Self {
            hardware,
            buffer: Mutex::new(TimeSeriesBuffer::default()),
            commanded,
            applied,
            feed: MessageFeed::default(),
            connected: AtomicBool::new(false),
            sample_interval: Mutex::new(sample_interval),
            occupant: Mutex::new(None),
            fault: Mutex::new(None),
            shutdown,
        }
    }

    pub fn hardware(&self) -> &dyn Hardware {
        self.hardware.as_ref()
    }

    pub fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    pub fn buffer(&self) -> MutexGuard<'_, TimeSeriesBuffer> {
        self.buffer.lock()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn latest_sample(&self) -> Option<MeasurementSample> {
        self.buffer.lock().last().copied()
    }

    pub fn command_load(&self, command: LoadCommand) {
        self.commanded.send_replace(command);
    }

    pub fn commanded_load(&self) -> LoadCommand {
        *self.commanded.borrow()
    }

    pub fn subscribe_commanded(&self) -> watch::Receiver<LoadCommand> {
        self.commanded.subscribe()
    }

    /// Called by the actuator once a command is in effect on the hardware.
    pub fn mark_applied(&self, command: LoadCommand) {
        self.applied.send_replace(command);
    }

    pub fn applied_load(&self) -> LoadCommand {
        *self.applied.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn sample_interval(&self) -> Duration {
        *self.sample_interval.lock()
    }

    pub fn set_sample_interval(&self, interval: Duration) {
        *self.sample_interval.lock() = interval;
    }

    pub fn samples_per_sec(&self) -> f64 {
        let secs = self.sample_interval().as_secs_f64();
        if secs > 0.0 { 1.0 / secs } else { 0.0 }
    }

    pub fn fault(&self) -> Option<HardwareFault> {
        self.fault.lock().clone()
    }

    /// Marks the bench unusable until restart (acquisition has died).
    pub fn raise_fault(&self, fault: HardwareFault) {
        self.feed.error(format!("Hardware fault: {fault}"));
        *self.fault.lock() = Some(fault);
    }

    pub fn occupant(&self) -> Option<BenchUser> {
        *self.occupant.lock()
    }

    /// Claims exclusive use of the bench; the buffer is pinned until the
    /// lease is dropped.
    pub fn acquire(self: &Arc<Self>, user: BenchUser) -> Result<BenchLease, BenchBusy> {
        let mut occupant = self.occupant.lock();
        if let Some(current) = *occupant {
            return Err(BenchBusy(current));
        }
        *occupant = Some(user);
        self.buffer.lock().set_pinned(true);
        tracing::debug!("bench acquired by {}", user);
        Ok(BenchLease {
            bench: Arc::clone(self),
            user,
        })
    }

    /// Turns the load off and drops both status outputs.
    pub fn release_outputs(&self) -> Result<(), HardwareFault> {
        self.command_load(LoadCommand::OFF);
        let duty = self.hardware.set_duty_cycle(0.0);
        self.mark_applied(LoadCommand::OFF);
        let led = self.hardware.set_status_output(StatusPin::Led, false);
        let signal = self.hardware.set_status_output(StatusPin::RunningSignal, false);
        duty.and(led).and(signal)
    }

    pub fn assert_outputs(&self) -> Result<(), HardwareFault> {
        self.hardware.set_status_output(StatusPin::Led, true)?;
        self.hardware.set_status_output(StatusPin::RunningSignal, true)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Exclusive claim on the bench, released on drop.
pub struct BenchLease {
    bench: Arc<Bench>,
    user: BenchUser,
}

impl BenchLease {
    pub fn user(&self) -> BenchUser {
        self.user
    }
}

impl Drop for BenchLease {
    fn drop(&mut self) {
        self.bench.buffer.lock().set_pinned(false);
        *self.bench.occupant.lock() = None;
        tracing::debug!("bench released by {}", self.user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::simulated_hardware::SimulatedHardware;

    fn bench() -> Arc<Bench> {
        Arc::new(Bench::new(
            Arc::new(SimulatedHardware::default()),
            Duration::from_millis(100),
        ))
    }

    #[test]
    fn test_only_one_user_at_a_time() {
        let bench = bench();
        let lease = bench.acquire(BenchUser::LoadTest).unwrap();
        assert!(bench.buffer().is_pinned());
        assert_eq!(
            bench.acquire(BenchUser::Ripple).err(),
            Some(BenchBusy(BenchUser::LoadTest))
        );

        drop(lease);
        assert!(!bench.buffer().is_pinned());
        assert!(bench.acquire(BenchUser::Ripple).is_ok());
    }

    #[test]
    fn test_samples_per_sec() {
        let bench = bench();
        assert!((bench.samples_per_sec() - 10.0).abs() < 1e-9);
        bench.set_sample_interval(Duration::from_millis(500));
        assert!((bench.samples_per_sec() - 2.0).abs() < 1e-9);
    }
}
