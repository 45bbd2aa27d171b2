// Cooperative cancellation shared by a run and its actuator
use crate::application::bench::Bench;
use crate::domain::error::HardwareFault;
use crate::domain::phase::SafetyTrip;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Longest sleep between two cancellation checks.
pub const CHECKPOINT_SLICE: Duration = Duration::from_millis(100);

/// Why a run left its normal path early.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    Stopped,
    Disconnected,
    Faulted(HardwareFault),
    SafetyAbort(SafetyTrip),
}

impl From<HardwareFault> for Interrupt {
    fn from(fault: HardwareFault) -> Self {
        Interrupt::Faulted(fault)
    }
}

#[derive(Debug, Default)]
pub struct RunControl {
    stop_requested: AtomicBool,
    finished: AtomicBool,
    fault: Mutex<Option<HardwareFault>>,
}

impl RunControl {
    /// Returns `true` if a stop had already been requested.
    pub fn request_stop(&self) -> bool {
        self.stop_requested.swap(true, Ordering::AcqRel)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Tells the actuator the run is over.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn record_fault(&self, fault: HardwareFault) {
        self.fault.lock().get_or_insert(fault);
    }

    pub fn fault(&self) -> Option<HardwareFault> {
        self.fault.lock().clone()
    }

    /// Fails fast when the run must unwind.
    pub fn checkpoint(&self, bench: &Bench) -> Result<(), Interrupt> {
        if let Some(fault) = self.fault().or_else(|| bench.fault()) {
            return Err(Interrupt::Faulted(fault));
        }
        if self.stop_requested() || bench.is_shutting_down() {
            return Err(Interrupt::Stopped);
        }
        if !bench.is_connected() {
            return Err(Interrupt::Disconnected);
        }
        Ok(())
    }

    /// Sleeps for `duration`, checking for cancellation at least every
    /// [`CHECKPOINT_SLICE`].
    pub async fn pause(&self, bench: &Bench, duration: Duration) -> Result<(), Interrupt> {
        let deadline = Instant::now() + duration;
        loop {
            self.checkpoint(bench)?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep((deadline - now).min(CHECKPOINT_SLICE)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::simulated_hardware::SimulatedHardware;
    use std::sync::Arc;

    fn bench() -> Bench {
        let bench = Bench::new(Arc::new(SimulatedHardware::default()), Duration::from_millis(100));
        bench.set_connected(true);
        bench
    }

    #[test]
    fn test_second_stop_request_is_reported() {
        let control = RunControl::default();
        assert!(!control.request_stop());
        assert!(control.request_stop());
    }

    #[test]
    fn test_first_fault_wins() {
        let control = RunControl::default();
        control.record_fault(HardwareFault::Sensor("a".into()));
        control.record_fault(HardwareFault::Sensor("b".into()));
        assert_eq!(control.fault(), Some(HardwareFault::Sensor("a".into())));
        assert_eq!(
            control.checkpoint(&bench()),
            Err(Interrupt::Faulted(HardwareFault::Sensor("a".into())))
        );
    }

    #[test]
    fn test_disconnected_bench_interrupts() {
        let bench = bench();
        bench.set_connected(false);
        assert_eq!(RunControl::default().checkpoint(&bench), Err(Interrupt::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_observes_stop() {
        let bench = bench();
        let control = Arc::new(RunControl::default());
        let stopper = Arc::clone(&control);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            stopper.request_stop();
        });

        let started = Instant::now();
        let result = control.pause(&bench, Duration::from_secs(10)).await;
        assert_eq!(result, Err(Interrupt::Stopped));
        assert!(started.elapsed() <= Duration::from_millis(400));
    }
}
