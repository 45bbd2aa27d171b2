// Ripple sequencer - fixed-duration voltage capture and its analysis
use crate::application::bench::{Bench, BenchBusy, BenchLease, BenchUser};
use crate::application::messages::Severity;
use crate::application::repositories::{RecordKind, RecordRepository};
use crate::domain::error::{PersistenceFailure, ValidationError};
use crate::domain::record::{RecordEntry, RippleRecord};
use crate::domain::ripple::{self, RippleParameters};
use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RippleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Busy(#[from] BenchBusy),
    #[error("adapter isn't connected")]
    NotConnected,
    #[error("a ripple test is already {0}")]
    InProgress(&'static str),
    #[error("no ripple result is displayed")]
    NothingSelected,
    #[error("the capture window holds no samples")]
    EmptyCapture,
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),
}

enum RippleState {
    Idle,
    Running {
        params: RippleParameters,
        elapsed_secs: u32,
        _lease: BenchLease,
    },
    Processing {
        _lease: BenchLease,
    },
    Ready(RippleRecord),
}

const RIPPLE_ID_PREFIX: &str = "ripple-test";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RippleStatus {
    Idle,
    Running {
        elapsed_secs: u32,
        duration_secs: u32,
    },
    Processing,
    Ready { record: RippleRecord },
}

/// `Idle -> Running -> Processing -> Ready -> Idle`, advanced by a
/// once-per-second [`tick`](RippleSequencer::tick).
///
/// Holds the bench while running so a load test can't start mid-capture.
pub struct RippleSequencer {
    bench: Arc<Bench>,
    records: Arc<dyn RecordRepository>,
    state: Mutex<RippleState>,
}

impl RippleSequencer {
    pub fn new(bench: Arc<Bench>, records: Arc<dyn RecordRepository>) -> Self {
        Self {
            bench,
            records,
            state: Mutex::new(RippleState::Idle),
        }
    }

    /// Validates parameters and starts a capture. A displayed result is
    /// discarded.
    pub fn start(
        &self,
        expected_voltage: f64,
        tolerance_percent: f64,
        duration_secs: u32,
    ) -> Result<(), RippleError> {
        let params = RippleParameters::new(expected_voltage, tolerance_percent, duration_secs)?;

        let mut state = self.state.lock();
        match *state {
            RippleState::Running { .. } => return Err(RippleError::InProgress("running")),
            RippleState::Processing { .. } => return Err(RippleError::InProgress("processing")),
            RippleState::Idle | RippleState::Ready(_) => {}
        }
        if !self.bench.is_connected() {
            return Err(RippleError::NotConnected);
        }
        let lease = self.bench.acquire(BenchUser::Ripple)?;

        *state = RippleState::Running {
            params,
            elapsed_secs: 0,
            _lease: lease,
        };
        self.bench.feed().success(format!(
            "Ripple test started: {expected_voltage}V \u{b1}{tolerance_percent}% for {duration_secs}s"
        ));
        Ok(())
    }

    /// Advances the elapsed-time counter; finishes the capture once the
    /// duration is reached. Returns the record when one was produced.
    pub async fn tick(&self) -> Result<Option<RippleRecord>, RippleError> {
        let params = {
            let mut state = self.state.lock();
            let RippleState::Running {
                params,
                elapsed_secs,
                ..
            } = &mut *state
            else {
                return Ok(None);
            };
            *elapsed_secs += 1;
            if *elapsed_secs < params.duration_secs {
                return Ok(None);
            }
            let params = *params;
            // the buffer stays pinned until the result is Ready or Idle
            if let RippleState::Running { _lease: lease, .. } =
                std::mem::replace(&mut *state, RippleState::Idle)
            {
                *state = RippleState::Processing { _lease: lease };
            }
            params
        };

        match self.process(params).await {
            Ok(record) => {
                *self.state.lock() = RippleState::Ready(record.clone());
                Ok(Some(record))
            }
            Err(e) => {
                self.bench.feed().error(format!("Ripple test failed: {e}"));
                *self.state.lock() = RippleState::Idle;
                Err(e)
            }
        }
    }

    async fn process(&self, params: RippleParameters) -> Result<RippleRecord, RippleError> {
        self.bench.feed().info("Processing ripple results, please wait ...");
        let samples: Vec<f64> = {
            let count = params.sample_count(self.bench.samples_per_sec());
            let buffer = self.bench.buffer();
            buffer.tail(count).iter().map(|s| s.voltage).collect()
        };
        let stats = ripple::statistics(&samples).ok_or(RippleError::EmptyCapture)?;
        let limits = params.limits();
        let out_of_band = ripple::out_of_band(&samples, limits);

        let test_id = match self.records.next_id(RecordKind::Ripple, RIPPLE_ID_PREFIX).await {
            Ok(id) => id,
            Err(e) => {
                self.bench
                    .feed()
                    .error(format!("Could not allocate a ripple id: {e}"));
                format!("{RIPPLE_ID_PREFIX}-{}", Local::now().format("%Y%m%d-%H%M%S"))
            }
        };

        let record = RippleRecord {
            test_id,
            date: Local::now(),
            expected_voltage: params.expected_voltage,
            tolerance_percent: params.tolerance_percent,
            duration_secs: params.duration_secs,
            pass: out_of_band.is_empty(),
            bottom_limit: limits.low,
            top_limit: limits.high,
            bottom_quartile: stats.bottom_quartile,
            top_quartile: stats.top_quartile,
            min_voltage: stats.min,
            max_voltage: stats.max,
            mean_voltage: stats.mean,
            out_of_band,
            samples,
        };

        match self.records.save_ripple(&record).await {
            Ok(path) => tracing::info!("ripple record written to {}", path.display()),
            Err(e) => self
                .bench
                .feed()
                .error(format!("Ripple record could not be saved: {e}")),
        }
        self.bench.feed().push(
            Severity::Result,
            format!(
                "{}: {} (min {:.3}V, max {:.3}V)",
                record.test_id,
                if record.pass { "PASS" } else { "FAIL" },
                record.min_voltage,
                record.max_voltage
            ),
        );
        Ok(record)
    }

    /// Drops the displayed result, or abandons a running capture.
    pub fn unselect(&self) -> Result<(), RippleError> {
        let mut state = self.state.lock();
        match *state {
            RippleState::Ready(_) | RippleState::Running { .. } => {
                *state = RippleState::Idle;
                Ok(())
            }
            RippleState::Processing { .. } => Err(RippleError::InProgress("processing")),
            RippleState::Idle => Err(RippleError::NothingSelected),
        }
    }

    /// Deletes the displayed record from storage and returns to idle.
    pub async fn delete(&self) -> Result<String, RippleError> {
        let test_id = match &*self.state.lock() {
            RippleState::Ready(record) => record.test_id.clone(),
            _ => return Err(RippleError::NothingSelected),
        };
        self.records.delete_ripple(&test_id).await?;
        *self.state.lock() = RippleState::Idle;
        self.bench.feed().info(format!("Ripple test {test_id} deleted"));
        Ok(test_id)
    }

    /// Loads a persisted record straight into `Ready`.
    pub async fn load(&self, test_id: &str) -> Result<RippleRecord, RippleError> {
        if let RippleState::Running { .. } | RippleState::Processing { .. } = *self.state.lock() {
            return Err(RippleError::InProgress("running"));
        }
        let record = self.records.load_ripple(test_id).await?;
        *self.state.lock() = RippleState::Ready(record.clone());
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<RecordEntry>, RippleError> {
        Ok(self.records.list_ripples().await?)
    }

    pub fn status(&self) -> RippleStatus {
        match &*self.state.lock() {
            RippleState::Idle => RippleStatus::Idle,
            RippleState::Running {
                params,
                elapsed_secs,
                ..
            } => RippleStatus::Running {
                elapsed_secs: *elapsed_secs,
                duration_secs: params.duration_secs,
            },
            RippleState::Processing { .. } => RippleStatus::Processing,
            RippleState::Ready(record) => RippleStatus::Ready {
                record: record.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::TestRecord;
    use crate::domain::sample::{LoadCommand, MeasurementSample};
    use crate::infrastructure::record_store::JsonRecordStore;
    use crate::infrastructure::simulated_hardware::SimulatedHardware;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::time::Duration;

    struct Rig {
        _dir: tempfile::TempDir,
        bench: Arc<Bench>,
        ripple: RippleSequencer,
    }

    fn rig() -> Rig {
        rig_with(|root, _| Arc::new(JsonRecordStore::new(root)))
    }

    fn rig_with<F>(records: F) -> Rig
    where
        F: FnOnce(PathBuf, Arc<Bench>) -> Arc<dyn RecordRepository>,
    {
        let dir = tempfile::tempdir().unwrap();
        let bench = Arc::new(Bench::new(
            Arc::new(SimulatedHardware::default()),
            Duration::from_millis(100),
        ));
        bench.set_connected(true);
        let records = records(dir.path().join("records"), bench.clone());
        let ripple = RippleSequencer::new(bench.clone(), records);
        Rig {
            _dir: dir,
            bench,
            ripple,
        }
    }

    /// Notes who holds the bench whenever the sequencer touches storage.
    struct WatchedStore {
        inner: JsonRecordStore,
        bench: Arc<Bench>,
        seen: Mutex<Vec<(Option<BenchUser>, bool)>>,
    }

    impl WatchedStore {
        fn note(&self) {
            let pinned = self.bench.buffer().is_pinned();
            self.seen.lock().push((self.bench.occupant(), pinned));
        }
    }

    #[async_trait]
    impl RecordRepository for WatchedStore {
        async fn next_id(&self, kind: RecordKind, prefix: &str) -> Result<String, PersistenceFailure> {
            self.note();
            self.inner.next_id(kind, prefix).await
        }

        async fn save_test(&self, record: &TestRecord) -> Result<PathBuf, PersistenceFailure> {
            self.inner.save_test(record).await
        }

        async fn load_test(&self, test_id: &str) -> Result<TestRecord, PersistenceFailure> {
            self.inner.load_test(test_id).await
        }

        async fn list_tests(&self) -> Result<Vec<RecordEntry>, PersistenceFailure> {
            self.inner.list_tests().await
        }

        async fn delete_test(&self, test_id: &str) -> Result<(), PersistenceFailure> {
            self.inner.delete_test(test_id).await
        }

        async fn save_ripple(&self, record: &RippleRecord) -> Result<PathBuf, PersistenceFailure> {
            self.note();
            self.inner.save_ripple(record).await
        }

        async fn load_ripple(&self, test_id: &str) -> Result<RippleRecord, PersistenceFailure> {
            self.inner.load_ripple(test_id).await
        }

        async fn list_ripples(&self) -> Result<Vec<RecordEntry>, PersistenceFailure> {
            self.inner.list_ripples().await
        }

        async fn delete_ripple(&self, test_id: &str) -> Result<(), PersistenceFailure> {
            self.inner.delete_ripple(test_id).await
        }
    }

    fn record_voltages(bench: &Bench, voltages: &[f64]) {
        let mut buffer = bench.buffer();
        for &v in voltages {
            buffer.push(MeasurementSample::new(v, 0.0, LoadCommand::OFF, true));
        }
    }

    async fn run_to_completion(rig: &Rig, duration_secs: u32) -> RippleRecord {
        for _ in 1..duration_secs {
            assert!(rig.ripple.tick().await.unwrap().is_none());
        }
        rig.ripple.tick().await.unwrap().unwrap()
    }

    #[test]
    fn test_start_validates_parameters() {
        let rig = rig();
        assert!(matches!(
            rig.ripple.start(20.0, 10.0, 30),
            Err(RippleError::Validation(_))
        ));
        assert!(matches!(rig.ripple.status(), RippleStatus::Idle));
        assert_eq!(rig.bench.occupant(), None);

        rig.ripple.start(5.0, 10.0, 30).unwrap();
        assert!(matches!(
            rig.ripple.status(),
            RippleStatus::Running {
                elapsed_secs: 0,
                duration_secs: 30
            }
        ));
        assert_eq!(rig.bench.occupant(), Some(BenchUser::Ripple));
        assert!(matches!(
            rig.ripple.start(5.0, 10.0, 30),
            Err(RippleError::InProgress(_))
        ));
    }

    #[test]
    fn test_start_refused_while_bench_in_use() {
        let rig = rig();
        let _lease = rig.bench.acquire(BenchUser::LoadTest).unwrap();
        assert!(matches!(
            rig.ripple.start(5.0, 10.0, 30),
            Err(RippleError::Busy(BenchBusy(BenchUser::LoadTest)))
        ));
    }

    #[tokio::test]
    async fn test_capture_within_limits_passes() {
        let rig = rig();
        rig.ripple.start(5.0, 10.0, 10).unwrap();
        // older samples fall outside the 100-sample window
        record_voltages(&rig.bench, &[9.0; 20]);
        record_voltages(&rig.bench, &[4.5, 5.0, 5.5, 5.1].repeat(25));

        let record = run_to_completion(&rig, 10).await;
        assert!(record.pass);
        assert_eq!(record.samples.len(), 100);
        assert_eq!(record.bottom_limit, 4.5);
        assert_eq!(record.top_limit, 5.5);
        assert!(record.test_id.starts_with("ripple-test-"));
        assert!(matches!(rig.ripple.status(), RippleStatus::Ready { .. }));
        assert_eq!(rig.bench.occupant(), None);
    }

    #[tokio::test]
    async fn test_single_excursion_fails() {
        let rig = rig();
        rig.ripple.start(5.0, 10.0, 10).unwrap();
        let mut voltages = vec![5.0; 100];
        voltages[42] = 6.0;
        record_voltages(&rig.bench, &voltages);

        let record = run_to_completion(&rig, 10).await;
        assert!(!record.pass);
        assert_eq!(record.out_of_band, vec![42]);
        assert_eq!(record.max_voltage, 6.0);
    }

    #[tokio::test]
    async fn test_empty_capture_returns_to_idle() {
        let rig = rig();
        rig.ripple.start(5.0, 10.0, 10).unwrap();
        for _ in 1..10 {
            rig.ripple.tick().await.unwrap();
        }
        assert!(matches!(
            rig.ripple.tick().await,
            Err(RippleError::EmptyCapture)
        ));
        assert!(matches!(rig.ripple.status(), RippleStatus::Idle));
    }

    #[tokio::test]
    async fn test_persisted_record_reloads_into_ready() {
        let rig = rig();
        rig.ripple.start(12.0, 5.0, 10).unwrap();
        record_voltages(&rig.bench, &[11.9, 12.0, 12.1, 12.2].repeat(25));
        let record = run_to_completion(&rig, 10).await;

        rig.ripple.unselect().unwrap();
        assert!(matches!(rig.ripple.status(), RippleStatus::Idle));

        let loaded = rig.ripple.load(&record.test_id).await.unwrap();
        assert_eq!(loaded, record);
        assert_eq!(rig.ripple.list().await.unwrap().len(), 1);

        let deleted = rig.ripple.delete().await.unwrap();
        assert_eq!(deleted, record.test_id);
        assert!(rig.ripple.list().await.unwrap().is_empty());
        assert!(matches!(
            rig.ripple.unselect(),
            Err(RippleError::NothingSelected)
        ));
    }

    #[tokio::test]
    async fn test_unsaved_capture_is_still_shown() {
        let rig = rig_with(|root, _| {
            // a regular file where the records directory should be
            std::fs::write(&root, b"").unwrap();
            Arc::new(JsonRecordStore::new(root))
        });
        rig.ripple.start(5.0, 10.0, 10).unwrap();
        record_voltages(&rig.bench, &[5.0; 100]);

        let record = run_to_completion(&rig, 10).await;
        assert!(record.pass);
        assert_eq!(record.samples.len(), 100);
        assert!(record.test_id.starts_with("ripple-test-"));
        let RippleStatus::Ready { record: shown } = rig.ripple.status() else {
            panic!("record should be displayed");
        };
        assert_eq!(shown, record);
        assert_eq!(rig.bench.occupant(), None);

        let errors = rig
            .bench
            .feed()
            .recent()
            .into_iter()
            .filter(|m| m.severity == Severity::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[tokio::test]
    async fn test_bench_held_until_capture_is_processed() {
        let store = Arc::new(Mutex::new(None::<Arc<WatchedStore>>));
        let slot = store.clone();
        let rig = rig_with(move |root, bench| {
            let watched = Arc::new(WatchedStore {
                inner: JsonRecordStore::new(root),
                bench,
                seen: Mutex::new(Vec::new()),
            });
            *slot.lock() = Some(watched.clone());
            watched
        });
        rig.ripple.start(5.0, 10.0, 10).unwrap();
        record_voltages(&rig.bench, &[5.0; 100]);
        run_to_completion(&rig, 10).await;

        let watched = store.lock().clone().unwrap();
        let seen = watched.seen.lock().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|&s| s == (Some(BenchUser::Ripple), true)));
        assert_eq!(rig.bench.occupant(), None);
        assert!(!rig.bench.buffer().is_pinned());
    }
}
