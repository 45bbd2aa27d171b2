// Test sequencer - phase state machine, safety interlocks and run lifecycle
use crate::application::actuation::run_actuator;
use crate::application::adapter_service::AdapterService;
use crate::application::bench::{Bench, BenchBusy, BenchLease, BenchUser};
use crate::application::calibration_service::{self, SweepTiming};
use crate::application::messages::Severity;
use crate::application::repositories::{CalibrationRepository, RecordKind, RecordRepository};
use crate::application::run_control::{Interrupt, RunControl};
use crate::application::settings_service::SettingsService;
use crate::domain::adapter::AdapterProfile;
use crate::domain::calibration::CalibrationTable;
use crate::domain::error::{HardwareFault, PersistenceFailure, ValidationError};
use crate::domain::evaluation::evaluate;
use crate::domain::phase::{OppTrip, PhaseWindow, SafetyTrip, TestRun};
use crate::domain::record::{RecordEntry, TestRecord, TestSummary};
use crate::domain::sample::{LoadCommand, MeasurementSample};
use crate::domain::settings::TestSettings;
use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Samples recorded at each phase 1 level before stepping up.
pub const LEVEL_SAMPLES: usize = 10;
/// Samples recorded at full and at zero load per transient cycle.
pub const TRANSIENT_SAMPLES: usize = 60;
pub const OPP_START_PERCENT: f64 = 100.0;
pub const OPP_STEP_PERCENT: f64 = 5.0;
pub const OPP_BACKOFF_PERCENT: f64 = 15.0;
/// A protected short circuit must read below both limits.
pub const SHORT_CIRCUIT_MAX_VOLTAGE: f64 = 1.5;
pub const SHORT_CIRCUIT_MAX_CURRENT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerState {
    Idle,
    Phase1,
    Phase2,
    Phase3,
    ShortCircuit,
    Evaluating,
    ConstantLoad,
    Calibrating,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TesterStatus {
    Idle,
    Running,
    Stopping,
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopResponse {
    /// A run was active and has been asked to stop.
    Stopping,
    /// A stop was already requested and is still unwinding.
    Waiting,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { summary: TestSummary, persisted: bool },
    Stopped,
    Disconnected,
    Aborted { trip: SafetyTrip },
    Faulted { fault: HardwareFault },
    Calibrated { points: usize, persisted: bool },
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("adapter isn't connected")]
    NotConnected,
    #[error("no adapter profile is selected")]
    NoAdapterSelected,
    #[error("calibration table is empty, run a calibration first")]
    NotCalibrated,
    #[error(transparent)]
    Busy(#[from] BenchBusy),
    #[error("bench is faulted: {0}")]
    Faulted(HardwareFault),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Dwell times used by the phases.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub poll: Duration,
    pub ramp_rest: Duration,
    pub transient_rest: Duration,
    pub opp_step: Duration,
    pub trip_recovery: Duration,
    pub stuck_after: Duration,
    pub short_circuit_settle: Duration,
    pub short_circuit_recovery: Duration,
    pub final_settle: Duration,
    pub sweep: SweepTiming,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(100),
            ramp_rest: Duration::from_millis(100),
            transient_rest: Duration::from_secs(3),
            opp_step: Duration::from_millis(250),
            trip_recovery: Duration::from_secs(3),
            stuck_after: Duration::from_secs(60),
            short_circuit_settle: Duration::from_millis(500),
            short_circuit_recovery: Duration::from_secs(3),
            final_settle: Duration::from_secs(1),
            sweep: SweepTiming::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: TesterStatus,
    pub state: SequencerState,
    pub occupant: Option<BenchUser>,
    pub connected: bool,
    pub commanded_load: LoadCommand,
    pub latest_sample: Option<MeasurementSample>,
    pub selected_adapter: Option<String>,
    pub calibration_points: usize,
    pub last_outcome: Option<RunOutcome>,
}

struct ActiveRun {
    user: BenchUser,
    control: Arc<RunControl>,
    done: watch::Receiver<Option<RunOutcome>>,
}

/// Owns the run lifecycle: load tests, constant load and calibration.
pub struct TesterService {
    bench: Arc<Bench>,
    adapters: Arc<AdapterService>,
    settings: Arc<SettingsService>,
    records: Arc<dyn RecordRepository>,
    calibration_store: Arc<dyn CalibrationRepository>,
    calibration: Mutex<Arc<CalibrationTable>>,
    timing: Timing,
    state: Arc<Mutex<SequencerState>>,
    active: Mutex<Option<ActiveRun>>,
    last_outcome: Mutex<Option<RunOutcome>>,
}

impl TesterService {
    pub fn new(
        bench: Arc<Bench>,
        adapters: Arc<AdapterService>,
        settings: Arc<SettingsService>,
        records: Arc<dyn RecordRepository>,
        calibration_store: Arc<dyn CalibrationRepository>,
        calibration: CalibrationTable,
    ) -> Self {
        Self {
            bench,
            adapters,
            settings,
            records,
            calibration_store,
            calibration: Mutex::new(Arc::new(calibration)),
            timing: Timing::default(),
            state: Arc::new(Mutex::new(SequencerState::Idle)),
            active: Mutex::new(None),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn calibration(&self) -> Arc<CalibrationTable> {
        Arc::clone(&self.calibration.lock())
    }

    /// Starts a full load test with the selected adapter.
    pub fn start(self: &Arc<Self>) -> Result<(), StartError> {
        let mut active = self.active.lock();
        self.preflight(active.as_ref())?;
        let adapter = self.adapters.selected().ok_or(StartError::NoAdapterSelected)?;
        let table = self.calibrated()?;
        let lease = self.bench.acquire(BenchUser::LoadTest)?;

        let control = Arc::new(RunControl::default());
        let runner = self.runner(&control, adapter);
        self.bench.feed().success("Test started");

        let service = Arc::clone(self);
        let run = async move {
            let max_current = runner.adapter.max_current;
            let result = service
                .actuated(&runner.control, table, max_current, runner.execute())
                .await;
            match result {
                Ok(run) => service.conclude(&runner, run).await,
                Err(interrupt) => service.interrupted(interrupt),
            }
        };
        self.launch(&mut active, lease, control, run);
        Ok(())
    }

    /// Holds the adapter at `amps` until stopped.
    pub fn start_constant_load(self: &Arc<Self>, amps: f64) -> Result<(), StartError> {
        let mut active = self.active.lock();
        self.preflight(active.as_ref())?;
        let adapter = self.adapters.selected().ok_or(StartError::NoAdapterSelected)?;
        let limit = self.settings.current().max_current_shutdown;
        if !(amps > 0.0 && amps <= limit) {
            return Err(ValidationError::out_of_range(
                "constant load",
                "above 0 A and within the max current shutdown",
                amps,
            )
            .into());
        }
        let table = self.calibrated()?;
        let lease = self.bench.acquire(BenchUser::ConstantLoad)?;

        let control = Arc::new(RunControl::default());
        let runner = self.runner(&control, adapter);
        let percent = amps / runner.adapter.max_current * 100.0;
        self.bench
            .feed()
            .info(format!("Constant load of {amps:.2}A ({percent:.0}%) applied"));

        let service = Arc::clone(self);
        let run = async move {
            let max_current = runner.adapter.max_current;
            let result = service
                .actuated(&runner.control, table, max_current, runner.hold_constant(percent))
                .await;
            match result {
                Ok(never) => match never {},
                Err(interrupt) => service.interrupted(interrupt),
            }
        };
        self.launch(&mut active, lease, control, run);
        Ok(())
    }

    /// Runs the duty sweep and replaces the calibration table.
    pub fn calibrate(self: &Arc<Self>) -> Result<(), StartError> {
        let mut active = self.active.lock();
        self.preflight(active.as_ref())?;
        let lease = self.bench.acquire(BenchUser::Calibration)?;
        let control = Arc::new(RunControl::default());
        *self.state.lock() = SequencerState::Calibrating;

        let service = Arc::clone(self);
        let sweep_control = Arc::clone(&control);
        let run = async move { service.run_calibration(&sweep_control).await };
        self.launch(&mut active, lease, control, run);
        Ok(())
    }

    pub fn stop(&self) -> StopResponse {
        let active = self.active.lock();
        match active.as_ref() {
            None => StopResponse::Idle,
            Some(run) if run.control.request_stop() => StopResponse::Waiting,
            Some(_) => {
                *self.state.lock() = SequencerState::Stopping;
                self.bench.feed().info("Stopping, please wait ...");
                StopResponse::Stopping
            }
        }
    }

    /// Waits for the active run (if any) and returns the latest outcome.
    pub async fn wait(&self) -> Option<RunOutcome> {
        let done = self.active.lock().as_ref().map(|run| run.done.clone());
        if let Some(mut done) = done {
            if let Ok(outcome) = done.wait_for(Option::is_some).await {
                return outcome.clone();
            }
        }
        self.last_outcome.lock().clone()
    }

    pub fn status(&self) -> StatusReport {
        let last_outcome = self.last_outcome.lock().clone();
        let status = {
            let active = self.active.lock();
            if self.bench.fault().is_some() {
                TesterStatus::Faulted
            } else if let Some(run) = active.as_ref() {
                if run.control.stop_requested() {
                    TesterStatus::Stopping
                } else {
                    TesterStatus::Running
                }
            } else if matches!(last_outcome, Some(RunOutcome::Faulted { .. })) {
                TesterStatus::Faulted
            } else {
                TesterStatus::Idle
            }
        };

        StatusReport {
            status,
            state: *self.state.lock(),
            occupant: self.bench.occupant(),
            connected: self.bench.is_connected(),
            commanded_load: self.bench.commanded_load(),
            latest_sample: self.bench.latest_sample(),
            selected_adapter: self.adapters.selected().map(|a| a.name.clone()),
            calibration_points: self.calibration().points().len(),
            last_outcome,
        }
    }

    /// Stops any run, waits for it to unwind, then ends acquisition.
    pub async fn shutdown(&self) {
        if self.stop() != StopResponse::Idle {
            self.wait().await;
        }
        self.bench.request_shutdown();
        if let Err(fault) = self.bench.release_outputs() {
            tracing::error!("could not release outputs on shutdown: {}", fault);
        }
    }

    pub async fn list_records(&self) -> Result<Vec<RecordEntry>, PersistenceFailure> {
        self.records.list_tests().await
    }

    pub async fn load_record(&self, test_id: &str) -> Result<TestRecord, PersistenceFailure> {
        self.records.load_test(test_id).await
    }

    pub async fn delete_record(&self, test_id: &str) -> Result<(), PersistenceFailure> {
        self.records.delete_test(test_id).await?;
        self.bench.feed().info(format!("Deleted test {test_id}"));
        Ok(())
    }

    fn preflight(&self, active: Option<&ActiveRun>) -> Result<(), StartError> {
        if let Some(run) = active {
            return Err(BenchBusy(run.user).into());
        }
        if let Some(fault) = self.bench.fault() {
            return Err(StartError::Faulted(fault));
        }
        if !self.bench.is_connected() {
            return Err(StartError::NotConnected);
        }
        Ok(())
    }

    fn calibrated(&self) -> Result<Arc<CalibrationTable>, StartError> {
        let table = self.calibration();
        if table.is_empty() {
            return Err(StartError::NotCalibrated);
        }
        Ok(table)
    }

    fn runner(&self, control: &Arc<RunControl>, adapter: Arc<AdapterProfile>) -> TestRunner {
        TestRunner {
            bench: Arc::clone(&self.bench),
            control: Arc::clone(control),
            state: Arc::clone(&self.state),
            adapter,
            settings: self.settings.current(),
            timing: self.timing,
        }
    }

    fn launch<F>(
        self: &Arc<Self>,
        active: &mut Option<ActiveRun>,
        lease: BenchLease,
        control: Arc<RunControl>,
        run: F,
    ) where
        F: Future<Output = RunOutcome> + Send + 'static,
    {
        let (done_tx, done_rx) = watch::channel(None);
        *active = Some(ActiveRun {
            user: lease.user(),
            control,
            done: done_rx,
        });

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = run.await;
            service.finish_run(lease, &outcome);
            done_tx.send_replace(Some(outcome));
        });
    }

    /// Runs `body` with the actuator following the commanded load.
    async fn actuated<T, F>(
        &self,
        control: &Arc<RunControl>,
        table: Arc<CalibrationTable>,
        max_current: f64,
        body: F,
    ) -> Result<T, Interrupt>
    where
        F: Future<Output = Result<T, Interrupt>>,
    {
        let actuator = tokio::spawn(run_actuator(
            Arc::clone(&self.bench),
            table,
            max_current,
            Arc::clone(control),
        ));
        let result = body.await;
        control.finish();
        if let Err(e) = actuator.await {
            tracing::error!("actuator task failed: {}", e);
        }

        match (result, control.fault()) {
            (Err(Interrupt::Stopped), Some(fault)) => Err(Interrupt::Faulted(fault)),
            (result, _) => result,
        }
    }

    async fn conclude(&self, runner: &TestRunner, run: TestRun) -> RunOutcome {
        runner.enter(SequencerState::Evaluating);
        let feed = self.bench.feed();
        feed.success("Processing results, please wait ...");

        let evaluation = {
            let buffer = self.bench.buffer();
            evaluate(
                buffer.samples(),
                &run,
                &runner.adapter,
                self.bench.sample_interval(),
            )
        };

        let test_id = match self.records.next_id(RecordKind::Test, &runner.adapter.name).await {
            Ok(id) => id,
            Err(e) => {
                feed.error(format!("Could not allocate a test id: {e}"));
                format!(
                    "{}-{}",
                    runner.adapter.name.to_uppercase(),
                    Local::now().format("%Y%m%d-%H%M%S")
                )
            }
        };

        let record = TestRecord {
            summary: TestSummary {
                test_id,
                phase1_pass: evaluation.phase1_pass,
                phase2_pass: evaluation.phase2_pass,
                phase3_pass: evaluation.phase3_pass,
                short_circuit_pass: evaluation.short_circuit_pass,
                valid: evaluation.valid,
                opp_trips: evaluation.opp_trips,
            },
            date: Local::now(),
            adapter: runner.adapter.as_ref().clone(),
            settings: runner.settings,
            out_of_band: evaluation.out_of_band,
            rows: evaluation.rows,
        };

        let persisted = match self.records.save_test(&record).await {
            Ok(path) => {
                tracing::info!("test record written to {}", path.display());
                true
            }
            Err(e) => {
                feed.error(format!("Test record could not be saved: {e}"));
                false
            }
        };

        feed.info("Test finished");
        feed.push(Severity::Result, record.summary.result_line());
        RunOutcome::Completed {
            summary: record.summary,
            persisted,
        }
    }

    async fn run_calibration(&self, control: &RunControl) -> RunOutcome {
        let table = match calibration_service::sweep(&self.bench, control, self.timing.sweep).await {
            Ok(table) => table,
            Err(interrupt) => return self.interrupted(interrupt),
        };

        let persisted = match self.calibration_store.save(&table).await {
            Ok(()) => true,
            Err(e) => {
                self.bench
                    .feed()
                    .error(format!("Calibration could not be saved: {e}"));
                false
            }
        };
        let points = table.points().len();
        *self.calibration.lock() = Arc::new(table);
        self.bench
            .feed()
            .success(format!("Calibration completed successfully ({points} points)"));
        RunOutcome::Calibrated { points, persisted }
    }

    fn interrupted(&self, interrupt: Interrupt) -> RunOutcome {
        let feed = self.bench.feed();
        match interrupt {
            Interrupt::Stopped => {
                feed.info("Test stopped successfully");
                RunOutcome::Stopped
            }
            Interrupt::Disconnected => {
                feed.warn("Adapter disconnected, run stopped");
                RunOutcome::Disconnected
            }
            Interrupt::Faulted(fault) => {
                feed.error(format!("Run aborted: {fault}"));
                RunOutcome::Faulted { fault }
            }
            Interrupt::SafetyAbort(trip) => {
                feed.warn("Test ended by safety shutdown");
                RunOutcome::Aborted { trip }
            }
        }
    }

    fn finish_run(&self, lease: BenchLease, outcome: &RunOutcome) {
        if let Err(fault) = self.bench.release_outputs() {
            self.bench
                .feed()
                .error(format!("Outputs could not be released: {fault}"));
        }
        *self.last_outcome.lock() = Some(outcome.clone());
        drop(lease);
        *self.active.lock() = None;
        *self.state.lock() = SequencerState::Idle;
    }
}

/// Per-run view of the bench, used by the phase routines.
struct TestRunner {
    bench: Arc<Bench>,
    control: Arc<RunControl>,
    state: Arc<Mutex<SequencerState>>,
    adapter: Arc<AdapterProfile>,
    settings: TestSettings,
    timing: Timing,
}

impl TestRunner {
    fn enter(&self, next: SequencerState) {
        let mut state = self.state.lock();
        if *state != SequencerState::Stopping {
            *state = next;
        }
        tracing::debug!("sequencer state {:?}", next);
    }

    async fn execute(&self) -> Result<TestRun, Interrupt> {
        self.bench.assert_outputs()?;

        let mut run = TestRun {
            standard: self.standard_ramp().await?,
            transient: self.transient().await?,
            ..TestRun::default()
        };

        let opp_start = self.bench.buffer_len();
        let include_opp = self.settings.phase3.include;
        if include_opp {
            run.trips = self.opp_hunt().await?;
            run.short_circuit_passed = self.short_circuit().await?;
        } else {
            self.bench.feed().info("Phase 3 skipped");
        }

        self.bench.command_load(LoadCommand::OFF);
        self.control
            .pause(&self.bench, self.timing.final_settle)
            .await?;
        run.end_index = self.bench.buffer_len();
        run.opp = if include_opp {
            PhaseWindow::new(opp_start, run.end_index)
        } else {
            PhaseWindow::empty_at(opp_start)
        };
        Ok(run)
    }

    async fn standard_ramp(&self) -> Result<PhaseWindow, Interrupt> {
        self.enter(SequencerState::Phase1);
        let cfg = self.settings.phase1;
        if !cfg.include {
            self.bench.feed().info("Phase 1 skipped");
            return Ok(PhaseWindow::empty_at(self.bench.buffer_len()));
        }
        self.bench.feed().success(format!(
            "Phase 1:\n- Testing standard load increase\n- Testing loads between 0% and 100%\n- Repeating test {} times",
            cfg.repeat
        ));

        let start = self.bench.buffer_len();
        for _ in 0..cfg.repeat {
            for step in 1..=10 {
                let level = LoadCommand::Percent(f64::from(step * 10));
                self.hold_level(level, LEVEL_SAMPLES).await?;
            }
            self.bench.command_load(LoadCommand::OFF);
            self.control.pause(&self.bench, self.timing.ramp_rest).await?;
        }

        Ok(self.loaded_window(start, self.bench.buffer_len()))
    }

    async fn transient(&self) -> Result<PhaseWindow, Interrupt> {
        self.enter(SequencerState::Phase2);
        let cfg = self.settings.phase2;
        if !cfg.include {
            self.bench.feed().info("Phase 2 skipped");
            return Ok(PhaseWindow::empty_at(self.bench.buffer_len()));
        }
        self.bench.feed().success(format!(
            "Phase 2:\n- Testing transient load\n- Testing sharp changes in load between 0% and 100%\n- Repeating test {} times",
            cfg.repeat
        ));

        self.bench.command_load(LoadCommand::OFF);
        self.control
            .pause(&self.bench, self.timing.transient_rest)
            .await?;

        let start = self.bench.buffer_len();
        for _ in 0..cfg.repeat {
            self.hold_level(LoadCommand::Percent(100.0), TRANSIENT_SAMPLES)
                .await?;
            self.hold_level(LoadCommand::OFF, TRANSIENT_SAMPLES).await?;
        }

        let end = self.bench.buffer_len();
        let first_loaded = self.loaded_window(start, end).start;
        Ok(PhaseWindow::new(first_loaded, end))
    }

    async fn opp_hunt(&self) -> Result<Vec<OppTrip>, Interrupt> {
        self.enter(SequencerState::Phase3);
        let cfg = self.settings.phase3;
        self.bench.feed().success(format!(
            "Phase 3:\n- Testing OPP\n- Testing loads over 100%\n- Repeating test {} times\n- Looking for {} OPP trips",
            cfg.repeat, cfg.opp_trip_target
        ));

        let started = Instant::now();
        let target = cfg.opp_trip_target as usize;
        let mut trips: Vec<OppTrip> = Vec::new();

        'repeats: for _ in 0..cfg.repeat {
            let mut load = OPP_START_PERCENT;

            while trips.len() < target {
                self.control.checkpoint(&self.bench)?;

                if let Some(trip) = self.safety_trip(load, started) {
                    self.bench.command_load(LoadCommand::OFF);
                    if self.settings.exit_at_safety {
                        self.bench
                            .feed()
                            .error(format!("Safety shutdown: {trip}, ending test, reducing load"));
                        return Err(Interrupt::SafetyAbort(trip));
                    }
                    self.bench
                        .feed()
                        .error(format!("Safety shutdown: {trip}, continuing test, reducing load"));
                    break 'repeats;
                }

                let step_start = self.bench.buffer_len();
                self.bench.command_load(LoadCommand::Percent(load));
                self.control.pause(&self.bench, self.timing.opp_step).await?;

                match self.detect_trip(step_start, load) {
                    Some(trip) => {
                        self.bench
                            .feed()
                            .warn(format!("OPP trip point: {:.0}%", trip.load_percent));
                        trips.push(trip);
                        load -= OPP_BACKOFF_PERCENT;
                        self.bench.command_load(LoadCommand::Percent(load));
                        self.control
                            .pause(&self.bench, self.timing.trip_recovery)
                            .await?;
                    }
                    None => load += OPP_STEP_PERCENT,
                }
            }
        }

        Ok(trips)
    }

    fn safety_trip(&self, load_percent: f64, started: Instant) -> Option<SafetyTrip> {
        let target_current = load_percent / 100.0 * self.adapter.max_current;
        let threshold = self.settings.max_current_shutdown;
        if target_current >= threshold {
            return Some(SafetyTrip::OverCurrent {
                target_current,
                threshold,
            });
        }
        let elapsed = started.elapsed();
        if elapsed > self.timing.stuck_after {
            return Some(SafetyTrip::Stuck {
                elapsed_secs: elapsed.as_secs_f64(),
            });
        }
        None
    }

    /// First sample since `step_start` recorded under `load_percent` that reads
    /// below the profile's minimum voltage.
    fn detect_trip(&self, step_start: usize, load_percent: f64) -> Option<OppTrip> {
        let load = LoadCommand::Percent(load_percent);
        let min_voltage = self.adapter.min_voltage;
        let buffer = self.bench.buffer();
        let index = buffer
            .first_matching_from(step_start, |s| s.load == load && s.voltage < min_voltage)?;
        let sample = buffer.get(index)?;
        Some(OppTrip {
            sample_index: index,
            voltage: sample.voltage,
            current: sample.current,
            load_percent,
            measured_load_percent: self.adapter.load_percent_of(sample.current),
        })
    }

    async fn short_circuit(&self) -> Result<bool, Interrupt> {
        self.enter(SequencerState::ShortCircuit);
        self.bench.feed().success("Testing short circuit");

        let mut passed = false;
        for _ in 0..self.settings.phase3.opp_trip_target {
            let from = self.bench.buffer_len();
            self.bench.command_load(LoadCommand::ShortCircuit);
            self.control
                .pause(&self.bench, self.timing.short_circuit_settle)
                .await?;

            passed = {
                let buffer = self.bench.buffer();
                buffer
                    .last_matching_from(from, |s| s.load == LoadCommand::ShortCircuit)
                    .and_then(|i| buffer.get(i))
                    .is_some_and(|s| {
                        s.voltage < SHORT_CIRCUIT_MAX_VOLTAGE && s.current < SHORT_CIRCUIT_MAX_CURRENT
                    })
            };
            self.bench.command_load(LoadCommand::OFF);
            if !passed {
                self.bench.feed().warn("Short circuit protection did not hold");
                break;
            }
            self.control
                .pause(&self.bench, self.timing.short_circuit_recovery)
                .await?;
        }

        Ok(passed)
    }

    async fn hold_constant(&self, percent: f64) -> Result<std::convert::Infallible, Interrupt> {
        self.enter(SequencerState::ConstantLoad);
        self.bench.assert_outputs()?;
        self.bench.command_load(LoadCommand::Percent(percent));
        loop {
            self.control.pause(&self.bench, Duration::from_secs(1)).await?;
        }
    }

    /// Commands `load` and waits for `samples` samples recorded under it.
    async fn hold_level(&self, load: LoadCommand, samples: usize) -> Result<(), Interrupt> {
        let from = self.bench.buffer_len();
        self.bench.command_load(load);
        loop {
            self.control.checkpoint(&self.bench)?;
            if self.bench.buffer().count_from(from, |s| s.load == load) >= samples {
                return Ok(());
            }
            tokio::time::sleep(self.timing.poll).await;
        }
    }

    /// `[start, stop)` trimmed of leading and trailing zero-load samples.
    fn loaded_window(&self, start: usize, stop: usize) -> PhaseWindow {
        let buffer = self.bench.buffer();
        let loaded = |i: usize| buffer.get(i).is_some_and(|s| !s.load.is_off());
        match (start..stop).find(|&i| loaded(i)) {
            Some(first) => {
                let last = (first..stop).rev().find(|&i| loaded(i)).unwrap_or(first);
                PhaseWindow::new(first, last + 1)
            }
            None => PhaseWindow::empty_at(stop),
        }
    }
}
