//! Periodic ingestion scheduler.
//!
//! The [`IngestionScheduler`] is the single owner of the store, the event log writer
//! and the active [`AggregationConfig`]. It runs in a dedicated Tokio task driven by an
//! interval timer and alternates between two states:
//!
//! ```text
//!          tick                      drain complete
//!   Idle ─────────▶ Processing ───────────────────────▶ Idle
//! ```
//!
//! On each `Idle → Processing` transition it:
//!
//! 1. applies every queued [`ConfigUpdate`] (replying accept/reject to the sender),
//! 2. drains the records currently available from the source, decoding each one and
//!    pushing it to the store and the event log in arrival order,
//! 3. flushes the event log to stable storage,
//! 4. recomputes every view from a store snapshot and publishes an
//!    [`AggregateSnapshot`] on a `watch` channel.
//!
//! Configuration messages that arrive while a pass is running stay queued until the next
//! transition. Malformed records and source failures are logged and isolated to the
//! record or tick they occur in; only a [`DaqError::LogWriteFailure`] stops the task.
//!
//! ## Shutdown
//!
//! [`SchedulerHandle::shutdown`] stops the timer after the in-flight pass, runs one final
//! drain, then flushes and closes the log and releases the source.

use crate::aggregate::{aggregate, window_width_for_mean, Aggregates};
use crate::config::{AggregationConfig, ConfigUpdate};
use crate::error::{AppResult, DaqError};
use crate::event::decode_record;
use crate::event_log::EventLogWriter;
use crate::source::{RecordSource, SourcePoll};
use crate::store::BoundedEventStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default bound on records drained in one tick.
pub const DEFAULT_MAX_RECORDS_PER_TICK: usize = 100_000;

/// Capacity of the configuration message queue.
const CONFIG_QUEUE_CAPACITY: usize = 32;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// Draining the source and aggregating.
    Processing,
}

/// Views and counters published after every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Tick number, 0 before the first pass.
    pub tick: u64,
    /// Wall-clock publication time.
    pub published_at: DateTime<Utc>,
    /// Gap, window-count and amplitude views.
    pub aggregates: Aggregates,
    /// Events currently retained.
    pub store_len: usize,
    /// Events decoded since start.
    pub events_total: u64,
    /// Malformed records skipped since start.
    pub malformed_total: u64,
    /// Events evicted from the store since start.
    pub evicted_total: u64,
    /// Configuration the views were computed with.
    pub config: AggregationConfig,
}

impl AggregateSnapshot {
    fn initial(config: &AggregationConfig) -> Self {
        Self {
            tick: 0,
            published_at: Utc::now(),
            aggregates: Aggregates::default(),
            store_len: 0,
            events_total: 0,
            malformed_total: 0,
            evicted_total: 0,
            config: config.clone(),
        }
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Raw records taken from the source.
    pub records: usize,
    /// Records decoded and stored.
    pub decoded: usize,
    /// Records skipped as malformed.
    pub malformed: usize,
    /// Source read failures.
    pub source_errors: usize,
    /// Configuration updates accepted at the start of the pass.
    pub config_updates: usize,
    /// Whether the source reported that it has ended.
    pub source_closed: bool,
}

/// Totals reported when the scheduler stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSummary {
    /// Passes completed.
    pub ticks: u64,
    /// Events decoded and logged.
    pub events_total: u64,
    /// Malformed records skipped.
    pub malformed_total: u64,
    /// Event log path.
    pub log_path: PathBuf,
}

struct ConfigRequest {
    update: ConfigUpdate,
    reply: Option<oneshot::Sender<AppResult<AggregationConfig>>>,
}

/// Sends configuration updates to a scheduler.
#[derive(Clone)]
pub struct ConfigSender {
    tx: mpsc::Sender<ConfigRequest>,
}

impl ConfigSender {
    /// Queue `update` and wait for the scheduler to accept or reject it.
    ///
    /// Resolves at the scheduler's next tick with the resulting configuration.
    pub async fn update(&self, update: ConfigUpdate) -> AppResult<AggregationConfig> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ConfigRequest {
                update,
                reply: Some(reply),
            })
            .await
            .map_err(|_| DaqError::SchedulerStopped)?;
        rx.await.map_err(|_| DaqError::SchedulerStopped)?
    }

    /// Queue `update` without waiting for the outcome.
    pub fn submit(&self, update: ConfigUpdate) -> AppResult<()> {
        self.tx
            .try_send(ConfigRequest {
                update,
                reply: None,
            })
            .map_err(|_| DaqError::SchedulerStopped)
    }
}

/// Single owner of the ingestion pipeline state.
pub struct IngestionScheduler {
    source: Box<dyn RecordSource>,
    writer: EventLogWriter,
    store: BoundedEventStore,
    config: AggregationConfig,
    config_tx: mpsc::Sender<ConfigRequest>,
    config_rx: mpsc::Receiver<ConfigRequest>,
    snapshot_tx: watch::Sender<Arc<AggregateSnapshot>>,
    state_tx: watch::Sender<SchedulerState>,
    max_records_per_tick: usize,
    exit_on_source_close: bool,
    source_closed: bool,
    ticks: u64,
    events_total: u64,
    malformed_total: u64,
}

impl IngestionScheduler {
    /// Create a scheduler. Fails if `config` is out of bounds.
    pub fn new(
        source: Box<dyn RecordSource>,
        writer: EventLogWriter,
        store: BoundedEventStore,
        config: AggregationConfig,
    ) -> AppResult<Self> {
        config.validate()?;
        let (config_tx, config_rx) = mpsc::channel(CONFIG_QUEUE_CAPACITY);
        let (snapshot_tx, _) = watch::channel(Arc::new(AggregateSnapshot::initial(&config)));
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Ok(Self {
            source,
            writer,
            store,
            config,
            config_tx,
            config_rx,
            snapshot_tx,
            state_tx,
            max_records_per_tick: DEFAULT_MAX_RECORDS_PER_TICK,
            exit_on_source_close: false,
            source_closed: false,
            ticks: 0,
            events_total: 0,
            malformed_total: 0,
        })
    }

    /// Bound the number of records drained per tick (at least 1).
    pub fn with_max_records_per_tick(mut self, max: usize) -> Self {
        self.max_records_per_tick = max.max(1);
        self
    }

    /// Stop the run loop once the source reports it has ended (file replay).
    pub fn exit_on_source_close(mut self, enabled: bool) -> Self {
        self.exit_on_source_close = enabled;
        self
    }

    /// Sender for runtime configuration updates.
    pub fn config_sender(&self) -> ConfigSender {
        ConfigSender {
            tx: self.config_tx.clone(),
        }
    }

    /// Receiver of published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AggregateSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Active configuration.
    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Retained events.
    pub fn store(&self) -> &BoundedEventStore {
        &self.store
    }

    /// Event log writer.
    pub fn writer(&self) -> &EventLogWriter {
        &self.writer
    }

    /// Run one `Idle → Processing → Idle` pass.
    ///
    /// Only a fatal event log failure is returned as an error.
    pub fn tick(&mut self) -> AppResult<TickReport> {
        let mut report = TickReport {
            config_updates: self.apply_config_updates(),
            ..TickReport::default()
        };

        self.state_tx.send_replace(SchedulerState::Processing);
        let result = self.process(&mut report);
        self.state_tx.send_replace(SchedulerState::Idle);
        result?;

        self.ticks += 1;
        self.publish();
        debug!(
            tick = self.ticks,
            records = report.records,
            decoded = report.decoded,
            malformed = report.malformed,
            stored = self.store.len(),
            "Tick complete"
        );
        Ok(report)
    }

    fn apply_config_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(request) = self.config_rx.try_recv() {
            let result = self
                .resolve_update(request.update)
                .and_then(|update| update.apply(&self.config));
            match &result {
                Ok(next) => {
                    info!(update = ?request.update, "Aggregation configuration updated");
                    self.config = next.clone();
                    applied += 1;
                }
                Err(e) => {
                    warn!(update = ?request.update, error = %e, "Configuration update rejected");
                }
            }
            if let Some(reply) = request.reply {
                let _ = reply.send(result);
            }
        }
        applied
    }

    fn resolve_update(&mut self, update: ConfigUpdate) -> AppResult<ConfigUpdate> {
        match update {
            ConfigUpdate::FitWindowWidth { mean_count } => {
                let snapshot = self.store.snapshot();
                window_width_for_mean(snapshot.timestamps, mean_count)
                    .map(ConfigUpdate::WindowWidth)
                    .ok_or_else(|| {
                        DaqError::InvalidConfiguration(format!(
                            "cannot fit a window width for mean count {} from {} events",
                            mean_count,
                            snapshot.len()
                        ))
                    })
            }
            other => Ok(other),
        }
    }

    fn process(&mut self, report: &mut TickReport) -> AppResult<()> {
        while report.records < self.max_records_per_tick {
            match self.source.poll_record() {
                Ok(SourcePoll::Record(raw)) => {
                    report.records += 1;
                    self.ingest(&raw, report)?;
                }
                Ok(SourcePoll::Empty) => break,
                Ok(SourcePoll::Closed) => {
                    if !self.source_closed {
                        info!(source = self.source.name(), "Source closed");
                        self.source_closed = true;
                    }
                    report.source_closed = true;
                    break;
                }
                Err(e @ DaqError::MalformedRecord { .. }) => {
                    report.records += 1;
                    self.skip_malformed(&e, report);
                }
                Err(e) => {
                    warn!(source = self.source.name(), error = %e, "Source read failed; retrying next tick");
                    report.source_errors += 1;
                    break;
                }
            }
        }
        self.writer.flush()
    }

    fn ingest(&mut self, raw: &str, report: &mut TickReport) -> AppResult<()> {
        match decode_record(raw) {
            Ok(event) => {
                // Views only ever hold logged events.
                self.writer.append(&event)?;
                self.store.push(&event);
                self.events_total += 1;
                report.decoded += 1;
            }
            Err(e) => self.skip_malformed(&e, report),
        }
        Ok(())
    }

    fn skip_malformed(&mut self, error: &DaqError, report: &mut TickReport) {
        match error {
            DaqError::MalformedRecord { record, reason } => {
                warn!(record = %record, reason = %reason, "Skipping malformed record")
            }
            other => warn!(error = %other, "Skipping malformed record"),
        }
        self.malformed_total += 1;
        report.malformed += 1;
    }

    fn publish(&mut self) {
        let evicted_total = self.store.evicted();
        let snapshot = self.store.snapshot();
        let aggregates = aggregate(&snapshot, &self.config);
        let published = AggregateSnapshot {
            tick: self.ticks,
            published_at: Utc::now(),
            aggregates,
            store_len: snapshot.len(),
            events_total: self.events_total,
            malformed_total: self.malformed_total,
            evicted_total,
            config: self.config.clone(),
        };
        self.snapshot_tx.send_replace(Arc::new(published));
    }

    /// Run the tick loop until `shutdown` fires (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> AppResult<SchedulerSummary> {
        let mut period = self.config.tick_period();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            source = self.source.name(),
            log = %self.writer.path().display(),
            period_ms = period.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let report = match self.tick() {
                        Ok(report) => report,
                        Err(e) => {
                            error!(error = %e, "Fatal event log failure; stopping");
                            self.source.close().await;
                            return Err(e);
                        }
                    };
                    if report.source_closed && self.exit_on_source_close {
                        break;
                    }
                    if self.config.tick_period() != period {
                        period = self.config.tick_period();
                        interval = reset_interval(period);
                        info!(period_ms = period.as_millis() as u64, "Tick period changed");
                    }
                }
            }
        }

        self.finish().await
    }

    async fn finish(mut self) -> AppResult<SchedulerSummary> {
        let final_pass = self.tick();
        self.source.close().await;
        final_pass?;
        self.writer.close()?;
        info!(
            ticks = self.ticks,
            events = self.events_total,
            malformed = self.malformed_total,
            "Scheduler stopped"
        );
        Ok(SchedulerSummary {
            ticks: self.ticks,
            events_total: self.events_total,
            malformed_total: self.malformed_total,
            log_path: self.writer.path().to_path_buf(),
        })
    }

    /// Spawn the run loop on the current runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let config = self.config_sender();
        let snapshots = self.subscribe();
        let state = self.state_tx.subscribe();
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle {
            config,
            snapshots,
            state,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

fn reset_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Presentation-side handle to a running scheduler.
///
/// Readers only ever see published snapshots; configuration changes are messages.
/// Dropping the handle stops the scheduler as [`SchedulerHandle::shutdown`] would, without
/// waiting for it.
pub struct SchedulerHandle {
    config: ConfigSender,
    snapshots: watch::Receiver<Arc<AggregateSnapshot>>,
    state: watch::Receiver<SchedulerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<AppResult<SchedulerSummary>>>,
}

impl SchedulerHandle {
    /// Request a configuration change; resolves at the next tick.
    pub async fn update_config(&self, update: ConfigUpdate) -> AppResult<AggregationConfig> {
        self.config.update(update).await
    }

    /// Sender for configuration updates, for other tasks.
    pub fn config_sender(&self) -> ConfigSender {
        self.config.clone()
    }

    /// New receiver of published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AggregateSnapshot>> {
        self.snapshots.clone()
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> Arc<AggregateSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Configuration of the most recent snapshot.
    pub fn config(&self) -> AggregationConfig {
        self.snapshots.borrow().config.clone()
    }

    /// Current scheduler state.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Whether the run loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the run loop to exit on its own (source closed or fatal error).
    ///
    /// Cancel-safe: dropping the future leaves the scheduler running.
    pub async fn wait(&mut self) -> AppResult<SchedulerSummary> {
        let task = self.task.as_mut().ok_or(DaqError::SchedulerStopped)?;
        let result = task.await;
        self.task = None;
        result.map_err(|e| DaqError::TaskFailed(e.to_string()))?
    }

    /// Stop the scheduler and wait for the log to be flushed and closed.
    pub async fn shutdown(mut self) -> AppResult<SchedulerSummary> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::LogSink;
    use crate::source::ChannelSource;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io::Write;
    use tracing_test::traced_test;

    /// Replays a fixed list of poll outcomes, then reports `Empty`.
    struct ScriptedSource {
        polls: VecDeque<AppResult<SourcePoll>>,
    }

    impl ScriptedSource {
        fn new(polls: Vec<AppResult<SourcePoll>>) -> Self {
            Self {
                polls: polls.into(),
            }
        }
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        fn poll_record(&mut self) -> AppResult<SourcePoll> {
            self.polls.pop_front().unwrap_or(Ok(SourcePoll::Empty))
        }

        async fn close(&mut self) {}

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn record(raw: &str) -> AppResult<SourcePoll> {
        Ok(SourcePoll::Record(raw.to_string()))
    }

    fn scripted(polls: Vec<AppResult<SourcePoll>>) -> IngestionScheduler {
        IngestionScheduler::new(
            Box::new(ScriptedSource::new(polls)),
            EventLogWriter::with_sink("mem", Vec::new()),
            BoundedEventStore::new(16).unwrap(),
            AggregationConfig::default(),
        )
        .unwrap()
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogSink for FailingSink {}

    fn scheduler(capacity: usize) -> (mpsc::Sender<String>, IngestionScheduler) {
        let (tx, source) = ChannelSource::new(64);
        let writer = EventLogWriter::with_sink("mem", Vec::new());
        let store = BoundedEventStore::new(capacity).unwrap();
        let scheduler =
            IngestionScheduler::new(Box::new(source), writer, store, AggregationConfig::default())
                .unwrap();
        (tx, scheduler)
    }

    #[tokio::test]
    async fn tick_ingests_in_arrival_order() {
        let (tx, mut scheduler) = scheduler(16);
        for record in ["700 1000 50", "710 1020 20", "705 1050 30"] {
            tx.send(record.to_string()).await.unwrap();
        }

        let report = scheduler.tick().unwrap();
        assert_eq!(report.records, 3);
        assert_eq!(report.decoded, 3);
        assert_eq!(scheduler.store().len(), 3);
        assert_eq!(scheduler.writer().appended(), 3);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let snapshot = scheduler.subscribe().borrow().clone();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.events_total, 3);
    }

    #[tokio::test]
    async fn malformed_record_does_not_halt_batch() {
        let (tx, mut scheduler) = scheduler(16);
        for record in ["700 1000 50", "12 abc", "705 1050 30"] {
            tx.send(record.to_string()).await.unwrap();
        }

        let report = scheduler.tick().unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.decoded, 2);
        assert_eq!(scheduler.store().len(), 2);
        assert_eq!(scheduler.writer().appended(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_record_is_logged_with_its_content() {
        let (tx, mut scheduler) = scheduler(16);
        tx.send("12 abc".to_string()).await.unwrap();
        tx.send("700 1000 50".to_string()).await.unwrap();

        scheduler.tick().unwrap();
        assert!(logs_contain("Skipping malformed record"));
        assert!(logs_contain("12 abc"));
        assert_eq!(scheduler.subscribe().borrow().malformed_total, 1);
    }

    #[test]
    fn source_error_ends_tick_and_is_retried_next_tick() {
        let mut scheduler = scripted(vec![
            record("700 1000 50"),
            Err(DaqError::SourceUnavailable("scripted: framing error".into())),
            record("710 1020 20"),
            record("705 1050 30"),
        ]);

        let first = scheduler.tick().unwrap();
        assert_eq!(first.source_errors, 1);
        assert_eq!(first.decoded, 1);
        assert!(!first.source_closed);

        let second = scheduler.tick().unwrap();
        assert_eq!(second.source_errors, 0);
        assert_eq!(second.decoded, 2);
        assert_eq!(scheduler.store().len(), 3);
        assert_eq!(scheduler.writer().appended(), 3);
        assert_eq!(scheduler.subscribe().borrow().tick, 2);
    }

    #[test]
    fn unframed_record_is_counted_malformed_and_drain_continues() {
        let mut scheduler = scripted(vec![
            Err(DaqError::malformed("7777", "record of 12288 bytes exceeds 4096 bytes")),
            record("705 1050 30"),
        ]);

        let report = scheduler.tick().unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.decoded, 1);
        assert_eq!(report.source_errors, 0);
    }

    #[test]
    fn refused_log_append_leaves_store_untouched() {
        let mut scheduler = IngestionScheduler::new(
            Box::new(ScriptedSource::new(vec![record("700 1000 50")])),
            EventLogWriter::with_sink("mem", FailingSink),
            BoundedEventStore::new(16).unwrap(),
            AggregationConfig::default(),
        )
        .unwrap();

        let err = scheduler.tick().unwrap_err();
        assert!(err.is_fatal());
        assert!(scheduler.store().is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.subscribe().borrow().events_total, 0);
    }

    #[tokio::test]
    async fn drain_is_bounded_per_tick() {
        let (tx, scheduler) = scheduler(16);
        let mut scheduler = scheduler.with_max_records_per_tick(2);
        for i in 0..5 {
            tx.send(format!("700 {} 10", 1000 + i * 10)).await.unwrap();
        }

        assert_eq!(scheduler.tick().unwrap().records, 2);
        assert_eq!(scheduler.tick().unwrap().records, 2);
        assert_eq!(scheduler.tick().unwrap().records, 1);
        assert_eq!(scheduler.tick().unwrap().records, 0);
    }

    #[tokio::test]
    async fn config_update_is_applied_at_next_tick() {
        let (_tx, mut scheduler) = scheduler(16);
        let sender = scheduler.config_sender();
        sender.submit(ConfigUpdate::WindowWidth(50)).unwrap();
        assert_eq!(scheduler.config().window_width, 1000);

        let report = scheduler.tick().unwrap();
        assert_eq!(report.config_updates, 1);
        assert_eq!(scheduler.config().window_width, 50);
        assert_eq!(scheduler.subscribe().borrow().config.window_width, 50);
    }

    #[tokio::test]
    async fn rejected_update_keeps_previous_value() {
        let (_tx, mut scheduler) = scheduler(16);
        let sender = scheduler.config_sender();

        let pending = tokio::spawn(async move { sender.update(ConfigUpdate::GapBinCount(0)).await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        scheduler.tick().unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(DaqError::InvalidConfiguration(_))));
        assert_eq!(scheduler.config().gap_bins, AggregationConfig::default().gap_bins);
    }

    #[tokio::test]
    async fn fit_window_width_uses_current_snapshot() {
        let (tx, mut scheduler) = scheduler(64);
        for i in 0..=10u64 {
            tx.send(format!("700 {} 10", i * 10)).await.unwrap();
        }
        scheduler.tick().unwrap();

        let sender = scheduler.config_sender();
        sender
            .submit(ConfigUpdate::FitWindowWidth { mean_count: 1.5 })
            .unwrap();
        scheduler.tick().unwrap();
        assert_eq!(scheduler.config().window_width, 14);
    }

    #[tokio::test]
    async fn fit_window_width_without_data_is_rejected() {
        let (_tx, mut scheduler) = scheduler(8);
        scheduler
            .config_sender()
            .submit(ConfigUpdate::FitWindowWidth { mean_count: 2.0 })
            .unwrap();
        assert_eq!(scheduler.tick().unwrap().config_updates, 0);
        assert_eq!(scheduler.config().window_width, 1000);
    }

    #[tokio::test]
    async fn source_close_is_reported() {
        let (tx, mut scheduler) = scheduler(8);
        tx.send("700 1000 50".to_string()).await.unwrap();
        drop(tx);

        let report = scheduler.tick().unwrap();
        assert_eq!(report.decoded, 1);
        assert!(report.source_closed);
    }

    #[tokio::test]
    async fn snapshot_reflects_eviction() {
        let (tx, mut scheduler) = scheduler(3);
        for i in 0..5u64 {
            tx.send(format!("700 {} 10", 1000 + i * 10)).await.unwrap();
        }
        scheduler.tick().unwrap();

        let snapshot = scheduler.subscribe().borrow().clone();
        assert_eq!(snapshot.store_len, 3);
        assert_eq!(snapshot.events_total, 5);
        assert_eq!(snapshot.evicted_total, 2);
        // Logged events are never evicted.
        assert_eq!(scheduler.writer().appended(), 5);
    }
}
