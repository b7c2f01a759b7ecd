//! Pipeline supervisor
//!
//! The supervisor owns every unit of a run and drives the pipeline through
//! `Starting -> Running -> Draining -> Stopped`. While running, each poll:
//! 1. Restarts worker units that have died, requeueing the task a dead unit held
//! 2. Drains failure reports, restarting the reporting unit and requeueing its task
//! 3. Checks the writer and discoverer for early exits
//! 4. Counts consecutive idle polls and starts draining after `quiescence-polls`
//!
//! Draining closes the frontier, stops the workers and the discoverer, then
//! stops the writer so it can make its final flush.

use crate::config::{Config, DiscoveryMode};
use crate::crawler::discoverer::{Discoverer, DiscoveryStats};
use crate::crawler::frontier::Frontier;
use crate::crawler::session::SessionFactory;
use crate::crawler::worker::{new_task_slot, take_slot, TaskSlot, Worker, WorkerExit};
use crate::crawler::writer::{RecordWriter, WriterStats};
use crate::model::{FailureReport, Record, Task};
use crate::storage::{StorageError, StorageSink};
use crate::HarvestError;
use async_channel::{Receiver, Sender};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// What a finished run did
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    pub records_received: usize,
    pub records_written: usize,
    pub records_superseded: usize,
    pub flushes: usize,
    pub restarts: usize,
    pub requeues: usize,
    pub abandoned_tasks: usize,
    pub discovery: Option<DiscoveryStats>,
}

/// Supervisor-side view of one worker unit
struct WorkerHandle {
    id: usize,
    generation: u64,
    slot: TaskSlot,
    join: JoinHandle<WorkerExit>,
}

pub struct Supervisor {
    config: Config,
    factory: Arc<dyn SessionFactory>,
    sink: Option<Box<dyn StorageSink>>,
    frontier: Frontier,
    output_tx: Sender<Record>,
    output_rx: Receiver<Record>,
    reports_tx: Sender<FailureReport>,
    reports_rx: Receiver<FailureReport>,
    workers: Vec<WorkerHandle>,
    writer: Option<JoinHandle<Result<WriterStats, StorageError>>>,
    discoverer: Option<JoinHandle<Result<DiscoveryStats, HarvestError>>>,
    stop: CancellationToken,
    writer_stop: CancellationToken,
    interrupt: CancellationToken,
    state: PipelineState,
    quiet_polls: u32,
    next_generation: u64,
    fault: Option<HarvestError>,
    started: Option<Instant>,
    summary: RunSummary,
}

impl Supervisor {
    /// Creates a supervisor in the `Starting` state
    ///
    /// # Arguments
    ///
    /// * `config` - The pipeline configuration
    /// * `factory` - Opens a session for each worker and the discoverer
    /// * `sink` - Storage backend handed to the writer unit
    pub fn new(config: Config, factory: Arc<dyn SessionFactory>, sink: Box<dyn StorageSink>) -> Self {
        let (output_tx, output_rx) = async_channel::unbounded();
        let (reports_tx, reports_rx) = async_channel::unbounded();

        Self {
            config,
            factory,
            sink: Some(sink),
            frontier: Frontier::new(),
            output_tx,
            output_rx,
            reports_tx,
            reports_rx,
            workers: Vec::new(),
            writer: None,
            discoverer: None,
            stop: CancellationToken::new(),
            writer_stop: CancellationToken::new(),
            interrupt: CancellationToken::new(),
            state: PipelineState::Starting,
            quiet_polls: 0,
            next_generation: 0,
            fault: None,
            started: None,
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Cancel this token to make [`Supervisor::run`] drain early
    pub fn interrupt_handle(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    /// Uses an externally owned token as the interrupt signal
    pub fn with_interrupt(mut self, interrupt: CancellationToken) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Launches the writer, the worker pool and discovery
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, seeds: Vec<String>) -> Result<(), HarvestError> {
        if self.state != PipelineState::Starting {
            return Err(HarvestError::Pipeline(format!(
                "cannot start a pipeline that is {}",
                self.state
            )));
        }
        let sink = self
            .sink
            .take()
            .ok_or_else(|| HarvestError::Pipeline("storage sink already taken".to_string()))?;

        self.started = Some(Instant::now());
        self.summary.started_at = Some(Utc::now());

        self.writer = Some(
            RecordWriter::new(
                &self.config.writer,
                sink,
                self.output_rx.clone(),
                self.writer_stop.clone(),
            )
            .spawn(),
        );

        for id in 0..self.config.pipeline.workers {
            let handle = self.spawn_worker(id);
            self.workers.push(handle);
        }

        match self.config.crawl.discovery {
            DiscoveryMode::Dedicated => {
                let discoverer = Discoverer {
                    seeds,
                    frontier: self.frontier.clone(),
                    factory: self.factory.clone(),
                    slot: self.config.pipeline.workers,
                    stop: self.stop.clone(),
                };
                self.discoverer = Some(tokio::spawn(discoverer.run()));
            }
            DiscoveryMode::Workers => {
                let referer = self.config.fetcher.referer.clone().unwrap_or_default();
                for seed in seeds {
                    self.frontier
                        .push(Task::discover_subcategories(seed, referer.clone()));
                }
            }
        }

        self.set_state(PipelineState::Running);
        tracing::info!(
            "Started {} workers ({:?} discovery)",
            self.workers.len(),
            self.config.crawl.discovery
        );
        Ok(())
    }

    /// Runs one supervision step
    ///
    /// # Returns
    ///
    /// * `Ok(PipelineState)` - State after this step
    /// * `Err(HarvestError)` - A pipeline fault; the pipeline has been drained
    pub async fn poll(&mut self) -> Result<PipelineState, HarvestError> {
        if self.state != PipelineState::Running {
            return Ok(self.state);
        }

        self.restart_dead_workers().await;
        self.handle_reports();
        self.check_discoverer().await;
        self.check_writer().await;

        if self.fault.is_some() {
            self.drain().await?;
            return Ok(self.state);
        }

        let idle = self.discoverer.is_none()
            && self.frontier.pending() == 0
            && self.frontier.is_empty()
            && self.output_rx.is_empty();

        if idle {
            self.quiet_polls += 1;
        } else {
            self.quiet_polls = 0;
        }

        if self.quiet_polls >= self.config.pipeline.quiescence_polls {
            tracing::info!("Pipeline quiescent for {} polls", self.quiet_polls);
            self.begin_draining();
        }

        Ok(self.state)
    }

    /// Stops every unit and waits (bounded) for the final flush
    pub async fn drain(&mut self) -> Result<RunSummary, HarvestError> {
        if self.state == PipelineState::Stopped {
            return Ok(self.summary.clone());
        }

        self.begin_draining();
        self.stop.cancel();

        let timeout = self.config.pipeline.shutdown_timeout();
        let deadline = tokio::time::Instant::now() + timeout;

        for mut handle in std::mem::take(&mut self.workers) {
            if tokio::time::timeout_at(deadline, &mut handle.join).await.is_err() {
                tracing::warn!("Worker {} did not stop in time, aborting", handle.id);
                handle.join.abort();
            }
            if let Some(task) = take_slot(&handle.slot) {
                tracing::warn!("Worker {} left {} unfinished", handle.id, task);
            }
        }

        if let Some(mut discoverer) = self.discoverer.take() {
            match tokio::time::timeout_at(deadline, &mut discoverer).await {
                Ok(result) => self.record_discovery(result),
                Err(_) => {
                    tracing::warn!("Discoverer did not stop in time, aborting");
                    discoverer.abort();
                }
            }
        }

        let unreported = self.reports_rx.len();
        if unreported > 0 {
            tracing::warn!("{} failure reports not handled before shutdown", unreported);
        }
        let unfinished = self.frontier.len();
        if unfinished > 0 {
            tracing::warn!("{} tasks left in the frontier", unfinished);
        }

        self.writer_stop.cancel();
        if let Some(mut writer) = self.writer.take() {
            match tokio::time::timeout(timeout, &mut writer).await {
                Ok(Ok(Ok(stats))) => self.record_writer(stats),
                Ok(Ok(Err(e))) => {
                    self.fault.get_or_insert(HarvestError::Storage(e));
                }
                Ok(Err(e)) => {
                    self.fault
                        .get_or_insert(HarvestError::Pipeline(format!("writer task failed: {}", e)));
                }
                Err(_) => {
                    writer.abort();
                    self.fault.get_or_insert(HarvestError::Pipeline(
                        "writer did not finish its final flush in time".to_string(),
                    ));
                }
            }
        }

        if let Some(started) = self.started {
            self.summary.elapsed = started.elapsed();
        }
        self.set_state(PipelineState::Stopped);

        match self.fault.take() {
            Some(fault) => {
                tracing::error!("Pipeline stopped on fault: {}", fault);
                Err(fault)
            }
            None => Ok(self.summary.clone()),
        }
    }

    /// Starts the pipeline and supervises it until it drains
    ///
    /// # Arguments
    ///
    /// * `seeds` - Category page URLs
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The pipeline reached quiescence (or was interrupted) and drained cleanly
    /// * `Err(HarvestError)` - Startup failed or a storage fault stopped the run
    pub async fn run(&mut self, seeds: Vec<String>) -> Result<RunSummary, HarvestError> {
        self.start(seeds)?;

        let mut ticker = tokio::time::interval(self.config.pipeline.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        let interrupt = self.interrupt.clone();
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = interrupt.cancelled() => {
                    tracing::info!("Interrupted, draining");
                    break;
                }
            }

            if self.poll().await? != PipelineState::Running {
                break;
            }
        }

        self.drain().await
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            tracing::info!("Pipeline {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn begin_draining(&mut self) {
        if self.state == PipelineState::Running || self.state == PipelineState::Starting {
            self.set_state(PipelineState::Draining);
        }
        self.frontier.close();
    }

    fn spawn_worker(&mut self, id: usize) -> WorkerHandle {
        let generation = self.next_generation;
        self.next_generation += 1;

        let slot = new_task_slot();
        let join = Worker {
            id,
            generation,
            frontier: self.frontier.clone(),
            output: self.output_tx.clone(),
            reports: self.reports_tx.clone(),
            slot: slot.clone(),
            factory: self.factory.clone(),
            pop_timeout: self.config.pipeline.pop_timeout(),
            stop: self.stop.clone(),
        }
        .spawn();

        WorkerHandle {
            id,
            generation,
            slot,
            join,
        }
    }

    fn restart(&mut self, index: usize) {
        let id = self.workers[index].id;
        let handle = self.spawn_worker(id);
        let generation = handle.generation;

        let old = std::mem::replace(&mut self.workers[index], handle);
        if !old.join.is_finished() {
            old.join.abort();
        }

        self.summary.restarts += 1;
        tracing::info!("Restarted worker {} (generation {})", id, generation);
    }

    async fn restart_dead_workers(&mut self) {
        for index in 0..self.workers.len() {
            if !self.workers[index].join.is_finished() {
                continue;
            }

            let id = self.workers[index].id;
            match (&mut self.workers[index].join).await {
                Ok(WorkerExit::Failed) => {
                    tracing::debug!("Worker {} exited after reporting a failure", id)
                }
                Ok(WorkerExit::SessionFailed(reason)) => {
                    tracing::warn!("Worker {} could not start: {}", id, reason)
                }
                Ok(WorkerExit::Stopped) => tracing::warn!("Worker {} stopped while running", id),
                Err(e) if e.is_panic() => tracing::error!("Worker {} panicked", id),
                Err(e) => tracing::error!("Worker {} died: {}", id, e),
            }

            if let Some(task) = take_slot(&self.workers[index].slot) {
                tracing::warn!("Worker {} died holding {}", id, task);
                self.requeue(task, "worker died");
            }
            self.restart(index);
        }
    }

    fn handle_reports(&mut self) {
        while let Ok(report) = self.reports_rx.try_recv() {
            tracing::warn!(
                "Worker {} reported failure on {}: {}",
                report.worker_id,
                report.task,
                report.reason
            );

            // A unit already replaced by the liveness check is not restarted again
            let current = self.workers.iter().position(|handle| {
                handle.id == report.worker_id && handle.generation == report.generation
            });
            if let Some(index) = current {
                self.restart(index);
            }

            self.requeue(report.task, &report.reason);
        }
    }

    fn requeue(&mut self, task: Task, reason: &str) {
        let retry = task.retry();
        let limit = self.config.pipeline.max_task_attempts;

        if limit > 0 && retry.attempts >= limit {
            tracing::error!(
                "Abandoning {} after {} attempts: {}",
                task,
                retry.attempts,
                reason
            );
            self.summary.abandoned_tasks += 1;
            self.frontier.complete();
            return;
        }

        let attempts = retry.attempts;
        if self.frontier.requeue(retry) {
            self.summary.requeues += 1;
            tracing::info!("Requeued {} (attempt {})", task, attempts + 1);
        }
    }

    async fn check_discoverer(&mut self) {
        let finished = self
            .discoverer
            .as_ref()
            .is_some_and(|handle| handle.is_finished());
        if !finished {
            return;
        }

        if let Some(handle) = self.discoverer.take() {
            let result = handle.await;
            self.record_discovery(result);
        }
    }

    fn record_discovery(
        &mut self,
        result: Result<Result<DiscoveryStats, HarvestError>, tokio::task::JoinError>,
    ) {
        match result {
            Ok(Ok(stats)) => self.summary.discovery = Some(stats),
            Ok(Err(e)) => {
                tracing::error!("Discovery could not run: {}", e);
                self.fault.get_or_insert(e);
            }
            Err(e) => {
                tracing::error!("Discoverer died: {}", e);
                self.fault
                    .get_or_insert(HarvestError::Pipeline(format!("discoverer failed: {}", e)));
            }
        }
    }

    async fn check_writer(&mut self) {
        let finished = self
            .writer
            .as_ref()
            .is_some_and(|handle| handle.is_finished());
        if !finished {
            return;
        }

        let Some(handle) = self.writer.take() else {
            return;
        };
        let fault = match handle.await {
            Ok(Ok(stats)) => {
                self.record_writer(stats);
                HarvestError::Pipeline("writer exited while the pipeline was running".to_string())
            }
            Ok(Err(e)) => HarvestError::Storage(e),
            Err(e) => HarvestError::Pipeline(format!("writer task failed: {}", e)),
        };
        tracing::error!("Writer stopped early: {}", fault);
        self.fault.get_or_insert(fault);
    }

    fn record_writer(&mut self, stats: WriterStats) {
        self.summary.records_received = stats.received;
        self.summary.records_written = stats.written;
        self.summary.records_superseded = stats.superseded;
        self.summary.flushes = stats.flushes;
    }
}
