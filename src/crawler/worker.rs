//! Worker units
//!
//! A worker repeatedly pops a task from the frontier, fetches its page and
//! dispatches on the task kind:
//! - Category pages push one listing task per subcategory
//! - Listing pages push one item task per item link, plus the next page
//! - Item pages push at most one record to the output channel
//!
//! Any error while processing a task ends the worker. The task goes back to
//! the supervisor in a [`FailureReport`] and the supervisor starts a
//! replacement unit. A worker never restarts itself.

use crate::crawler::discoverer::category_context;
use crate::crawler::frontier::{Frontier, Popped};
use crate::crawler::session::{Session, SessionFactory};
use crate::model::{FailureReport, Record, Task, TaskKind};
use crate::url::{label_from_url, next_page_url};
use crate::HarvestError;
use async_channel::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The task a worker is processing, shared with its supervisor handle
pub type TaskSlot = Arc<Mutex<Option<Task>>>;

pub fn new_task_slot() -> TaskSlot {
    Arc::new(Mutex::new(None))
}

/// Replaces the slot contents, recovering from a poisoned lock
pub fn set_slot(slot: &TaskSlot, task: Option<Task>) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = task;
}

/// Empties the slot and returns what it held
pub fn take_slot(slot: &TaskSlot) -> Option<Task> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// What a successfully processed task produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutput {
    /// New tasks pushed to the frontier
    Discovered { tasks: usize },
    /// One record pushed to the output channel
    Record,
    /// Nothing to do; an item page without a record or an empty listing
    Empty,
}

/// Why a worker unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Stop signal received or the frontier closed
    Stopped,
    /// A task failed and was reported
    Failed,
    /// The session could not be opened
    SessionFailed(String),
}

/// Everything a worker unit needs to run one generation
pub struct Worker {
    pub id: usize,
    pub generation: u64,
    pub frontier: Frontier,
    pub output: Sender<Record>,
    pub reports: Sender<FailureReport>,
    pub slot: TaskSlot,
    pub factory: Arc<dyn SessionFactory>,
    pub pop_timeout: Duration,
    pub stop: CancellationToken,
}

impl Worker {
    pub fn spawn(self) -> JoinHandle<WorkerExit> {
        tokio::spawn(self.run())
    }

    /// Runs until stopped or until a task fails
    pub async fn run(self) -> WorkerExit {
        let session = match self.factory.open_session(self.id) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Worker {} could not open a session: {}", self.id, e);
                return WorkerExit::SessionFailed(e.to_string());
            }
        };

        tracing::debug!("Worker {} (generation {}) started", self.id, self.generation);

        loop {
            let popped = tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    tracing::debug!("Worker {} stopping", self.id);
                    return WorkerExit::Stopped;
                }
                popped = self.frontier.pop(self.pop_timeout) => popped,
            };

            let task = match popped {
                Popped::Task(task) => task,
                Popped::Idle => continue,
                Popped::Closed => return WorkerExit::Stopped,
            };

            set_slot(&self.slot, Some(task.clone()));

            match process_task(&session, &task, &self.frontier, &self.output).await {
                Ok(outcome) => {
                    tracing::debug!("Worker {} finished {}: {:?}", self.id, task, outcome);
                    set_slot(&self.slot, None);
                    self.frontier.complete();
                }
                Err(e) => {
                    let task = take_slot(&self.slot).unwrap_or(task);
                    tracing::warn!("Worker {} failed {}: {}", self.id, task, e);

                    drop(session);

                    let report = FailureReport {
                        task,
                        reason: e.to_string(),
                        worker_id: self.id,
                        generation: self.generation,
                    };
                    if let Err(e) = self.reports.try_send(report) {
                        // Nobody left to requeue it
                        tracing::error!("Dropping failure report: {}", e.into_inner().task);
                        self.frontier.complete();
                    }
                    return WorkerExit::Failed;
                }
            }
        }
    }
}

/// Fetches and handles one task
///
/// Downstream tasks are pushed to `frontier` and records to `output` before
/// this returns, so the caller may mark the task complete on `Ok`.
///
/// # Returns
///
/// * `Ok(TaskOutput)` - The task is done, possibly with nothing produced
/// * `Err(HarvestError)` - Fetching failed or a downstream channel is gone
pub async fn process_task(
    session: &Session,
    task: &Task,
    frontier: &Frontier,
    output: &Sender<Record>,
) -> Result<TaskOutput, HarvestError> {
    let content = session.fetcher.fetch(&task.url, task.referer()).await?;

    match task.kind {
        TaskKind::DiscoverSubcategories => {
            let page = session.extractor.extract_category(&content, &task.url);
            let label = page
                .label
                .or_else(|| label_from_url(&task.url))
                .unwrap_or_default();

            let mut pushed = 0;
            for link in page.subcategory_links {
                if frontier.push(Task::discover_listings(link, label.clone())) {
                    pushed += 1;
                }
            }

            tracing::info!("Category '{}' has {} subcategories", label, pushed);
            Ok(discovered(pushed))
        }

        TaskKind::DiscoverListings => {
            let page = session.extractor.extract_listing(&content, &task.url);
            let context = category_context(&task.context, page.label.as_deref());

            let mut pushed = 0;
            for link in page.item_links {
                if frontier.push(Task::extract_item(link, context.clone())) {
                    pushed += 1;
                }
            }

            if let Some(pagination) = page.pagination {
                if !pagination.is_last() {
                    match next_page_url(&task.url)? {
                        Some(next) => {
                            if frontier.push(Task::discover_listings(next, task.context.clone())) {
                                pushed += 1;
                            }
                        }
                        None => tracing::warn!("No page after {}, stopping listing", task.url),
                    }
                }
            }

            Ok(discovered(pushed))
        }

        TaskKind::ExtractItem => {
            match session
                .extractor
                .extract_item(&content, &task.url, &task.context)
            {
                Some(record) => {
                    output.send(record).await.map_err(|_| {
                        HarvestError::Pipeline("output channel closed".to_string())
                    })?;
                    Ok(TaskOutput::Record)
                }
                None => Ok(TaskOutput::Empty),
            }
        }
    }
}

fn discovered(tasks: usize) -> TaskOutput {
    if tasks == 0 {
        TaskOutput::Empty
    } else {
        TaskOutput::Discovered { tasks }
    }
}
