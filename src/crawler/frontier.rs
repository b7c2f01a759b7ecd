//! Shared task frontier
//!
//! The frontier is a many-producer many-consumer FIFO of [`Task`]s with a
//! count of outstanding work. A task is outstanding from the moment it is
//! pushed until a worker calls [`Frontier::complete`] for it, so the count
//! covers both queued and in-flight tasks. Requeued tasks reuse the slot of
//! the task they replace.

use crate::model::Task;
use async_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of a bounded wait on the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popped {
    Task(Task),
    /// Nothing arrived within the timeout
    Idle,
    /// The frontier was closed and fully drained
    Closed,
}

#[derive(Clone)]
pub struct Frontier {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    pending: Arc<AtomicUsize>,
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontier {
    pub fn new() -> Self {
        let (sender, receiver) = async_channel::unbounded();
        Self {
            sender,
            receiver,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Adds a new task
    ///
    /// # Returns
    ///
    /// * `true` - Task queued
    /// * `false` - The frontier is closed (pipeline draining)
    pub fn push(&self, task: Task) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Frontier closed, dropping {}", e.into_inner());
                self.pending.fetch_sub(1, Ordering::SeqCst);
                false
            }
        }
    }

    /// Hands a failed task back without counting it as new work
    pub fn requeue(&self, task: Task) -> bool {
        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Frontier closed, not requeueing {}", e.into_inner());
                self.complete();
                false
            }
        }
    }

    /// Waits up to `timeout` for the next task
    pub async fn pop(&self, timeout: Duration) -> Popped {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Ok(task)) => Popped::Task(task),
            Ok(Err(_)) => Popped::Closed,
            Err(_) => Popped::Idle,
        }
    }

    /// Takes the next task if one is queued
    pub fn try_pop(&self) -> Option<Task> {
        match self.receiver.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Marks one outstanding task as finished
    pub fn complete(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Tasks queued and not yet popped
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Tasks queued or in flight
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Rejects further pushes; queued tasks can still be popped
    pub fn close(&self) {
        self.sender.close();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
