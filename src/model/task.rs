//! Task and failure report definitions for the crawl frontier

use std::fmt;

/// The kind of work a task represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Category page: yields one listing task per subcategory
    DiscoverSubcategories,

    /// Paginated listing page: yields item tasks and the next listing page
    DiscoverListings,

    /// Item page: yields at most one record
    ExtractItem,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscoverSubcategories => "discover_subcategories",
            Self::DiscoverListings => "discover_listings",
            Self::ExtractItem => "extract_item",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of crawl work
///
/// `context` is the referrer for category tasks and the category label for
/// listing and item tasks. Tasks are never mutated; a retry is a new task
/// built by [`Task::retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub url: String,
    pub kind: TaskKind,
    pub context: String,

    /// How many times this task has already been handed back to the frontier
    pub attempts: u32,
}

impl Task {
    pub fn new(kind: TaskKind, url: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            context: context.into(),
            attempts: 0,
        }
    }

    pub fn discover_subcategories(url: impl Into<String>, referer: impl Into<String>) -> Self {
        Self::new(TaskKind::DiscoverSubcategories, url, referer)
    }

    pub fn discover_listings(url: impl Into<String>, category: impl Into<String>) -> Self {
        Self::new(TaskKind::DiscoverListings, url, category)
    }

    pub fn extract_item(url: impl Into<String>, category: impl Into<String>) -> Self {
        Self::new(TaskKind::ExtractItem, url, category)
    }

    /// A fresh copy of this task for requeueing after a failure
    pub fn retry(&self) -> Self {
        Self {
            attempts: self.attempts + 1,
            ..self.clone()
        }
    }

    /// Referer to send when fetching this task's page
    pub fn referer(&self) -> Option<&str> {
        match self.kind {
            TaskKind::DiscoverSubcategories if !self.context.is_empty() => {
                Some(self.context.as_str())
            }
            _ => None,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.url)
    }
}

/// A task a worker could not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub task: Task,
    pub reason: String,
    pub worker_id: usize,

    /// Generation of the worker unit that sent the report
    pub generation: u64,
}
