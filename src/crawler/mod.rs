//! Crawler module: the supervised crawl-extract-persist pipeline
//!
//! This module contains the pipeline units and their capabilities:
//! - HTTP fetching with retry logic
//! - HTML extraction of categories, listings and items
//! - Per-unit sessions
//! - The shared frontier
//! - Discoverer, worker pool and record writer
//! - The supervisor that restarts units and detects quiescence

mod discoverer;
mod extractor;
mod fetcher;
mod frontier;
mod session;
mod supervisor;
mod worker;
mod writer;

#[cfg(test)]
mod testing;

pub use discoverer::{category_context, Discoverer, DiscoveryStats};
pub use extractor::{
    parse_number, CategoryPage, ListingPage, PageExtractor, Pagination, SelectorExtractor,
};
pub use fetcher::{Fetcher, HttpFetcher};
pub use frontier::{Frontier, Popped};
pub use session::{HttpSessionFactory, Session, SessionFactory};
pub use supervisor::{PipelineState, RunSummary, Supervisor};
pub use worker::{process_task, TaskOutput, Worker, WorkerExit};
pub use writer::{dedupe_last_wins, RecordWriter, WriterStats};

use crate::config::Config;
use crate::storage::open_sink;
use crate::HarvestError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs a complete pipeline over the configured seeds
///
/// This is the main entry point for a harvest. It will:
/// 1. Open the configured storage sink
/// 2. Build an HTTP session factory
/// 3. Supervise discovery, workers and the writer until quiescence
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `interrupt` - Cancelled to drain early (e.g. on Ctrl-C)
///
/// # Returns
///
/// * `Ok(RunSummary)` - Harvest completed
/// * `Err(HarvestError)` - Startup failed or storage faulted
pub async fn harvest(
    config: Config,
    interrupt: CancellationToken,
) -> Result<RunSummary, HarvestError> {
    let sink = open_sink(&config.storage).await?;
    let factory = Arc::new(HttpSessionFactory::new(config.clone()));
    let seeds = config.crawl.seeds.clone();

    let mut supervisor = Supervisor::new(config, factory, sink).with_interrupt(interrupt);
    supervisor.run(seeds).await
}
