//! Persistence sink unit
//!
//! The writer drains the output channel into a buffer and flushes it to a
//! [`StorageSink`] when:
//! - The buffer reaches the batch size
//! - No record arrived for the idle-flush interval and the buffer is not empty
//! - The stop signal is seen with an empty channel (final flush)
//!
//! Each flush deduplicates the buffer by unique key, keeping the last record
//! for a key, and writes it as one upsert.

use crate::config::WriterConfig;
use crate::model::{Record, RecordKey};
use crate::storage::{StorageError, StorageSink};
use async_channel::Receiver;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Base delay between upsert attempts, doubled each retry
const WRITE_BACKOFF: Duration = Duration::from_millis(200);

/// Counters for one writer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records taken off the output channel
    pub received: usize,
    /// Rows handed to the sink after deduplication
    pub written: usize,
    /// Records dropped because a later one had the same key
    pub superseded: usize,
    pub flushes: usize,
}

/// Deduplicates records by key, keeping the last occurrence
///
/// The surviving record for a key takes the position of that key's first
/// occurrence, so output order follows first arrival.
pub fn dedupe_last_wins<F>(records: Vec<Record>, key: F) -> Vec<Record>
where
    F: Fn(&Record) -> RecordKey,
{
    let mut positions: HashMap<RecordKey, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<Record> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&key(&record)) {
            Some(&index) => unique[index] = record,
            None => {
                positions.insert(key(&record), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}

pub struct RecordWriter {
    sink: Box<dyn StorageSink>,
    input: Receiver<Record>,
    batch_size: usize,
    idle_flush: Duration,
    write_retries: u32,
    stop: CancellationToken,
    buffer: Vec<Record>,
    stats: WriterStats,
}

impl RecordWriter {
    pub fn new(
        config: &WriterConfig,
        sink: Box<dyn StorageSink>,
        input: Receiver<Record>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            sink,
            input,
            batch_size: config.batch_size.max(1),
            idle_flush: config.idle_flush(),
            write_retries: config.write_retries,
            stop,
            buffer: Vec::with_capacity(config.batch_size.max(1)),
            stats: WriterStats::default(),
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<WriterStats, StorageError>> {
        tokio::spawn(self.run())
    }

    /// Runs until stopped with an empty channel, then flushes what is left
    ///
    /// # Returns
    ///
    /// * `Ok(WriterStats)` - Every received record was flushed
    /// * `Err(StorageError)` - Schema creation or a flush failed after retries
    pub async fn run(mut self) -> Result<WriterStats, StorageError> {
        self.sink.ensure_schema().await?;
        tracing::info!(
            "Writer started ({} backend, batch size {})",
            self.sink.backend(),
            self.batch_size
        );

        loop {
            if self.stop.is_cancelled() && self.input.is_empty() {
                break;
            }

            let next = tokio::select! {
                biased;
                next = tokio::time::timeout(self.idle_flush, self.input.recv()) => next,
                _ = self.stop.cancelled() => continue,
            };

            match next {
                Ok(Ok(record)) => {
                    self.stats.received += 1;
                    self.buffer.push(record);
                    if self.buffer.len() >= self.batch_size {
                        self.flush().await?;
                    }
                }
                Ok(Err(_)) => {
                    tracing::debug!("Output channel closed");
                    break;
                }
                Err(_) => {
                    if !self.buffer.is_empty() {
                        self.flush().await?;
                    }
                }
            }
        }

        self.flush().await?;
        tracing::info!(
            "Writer stopped: {} records received, {} rows written in {} flushes",
            self.stats.received,
            self.stats.written,
            self.stats.flushes
        );
        Ok(self.stats)
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.buffer);
        let received = pending.len();
        let batch = dedupe_last_wins(pending, |record| self.sink.unique_key(record));
        let superseded = received - batch.len();

        let mut attempt = 0;
        loop {
            match self.sink.upsert(&batch).await {
                Ok(written) => {
                    self.stats.written += written;
                    self.stats.superseded += superseded;
                    self.stats.flushes += 1;
                    tracing::info!(
                        "Flushed {} records ({} superseded in batch)",
                        written,
                        superseded
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.write_retries => {
                    let delay = WRITE_BACKOFF.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(
                        "Upsert of {} records failed (attempt {}/{}): {}, retrying in {:?}",
                        batch.len(),
                        attempt,
                        self.write_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!("Upsert of {} records failed: {}", batch.len(), e);
                    return Err(e);
                }
            }
        }
    }
}
