//! # Bulk Dispatch
//!
//! Purpose: Push or pop large record sets through several pooled connections
//! at once while isolating failures per record.
//!
//! ## Design Principles
//! 1. **Contiguous Partitioning**: Records are split into at most
//!    `parallelism` contiguous, non-empty chunks of `ceil(n / parallelism)`.
//! 2. **One Driver per Worker**: Each scoped worker thread checks out its own
//!    driver, so connections are never shared.
//! 3. **Error Isolation**: A failed record is collected and the worker moves
//!    on; workers never observe each other's failures.
//! 4. **Fan-In by Completion**: Per-worker error lists are concatenated in the
//!    order the workers finish.

use std::thread;

use crossbeam_channel::unbounded;
use sonic_common::{IngestBulkError, IngestBulkRecord, SonicResult};
use tracing::{debug, warn};

use crate::driver::Driver;
use crate::pool::Pool;

/// Splits `records` into at most `parallelism` contiguous non-empty chunks.
///
/// A parallelism of zero is treated as one.
pub fn partition<T>(records: &[T], parallelism: usize) -> Vec<&[T]> {
    if records.is_empty() {
        return Vec::new();
    }
    let parallelism = parallelism.max(1);
    let chunk_size = records.len().div_ceil(parallelism);
    records.chunks(chunk_size).collect()
}

/// Runs `op` for every record across parallel workers and returns the failures.
///
/// Returns once every worker has finished. Order is preserved within a worker
/// only.
pub fn dispatch<F>(
    pool: &Pool,
    records: &[IngestBulkRecord],
    parallelism: usize,
    op: F,
) -> Vec<IngestBulkError>
where
    F: Fn(&mut Driver, &IngestBulkRecord) -> SonicResult<()> + Sync,
{
    let chunks = partition(records, parallelism);
    debug!(records = records.len(), workers = chunks.len(), "sonic bulk dispatch");

    let (tx, rx) = unbounded();
    thread::scope(|scope| {
        for chunk in chunks {
            let tx = tx.clone();
            let op = &op;
            scope.spawn(move || {
                let errors = run_worker(pool, chunk, op);
                let _ = tx.send(errors);
            });
        }
    });
    drop(tx);

    rx.try_iter().flatten().collect()
}

fn run_worker<F>(pool: &Pool, chunk: &[IngestBulkRecord], op: &F) -> Vec<IngestBulkError>
where
    F: Fn(&mut Driver, &IngestBulkRecord) -> SonicResult<()>,
{
    let mut driver = match pool.get() {
        Ok(driver) => driver,
        Err(err) => {
            warn!(records = chunk.len(), error = %err, "sonic bulk worker could not acquire a driver");
            return chunk
                .iter()
                .map(|record| IngestBulkError {
                    object: record.object.clone(),
                    error: err.clone(),
                })
                .collect();
        }
    };

    let mut errors = Vec::new();
    for record in chunk {
        if let Err(error) = op(&mut *driver, record) {
            errors.push(IngestBulkError {
                object: record.object.clone(),
                error,
            });
        }
    }
    errors
}
