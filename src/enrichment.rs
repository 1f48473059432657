//! Asynchronous bookmark enrichment.
//!
//! [`Enricher`] runs one task end to end; [`WorkerPool`] feeds it bookmark
//! ids from a bounded queue on a fixed set of threads.

mod pipeline;
mod pool;

use std::sync::Arc;

pub use pipeline::{EnrichmentOutcome, Enricher, build_prompt, merge_suggestion};
pub use pool::{PoolState, PoolStats, TaskHandler, WorkerPool};

use crate::config::Config;
use crate::models::BookmarkId;

/// Builds a pool sized from `config` whose tasks run `enricher`.
///
/// The pool is returned unstarted.
pub fn enrichment_pool(config: &Config, enricher: Enricher) -> WorkerPool {
    let enricher = Arc::new(enricher);
    let handler: TaskHandler = Arc::new(move |id: BookmarkId| enricher.enrich(id).map(|_| ()));
    WorkerPool::new(config.worker_count, config.queue_capacity, handler)
}
