use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::BookmarkId;

/// Work run for each queued bookmark id.
pub type TaskHandler = Arc<dyn Fn(BookmarkId) -> Result<()> + Send + Sync>;

/// Lifecycle of a [`WorkerPool`]. A stopped pool cannot be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    NotStarted,
    Running,
    Stopped,
}

/// Counters since the pool was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub accepted: u64,
    /// Submissions refused because the pool was not running or the queue was full.
    pub dropped: u64,
    pub completed: u64,
    /// Tasks that returned an error or panicked.
    pub failed: u64,
    /// Queued tasks thrown away by `stop`.
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

/// State shared with worker threads.
struct Shared {
    stopping: AtomicBool,
    counters: Counters,
    /// Accepted tasks not yet finished or discarded.
    pending: Mutex<usize>,
    idle: Condvar,
}

impl Shared {
    fn begin(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finish(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

enum Lifecycle {
    NotStarted,
    Running {
        sender: SyncSender<BookmarkId>,
        workers: Vec<JoinHandle<()>>,
    },
    Stopped,
}

/// Fixed-size thread pool fed by a bounded queue of bookmark ids.
///
/// `submit` never blocks: when the queue is full the id is dropped and logged.
/// Each task runs under `catch_unwind`, so a panicking task is counted as a
/// failure and its worker keeps going.
pub struct WorkerPool {
    worker_count: usize,
    capacity: usize,
    handler: TaskHandler,
    lifecycle: Mutex<Lifecycle>,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Creates an unstarted pool. Zero workers or capacity are raised to one.
    pub fn new(worker_count: usize, capacity: usize, handler: TaskHandler) -> Self {
        Self {
            worker_count: worker_count.max(1),
            capacity: capacity.max(1),
            handler,
            lifecycle: Mutex::new(Lifecycle::NotStarted),
            shared: Arc::new(Shared {
                stopping: AtomicBool::new(false),
                counters: Counters::default(),
                pending: Mutex::new(0),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Spawns the workers. Returns false if the pool was already started or stopped.
    pub fn start(&self) -> bool {
        let mut lifecycle = self.lock_lifecycle();
        if !matches!(*lifecycle, Lifecycle::NotStarted) {
            return false;
        }

        let (sender, receiver) = mpsc::sync_channel(self.capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let receiver = Arc::clone(&receiver);
            let shared = Arc::clone(&self.shared);
            let handler = Arc::clone(&self.handler);
            let spawned = thread::Builder::new()
                .name(format!("enrichment-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &receiver, &shared, &handler));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => error!(worker_id, error = %e, "Failed to spawn enrichment worker"),
            }
        }

        info!(
            workers = workers.len(),
            capacity = self.capacity,
            "Enrichment pool started"
        );
        *lifecycle = Lifecycle::Running { sender, workers };
        true
    }

    /// Queues a bookmark for enrichment.
    ///
    /// Returns false, after logging, when the pool is not running or the
    /// queue is full.
    pub fn submit(&self, id: BookmarkId) -> bool {
        let lifecycle = self.lock_lifecycle();
        let Lifecycle::Running { sender, .. } = &*lifecycle else {
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            info!(bookmark_id = %id, "Enrichment pool not running, task skipped");
            return false;
        };

        self.shared.begin();
        match sender.try_send(id) {
            Ok(()) => {
                self.shared.counters.accepted.fetch_add(1, Ordering::Relaxed);
                debug!(bookmark_id = %id, "Enrichment task queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                self.shared.finish();
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(bookmark_id = %id, capacity = self.capacity, "Enrichment queue full, task dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.shared.finish();
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(bookmark_id = %id, "Enrichment workers gone, task dropped");
                false
            }
        }
    }

    /// Stops the pool.
    ///
    /// Closes the queue, lets in-flight tasks finish, discards queued ones and
    /// joins every worker. Calling it again is a no-op.
    pub fn stop(&self) {
        let previous = {
            let mut lifecycle = self.lock_lifecycle();
            if matches!(*lifecycle, Lifecycle::Running { .. }) {
                self.shared.stopping.store(true, Ordering::Release);
            }
            mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };
        let Lifecycle::Running { sender, workers } = previous else {
            return;
        };
        drop(sender);

        for (worker_id, handle) in workers.into_iter().enumerate() {
            if handle.join().is_err() {
                error!(worker_id, "Enrichment worker panicked outside a task");
            }
        }

        let stats = self.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            discarded = stats.discarded,
            "Enrichment pool stopped"
        );
    }

    pub fn state(&self) -> PoolState {
        match *self.lock_lifecycle() {
            Lifecycle::NotStarted => PoolState::NotStarted,
            Lifecycle::Running { .. } => PoolState::Running,
            Lifecycle::Stopped => PoolState::Stopped,
        }
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.shared.counters;
        PoolStats {
            accepted: c.accepted.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }

    /// Blocks until every accepted task has finished, or `timeout` elapses.
    ///
    /// Returns true when the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (pending, _) = self
            .shared
            .idle
            .wait_timeout_while(pending, timeout, |pending| *pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *pending == 0
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    worker_id: usize,
    receiver: &Mutex<Receiver<BookmarkId>>,
    shared: &Shared,
    handler: &TaskHandler,
) {
    debug!(worker_id, "Enrichment worker ready");
    loop {
        let next = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(id) = next else {
            break;
        };

        if shared.stopping.load(Ordering::Acquire) {
            shared.counters.discarded.fetch_add(1, Ordering::Relaxed);
            shared.finish();
            continue;
        }

        match catch_unwind(AssertUnwindSafe(|| handler(id))) {
            Ok(Ok(())) => {
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker_id, bookmark_id = %id, error = %e, "Enrichment task failed");
            }
            Err(_) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(worker_id, bookmark_id = %id, "Enrichment task panicked");
            }
        }
        shared.finish();
    }
    debug!(worker_id, "Enrichment worker exiting");
}
