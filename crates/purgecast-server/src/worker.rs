//! Worker pool draining the shared job queue.
//!
//! A fixed set of tasks pulls [`Job`]s from one bounded queue. Per job the
//! worker attempts the round-trip up to `1 + retries` times; after a failed
//! attempt the cache's client is re-warmed so the retry never routes through
//! the broken connections. If re-warming itself fails, retrying is pointless
//! and the warm-up error is published instead.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use purgecast_common::{Cache, Result};

use crate::client::ClientTable;
use crate::wire::OutboundRequest;

/// Capacity of the shared job queue (2^13). Enqueueing blocks when full.
pub const JOB_QUEUE_CAPACITY: usize = 8192;

/// One outbound unit of work: a target cache, the shared request context and
/// a one-shot carrier the worker publishes the outcome on.
pub struct Job {
    pub cache: Cache,
    pub request: Arc<OutboundRequest>,
    pub result_tx: oneshot::Sender<Result<u16>>,
}

/// Fixed-size pool of worker tasks over one shared bounded queue.
pub struct WorkerPool {
    job_tx: mpsc::Sender<Job>,
    /// Kept so the workers are not detached invisibly; the tasks exit when
    /// every sender is dropped.
    _handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the worker tasks.
    ///
    /// # Arguments
    /// * `workers` - Number of worker tasks
    /// * `retries` - Per-job retry count (attempts = 1 + retries)
    /// * `clients` - Client table the workers execute and re-warm through
    ///
    /// # Returns
    /// A pool whose tasks run until every job sender is dropped
    pub fn spawn(workers: usize, retries: u32, clients: Arc<ClientTable>) -> Self {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let handles = (0..workers)
            .map(|_| {
                let job_rx = Arc::clone(&job_rx);
                let clients = Arc::clone(&clients);
                tokio::spawn(worker_loop(job_rx, clients, retries))
            })
            .collect();

        Self {
            job_tx,
            _handles: handles,
        }
    }

    /// Handle for enqueueing jobs.
    ///
    /// # Returns
    /// A clone of the bounded queue's sender; sending blocks when the queue
    /// is full
    pub fn sender(&self) -> mpsc::Sender<Job> {
        self.job_tx.clone()
    }
}

async fn worker_loop(
    job_rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    clients: Arc<ClientTable>,
    retries: u32,
) {
    loop {
        // The receiver lock is held only while waiting for a job, never
        // during the outbound request itself.
        let job = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };

        let outcome = run_job(&clients, retries, &job.cache, &job.request).await;
        // The dispatcher may have given up on a disconnected inbound client;
        // a dropped receiver just discards the result.
        let _ = job.result_tx.send(outcome);
    }
}

/// Executes one job with re-warm-and-retry semantics.
///
/// # Arguments
/// * `clients` - Client table to execute and re-warm through
/// * `retries` - Additional attempts after a failed first one
/// * `cache` - The target cache
/// * `request` - The request context shared by the dispatch
///
/// # Returns
/// The upstream status of the first successful attempt, or the last error
/// once retries are exhausted. A failed re-warm ends retrying early with the
/// warm-up error, since every further attempt would hit the same dead pool.
async fn run_job(
    clients: &ClientTable,
    retries: u32,
    cache: &Cache,
    request: &OutboundRequest,
) -> Result<u16> {
    let mut outcome = clients.execute(cache, request).await;

    for _ in 0..retries {
        let Err(err) = &outcome else {
            return outcome;
        };
        tracing::debug!(cache = %cache.name, error = %err, "outbound request failed, re-warming");

        if let Err(warm_err) = clients.warm_up(cache).await {
            tracing::warn!(cache = %cache.name, error = %warm_err, "re-warm failed");
            return Err(warm_err);
        }
        outcome = clients.execute(cache, request).await;
    }

    // The final failed attempt still repairs the pool for later jobs.
    if outcome.is_err() {
        if let Err(warm_err) = clients.warm_up(cache).await {
            tracing::warn!(cache = %cache.name, error = %warm_err, "re-warm failed");
        }
    }

    outcome
}
