//! Fan-out dispatch of one inbound request.
//!
//! The dispatcher resolves the addressed group, enqueues one job per cache on
//! the shared queue (blocking when the queue is full, never dropping) and then
//! collects the results in enqueue order. Status aggregation: without enforce
//! mode the response status is always 200; with it, the first non-200
//! per-cache status in enqueue order is adopted and never overwritten. A job
//! error counts as a 500, both in the map and for aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use purgecast_common::Cache;

use crate::registry::ALL_GROUP;
use crate::server::Server;
use crate::wire::OutboundRequest;
use crate::worker::Job;

/// Inbound header selecting the target group.
pub const GROUP_HEADER: &str = "x-group";

/// Outcome of one broadcast, rendered to HTTP by the surface layer.
#[derive(Debug, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// No `X-Group` header (or an empty one): 400.
    MissingGroup,
    /// The named group is not configured: 404.
    UnknownGroup,
    /// The resolved target list is empty: 204.
    Empty,
    /// The fan-out ran; per-cache statuses and the aggregate to respond with.
    Completed {
        status: u16,
        statuses: BTreeMap<String, u16>,
    },
}

impl Server {
    /// Broadcasts one inbound request to every cache of its group.
    ///
    /// # Arguments
    /// * `request` - Method, path and headers of the inbound request
    ///
    /// # Returns
    /// - [`BroadcastOutcome::MissingGroup`] - no (or an empty) `X-Group`
    ///   header
    /// - [`BroadcastOutcome::UnknownGroup`] - the named group is not
    ///   configured
    /// - [`BroadcastOutcome::Empty`] - the resolved target list is empty
    /// - [`BroadcastOutcome::Completed`] - the per-cache statuses plus the
    ///   aggregate status to respond with
    pub async fn broadcast(&self, request: OutboundRequest) -> BroadcastOutcome {
        let group_name = request
            .headers
            .get(GROUP_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if group_name.is_empty() {
            return BroadcastOutcome::MissingGroup;
        }

        // Resolve the target list under the read lock, then release it: the
        // fan-out below must not block a concurrent reload.
        let targets: Vec<Cache> = {
            let registry = self.registry.read().await;
            if group_name == ALL_GROUP {
                registry.all().to_vec()
            } else {
                match registry.lookup(&group_name) {
                    Some(group) => group.caches.clone(),
                    None => return BroadcastOutcome::UnknownGroup,
                }
            }
        };

        if targets.is_empty() {
            return BroadcastOutcome::Empty;
        }

        let request = Arc::new(request);
        let mut results = Vec::with_capacity(targets.len());
        for cache in &targets {
            let (result_tx, result_rx) = oneshot::channel();
            let job = Job {
                cache: cache.clone(),
                request: Arc::clone(&request),
                result_tx,
            };
            // Blocks when the queue is full; a send error means the worker
            // pool is gone and the job is recorded as a 500 below.
            match self.job_tx.send(job).await {
                Ok(()) => results.push(Some(result_rx)),
                Err(_) => results.push(None),
            }
        }

        let request_id = self
            .access_log
            .enabled()
            .then(|| request_id(&chrono::Utc::now().to_string()));

        let mut aggregate: u16 = 200;
        let mut statuses = BTreeMap::new();

        for (cache, result_rx) in targets.iter().zip(results) {
            let status = match result_rx {
                Some(rx) => match rx.await {
                    Ok(Ok(status)) => status,
                    Ok(Err(err)) => {
                        tracing::debug!(cache = %cache.name, error = %err, "job failed");
                        500
                    }
                    Err(_) => 500,
                },
                None => 500,
            };

            if self.config.enforce_status && aggregate == 200 {
                aggregate = status;
            }
            statuses.insert(cache.name.clone(), status);

            if let Some(id) = &request_id {
                self.access_log.record(vec![
                    id.clone(),
                    " ".to_string(),
                    request.method.to_string(),
                    " ".to_string(),
                    cache.address.clone(),
                    request.path.clone(),
                    " ".to_string(),
                    status.to_string(),
                ]);
            }
        }

        BroadcastOutcome::Completed {
            status: aggregate,
            statuses,
        }
    }
}

/// 32-bit FNV-1a.
fn fnv32a(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Correlation id for one dispatch.
///
/// # Arguments
/// * `now` - The current time rendered as a string
///
/// # Returns
/// The doubly-applied 32-bit FNV-1a of `now`, rendered as decimal
fn request_id(now: &str) -> String {
    fnv32a(fnv32a(now.as_bytes()).to_string().as_bytes()).to_string()
}
