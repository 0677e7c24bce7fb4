//! Server composition.
//!
//! A [`Server`] value ties together the registry, client table, worker pool
//! and access log for one broadcaster instance. Nothing is process-global:
//! signal handlers capture an `Arc<Server>` and tests instantiate as many
//! servers as they need.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use purgecast_common::{config::load_groups, Result};

use crate::access_log::AccessLog;
use crate::client::ClientTable;
use crate::registry::Registry;
use crate::worker::{Job, WorkerPool};

/// Runtime settings of one broadcaster instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Worker pool size.
    pub workers: usize,
    /// Per-job retry count (attempts = 1 + retries).
    pub retries: u32,
    /// Adopt the first non-200 upstream status as the response status.
    pub enforce_status: bool,
    /// Path the configuration is (re)loaded from.
    pub config_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            retries: 1,
            enforce_status: false,
            config_path: PathBuf::from("/caches.ini"),
        }
    }
}

/// One broadcaster instance.
pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) clients: Arc<ClientTable>,
    pub(crate) job_tx: mpsc::Sender<Job>,
    pub(crate) access_log: AccessLog,
    /// Owns the worker tasks for the lifetime of the server.
    _workers: WorkerPool,
}

impl Server {
    /// Loads the configuration from `config.config_path` and spawns the
    /// worker pool. Connection warm-up is separate ([`Server::warm_up_all`]):
    /// an unreachable cache must not prevent startup.
    ///
    /// # Arguments
    /// * `config` - Runtime settings of this instance
    /// * `access_log` - The access log sink (possibly disabled)
    ///
    /// # Errors
    /// Configuration load or validation failures; fatal at startup.
    pub async fn new(config: ServerConfig, access_log: AccessLog) -> Result<Arc<Self>> {
        let groups = load_groups(&config.config_path)?;
        let registry = Registry::from_groups(groups)?;

        let clients = Arc::new(ClientTable::default());
        let workers = WorkerPool::spawn(config.workers, config.retries, Arc::clone(&clients));
        let job_tx = workers.sender();

        Ok(Arc::new(Self {
            config,
            registry: RwLock::new(registry),
            clients,
            job_tx,
            access_log,
            _workers: workers,
        }))
    }

    /// Warms the connection pool of every configured cache. Failures are
    /// logged per cache; requests targeting an unwarmed cache yield a 500
    /// entry until a later warm-up succeeds.
    pub async fn warm_up_all(&self) {
        let caches = self.registry.read().await.all().to_vec();
        for cache in caches {
            if let Err(err) = self.clients.warm_up(&cache).await {
                tracing::warn!(cache = %cache.name, error = %err, "connection warm-up failed");
            }
        }
    }

    /// Reloads the configuration and swaps the registry atomically.
    ///
    /// After a successful swap, clients of departed caches are pruned and
    /// every cache of the new registry is re-warmed.
    ///
    /// # Errors
    /// Parse or validation failures, in which case nothing is swapped and
    /// the previous registry stays in effect.
    pub async fn reload(&self) -> Result<()> {
        let groups = load_groups(&self.config.config_path)?;
        let registry = Registry::from_groups(groups)?;

        let caches = registry.all().to_vec();
        let names: HashSet<String> = caches.iter().map(|c| c.name.clone()).collect();

        *self.registry.write().await = registry;
        self.clients.retain(&names).await;

        for cache in caches {
            if let Err(err) = self.clients.warm_up(&cache).await {
                tracing::warn!(cache = %cache.name, error = %err, "connection warm-up failed");
            }
        }

        tracing::info!(caches = names.len(), "configuration reloaded");
        Ok(())
    }

    /// The access log sink of this instance.
    pub fn access_log(&self) -> &AccessLog {
        &self.access_log
    }

    /// Flushes and closes the access log. Called once on shutdown.
    pub async fn close(&self) {
        self.access_log.close().await;
    }
}
