//! Per-cache outbound client and the client table.
//!
//! A [`CacheClient`] owns the connection pool for one cache and performs
//! single round-trips: write the wire-form request, read the status line,
//! then drain the rest of the response so the connection can go back to the
//! pool. Responses of unknown length (chunked, no `Content-Length`,
//! `Connection: close`) make the connection non-reusable; it is closed
//! instead of returned.
//!
//! On any I/O or protocol error the client discards every pooled connection
//! for its cache before surfacing the error. Recovery is not attempted
//! inline; the worker decides whether to re-warm and retry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::RwLock;

use purgecast_common::{Cache, PurgecastError, Result};

use crate::pool::ConnectionPool;
use crate::wire::{parse_status_line, serialize_request, OutboundRequest};

/// Upper bound on the response head (status line + headers).
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Reusable outbound client for one cache.
pub struct CacheClient {
    cache: Cache,
    pool: ConnectionPool,
}

/// What to do with the connection once the response is consumed.
enum Disposition {
    /// Fully drained; the connection goes back to the pool.
    Reuse,
    /// Unknown remaining length or server-requested close; drop the socket.
    Close,
}

impl CacheClient {
    /// Builds a client with a fully warmed pool for `cache`.
    ///
    /// # Arguments
    /// * `cache` - The cache endpoint to dial
    ///
    /// # Errors
    /// Returns a connection error if the address does not resolve or any
    /// warm-up dial fails; no partially warmed client is ever produced.
    pub async fn connect(cache: &Cache) -> Result<Self> {
        let pool = ConnectionPool::warm(&cache.address).await?;
        Ok(Self {
            cache: cache.clone(),
            pool,
        })
    }

    /// The cache this client talks to.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Performs one round-trip against the cache.
    ///
    /// # Arguments
    /// * `request` - The request context shared by the dispatch
    ///
    /// # Returns
    /// The status code parsed from the cache's status line
    ///
    /// # Errors
    /// Any I/O or protocol error is returned only after every pooled
    /// connection for this cache has been discarded; whether to re-warm is
    /// the caller's decision.
    pub async fn execute(&self, request: &OutboundRequest) -> Result<u16> {
        match self.round_trip(request).await {
            Ok(status) => Ok(status),
            Err(err) => {
                self.pool.clear().await;
                Err(err)
            }
        }
    }

    /// Executes the request on one pooled connection.
    ///
    /// The connection goes back to the pool only when the response was
    /// drained completely and the server did not ask for a close.
    async fn round_trip(&self, request: &OutboundRequest) -> Result<u16> {
        let mut stream = self.pool.acquire().await?;

        let wire = serialize_request(&self.cache, request);
        stream.write_all(wire.as_bytes()).await?;

        let mut reader = BufReader::new(stream);

        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).await?;
        if line.is_empty() {
            return Err(PurgecastError::Protocol(format!(
                "{} closed the connection before responding",
                self.cache.address
            )));
        }
        let status = parse_status_line(&String::from_utf8_lossy(&line))?;

        match Self::drain_response(&mut reader).await? {
            Disposition::Reuse => self.pool.release(reader.into_inner()).await,
            Disposition::Close => {}
        }

        Ok(status)
    }

    /// Reads the remaining head and body of a response whose status line has
    /// already been consumed.
    ///
    /// # Returns
    /// Whether the connection can be reused or must be closed
    async fn drain_response(reader: &mut BufReader<TcpStream>) -> Result<Disposition> {
        let mut content_length: Option<u64> = None;
        let mut reusable = true;
        let mut head_bytes = 0usize;

        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                // EOF inside the head; nothing left to reuse.
                return Ok(Disposition::Close);
            }
            head_bytes += n;
            if head_bytes > MAX_HEAD_BYTES {
                return Err(PurgecastError::Protocol(
                    "response head exceeds limit".to_string(),
                ));
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                break;
            }

            let Some((name, value)) = text.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            match name.as_str() {
                "content-length" => content_length = value.parse().ok(),
                "connection" => {
                    if value.eq_ignore_ascii_case("close") {
                        reusable = false;
                    }
                }
                "transfer-encoding" => {
                    if value.to_ascii_lowercase().contains("chunked") {
                        content_length = None;
                    }
                }
                _ => {}
            }
        }

        // Without a definite length the body cannot be drained reliably;
        // close rather than hand a mid-response socket back to the pool.
        let Some(length) = content_length else {
            return Ok(Disposition::Close);
        };

        let mut body = tokio::io::AsyncReadExt::take(reader, length);
        let drained = tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
        if drained < length {
            return Ok(Disposition::Close);
        }

        if reusable {
            Ok(Disposition::Reuse)
        } else {
            Ok(Disposition::Close)
        }
    }

    #[cfg(test)]
    async fn idle_connections(&self) -> usize {
        self.pool.idle_count().await
    }
}

/// Thread-safe map of cache name → client.
///
/// Entries are replaced wholesale by [`ClientTable::warm_up`]; a reader either
/// sees the previous fully-built client or the new one. Lookups clone the
/// `Arc` out under a read lock so no lock is ever held across network I/O.
#[derive(Default)]
pub struct ClientTable {
    clients: RwLock<HashMap<String, Arc<CacheClient>>>,
}

impl ClientTable {
    /// (Re)creates the client for `cache`, replacing any prior entry.
    ///
    /// # Arguments
    /// * `cache` - The cache to (re)build the client for
    ///
    /// # Errors
    /// Returns the warm-up failure. The new client is fully built before
    /// installation, so on failure the old entry stays in place.
    pub async fn warm_up(&self, cache: &Cache) -> Result<()> {
        let client = Arc::new(CacheClient::connect(cache).await?);
        self.clients
            .write()
            .await
            .insert(cache.name.clone(), client);
        Ok(())
    }

    /// Looks up the client for a cache name.
    ///
    /// # Arguments
    /// * `name` - The cache name used as table key
    ///
    /// # Returns
    /// The installed client, or `None` between a reload and its warm-up
    pub async fn get(&self, name: &str) -> Option<Arc<CacheClient>> {
        self.clients.read().await.get(name).cloned()
    }

    /// Executes one request against the named cache.
    ///
    /// The client `Arc` is cloned out under the read lock and the lock is
    /// released before any I/O happens.
    ///
    /// # Arguments
    /// * `cache` - The target cache
    /// * `request` - The request context shared by the dispatch
    ///
    /// # Returns
    /// The upstream status code
    ///
    /// # Errors
    /// [`PurgecastError::NoClient`] when no entry is installed (possible
    /// between reload and warm-up; the dispatcher records it as a 500),
    /// otherwise whatever the client's round-trip returned.
    pub async fn execute(&self, cache: &Cache, request: &OutboundRequest) -> Result<u16> {
        let client = self
            .get(&cache.name)
            .await
            .ok_or_else(|| PurgecastError::NoClient(cache.name.clone()))?;
        client.execute(request).await
    }

    /// Drops the client and all its connections for `name`.
    ///
    /// # Arguments
    /// * `name` - The cache name to evict
    pub async fn close_all(&self, name: &str) {
        self.clients.write().await.remove(name);
    }

    /// Drops every client whose cache name is not in `names`. Used after a
    /// reload to prune caches that left the configuration.
    ///
    /// # Arguments
    /// * `names` - The cache names that remain configured
    pub async fn retain(&self, names: &HashSet<String>) {
        self.clients
            .write()
            .await
            .retain(|name, _| names.contains(name));
    }
}
