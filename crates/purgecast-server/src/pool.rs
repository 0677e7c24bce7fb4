//! Bounded keep-alive TCP connection pool, one per cache.
//!
//! Warm-up dials [`WARM_CONNECTIONS`] connections up front; at most
//! [`MAX_IDLE_CONNECTIONS`] idle sockets are retained on release, anything
//! beyond that is closed. A connection is only returned to the pool by a
//! caller that observed a complete, reusable response; on any failure the
//! whole pool is discarded and rebuilt by the next warm-up.

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::Mutex;

use purgecast_common::{PurgecastError, Result};

/// Connections dialed eagerly by warm-up.
pub const WARM_CONNECTIONS: usize = 10;

/// Upper bound on idle keep-alive sockets retained per cache.
pub const MAX_IDLE_CONNECTIONS: usize = 40;

/// TCP keep-alive period on pooled sockets.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(60);

/// Dial timeout for new connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool of idle connections to one resolved cache address.
pub struct ConnectionPool {
    addr: SocketAddr,
    idle: Mutex<Vec<TcpStream>>,
}

impl ConnectionPool {
    /// Resolves `address` and dials [`WARM_CONNECTIONS`] connections.
    ///
    /// # Arguments
    /// * `address` - The cache address as `host:port`
    ///
    /// # Errors
    /// Resolution or dial failures; the caller keeps whatever pool it had
    /// before.
    pub async fn warm(address: &str) -> Result<Self> {
        let addr = lookup_host(address)
            .await
            .map_err(|e| PurgecastError::Connection(format!("resolving {}: {}", address, e)))?
            .next()
            .ok_or_else(|| {
                PurgecastError::Connection(format!("{} resolved to no addresses", address))
            })?;

        let mut idle = Vec::with_capacity(WARM_CONNECTIONS);
        for _ in 0..WARM_CONNECTIONS {
            idle.push(Self::dial(addr).await?);
        }

        Ok(Self {
            addr,
            idle: Mutex::new(idle),
        })
    }

    async fn dial(addr: SocketAddr) -> Result<TcpStream> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| PurgecastError::Connection(format!("connect to {} timed out", addr)))??;

        stream.set_nodelay(true)?;
        let socket = SockRef::from(&stream);
        socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEPALIVE_PERIOD))?;

        Ok(stream)
    }

    /// Draws an idle connection or dials a fresh one.
    ///
    /// # Returns
    /// A connected stream with keep-alive configured
    ///
    /// # Errors
    /// Dial failures when the pool is empty and the cache is unreachable
    pub async fn acquire(&self) -> Result<TcpStream> {
        if let Some(stream) = self.idle.lock().await.pop() {
            return Ok(stream);
        }
        Self::dial(self.addr).await
    }

    /// Returns a healthy connection to the pool.
    ///
    /// Unhealthy connections are never released; dropping them closes the
    /// socket.
    ///
    /// # Arguments
    /// * `stream` - The connection to put back; closed instead when
    ///   [`MAX_IDLE_CONNECTIONS`] are already pooled
    pub async fn release(&self, stream: TcpStream) {
        let mut idle = self.idle.lock().await;
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(stream);
        }
    }

    /// Closes every idle connection.
    pub async fn clear(&self) {
        self.idle.lock().await.clear();
    }

    /// Number of idle connections currently pooled.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Accepts connections forever, counting them and keeping them open.
    async fn accepting_listener() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                if let Ok((stream, _)) = listener.accept().await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    held.push(stream);
                }
            }
        });
        (addr, accepted)
    }

    #[tokio::test]
    async fn test_warm_dials_warm_connections() {
        let (addr, accepted) = accepting_listener().await;
        let pool = ConnectionPool::warm(&addr).await.unwrap();

        assert_eq!(pool.idle_count().await, WARM_CONNECTIONS);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), WARM_CONNECTIONS);
    }

    #[tokio::test]
    async fn test_acquire_reuses_idle_before_dialing() {
        let (addr, accepted) = accepting_listener().await;
        let pool = ConnectionPool::warm(&addr).await.unwrap();

        let stream = pool.acquire().await.unwrap();
        assert_eq!(pool.idle_count().await, WARM_CONNECTIONS - 1);
        pool.release(stream).await;
        assert_eq!(pool.idle_count().await, WARM_CONNECTIONS);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), WARM_CONNECTIONS);
    }

    #[tokio::test]
    async fn test_release_beyond_max_idle_closes() {
        let (addr, _) = accepting_listener().await;
        let pool = ConnectionPool::warm(&addr).await.unwrap();

        let mut streams = Vec::new();
        for _ in 0..(MAX_IDLE_CONNECTIONS + 5) {
            streams.push(pool.acquire().await.unwrap());
        }
        for stream in streams {
            pool.release(stream).await;
        }

        assert_eq!(pool.idle_count().await, MAX_IDLE_CONNECTIONS);
    }

    #[tokio::test]
    async fn test_clear_drops_all_idle() {
        let (addr, _) = accepting_listener().await;
        let pool = ConnectionPool::warm(&addr).await.unwrap();
        pool.clear().await;
        assert_eq!(pool.idle_count().await, 0);
    }

    #[tokio::test]
    async fn test_warm_fails_when_nothing_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(ConnectionPool::warm(&addr).await.is_err());
    }
}
