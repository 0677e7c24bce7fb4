//! Shared test support: a scriptable mock cache and a fully wired server.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use purgecast_server::{AccessLog, HttpServer, Server, ServerConfig};

/// A mock upstream cache speaking just enough HTTP/1.1 for the broadcaster:
/// it reads request heads off keep-alive connections and answers each with a
/// configurable status and an empty body.
pub struct MockCache {
    pub addr: String,
    status: Arc<AtomicU16>,
    hits: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
}

impl MockCache {
    pub async fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let status = Arc::new(AtomicU16::new(status));
        let hits = Arc::new(AtomicUsize::new(0));
        let heads: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_status = Arc::clone(&status);
        let accept_hits = Arc::clone(&hits);
        let accept_heads = Arc::clone(&heads);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let status = Arc::clone(&accept_status);
                let hits = Arc::clone(&accept_hits);
                let heads = Arc::clone(&accept_heads);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    loop {
                        let Ok(n) = stream.read(&mut chunk).await else {
                            return;
                        };
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);

                        // Request heads are terminated by a blank line.
                        while let Some(pos) = buf.windows(2).position(|w| w == b"\n\n") {
                            let head: Vec<u8> = buf.drain(..pos + 2).collect();
                            heads
                                .lock()
                                .unwrap()
                                .push(String::from_utf8_lossy(&head).to_string());
                            hits.fetch_add(1, Ordering::SeqCst);

                            let response = format!(
                                "HTTP/1.1 {} MockCache\r\nContent-Length: 0\r\n\r\n",
                                status.load(Ordering::SeqCst)
                            );
                            if stream.write_all(response.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            status,
            hits,
            heads,
        }
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

/// A broadcaster instance bound to an ephemeral port, plus the live
/// configuration file it was loaded from.
pub struct TestServer {
    pub server: Arc<Server>,
    pub addr: SocketAddr,
    pub config_file: tempfile::NamedTempFile,
}

impl TestServer {
    pub async fn start(ini: &str, enforce: bool) -> Self {
        Self::start_with_log(ini, enforce, AccessLog::disabled()).await
    }

    pub async fn start_with_log(ini: &str, enforce: bool, access_log: AccessLog) -> Self {
        let mut config_file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        config_file.write_all(ini.as_bytes()).unwrap();

        let config = ServerConfig {
            workers: 4,
            retries: 1,
            enforce_status: enforce,
            config_path: config_file.path().to_path_buf(),
        };
        let server = Server::new(config, access_log).await.unwrap();
        server.warm_up_all().await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = HttpServer::new(Arc::clone(&server)).router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            server,
            addr,
            config_file,
        }
    }

    /// Rewrites the configuration file in place; pair with `server.reload()`.
    pub fn rewrite_config(&self, ini: &str) {
        std::fs::write(self.config_file.path(), ini).unwrap();
    }

    /// Sends one request to the broadcaster.
    pub async fn send(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
    ) -> reqwest::Response {
        let client = reqwest::Client::new();
        let url = format!("http://{}{}", self.addr, path);
        let mut request = client.request(
            reqwest::Method::from_bytes(method.as_bytes()).unwrap(),
            url,
        );
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.send().await.unwrap()
    }
}
