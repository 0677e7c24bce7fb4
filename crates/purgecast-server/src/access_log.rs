//! Access-log sink.
//!
//! Log events are tuples of string parts pushed onto a bounded channel and
//! drained by a single pump task, which prefixes each event with an RFC3339
//! timestamp and writes the concatenated line to the configured destination.
//!
//! Overflow policy: **drop on full**. Recording never blocks a dispatcher on
//! a slow log writer; drops are counted and reported through `tracing`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use purgecast_common::Result;

/// Capacity of the log-event channel (2^13).
pub const LOG_QUEUE_CAPACITY: usize = 8192;

type LogWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Handle for recording access-log events.
///
/// A disabled sink swallows events without allocating a channel or task.
pub struct AccessLog {
    tx: Mutex<Option<mpsc::Sender<Vec<String>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl AccessLog {
    /// A sink that discards everything; used when logging is switched off.
    pub fn disabled() -> Self {
        Self {
            tx: Mutex::new(None),
            handle: Mutex::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    /// A sink pumping to stdout.
    pub fn to_stdout() -> Self {
        Self::with_writer(Box::new(tokio::io::stdout()))
    }

    /// A sink pumping to `path`, created if absent, appended to otherwise.
    ///
    /// # Arguments
    /// * `path` - The log file path
    ///
    /// # Errors
    /// Returns the open failure; fatal at startup since the operator asked
    /// for a file explicitly.
    pub async fn to_file(path: &str) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::with_writer(Box::new(file)))
    }

    fn with_writer(writer: LogWriter) -> Self {
        let (tx, rx) = mpsc::channel(LOG_QUEUE_CAPACITY);
        let handle = tokio::spawn(pump(rx, writer));
        Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Whether events will actually be written anywhere.
    pub fn enabled(&self) -> bool {
        self.tx.lock().unwrap().is_some()
    }

    /// Records one event without blocking; on a full queue the event is
    /// dropped and counted.
    ///
    /// # Arguments
    /// * `parts` - Event fragments, concatenated verbatim by the pump
    pub fn record(&self, parts: Vec<String>) {
        let Some(tx) = self.tx.lock().unwrap().clone() else {
            return;
        };
        if tx.try_send(parts).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(dropped, "access log queue full, event dropped");
        }
    }

    /// Events dropped so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Closes the channel and waits for the pump to flush and exit.
    pub async fn close(&self) {
        let tx = self.tx.lock().unwrap().take();
        drop(tx);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn pump(mut rx: mpsc::Receiver<Vec<String>>, mut writer: LogWriter) {
    while let Some(parts) = rx.recv().await {
        let mut line = chrono::Utc::now().to_rfc3339();
        line.push(' ');
        for part in &parts {
            line.push_str(part);
        }
        line.push('\n');

        if let Err(err) = writer.write_all(line.as_bytes()).await {
            tracing::warn!(error = %err, "access log write failed");
        }
    }
    let _ = writer.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_sink_swallows_events() {
        let log = AccessLog::disabled();
        assert!(!log.enabled());
        log.record(vec!["x".to_string()]);
        assert_eq!(log.dropped(), 0);
        log.close().await;
    }

    #[tokio::test]
    async fn test_events_are_timestamped_and_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let path = path.to_str().unwrap().to_string();

        let log = AccessLog::to_file(&path).await.unwrap();
        assert!(log.enabled());
        log.record(vec![
            "42".to_string(),
            " ".to_string(),
            "PURGE".to_string(),
            " ".to_string(),
            "127.0.0.1:6081/a".to_string(),
        ]);
        log.close().await;

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let line = content.lines().next().unwrap();
        let (timestamp, rest) = line.split_once(' ').unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert_eq!(rest, "42 PURGE 127.0.0.1:6081/a");
    }

    #[tokio::test]
    async fn test_overflow_drops_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let log = AccessLog::to_file(path.to_str().unwrap()).await.unwrap();

        // Without yielding, the pump cannot drain on a current-thread
        // runtime, so pushing past the capacity must drop rather than hang.
        for i in 0..(LOG_QUEUE_CAPACITY + 100) {
            log.record(vec![i.to_string()]);
        }
        assert!(log.dropped() > 0);
        log.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let log = AccessLog::to_stdout();
        log.close().await;
        log.close().await;
        log.record(vec!["after close".to_string()]);
    }
}
