//! Purgecast Server
//!
//! This crate provides the fan-out engine of the purgecast request
//! broadcaster. One inbound HTTP request is turned into one outbound job per
//! cache in the addressed group; a fixed pool of worker tasks executes the
//! jobs in parallel over per-cache connection pools; the per-cache status
//! codes are collected and returned to the client as a JSON map.
//!
//! # Architecture
//!
//! - **[`registry`]** - group name → cache list mapping, swapped atomically on
//!   reload
//! - **[`wire`]** - the minimal HTTP/1.1 request form written to caches and
//!   the status-line parser
//! - **[`pool`]** - bounded keep-alive TCP connection pool per cache
//! - **[`client`]** - one round-trip against one cache; the client table keyed
//!   by cache name
//! - **[`worker`]** - worker tasks draining the shared bounded job queue with
//!   per-job retry
//! - **[`dispatcher`]** - inbound request → jobs → aggregated response
//! - **[`access_log`]** - bounded log-event channel drained by a single pump
//!   task
//! - **[`http`]** - the axum surface: every path and method routes to the
//!   broadcast handler
//! - **[`lifecycle`]** - interrupt and reload signal handling
//!
//! # Control Flow
//!
//! Inbound request → [`Server::broadcast`] resolves the group against the
//! registry → one [`worker::Job`] per cache is enqueued on the shared queue →
//! workers execute the jobs through the client table → results flow back
//! through per-job one-shot channels → the dispatcher aggregates and writes a
//! single response. Out of band, a SIGHUP-triggered reload may swap the
//! registry and re-warm clients concurrently with dispatch.

pub mod access_log;
pub mod client;
pub mod dispatcher;
pub mod http;
pub mod lifecycle;
pub mod pool;
pub mod registry;
pub mod server;
pub mod wire;
pub mod worker;

pub use access_log::AccessLog;
pub use client::{CacheClient, ClientTable};
pub use dispatcher::BroadcastOutcome;
pub use http::HttpServer;
pub use registry::Registry;
pub use server::{Server, ServerConfig};
pub use wire::OutboundRequest;
pub use worker::{Job, WorkerPool};
