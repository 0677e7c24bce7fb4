//! HTTP surface.
//!
//! Every path and every method routes to the single broadcast handler; the
//! group selector is the `X-Group` header, so `PURGE /a` with `X-Group: g1`
//! purges `/a` on every cache of `g1`. Responses are JSON maps of cache name
//! to upstream status, two-space indented.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;

use purgecast_common::{PurgecastError, Result};

use crate::dispatcher::BroadcastOutcome;
use crate::lifecycle;
use crate::server::Server;
use crate::wire::OutboundRequest;

/// HTTP server binding the broadcast handler.
pub struct HttpServer {
    server: Arc<Server>,
}

impl HttpServer {
    /// Creates the HTTP surface for one broadcaster instance.
    ///
    /// # Arguments
    /// * `server` - Arc-wrapped server the handlers dispatch through
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }

    /// The axum router.
    ///
    /// # Returns
    /// A router whose catch-all sends any path and any method (PURGE and BAN
    /// included) to the broadcast handler
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(broadcast_handler)
            .with_state(Arc::clone(&self.server))
    }

    /// Binds `addr` and serves until an interrupt or terminate signal.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind
    ///
    /// # Errors
    /// Returns a connection error when the bind fails or the server dies;
    /// a graceful shutdown resolves to `Ok(())`.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PurgecastError::Connection(format!("failed to bind {}: {}", addr, e)))?;

        tracing::info!("broadcaster serving on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(lifecycle::shutdown_signal())
            .await
            .map_err(|e| PurgecastError::Connection(format!("server error: {}", e)))?;

        Ok(())
    }
}

async fn broadcast_handler(State(server): State<Arc<Server>>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let outbound = OutboundRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        headers: parts.headers,
    };

    match server.broadcast(outbound).await {
        BroadcastOutcome::MissingGroup => {
            (StatusCode::BAD_REQUEST, "Missing group name.").into_response()
        }
        BroadcastOutcome::UnknownGroup => {
            (StatusCode::NOT_FOUND, "Group not found.").into_response()
        }
        BroadcastOutcome::Empty => StatusCode::NO_CONTENT.into_response(),
        BroadcastOutcome::Completed { status, statuses } => {
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = serde_json::to_string_pretty(&statuses).unwrap_or_default();
            (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
    }
}
