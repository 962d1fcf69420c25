//! HTTP listener for lifecycle telemetry.
//!
//! The sandbox host POSTs event batches to [`TelemetryServer::endpoint`].
//! Every well-formed batch is answered with `200 OK` and an empty body; when
//! the batch contains a `platform.runtimeDone` event the runtime-done hook
//! runs first, once per request. Malformed batches get `400 Bad Request` and
//! never reach the hook.
//!
//! The hook runs on the request path. It must return promptly and must not
//! panic: a panic aborts the in-flight request and is not caught here.

use super::event::{contains_runtime_done, decode_events};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Span};

/// Address reachable only from inside the sandbox network namespace.
pub const DEFAULT_ADDR: &str = "sandbox:8083";

/// Fixed path the host pushes events to.
pub const TELEMETRY_PATH: &str = "/telemetry";

pub type RuntimeDoneHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind telemetry listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Telemetry listener failed during shutdown: {0}")]
    Shutdown(#[source] std::io::Error),
}

/// Construction options for [`TelemetryServer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerConfig {
    /// Overrides the default bind `host:port`. The path stays fixed.
    pub custom_addr: Option<String>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_custom_addr(mut self, addr: impl Into<String>) -> Self {
        self.custom_addr = Some(addr.into());
        self
    }
}

#[derive(Clone)]
struct HandlerState {
    logger: Span,
    on_runtime_done: RuntimeDoneHook,
}

pub struct TelemetryServer {
    logger: Span,
    on_runtime_done: RuntimeDoneHook,
    addr: String,
}

impl TelemetryServer {
    pub fn new<F>(logger: Span, on_runtime_done: F, config: ServerConfig) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            logger,
            on_runtime_done: Arc::new(on_runtime_done),
            addr: config
                .custom_addr
                .unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        }
    }

    /// The `host:port` this server binds to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// URL the host runtime should push events to.
    pub fn endpoint(&self) -> String {
        format!("http://{}{}", self.addr, TELEMETRY_PATH)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(TELEMETRY_PATH, post(handle_events))
            .with_state(HandlerState {
                logger: self.logger.clone(),
                on_runtime_done: Arc::clone(&self.on_runtime_done),
            })
    }

    /// Binds the configured address and serves until `token` is cancelled.
    ///
    /// Cancellation triggers a graceful shutdown: no new connections are
    /// accepted and in-flight requests are allowed to finish. Returns an
    /// error only when the bind or the shutdown fails.
    pub async fn start(&self, token: CancellationToken) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr.as_str())
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr.clone(),
                source,
            })?;

        self.serve(listener, token).await
    }

    /// Serves on an already bound listener until `token` is cancelled.
    pub async fn serve(
        &self,
        listener: TcpListener,
        token: CancellationToken,
    ) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(local) => info!(parent: &self.logger, addr = %local, "Telemetry listener started"),
            Err(e) => warn!(parent: &self.logger, error = %e, "Could not read listener address"),
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await
            .map_err(ServerError::Shutdown)?;

        info!(parent: &self.logger, "Telemetry listener stopped");
        Ok(())
    }
}

async fn handle_events(State(state): State<HandlerState>, body: Bytes) -> StatusCode {
    let events = match decode_events(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(parent: &state.logger, error = %e, "Rejected telemetry batch");
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!(parent: &state.logger, events = events.len(), "Received telemetry batch");

    if contains_runtime_done(&events) {
        info!(parent: &state.logger, "Runtime done, invoking hook");
        (state.on_runtime_done)();
    }

    StatusCode::OK
}
