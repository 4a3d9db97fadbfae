//! DPE API
//!
//! Network adapters over the ingest pipeline: the gRPC publisher endpoint,
//! and the HTTP query, status and WebSocket subscription endpoints.

pub mod error;
pub mod grpc;
pub mod http;

pub use error::{ApiError, ApiResult};
pub use grpc::{serve_grpc, IngestService};
pub use http::{router, serve_http, AppState};

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Flipped to `true` once when the process begins shutting down.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Bind a listener, naming the address on failure.
pub async fn bind(addr: SocketAddr) -> ApiResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ApiError::Bind { addr, source })
}

/// Resolve once shutdown has been requested or the signal's sender is gone.
pub async fn shutdown_requested(mut signal: ShutdownSignal) {
    while !*signal.borrow_and_update() {
        if signal.changed().await.is_err() {
            return;
        }
    }
}
