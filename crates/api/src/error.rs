//! Error types for the network adapters.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while binding or running the servers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// gRPC transport failure
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// HTTP server failure
    #[error("HTTP server error: {0}")]
    Http(#[from] std::io::Error),
}

/// Result type for adapter operations.
pub type ApiResult<T> = Result<T, ApiError>;
