//! Error types for sessions and the listener.

use thiserror::Error;

use crate::codec::CodecError;

/// Reasons a session ends abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Listener setup and accept loop errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address '{addr}': {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("listen address '{0}' did not resolve to any socket address")]
    NoAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("session limiter closed")]
    LimiterClosed(#[from] tokio::sync::AcquireError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
