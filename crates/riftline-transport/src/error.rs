use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve {0}")]
    ResolveFailed(String),
    #[error("connect to {0} timed out")]
    ConnectTimedOut(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(#[from] rustls::Error),
    #[error("connection closed by peer")]
    Closed,
}

/// Non-error outcomes of a non-blocking operation. Kept distinct from
/// [`TransportError`] per the spec's propagation policy: `would_block` is
/// never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeProgress {
    InProgress,
    Done,
}
