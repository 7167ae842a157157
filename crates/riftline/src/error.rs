use thiserror::Error;

/// Init-time failure kinds, per §7's propagation policy: everything that can
/// go wrong before the context exists is a `Result`; everything after is
/// delivered through the status callback instead.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("invalid websocket URL: {0}")]
    InvalidUrl(String),
    #[error("port {0} is out of the valid [1, 65535] range")]
    InvalidPort(u32),
    #[error(transparent)]
    Ring(#[from] riftline_ring::RingError),
    #[error(transparent)]
    Transport(#[from] riftline_transport::TransportError),
}
