//! Single-connection, client-side secure WebSocket library optimized for a
//! deterministic, low-latency receive path.
//!
//! The moving parts live one crate down: [`riftline_ring`] for the SPSC
//! ring buffers, [`riftline_notify`] for readiness, [`riftline_transport`]
//! for TLS (with opportunistic kTLS offload) and NIC timestamps,
//! [`riftline_ws`] for the RFC 6455 frame engine, and [`riftline_timing`] /
//! [`riftline_utils`] for the cycle-counter clock and thread setup this
//! profile expects callers to use for their receive thread. This crate's
//! only job is [`WsContext`]: wiring all of that into one `connect` /
//! `update` / `send` / `close` surface.

mod context;
mod error;
mod state;
mod timestamps;
mod url;

pub use context::{TlsMode, WsContext};
pub use error::WsError;
pub use state::WsState;
pub use timestamps::MessageTimestamps;
pub use url::WsUrl;

pub use riftline_notify::{EVENT_ERROR, EVENT_READ, EVENT_WRITE, Notifier};
pub use riftline_timing::{Duration, Instant};
pub use riftline_utils::{ThreadPriority, thread_boot};
pub use riftline_ws::Opcode;
