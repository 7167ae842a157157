//! RFC 6455 WebSocket frame engine: the HTTP/1.1 Upgrade handshake, a
//! zero-copy inbound frame parser that reads directly out of a
//! [`riftline_ring::RingBuffer`], automatic PING/CLOSE auto-replies, and a
//! masked client-to-server framer.
//!
//! This crate only understands the client side of a single, unfragmented
//! RFC 6455 connection — no permessage-deflate, no continuation frames, no
//! server role. [`riftline::WsContext`] (the top-level crate) is what drives
//! [`FrameEngine`] against a live [`riftline_transport::Transport`].

mod engine;
mod error;
mod framer;
mod handshake;
mod mask;
mod opcode;
mod parser;

pub use engine::{FrameEngine, HandshakeStep};
pub use error::WsError;
pub use opcode::Opcode;
