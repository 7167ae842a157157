use thiserror::Error;

/// Protocol-violation and handshake-rejection kinds the frame engine can
/// surface. Every variant here is fatal to the connection: the engine sets
/// its `closed` flag and stops parsing the instant one of these is produced.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("server frame set the MASK bit, which is a protocol violation from a server")]
    ServerFrameMasked,
    #[error("frame uses a non-minimal length encoding")]
    NonMinimalLength,
    #[error("frame header length overflowed")]
    HeaderOverflow,
    #[error("fragmented (continuation) frames are not supported in this profile")]
    Fragmented,
    #[error("control frame payload exceeds 125 bytes")]
    ControlFrameTooLarge,
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    #[error("HTTP upgrade handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("HTTP upgrade response exceeded the 4 KiB accumulator without completing")]
    HandshakeResponseTooLarge,
}
