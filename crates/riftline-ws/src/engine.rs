//! Frame-engine state: the HTTP Upgrade handshake, the zero-copy inbound
//! parser, and the masked outbound framer, wired together behind one type
//! that [`riftline::WsContext`] (in the top-level crate) drives once per
//! `update` pass.

use riftline_ring::RingBuffer;

use crate::{
    error::WsError,
    framer,
    handshake::{self, HandshakeOutcome, MAX_HANDSHAKE_RESPONSE},
    mask::MaskRng,
    opcode::Opcode,
};

/// Outcome of feeding newly decrypted bytes to [`FrameEngine::feed_handshake_bytes`].
pub enum HandshakeStep {
    Pending,
    Accepted,
    Rejected(WsError),
}

/// Everything the frame engine needs beyond the two ring buffers it is
/// handed on every call: the handshake accumulator (retired once
/// `connected` flips), the masking PRNG, and the three flags the spec's
/// data model calls out.
pub struct FrameEngine {
    handshake_buf: Vec<u8>,
    handshake_sent: bool,
    rng: MaskRng,
    has_pending_tx: bool,
    connected: bool,
    closed: bool,
}

impl FrameEngine {
    pub fn new() -> Self {
        Self {
            handshake_buf: Vec::with_capacity(256),
            handshake_sent: false,
            rng: MaskRng::seed_from_os(),
            has_pending_tx: false,
            connected: false,
            closed: false,
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    pub fn has_pending_tx(&self) -> bool {
        self.has_pending_tx
    }

    /// Sends the one-and-only HTTP Upgrade request. Safe to call every
    /// `update` pass before the handshake completes; it no-ops once the
    /// request has gone out, returning `true` again so the caller doesn't
    /// need to track the flag itself.
    pub fn send_handshake_request(
        &mut self,
        tx: &mut RingBuffer,
        host: &str,
        port: u16,
        path: &str,
        default_port: u16,
    ) -> bool {
        if self.handshake_sent {
            return true;
        }
        let request = handshake::build_upgrade_request(host, port, path, default_port);
        let bytes = request.as_bytes();
        if tx.available_write() < bytes.len() {
            return false;
        }
        let written = tx.write_copy(bytes);
        self.handshake_sent = written == bytes.len();
        if self.handshake_sent {
            self.has_pending_tx = true;
        }
        self.handshake_sent
    }

    /// Accumulates `chunk` of decrypted response bytes and re-checks for
    /// `101`/`200` + `Upgrade: websocket`. Once accepted the accumulator is
    /// dropped and never touched again.
    pub fn feed_handshake_bytes(&mut self, chunk: &[u8]) -> HandshakeStep {
        self.handshake_buf.extend_from_slice(chunk);

        match handshake::scan_response(&self.handshake_buf) {
            HandshakeOutcome::Pending => {
                if self.handshake_buf.len() >= MAX_HANDSHAKE_RESPONSE {
                    self.closed = true;
                    HandshakeStep::Rejected(WsError::HandshakeResponseTooLarge)
                } else {
                    HandshakeStep::Pending
                }
            }
            HandshakeOutcome::Accepted => {
                self.connected = true;
                self.handshake_buf = Vec::new();
                HandshakeStep::Accepted
            }
            HandshakeOutcome::Rejected => {
                self.closed = true;
                let preview = String::from_utf8_lossy(&self.handshake_buf).into_owned();
                HandshakeStep::Rejected(WsError::HandshakeRejected(preview))
            }
        }
    }

    /// Drains every complete frame currently sitting in `rx`, invoking
    /// `on_message(opcode, payload)` once per frame with a pointer straight
    /// into the ring — valid only for the duration of the call, per the
    /// spec's zero-copy callback contract. PING is auto-replied with an
    /// echoing PONG and still delivered to the callback; CLOSE is
    /// auto-replied, flips `closed`/`connected`, and stops the drain.
    ///
    /// Returns on the first incomplete frame (normal exit) or protocol
    /// violation (`Err`, already terminal: `closed` is set before this
    /// returns).
    pub fn drain_frames<F: FnMut(Opcode, &[u8])>(
        &mut self,
        rx: &mut RingBuffer,
        tx: &mut RingBuffer,
        mut on_message: F,
    ) -> Result<(), WsError> {
        loop {
            if self.closed {
                return Ok(());
            }

            let span = rx.readable_span();
            if span.len() < 2 {
                return Ok(());
            }

            let (header_len, payload_len, opcode) = match crate::parser::try_parse_header(span) {
                crate::parser::ParseOutcome::Incomplete => return Ok(()),
                crate::parser::ParseOutcome::Violation(err) => {
                    self.closed = true;
                    self.connected = false;
                    return Err(err);
                }
                crate::parser::ParseOutcome::Frame { header_len, payload_len, opcode } => {
                    (header_len, payload_len, opcode)
                }
            };

            // SAFETY: `span` is at least `header_len + payload_len` bytes
            // (the parser already checked this), and `payload` is never
            // touched after `rx.advance_read` runs below — it does not
            // outlive this loop iteration, matching the spec's zero-copy
            // callback contract.
            let payload: &[u8] =
                unsafe { std::slice::from_raw_parts(span.as_ptr().add(header_len), payload_len) };

            match opcode {
                Opcode::Ping => {
                    self.try_queue(tx, Opcode::Pong, payload);
                    on_message(opcode, payload);
                }
                Opcode::Close => {
                    let status = if payload.len() >= 2 { &payload[..2] } else { &[][..] };
                    self.try_queue(tx, Opcode::Close, status);
                    self.closed = true;
                    self.connected = false;
                    on_message(opcode, payload);
                    rx.advance_read(header_len + payload_len);
                    return Ok(());
                }
                _ => on_message(opcode, payload),
            }

            rx.advance_read(header_len + payload_len);
        }
    }

    /// Frames and queues an application message. Returns `false` if the TX
    /// ring didn't have room; short of CLOSE this is best-effort.
    pub fn send_message(&mut self, tx: &mut RingBuffer, opcode: Opcode, payload: &[u8]) -> bool {
        self.try_queue(tx, opcode, payload)
    }

    /// Enqueues a Normal-Closure CLOSE frame and marks the engine closed.
    /// Idempotent: a second call is a no-op, so callers never need to track
    /// whether they already closed.
    pub fn close(&mut self, tx: &mut RingBuffer) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connected = false;
        self.try_queue(tx, Opcode::Close, &1000u16.to_be_bytes());
    }

    fn try_queue(&mut self, tx: &mut RingBuffer, opcode: Opcode, payload: &[u8]) -> bool {
        let queued = framer::queue_frame(tx, opcode, payload, &mut self.rng);
        if queued {
            self.has_pending_tx = true;
        }
        queued
    }

    /// Called after the context flushes some (or all) of the TX ring to the
    /// transport; recomputes `has_pending_tx` from what's actually left.
    pub fn note_tx_flushed(&mut self, tx: &RingBuffer) {
        self.has_pending_tx = tx.available_read() > 0;
    }
}

impl Default for FrameEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FrameEngine {
    fn drop(&mut self) {
        self.rng.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rings() -> (RingBuffer, RingBuffer) {
        (RingBuffer::new(1 << 16).unwrap(), RingBuffer::new(1 << 16).unwrap())
    }

    #[test]
    fn ping_triggers_pong_and_still_reaches_the_callback() {
        let (mut rx, mut tx) = rings();
        rx.write_copy(&[0x89, 0x04, b'p', b'i', b'n', b'g']);

        let mut engine = FrameEngine::new();
        engine.connected = true;
        let mut seen = Vec::new();
        engine.drain_frames(&mut rx, &mut tx, |op, payload| seen.push((op, payload.to_vec()))).unwrap();

        assert_eq!(seen, vec![(Opcode::Ping, b"ping".to_vec())]);

        let span = tx.readable_span();
        assert_eq!(span[0], 0x8A); // FIN | PONG
        assert_eq!(span[1] & 0x80, 0x80); // MASK set
        assert_eq!(span[1] & 0x7F, 4);
        let mask = [span[2], span[3], span[4], span[5]];
        let mut unmasked = [span[6], span[7], span[8], span[9]];
        for (i, b) in unmasked.iter_mut().enumerate() {
            *b ^= mask[i & 3];
        }
        assert_eq!(unmasked, *b"ping");
    }

    #[test]
    fn close_stops_further_delivery_and_replies_once() {
        let (mut rx, mut tx) = rings();
        rx.write_copy(&[0x88, 0x02, 0x03, 0xE8]); // CLOSE, status 1000
        rx.write_copy(&[0x81, 0x02, b'h', b'i']); // a TEXT frame that must never arrive

        let mut engine = FrameEngine::new();
        engine.connected = true;
        let mut seen = Vec::new();
        engine.drain_frames(&mut rx, &mut tx, |op, payload| seen.push((op, payload.to_vec()))).unwrap();

        assert_eq!(seen, vec![(Opcode::Close, vec![0x03, 0xE8])]);
        assert!(engine.closed());
        assert!(!engine.connected());

        let span = tx.readable_span();
        assert_eq!(span[0], 0x88);
    }

    #[test]
    fn protocol_violation_closes_and_stops_parsing() {
        let (mut rx, mut tx) = rings();
        // masked frame from the server
        rx.write_copy(&[0x81, 0x85, 0x00, 0x00, 0x00, 0x00, b'H', b'e', b'l', b'l', b'o']);

        let mut engine = FrameEngine::new();
        engine.connected = true;
        let mut seen = Vec::new();
        let result = engine.drain_frames(&mut rx, &mut tx, |op, payload| seen.push((op, payload.to_vec())));

        assert!(matches!(result, Err(WsError::ServerFrameMasked)));
        assert!(seen.is_empty());
        assert!(engine.closed());
    }

    #[test]
    fn close_is_idempotent() {
        let (_, mut tx) = rings();
        let mut engine = FrameEngine::new();
        engine.close(&mut tx);
        let queued_after_first = tx.available_read();
        engine.close(&mut tx);
        assert_eq!(tx.available_read(), queued_after_first);
    }

    #[test]
    fn handshake_accepts_after_status_and_upgrade_header_arrive() {
        let mut engine = FrameEngine::new();
        match engine.feed_handshake_bytes(b"HTTP/1.1 101 Switching Protocols\r\n") {
            HandshakeStep::Pending => {}
            _ => panic!("expected pending before header terminator"),
        }
        match engine.feed_handshake_bytes(b"Upgrade: websocket\r\nConnection: Upgrade\r\n\r\n") {
            HandshakeStep::Accepted => {}
            _ => panic!("expected accepted once headers terminate"),
        }
        assert!(engine.connected());
    }
}
