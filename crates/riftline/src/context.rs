//! The context: owns both ring buffers, the transport, and the frame
//! engine, and exposes the single `update` pump the spec's control-flow
//! section describes.

use std::{cell::RefCell, io::ErrorKind, os::fd::RawFd, rc::Rc};

use riftline_notify::{EVENT_READ, EVENT_WRITE, Notifier};
use riftline_ring::RingBuffer;
use riftline_timing::Instant;
use riftline_transport::{Config as TransportConfig, HandshakeProgress, Transport};
use riftline_ws::{FrameEngine, HandshakeStep, Opcode};

use crate::{
    error::WsError,
    state::WsState,
    timestamps::MessageTimestamps,
    url::{self, WsUrl},
};

/// Power of two per the ring buffer contract; large enough to hold several
/// seconds of a typical market-data feed between `update` calls.
const RING_CAPACITY: usize = 1 << 20;
/// Upper bound on bytes flushed to the transport per `update` pass.
const FLUSH_CHUNK: usize = 4096;

/// Which side is doing the record-layer crypto, mirroring
/// [`riftline_transport::Transport::ktls_active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Userspace,
    KernelOffload,
    /// A `ws://` connection: no TLS was ever negotiated.
    None,
}

/// A single WebSocket connection: two ring buffers, one transport, the
/// frame-engine state, and the callbacks the application registers.
///
/// Strictly single-threaded per the spec's concurrency model — nothing here
/// is `Send`/`Sync`, and there is no supported way to share one context
/// across workers.
pub struct WsContext {
    rx: RingBuffer,
    tx: RingBuffer,
    transport: Transport,
    engine: FrameEngine,
    state: WsState,
    url: WsUrl,
    transport_cfg: TransportConfig,
    on_msg: Option<Box<dyn FnMut(&[u8], u8)>>,
    on_status: Option<Box<dyn FnMut(i32)>>,
    notifier: Option<Rc<RefCell<Notifier>>>,
    last_timestamps: MessageTimestamps,
    local_close_requested: bool,
    total_messages: u64,
    total_batches: u64,
    last_batch_size: usize,
    max_batch_size: usize,
}

impl WsContext {
    /// Parses `url`, opens the transport (TLS for `wss://`, clear for
    /// `ws://`), and allocates the two ring buffers. Everything that can
    /// fail here is an init-time error per §7 — nothing after this point is
    /// ever surfaced as a `Result`.
    pub fn connect(raw_url: &str) -> Result<Self, WsError> {
        let parsed = url::parse(raw_url)?;
        let cfg = TransportConfig::from_env();

        let transport = if parsed.tls {
            Transport::open(&parsed.host, parsed.port, &cfg)?
        } else {
            Transport::open_plain(&parsed.host, parsed.port, &cfg)?
        };

        let rx = RingBuffer::new(RING_CAPACITY)?;
        let tx = RingBuffer::new(RING_CAPACITY)?;

        Ok(Self {
            rx,
            tx,
            transport,
            engine: FrameEngine::new(),
            state: WsState::Connecting,
            url: parsed,
            transport_cfg: cfg,
            on_msg: None,
            on_status: None,
            notifier: None,
            last_timestamps: MessageTimestamps::default(),
            local_close_requested: false,
            total_messages: 0,
            total_batches: 0,
            last_batch_size: 0,
            max_batch_size: 0,
        })
    }

    pub fn set_on_msg(&mut self, cb: impl FnMut(&[u8], u8) + 'static) -> &mut Self {
        self.on_msg = Some(Box::new(cb));
        self
    }

    pub fn set_on_status(&mut self, cb: impl FnMut(i32) + 'static) -> &mut Self {
        self.on_status = Some(Box::new(cb));
        self
    }

    /// Attaches a shared readiness notifier, registering this context's
    /// socket for read interest. The engine arms/disarms write interest on
    /// it automatically as `has_pending_tx` changes.
    pub fn set_notifier(&mut self, notifier: Rc<RefCell<Notifier>>) -> &mut Self {
        let _ = notifier.borrow_mut().add(self.transport.fd(), EVENT_READ);
        self.notifier = Some(notifier);
        self
    }

    /// The one-shot pump: advances the handshake if not yet connected,
    /// drains decrypted bytes into the RX ring, drains complete frames out
    /// of it, then flushes pending TX bytes. Never blocks beyond a single
    /// non-blocking transport `recv`.
    pub fn update(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        let t_event = Instant::now();

        if self.state == WsState::Connecting {
            self.drive_tls_handshake();
        }

        if self.state == WsState::Handshaking {
            self.drive_http_handshake();
        }

        if self.state == WsState::Connected {
            self.pump_receive(t_event);
        }

        if !self.state.is_terminal() {
            self.flush_tx();
        }
    }

    fn drive_tls_handshake(&mut self) {
        match self.transport.handshake(self.transport_cfg.debug_ktls) {
            Ok(HandshakeProgress::InProgress) => {}
            Ok(HandshakeProgress::Done) => {
                let default_port = self.url.default_port();
                let sent = self.engine.send_handshake_request(
                    &mut self.tx,
                    &self.url.host,
                    self.url.port,
                    &self.url.path,
                    default_port,
                );
                if sent {
                    self.state = WsState::Handshaking;
                }
            }
            Err(_err) => self.fail(),
        }
    }

    fn drive_http_handshake(&mut self) {
        let mut buf = [0u8; 4096];
        loop {
            match self.transport.recv_into(&mut buf) {
                Ok((0, _)) => return,
                Ok((n, _)) => match self.engine.feed_handshake_bytes(&buf[..n]) {
                    HandshakeStep::Pending => {}
                    HandshakeStep::Accepted => {
                        self.state = WsState::Connected;
                        self.emit_status(0);
                        return;
                    }
                    HandshakeStep::Rejected(_err) => {
                        self.state = WsState::Closed;
                        self.emit_status(-1);
                        return;
                    }
                },
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(_err) => {
                    self.fail();
                    return;
                }
            }
        }
    }

    fn pump_receive(&mut self, t_event: Instant) {
        self.last_timestamps.t_event = t_event;
        let mut decrypted_any = false;

        loop {
            let span = self.rx.writable_span();
            if span.is_empty() {
                break;
            }
            match self.transport.recv_into(span) {
                Ok((0, _)) => break,
                Ok((n, nic_ts)) => {
                    self.rx.commit_write(n);
                    if !decrypted_any {
                        self.last_timestamps.t_decrypt = Instant::now();
                        decrypted_any = true;
                    }
                    if let Some(ts) = nic_ts {
                        self.last_timestamps.t_nic = Some(ts);
                    }
                    if !self.transport.pending() {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(_err) => {
                    self.fail();
                    return;
                }
            }
        }

        let rx = &mut self.rx;
        let tx = &mut self.tx;
        let on_msg = &mut self.on_msg;
        let timestamps = &mut self.last_timestamps;
        let mut batch_size = 0usize;
        let result = self.engine.drain_frames(rx, tx, |opcode, payload| {
            timestamps.t_callback = Instant::now();
            batch_size += 1;
            if let Some(cb) = on_msg {
                cb(payload, opcode as u8);
            }
        });

        if batch_size > 0 {
            self.total_messages += batch_size as u64;
            self.total_batches += 1;
            self.last_batch_size = batch_size;
            self.max_batch_size = self.max_batch_size.max(batch_size);
        }

        if result.is_err() {
            self.state = WsState::Closed;
            self.emit_status(-1);
            return;
        }

        if self.engine.closed() {
            self.state = WsState::Closed;
            if !self.local_close_requested {
                self.emit_status(-1);
            }
        }
    }

    /// Frames `bytes` as a BINARY message and queues it on the TX ring.
    /// Returns `false` if the ring didn't have room or the connection isn't
    /// `Connected`.
    pub fn send(&mut self, bytes: &[u8]) -> bool {
        if self.state != WsState::Connected {
            return false;
        }
        let queued = self.engine.send_message(&mut self.tx, Opcode::Binary, bytes);
        self.sync_notifier_write_interest();
        queued
    }

    /// Enqueues a Normal-Closure CLOSE frame. Idempotent. The socket stays
    /// open until the context is dropped, so the buffered CLOSE has a
    /// chance to actually leave on the next `update`/flush.
    pub fn close(&mut self) {
        self.local_close_requested = true;
        self.engine.close(&mut self.tx);
        if !self.state.is_terminal() {
            self.state = WsState::Closed;
        }
        self.sync_notifier_write_interest();
    }

    /// Pushes up to [`FLUSH_CHUNK`] bytes of the TX ring's readable span to
    /// the transport. Called automatically at the end of every `update`;
    /// exposed for callers that want to push sooner.
    pub fn flush_tx(&mut self) {
        if !self.engine.has_pending_tx() {
            return;
        }

        let mut budget = FLUSH_CHUNK;
        while budget > 0 {
            let span = self.tx.readable_span();
            if span.is_empty() {
                break;
            }
            let n = span.len().min(budget);
            match self.transport.send(&span[..n]) {
                Ok(0) => break,
                Ok(sent) => {
                    self.tx.advance_read(sent);
                    budget = budget.saturating_sub(sent);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(_err) => {
                    self.fail();
                    return;
                }
            }
        }

        self.engine.note_tx_flushed(&self.tx);
        self.sync_notifier_write_interest();
    }

    fn sync_notifier_write_interest(&mut self) {
        let Some(notifier) = &self.notifier else { return };
        let events = if self.engine.has_pending_tx() { EVENT_READ | EVENT_WRITE } else { EVENT_READ };
        let _ = notifier.borrow_mut().modify(self.transport.fd(), events);
    }

    fn fail(&mut self) {
        self.state = WsState::Error;
        self.emit_status(-1);
    }

    fn emit_status(&mut self, code: i32) {
        if let Some(cb) = &mut self.on_status {
            cb(code);
        }
    }

    pub fn state(&self) -> WsState {
        self.state
    }

    pub fn fd(&self) -> RawFd {
        self.transport.fd()
    }

    pub fn cipher_name(&self) -> Option<&'static str> {
        self.transport.cipher_name()
    }

    pub fn tls_mode(&self) -> TlsMode {
        if !self.url.tls {
            TlsMode::None
        } else if self.transport.ktls_active() {
            TlsMode::KernelOffload
        } else {
            TlsMode::Userspace
        }
    }

    pub fn hw_ts_enabled(&self) -> bool {
        self.transport.hw_ts_enabled()
    }

    pub fn timestamps(&self) -> MessageTimestamps {
        self.last_timestamps
    }

    /// Total messages delivered to the application callback across the
    /// life of the connection, read-only introspection with no effect on
    /// control flow.
    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    /// Total `update` passes that delivered at least one message.
    pub fn total_batches(&self) -> u64 {
        self.total_batches
    }

    /// Number of messages delivered by the most recent batch-producing
    /// `update` pass.
    pub fn last_batch_size(&self) -> usize {
        self.last_batch_size
    }

    /// Largest batch ever observed.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Mean messages per batch; `0.0` before the first batch.
    pub fn avg_batch_size(&self) -> f64 {
        if self.total_batches == 0 { 0.0 } else { self.total_messages as f64 / self.total_batches as f64 }
    }

    pub fn rx_available_read(&self) -> usize {
        self.rx.available_read()
    }

    pub fn rx_available_write(&self) -> usize {
        self.rx.available_write()
    }

    pub fn tx_available_read(&self) -> usize {
        self.tx.available_read()
    }

    pub fn tx_available_write(&self) -> usize {
        self.tx.available_write()
    }
}

impl Drop for WsContext {
    /// Gives a buffered local CLOSE a chance to leave before the socket
    /// closes; ring buffers and the transport free themselves via their own
    /// `Drop` impls, and the frame engine zeroes its masking PRNG via its own.
    fn drop(&mut self) {
        if self.engine.has_pending_tx() {
            self.flush_tx();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_terminal_only_after_close_without_connecting() {
        assert!(!WsState::Connecting.is_terminal());
        assert!(WsState::Closed.is_terminal());
        assert!(WsState::Error.is_terminal());
    }
}
