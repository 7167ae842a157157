//! The TLS-over-TCP transport: handshake pump, steady-state I/O, and the
//! handoff into kernel-offloaded (kTLS) mode once the handshake secrets are
//! available.

use std::{
    io::{self, ErrorKind, Read, Write},
    net::TcpStream,
    os::fd::{AsRawFd, RawFd},
};

use rustls::{ClientConnection, ProtocolVersion, pki_types::ServerName};

use crate::{
    config::Config,
    error::{HandshakeProgress, TransportError},
    hw_timestamp, ktls, socket, tls_config,
};

/// Cipher families the kernel's TLS ULP can offload; kept as plain
/// substring matches against `CipherSuite::as_str()` since `rustls` has no
/// "is kTLS-eligible" query of its own.
const KTLS_ELIGIBLE_SUITE_FRAGMENTS: [&str; 3] = ["AES_128_GCM", "AES_256_GCM", "CHACHA20_POLY1305"];

enum Mode {
    Userspace(ClientConnection),
    /// `rustls` is gone; the kernel now owns the record layer and the
    /// socket carries plaintext application data directly.
    KernelOffload,
    /// No TLS was ever negotiated (a `ws://` URL); the socket carries
    /// plaintext from the start. Shares its I/O path with `KernelOffload`
    /// since both just read/write the raw stream.
    Plain,
}

/// A single-connection client-side TLS transport.
///
/// Owns the raw `TcpStream` and, until kTLS activates (if it ever does),
/// the `rustls` connection driving it. The socket is non-blocking except
/// for the one-time [`Transport::handshake`] window; `send`/`recv_into`
/// are non-blocking throughout: callers are expected to pair this with a
/// readiness notifier and retry on `WouldBlock`.
pub struct Transport {
    stream: TcpStream,
    mode: Mode,
    hw_ts_enabled: bool,
    ktls_active: bool,
    cipher_name: Option<&'static str>,
    tls13: bool,
    plaintext_pending: usize,
}

impl Transport {
    /// Resolves `host` and connects with a bounded timeout. The socket is
    /// non-blocking by the time this returns; call [`Transport::handshake`]
    /// once to drive the TLS handshake to completion (it switches the
    /// socket to blocking for that call only) and get
    /// [`HandshakeProgress::Done`].
    pub fn open(host: &str, port: u16, cfg: &Config) -> Result<Self, TransportError> {
        let addr = socket::resolve_ipv4(host, port)?;
        let stream = socket::connect(addr)?;
        stream.set_nonblocking(true).map_err(TransportError::Io)?;

        let hw_ts_enabled = if cfg.enable_hw_timestamps {
            socket::enable_hw_timestamping(&stream)
        } else {
            false
        };

        let name = ServerName::try_from(host.to_string())
            .map_err(|_| TransportError::ResolveFailed(host.to_string()))?;
        let config = tls_config::client_config(cfg);
        let conn = ClientConnection::new(config, name).map_err(TransportError::HandshakeFailed)?;

        Ok(Self {
            stream,
            mode: Mode::Userspace(conn),
            hw_ts_enabled,
            ktls_active: false,
            cipher_name: None,
            tls13: false,
            plaintext_pending: 0,
        })
    }

    /// Same connect sequence as [`Transport::open`] but for a `ws://` (clear
    /// text) URL: no TLS is ever negotiated, so [`Transport::handshake`]
    /// returns [`HandshakeProgress::Done`] immediately and `send`/`recv_into`
    /// talk to the raw socket from the first call.
    pub fn open_plain(host: &str, port: u16, cfg: &Config) -> Result<Self, TransportError> {
        let addr = socket::resolve_ipv4(host, port)?;
        let stream = socket::connect(addr)?;
        stream.set_nonblocking(true).map_err(TransportError::Io)?;

        let hw_ts_enabled = if cfg.enable_hw_timestamps {
            socket::enable_hw_timestamping(&stream)
        } else {
            false
        };

        Ok(Self {
            stream,
            mode: Mode::Plain,
            hw_ts_enabled,
            ktls_active: false,
            cipher_name: None,
            tls13: false,
            plaintext_pending: 0,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn hw_ts_enabled(&self) -> bool {
        self.hw_ts_enabled
    }

    pub fn ktls_active(&self) -> bool {
        self.ktls_active
    }

    pub fn cipher_name(&self) -> Option<&'static str> {
        self.cipher_name
    }

    /// Whether application data has already been decrypted and is sitting
    /// in `rustls`'s internal buffer, ready for [`Transport::recv_into`]
    /// without another socket read. Always `false` once kTLS has taken
    /// over, since the kernel hands back plaintext directly on read.
    pub fn pending(&self) -> bool {
        self.plaintext_pending > 0
    }

    /// Drives the TLS handshake to completion. The socket switches to
    /// blocking for the duration of this call — required for kernel-offload
    /// activation, and an accepted one-time suspension point distinct from
    /// the non-blocking steady-state streaming path — and switches back to
    /// non-blocking before returning, whether or not kTLS ends up active.
    pub fn handshake(&mut self, debug_ktls: bool) -> Result<HandshakeProgress, TransportError> {
        let Mode::Userspace(conn) = &mut self.mode else {
            return Ok(HandshakeProgress::Done);
        };

        self.stream.set_nonblocking(false).map_err(TransportError::Io)?;

        while conn.is_handshaking() || conn.wants_write() {
            if conn.wants_write() {
                conn.write_tls(&mut self.stream).map_err(TransportError::Io)?;
            }

            if conn.wants_read() {
                match conn.read_tls(&mut self.stream) {
                    Ok(0) => return Err(TransportError::Closed),
                    Ok(_) => {
                        if let Err(err) = conn.process_new_packets() {
                            return Err(TransportError::HandshakeFailed(err));
                        }
                    }
                    Err(err) => return Err(TransportError::Io(err)),
                }
            }
        }

        self.cipher_name =
            conn.negotiated_cipher_suite().and_then(|suite| suite.suite().as_str());
        self.tls13 = conn.protocol_version() == Some(ProtocolVersion::TLSv1_3);

        // kTLS activation needs `dangerous_extract_secrets` and the
        // `setsockopt(SOL_TLS, TCP_ULP)` sequence to run on the same blocking
        // fd the handshake just finished on, before any application data
        // flows.
        self.try_activate_ktls(debug_ktls);
        self.stream.set_nonblocking(true).map_err(TransportError::Io)?;

        Ok(HandshakeProgress::Done)
    }

    #[cfg(target_os = "linux")]
    fn try_activate_ktls(&mut self, debug: bool) {
        let eligible = !self.hw_ts_enabled
            && self
                .cipher_name
                .is_some_and(|name| KTLS_ELIGIBLE_SUITE_FRAGMENTS.iter().any(|frag| name.contains(frag)));
        if !eligible {
            return;
        }

        let prior = std::mem::replace(&mut self.mode, Mode::KernelOffload);
        let Mode::Userspace(conn) = prior else {
            unreachable!("mode was just checked to be Userspace above");
        };

        let fd = self.stream.as_raw_fd();
        match conn.dangerous_extract_secrets() {
            Ok(secrets) => {
                let activated =
                    ktls::activate(fd, (secrets.tx.0, &secrets.tx.1), (secrets.rx.0, &secrets.rx.1), self.tls13);
                if activated {
                    if debug {
                        tracing::debug!("kTLS offload activated on fd {fd}");
                    }
                    self.ktls_active = true;
                } else {
                    tracing::warn!("kTLS setsockopt sequence failed on fd {fd}; staying on plain TCP reads");
                }
                // Either way the `rustls` connection is gone for good: the
                // secrets have left userspace. `self.mode` stays
                // `KernelOffload` even on a failed `setsockopt`, since
                // there is no connection left to fall back to.
            }
            Err(err) => {
                tracing::warn!("kTLS secret extraction failed on fd {fd}: {err}; staying on plain TCP reads");
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn try_activate_ktls(&mut self, _debug: bool) {}

    pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.mode {
            Mode::Userspace(conn) => {
                let n = conn.writer().write(buf)?;
                while conn.wants_write() {
                    match conn.write_tls(&mut self.stream) {
                        Ok(_) => {}
                        Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                        Err(err) => return Err(err),
                    }
                }
                Ok(n)
            }
            Mode::KernelOffload | Mode::Plain => self.stream.write(buf),
        }
    }

    /// Reads and, when possible, decrypts the next chunk of application
    /// data into `buf`. Returns the byte count and a hardware/software
    /// receive timestamp when [`Transport::hw_ts_enabled`] is set.
    pub fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<(usize, Option<u64>)> {
        match &mut self.mode {
            Mode::Userspace(conn) => {
                let mut ts = None;
                if conn.wants_read() {
                    if self.hw_ts_enabled {
                        let mut raw = [0u8; 16 * 1024];
                        let (n, read_ts) = hw_timestamp::recv_with_timestamp(self.stream.as_raw_fd(), &mut raw)?;
                        ts = read_ts;
                        if n > 0 {
                            let mut cursor = &raw[..n];
                            conn.read_tls(&mut cursor)?;
                        }
                    } else {
                        match conn.read_tls(&mut self.stream) {
                            Ok(0) => return Err(io::Error::from(ErrorKind::ConnectionReset)),
                            Ok(_) => {}
                            Err(err) if err.kind() == ErrorKind::WouldBlock && self.plaintext_pending == 0 => {
                                return Err(err);
                            }
                            Err(err) if err.kind() != ErrorKind::WouldBlock => return Err(err),
                            Err(_) => {}
                        }
                    }
                    let state = conn.process_new_packets().map_err(io::Error::other)?;
                    self.plaintext_pending = state.plaintext_bytes_to_read();
                }

                let n = conn.reader().read(buf).unwrap_or(0);
                self.plaintext_pending = self.plaintext_pending.saturating_sub(n);
                Ok((n, ts))
            }
            Mode::KernelOffload | Mode::Plain => {
                if self.hw_ts_enabled {
                    hw_timestamp::recv_with_timestamp(self.stream.as_raw_fd(), buf)
                } else {
                    self.stream.read(buf).map(|n| (n, None))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::KTLS_ELIGIBLE_SUITE_FRAGMENTS;

    fn eligible(name: &str) -> bool {
        KTLS_ELIGIBLE_SUITE_FRAGMENTS.iter().any(|frag| name.contains(frag))
    }

    #[test]
    fn recognizes_offloadable_suites() {
        assert!(eligible("TLS13_AES_128_GCM_SHA256"));
        assert!(eligible("TLS13_CHACHA20_POLY1305_SHA256"));
        assert!(eligible("TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384"));
    }

    #[test]
    fn rejects_everything_else() {
        assert!(!eligible("TLS13_AES_128_CCM_SHA256"));
        assert!(!eligible(""));
    }
}
