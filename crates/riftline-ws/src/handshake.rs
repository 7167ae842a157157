//! HTTP/1.1 Upgrade request construction and response acceptance.
//!
//! The accumulator and acceptance rule deliberately preserve the reference
//! client's looser-than-strict-RFC-6455 behavior of also accepting a bare
//! `200` status line "for compatibility" (see `SPEC_FULL.md` §9's open
//! questions) — this implementation does not verify `Sec-WebSocket-Accept`
//! against the key it sent, matching that same reference behavior.

use base64::Engine as _;
use rand::RngCore;

pub const MAX_HANDSHAKE_RESPONSE: usize = 4096;

pub fn build_upgrade_request(host: &str, port: u16, path: &str, default_port: u16) -> String {
    let mut key_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut key_bytes);
    let key = base64::engine::general_purpose::STANDARD.encode(key_bytes);

    let host_header = if port == default_port { host.to_string() } else { format!("{host}:{port}") };

    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The header terminator hasn't arrived yet; keep accumulating.
    Pending,
    Accepted,
    Rejected,
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Scans the accumulated response for a header terminator and, once found,
/// checks the status line and `Upgrade` header. The caller is responsible
/// for treating a [`HandshakeOutcome::Pending`] response that has grown past
/// [`MAX_HANDSHAKE_RESPONSE`] as a rejection.
pub fn scan_response(buf: &[u8]) -> HandshakeOutcome {
    let Some(end) = find_header_end(buf) else {
        return HandshakeOutcome::Pending;
    };

    let head = String::from_utf8_lossy(&buf[..end]);
    let mut lines = head.split("\r\n");

    let status_ok = lines.next().is_some_and(|line| line.contains(" 101 ") || line.contains(" 200 "));

    let upgrade_ok = lines.any(|line| {
        let lower = line.to_ascii_lowercase();
        lower.starts_with("upgrade:") && lower.contains("websocket")
    });

    if status_ok && upgrade_ok { HandshakeOutcome::Accepted } else { HandshakeOutcome::Rejected }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_with_default_port_omitted() {
        let req = build_upgrade_request("example.com", 443, "/feed", 443);
        assert!(req.starts_with("GET /feed HTTP/1.1\r\n"));
        assert!(req.contains("Host: example.com\r\n"));
        assert!(req.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn builds_request_with_non_default_port_included() {
        let req = build_upgrade_request("example.com", 8443, "/", 443);
        assert!(req.contains("Host: example.com:8443\r\n"));
    }

    #[test]
    fn accepts_101_with_upgrade_header() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        assert_eq!(scan_response(resp), HandshakeOutcome::Accepted);
    }

    #[test]
    fn accepts_200_for_compatibility() {
        let resp = b"HTTP/1.1 200 OK\r\nUpgrade: WebSocket\r\n\r\n";
        assert_eq!(scan_response(resp), HandshakeOutcome::Accepted);
    }

    #[test]
    fn rejects_missing_upgrade_header() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\n\r\n";
        assert_eq!(scan_response(resp), HandshakeOutcome::Rejected);
    }

    #[test]
    fn rejects_error_status() {
        let resp = b"HTTP/1.1 404 Not Found\r\nUpgrade: websocket\r\n\r\n";
        assert_eq!(scan_response(resp), HandshakeOutcome::Rejected);
    }

    #[test]
    fn pending_until_headers_terminate() {
        let resp = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: web";
        assert_eq!(scan_response(resp), HandshakeOutcome::Pending);
    }
}
