//! `wss://host[:port][/path]` (or `ws://` for clear-text) grammar.
//!
//! Parsing itself goes through the `url` crate, already part of the
//! reference crate's workspace dependency table; this module only adds the
//! thin post-parse validation layer the general-purpose crate doesn't do on
//! its own — rejecting non-`ws`/`wss` schemes, missing hosts, and ports
//! outside `[1, 65535]`.

use url::Url;

use crate::error::WsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    pub tls: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl WsUrl {
    pub fn default_port(&self) -> u16 {
        if self.tls { 443 } else { 80 }
    }
}

pub fn parse(raw: &str) -> Result<WsUrl, WsError> {
    let url = Url::parse(raw).map_err(|err| WsError::InvalidUrl(err.to_string()))?;

    let tls = match url.scheme() {
        "wss" => true,
        "ws" => false,
        other => return Err(WsError::InvalidUrl(format!("unsupported scheme {other:?}, expected ws or wss"))),
    };

    let host = url.host_str().ok_or_else(|| WsError::InvalidUrl("missing host".to_string()))?.to_string();

    let default_port = if tls { 443 } else { 80 };
    let port = url.port().unwrap_or(default_port);
    if port == 0 {
        return Err(WsError::InvalidPort(u32::from(port)));
    }

    let path = match url.path() {
        "" => "/".to_string(),
        p => p.to_string(),
    };

    Ok(WsUrl { tls, host, port, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wss_with_default_port_and_path() {
        let parsed = parse("wss://example.com").unwrap();
        assert!(parsed.tls);
        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.port, 443);
        assert_eq!(parsed.path, "/");
    }

    #[test]
    fn parses_ws_with_explicit_port_and_path() {
        let parsed = parse("ws://example.com:9001/feed/ticks").unwrap();
        assert!(!parsed.tls);
        assert_eq!(parsed.port, 9001);
        assert_eq!(parsed.path, "/feed/ticks");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(parse("https://example.com").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not a url").is_err());
    }

    #[test]
    fn rejects_zero_port() {
        assert!(matches!(parse("ws://example.com:0/"), Err(WsError::InvalidPort(0))));
    }
}
