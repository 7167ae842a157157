//! Process-wide, one-shot TLS client configuration.
//!
//! Mirrors the reference crate's `flux-timing::global_clock` pattern: a
//! lazily-initialized, immutable, process-scoped value behind
//! `once_cell::sync::OnceCell`. Session caching is off and certificate
//! verification is disabled (see [`crate::danger`]) to keep handshake
//! timing deterministic and repeatable across connections.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use rustls::{ClientConfig, SupportedCipherSuite, crypto::CryptoProvider, crypto::ring::cipher_suite as cs};

use crate::{config::Config, danger::AcceptAnyServerCert};

static CLIENT_CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();

/// Keeps only the suites whose name contains one of `csv`'s comma-separated,
/// case-insensitive fragments (matching either direction, so both a full
/// name and a short fragment like `CHACHA20` work). An empty/unparseable
/// `csv` leaves `suites` untouched.
fn filter_suites(suites: Vec<SupportedCipherSuite>, csv: &str) -> Vec<SupportedCipherSuite> {
    let wanted: Vec<String> =
        csv.split(',').map(|s| s.trim().to_ascii_uppercase()).filter(|s| !s.is_empty()).collect();
    if wanted.is_empty() {
        return suites;
    }
    let filtered: Vec<_> = suites
        .iter()
        .filter(|s| {
            s.suite().as_str().is_some_and(|name| {
                let name = name.to_ascii_uppercase();
                wanted.iter().any(|w| name.contains(w.as_str()) || w.contains(name.as_str()))
            })
        })
        .copied()
        .collect();
    if filtered.is_empty() {
        tracing::warn!(csv, "cipher suite override matched nothing; keeping the default list");
        return suites;
    }
    filtered
}

/// AES-GCM first (hardware AES-NI / ARMv8 crypto acceleration is near
/// universal), ChaCha20-Poly1305 second (the software-friendly fallback) —
/// both AEAD, both kTLS-offloadable. `WS_TLS13_CIPHERSUITES`/`WS_CIPHER_LIST`
/// narrow the 1.3/1.2 lists independently before they're concatenated.
fn preferred_provider(cfg: &Config) -> CryptoProvider {
    let mut provider = rustls::crypto::ring::default_provider();

    let tls13_suites =
        vec![cs::TLS13_AES_128_GCM_SHA256, cs::TLS13_AES_256_GCM_SHA384, cs::TLS13_CHACHA20_POLY1305_SHA256];
    let tls12_suites = vec![
        cs::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        cs::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        cs::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        cs::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        cs::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        cs::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ];

    let tls13_suites = match &cfg.tls13_ciphersuites {
        Some(csv) => filter_suites(tls13_suites, csv),
        None => tls13_suites,
    };
    let tls12_suites = match &cfg.cipher_list {
        Some(csv) => filter_suites(tls12_suites, csv),
        None => tls12_suites,
    };

    provider.cipher_suites = tls13_suites.into_iter().chain(tls12_suites).collect();
    provider
}

fn build(cfg: &Config) -> Arc<ClientConfig> {
    let provider = Arc::new(preferred_provider(cfg));
    let versions: &[&rustls::SupportedProtocolVersion] =
        if cfg.force_tls13 { &[&rustls::version::TLS13] } else { rustls::ALL_VERSIONS };

    let builder = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)
        .expect("the ring provider's reordered suite list supports both TLS versions");

    let mut config = builder
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
        .with_no_client_auth();

    config.enable_sni = true;
    config.resumption = rustls::client::Resumption::disabled();
    config.enable_early_data = false;

    Arc::new(config)
}

/// Returns the process-wide `ClientConfig`, building it from `cfg` on first
/// call. Subsequent calls ignore `cfg` and return the already-built config,
/// matching the "one-shot guard" the spec's concurrency model describes.
pub fn client_config(cfg: &Config) -> Arc<ClientConfig> {
    CLIENT_CONFIG.get_or_init(|| build(cfg)).clone()
}
