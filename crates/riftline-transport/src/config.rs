//! Environment-driven transport configuration. Read once at transport
//! construction — this profile has no config-file layer, matching the
//! reference crate's convention of reading a handful of env vars directly
//! rather than pulling in a config framework.

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Forces the handshake to TLS 1.3, which disables kernel-offload
    /// activation in this profile.
    pub force_tls13: bool,
    /// Overrides the default TLS 1.3 ciphersuite list (comma-separated).
    pub tls13_ciphersuites: Option<String>,
    /// Overrides the default TLS 1.2 ciphersuite list (comma-separated).
    pub cipher_list: Option<String>,
    /// Enables hardware receive timestamping. Mutually exclusive with
    /// kernel-offload activation in this profile.
    pub enable_hw_timestamps: bool,
    /// Widens `tracing::debug!` call sites for general transport activity.
    pub debug: bool,
    /// Widens `tracing::debug!` call sites for kTLS activation specifically.
    pub debug_ktls: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            force_tls13: env_flag("WS_FORCE_TLS13"),
            tls13_ciphersuites: std::env::var("WS_TLS13_CIPHERSUITES").ok(),
            cipher_list: std::env::var("WS_CIPHER_LIST").ok(),
            enable_hw_timestamps: env_flag("WS_ENABLE_HW_TIMESTAMPS"),
            debug: env_flag("WS_DEBUG"),
            debug_ktls: env_flag("WS_DEBUG_KTLS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_all_off() {
        let cfg = Config { force_tls13: false, ..Default::default() };
        assert!(!cfg.force_tls13);
        assert!(!cfg.enable_hw_timestamps);
    }
}
