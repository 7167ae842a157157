use riftline_timing::{Duration, Instant};

/// The three cycle-counter readings captured per inbound message, plus the
/// optional NIC hardware receive timestamp, from which latency breakdowns
/// are derived. A fresh `MessageTimestamps` is produced by every `update`
/// pass that delivers at least one message; [`WsContext::timestamps`]
/// returns the latest one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageTimestamps {
    /// Entry into the `update` pass that delivered the message.
    pub t_event: Instant,
    /// Immediately after the first successful decrypt yielded bytes.
    pub t_decrypt: Instant,
    /// First instruction of the application callback.
    pub t_callback: Instant,
    /// NIC hardware (or software-fallback) receive timestamp, nanoseconds
    /// since the epoch, when hardware timestamping is enabled.
    pub t_nic: Option<u64>,
}

impl MessageTimestamps {
    /// Kernel-to-decrypt latency.
    pub fn decrypt_latency(&self) -> Duration {
        self.t_decrypt.saturating_duration_since(self.t_event)
    }

    /// Decrypt-to-callback latency.
    pub fn callback_latency(&self) -> Duration {
        self.t_callback.saturating_duration_since(self.t_decrypt)
    }

    /// End-to-end kernel-to-callback latency.
    pub fn total_latency(&self) -> Duration {
        self.t_callback.saturating_duration_since(self.t_event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latencies_are_non_negative_for_in_order_stamps() {
        let t_event = Instant::now();
        let t_decrypt = Instant::now();
        let t_callback = Instant::now();
        let ts = MessageTimestamps { t_event, t_decrypt, t_callback, t_nic: None };
        assert!(ts.decrypt_latency() <= ts.total_latency());
        assert!(ts.callback_latency() <= ts.total_latency());
    }
}
