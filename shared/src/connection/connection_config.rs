use std::default::Default;

use crate::connection::{link_conditioner::LinkConditionerConfig, rate::RatePrefs};

/// Contains Config properties which will be used by a NetConnection
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Milliseconds without an acknowledged packet before a Ping is sent
    pub ping_timeout_ms: u32,
    /// Unanswered Pings after which the connection counts as timed out
    pub ping_retry_count: u32,
    /// Largest carried-over send delay, so a stalled tick loop cannot burst
    pub send_delay_credit_cap_ms: u32,
    /// Packet rate and size preferences, clamped on use
    pub rate_prefs: RatePrefs,
    /// Refuse every file download request from the peer
    pub never_upload_files: bool,
    /// Never request missing files from the peer
    pub never_download_files: bool,
    /// Simulated packet loss and latency for outgoing packets
    pub link_conditioner: Option<LinkConditionerConfig>,
    /// Seed for the packet loss simulation; random when unset
    pub rng_seed: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_timeout_ms: 4500,
            ping_retry_count: 15,
            send_delay_credit_cap_ms: 1000,
            rate_prefs: RatePrefs::default(),
            never_upload_files: false,
            never_download_files: false,
            link_conditioner: None,
            rng_seed: None,
        }
    }
}
