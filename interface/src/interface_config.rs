use ghostnet_shared::ConnectionConfig;

/// Contains Config properties which will be used by a NetInterface
#[derive(Clone, Debug)]
pub struct InterfaceConfig {
    /// Whether connect challenges from unknown addresses are answered
    pub allow_connections: bool,
    /// Times each handshake step is resent before the attempt times out
    pub connect_retry_count: u32,
    /// Milliseconds between handshake resends
    pub connect_retry_interval_ms: u32,
    /// Milliseconds between timeout checks of established connections
    pub timeout_check_interval_ms: u32,
    /// Used to configure connections the interface creates for new peers
    pub connection: ConnectionConfig,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            allow_connections: true,
            connect_retry_count: 4,
            connect_retry_interval_ms: 2500,
            timeout_check_interval_ms: 1500,
            connection: ConnectionConfig::default(),
        }
    }
}
