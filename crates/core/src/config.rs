// Bridge configuration

use crate::error::Result;
use serde::Deserialize;

/// What to do with a transport command issued while still connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingCommandPolicy {
    /// Reject and forget it
    #[default]
    Drop,
    /// Reject, but remember the latest one and send it once connected
    ReplayLatest,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Clear cached status and metadata when leaving `Connected`
    /// instead of keeping the last known values
    pub clear_on_disconnect: bool,
    pub pending_commands: PendingCommandPolicy,
    /// Minimum interval between position-only updates per listener (0 = off)
    pub position_throttle_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            clear_on_disconnect: false,
            pending_commands: PendingCommandPolicy::Drop,
            position_throttle_ms: 0,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(text)?;
        log::debug!("loaded bridge config: {:?}", config);
        Ok(config)
    }
}
