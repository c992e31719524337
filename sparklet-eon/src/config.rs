use std::time::Duration;

use serde::Deserialize;
use sparklet_types::{utils::validate_name, Revision};

use crate::error::ConfigError;

fn default_reconnect_backoff_ms() -> u64 {
    1000
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

fn default_rebirth_cooldown_ms() -> u64 {
    5000
}

/// Edge Node configuration.
///
/// Can be deserialised from JSON, durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub revision: Revision,
    pub group_id: String,
    pub node_id: String,
    /// Time to wait after losing the connection before the next connect cycle
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// Upper bound on every transport operation
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Minimum time between two rebirths requested by a `Node Control/Rebirth` command
    #[serde(default = "default_rebirth_cooldown_ms")]
    pub rebirth_cooldown_ms: u64,
}

impl NodeConfig {
    pub fn new<S: Into<String>, T: Into<String>>(group_id: S, node_id: T) -> Self {
        Self {
            revision: Revision::default(),
            group_id: group_id.into(),
            node_id: node_id.into(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            rebirth_cooldown_ms: default_rebirth_cooldown_ms(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_id.is_empty() {
            return Err(ConfigError::MissingGroupId);
        }
        if self.node_id.is_empty() {
            return Err(ConfigError::MissingNodeId);
        }
        validate_name(&self.group_id).map_err(ConfigError::InvalidName)?;
        validate_name(&self.node_id).map_err(ConfigError::InvalidName)?;
        if self.reconnect_backoff_ms == 0 {
            return Err(ConfigError::ZeroDuration("reconnect backoff"));
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("operation timeout"));
        }
        Ok(())
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn rebirth_cooldown(&self) -> Duration {
        Duration::from_millis(self.rebirth_cooldown_ms)
    }
}
