use std::time::Duration;

use serde::Deserialize;
use sparklet_types::{topic::TopicFilter, utils::validate_name, Revision};

use crate::error::ConfigError;

/// A part of the namespace to subscribe to
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceSubConfig {
    Group { group_id: String },
    Node { group_id: String, node_id: String },
}

/// Which nodes the application tracks
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionConfig {
    #[default]
    AllGroups,
    SingleGroup {
        group_id: String,
    },
    Custom(Vec<NamespaceSubConfig>),
}

impl SubscriptionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let check = |name: &str| validate_name(name).map_err(ConfigError::InvalidSubscription);
        match self {
            SubscriptionConfig::AllGroups => Ok(()),
            SubscriptionConfig::SingleGroup { group_id } => check(group_id),
            SubscriptionConfig::Custom(configs) => {
                if configs.is_empty() {
                    return Err(ConfigError::InvalidSubscription(
                        "custom subscription must not be empty".into(),
                    ));
                }
                for config in configs {
                    match config {
                        NamespaceSubConfig::Group { group_id } => check(group_id)?,
                        NamespaceSubConfig::Node { group_id, node_id } => {
                            check(group_id)?;
                            check(node_id)?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Topic filters covering the configured part of the namespace
    pub fn filters(&self, revision: Revision) -> Vec<TopicFilter> {
        match self {
            SubscriptionConfig::AllGroups => vec![TopicFilter::namespace(revision)],
            SubscriptionConfig::SingleGroup { group_id } => {
                vec![TopicFilter::group(revision, group_id)]
            }
            SubscriptionConfig::Custom(configs) => configs
                .iter()
                .map(|config| match config {
                    NamespaceSubConfig::Group { group_id } => TopicFilter::group(revision, group_id),
                    NamespaceSubConfig::Node { group_id, node_id } => {
                        TopicFilter::node(revision, group_id, node_id)
                    }
                })
                .collect(),
        }
    }
}

fn default_reconnect_backoff_ms() -> u64 {
    1000
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

fn default_auto_rebirth() -> bool {
    true
}

fn default_rebirth_cooldown_ms() -> u64 {
    5000
}

/// Host Application configuration.
///
/// Can be deserialised from JSON, durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub revision: Revision,
    pub host_id: String,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Request a rebirth from nodes that are marked stale or send data before a birth
    #[serde(default = "default_auto_rebirth")]
    pub auto_rebirth: bool,
    /// Minimum time between two rebirth requests to the same node
    #[serde(default = "default_rebirth_cooldown_ms")]
    pub rebirth_cooldown_ms: u64,
}

impl ApplicationConfig {
    pub fn new<S: Into<String>>(host_id: S) -> Self {
        Self {
            revision: Revision::default(),
            host_id: host_id.into(),
            subscription: SubscriptionConfig::default(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            auto_rebirth: default_auto_rebirth(),
            rebirth_cooldown_ms: default_rebirth_cooldown_ms(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_id.is_empty() {
            return Err(ConfigError::MissingHostId);
        }
        validate_name(&self.host_id).map_err(ConfigError::InvalidHostId)?;
        self.subscription.validate()?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults() {
        let config = ApplicationConfig::from_json(r#"{"host_id": "scada"}"#).unwrap();
        assert_eq!(config, ApplicationConfig::new("scada"));
        assert_eq!(config.subscription, SubscriptionConfig::AllGroups);
        assert!(config.auto_rebirth);
    }

    #[test]
    fn json_subscriptions() {
        let config = ApplicationConfig::from_json(
            r#"{"host_id": "scada", "subscription": {"single_group": {"group_id": "G1"}}}"#,
        )
        .unwrap();
        assert_eq!(
            config.subscription.filters(Revision::B),
            vec![TopicFilter::new("spBv1.0/G1/#")]
        );

        let config = ApplicationConfig::from_json(
            r#"{
                "host_id": "scada",
                "revision": "A",
                "subscription": {"custom": [
                    {"group": {"group_id": "G1"}},
                    {"node": {"group_id": "G2", "node_id": "E1"}}
                ]}
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.subscription.filters(config.revision),
            vec![
                TopicFilter::new("spAv1.0/G1/#"),
                TopicFilter::new("spAv1.0/G2/+/E1/#")
            ]
        );
    }

    #[test]
    fn invalid_configs() {
        assert!(matches!(
            ApplicationConfig::new("").validate(),
            Err(ConfigError::MissingHostId)
        ));
        assert!(matches!(
            ApplicationConfig::new("a/b").validate(),
            Err(ConfigError::InvalidHostId(_))
        ));
        let mut config = ApplicationConfig::new("scada");
        config.subscription = SubscriptionConfig::SingleGroup {
            group_id: "#".into(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSubscription(_))
        ));
        let mut config = ApplicationConfig::new("scada");
        config.operation_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration(_))
        ));
    }
}
