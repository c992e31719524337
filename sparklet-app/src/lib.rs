//! Part of sparklet, a Sparkplug client library.
//!
//! The Host Application engine: tracks the liveness and last values of every node and device in
//! the subscribed part of the namespace and issues commands to them.

mod app;
mod builder;
mod config;
mod error;
mod liveness;
mod record;
mod sequence;

use std::fmt::Display;

pub use app::{AppEvent, AppHandle, Application, EventCallback};
pub use builder::ApplicationBuilder;
pub use config::{ApplicationConfig, NamespaceSubConfig, SubscriptionConfig};
pub use error::{CommandError, ConfigError, QueryError};
pub use liveness::{LivenessTracker, Rejection};
pub use record::{DeviceSnapshot, MetricSnapshot, NodeSnapshot};

/// Used to uniquely identify a node
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct NodeIdentifier {
    pub group: String,
    pub node: String,
}

impl NodeIdentifier {
    pub fn new<S: Into<String>, T: Into<String>>(group: S, node: T) -> Self {
        Self {
            group: group.into(),
            node: node.into(),
        }
    }
}

impl Display for NodeIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.node)
    }
}
