use std::{sync::Arc, time::Duration};

use sparklet_client::{Client, DynClient, DynEventLoop, EventLoop};
use sparklet_types::{Metric, Revision};

use crate::{
    config::NodeConfig,
    error::ConfigError,
    node::{CommandCallback, CommandTarget},
    EdgeNode, NodeHandle,
};

/// A builder for creating and configuring [EdgeNode] instances.
pub struct NodeBuilder {
    config: NodeConfig,
    eventloop_client: (Box<DynEventLoop>, Arc<DynClient>),
    metrics: Vec<Metric>,
    devices: Vec<(String, Vec<Metric>)>,
    callback: Option<Box<CommandCallback>>,
}

impl NodeBuilder {
    /// Creates a new builder with the specified event loop and client.
    ///
    /// The group and node ids must be provided before calling [NodeBuilder::build].
    pub fn new<E: EventLoop + Send + 'static, C: Client + Send + Sync + 'static>(
        eventloop: E,
        client: C,
    ) -> Self {
        Self {
            config: NodeConfig::new("", ""),
            eventloop_client: (Box::new(eventloop), Arc::new(client)),
            metrics: Vec::new(),
            devices: Vec::new(),
            callback: None,
        }
    }

    /// Replace the whole configuration, e.g. with one loaded through [NodeConfig::from_json]
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the group ID the node belongs to.
    pub fn with_group_id<S: Into<String>>(mut self, group_id: S) -> Self {
        self.config.group_id = group_id.into();
        self
    }

    /// Sets the node ID. It uniquely identifies this node within its group.
    pub fn with_node_id<S: Into<String>>(mut self, node_id: S) -> Self {
        self.config.node_id = node_id.into();
        self
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.config.revision = revision;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.config.reconnect_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_rebirth_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.rebirth_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    /// Set the metrics declared in the node birth certificate. Their values are the initial values published.
    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register a device that is birthed together with the node.
    pub fn with_device<S: Into<String>>(mut self, device_id: S, metrics: Vec<Metric>) -> Self {
        self.devices.push((device_id.into(), metrics));
        self
    }

    /// Set the callback invoked for each metric of an accepted NCMD or DCMD.
    pub fn on_command<F>(mut self, callback: F) -> Self
    where
        F: Fn(CommandTarget, Metric) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Builds the [EdgeNode] and its associated [NodeHandle].
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn build(self) -> Result<(EdgeNode, NodeHandle), ConfigError> {
        let (eventloop, client) = self.eventloop_client;
        EdgeNode::new(
            self.config,
            self.metrics,
            self.devices,
            self.callback,
            eventloop,
            client,
        )
    }
}
