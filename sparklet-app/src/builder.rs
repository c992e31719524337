use std::{sync::Arc, time::Duration};

use sparklet_client::{Client, DynClient, DynEventLoop, EventLoop};
use sparklet_types::Revision;

use crate::{
    app::{AppEvent, AppHandle, Application, EventCallback},
    config::{ApplicationConfig, SubscriptionConfig},
    error::ConfigError,
};

/// A builder for creating and configuring [Application] instances.
pub struct ApplicationBuilder {
    config: ApplicationConfig,
    eventloop_client: (Box<DynEventLoop>, Arc<DynClient>),
    callback: Option<Box<EventCallback>>,
}

impl ApplicationBuilder {
    /// Creates a new builder with the specified event loop and client.
    ///
    /// The host id must be provided before calling [ApplicationBuilder::build].
    pub fn new<E: EventLoop + Send + 'static, C: Client + Send + Sync + 'static>(
        eventloop: E,
        client: C,
    ) -> Self {
        Self {
            config: ApplicationConfig::new(""),
            eventloop_client: (Box::new(eventloop), Arc::new(client)),
            callback: None,
        }
    }

    /// Replace the whole configuration, e.g. with one loaded through [ApplicationConfig::from_json]
    pub fn with_config(mut self, config: ApplicationConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the host application id. The application publishes its state on `STATE/<host_id>`.
    pub fn with_host_id<S: Into<String>>(mut self, host_id: S) -> Self {
        self.config.host_id = host_id.into();
        self
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.config.revision = revision;
        self
    }

    /// Sets which part of the namespace is tracked. Defaults to [SubscriptionConfig::AllGroups]
    pub fn with_subscription(mut self, subscription: SubscriptionConfig) -> Self {
        self.config.subscription = subscription;
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

    /// Enable or disable automatic rebirth requests to nodes whose state cannot be trusted
    pub fn with_auto_rebirth(mut self, enabled: bool) -> Self {
        self.config.auto_rebirth = enabled;
        self
    }

    pub fn with_rebirth_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.rebirth_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    /// Set the callback invoked for every [AppEvent].
    ///
    /// The callback is called from the application's event loop and should not block.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(AppEvent) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Builds the [Application] and its associated [AppHandle].
    pub fn build(self) -> Result<(Application, AppHandle), ConfigError> {
        let (eventloop, client) = self.eventloop_client;
        Application::new(self.config, self.callback, eventloop, client)
    }
}
