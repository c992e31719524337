use async_trait::async_trait;
use sparklet_types::{
    topic::{Topic, TopicFilter},
    StatePayload,
};

use crate::{ClientError, Event, LastWill};

/// The publishing half of a transport connection.
///
/// QoS and retain settings are derived from the [Topic] being published to.
#[async_trait]
pub trait Client {
    /// Disconnects the client.
    async fn disconnect(&self) -> Result<(), ClientError>;

    /// Publishes an encoded payload.
    ///
    /// This method will yield to the async runtime until the message is accepted by the client
    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError>;

    /// Attempts to publish an encoded payload.
    ///
    /// Unlike `publish`, this method may return early if the client cannot process the message
    /// e.g the message queue is full.
    async fn try_publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError>;

    /// Publishes a state message to a host application's STATE topic.
    async fn publish_state_message(
        &self,
        topic: Topic,
        payload: StatePayload,
    ) -> Result<(), ClientError> {
        self.publish(topic, payload.into()).await
    }

    /// Subscribes to a single topic.
    ///
    /// This is a convenience method that calls `subscribe_many` with a single topic.
    async fn subscribe(&self, topic: TopicFilter) -> Result<(), ClientError> {
        self.subscribe_many(vec![topic]).await
    }

    /// Subscribes to multiple topics in a single operation.
    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError>;
}

pub type DynClient = dyn Client + Send + Sync;

/// The receiving half of a transport connection.
#[async_trait]
pub trait EventLoop {
    /// Drive the connection and wait for the next [Event].
    async fn poll(&mut self) -> Event;

    /// Set the last will registered with the transport on the next connect.
    fn set_last_will(&mut self, will: LastWill);
}

pub type DynEventLoop = dyn EventLoop + Send;
