use std::sync::Arc;

use crate::{ClientError, Event, LastWill};
use async_trait::async_trait;
use parking_lot::Mutex;
use sparklet_types::topic::{Topic, TopicFilter};
use tokio::sync::mpsc;

/// A [Client](crate::Client) implementation that uses channels for message passing.
///
/// # Examples
///
/// See [ChannelEventLoop]
#[derive(Clone)]
pub struct ChannelClient {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelClient {
    fn send(&self, message: OutboundMessage) -> Result<(), ClientError> {
        self.tx.send(message).map_err(|_| ClientError::Disconnected)
    }
}

#[async_trait]
impl crate::Client for ChannelClient {
    async fn disconnect(&self) -> Result<(), ClientError> {
        self.send(OutboundMessage::Disconnect)
    }

    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        self.send(OutboundMessage::Publish { topic, payload })
    }

    async fn try_publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        self.publish(topic, payload).await
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError> {
        self.send(OutboundMessage::Subscribe(topics))
    }
}

/// An Enum representing different messages and requests a [ChannelClient] can send to the [ChannelBroker]
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    Disconnect,
    Publish { topic: Topic, payload: Vec<u8> },
    Subscribe(Vec<TopicFilter>),
}

/// A "broker" that manages the communication between a [ChannelClient] and an [ChannelEventLoop].
///
/// Used to send messages to the eventloop and inspect messages/requests produced by the client
///
/// # Examples
///
/// ```no_run
/// use sparklet_client::{Event, channel::ChannelEventLoop};
/// use tokio::runtime::Runtime;
///
/// let rt = Runtime::new().unwrap();
/// rt.block_on(async {
///     let (mut eventloop, client, mut broker) = ChannelEventLoop::new();
///
///     //create application that uses the EventLoop and client
///
///     //Send an event to the EventLoop
///     broker.tx_event.send(Event::Online).unwrap();
///
///     //Receive a message or request from the Client
///     let message = broker.rx_outbound.recv().await.unwrap();
/// });
/// ```
pub struct ChannelBroker {
    pub rx_outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    pub tx_event: mpsc::UnboundedSender<Event>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

impl ChannelBroker {
    /// Retrieves the current last will message set by the EventLoop, if set.
    pub fn last_will(&self) -> Option<LastWill> {
        self.last_will.lock().clone()
    }

    /// Deliver a publish to the event loop as if it had been received from the transport.
    pub fn deliver(&self, topic: Topic, payload: Vec<u8>) {
        // the event loop being gone is not an error for a test broker
        let _ = self.tx_event.send(Event::Message { topic, payload });
    }
}

/// An [EventLoop](crate::EventLoop) implementation that uses channels
///
/// # Examples
///
/// See [ChannelBroker]
pub struct ChannelEventLoop {
    rx: mpsc::UnboundedReceiver<Event>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

impl ChannelEventLoop {
    /// Creates a new event loop along with the corresponding client and broker.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, ChannelClient, ChannelBroker) {
        let (tx_event, rx_event) = mpsc::unbounded_channel();
        let (tx_outbound, rx_outbound) = mpsc::unbounded_channel();
        let last_will = Arc::new(Mutex::new(None));
        let el = Self {
            rx: rx_event,
            last_will: last_will.clone(),
        };
        (
            el,
            ChannelClient { tx: tx_outbound },
            ChannelBroker {
                rx_outbound,
                tx_event,
                last_will,
            },
        )
    }
}

#[async_trait]
impl crate::EventLoop for ChannelEventLoop {
    async fn poll(&mut self) -> Event {
        match self.rx.recv().await {
            Some(event) => event,
            // broker dropped, nothing will ever arrive
            None => std::future::pending().await,
        }
    }

    fn set_last_will(&mut self, will: LastWill) {
        *self.last_will.lock() = Some(will)
    }
}
