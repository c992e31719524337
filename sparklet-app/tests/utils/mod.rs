#![allow(dead_code)]

pub mod payloads;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use sparklet_app::{AppEvent, AppHandle, ApplicationBuilder, SubscriptionConfig};
use sparklet_client::{
    channel::{ChannelBroker, ChannelClient, ChannelEventLoop, OutboundMessage},
    Client, ClientError, Event,
};
use sparklet_types::{
    topic::{Topic, TopicFilter},
    StatePayload,
};
use tokio::{sync::mpsc, time::timeout};

pub const HOST: &str = "scada";

pub struct TestApp {
    pub broker: ChannelBroker,
    pub events: mpsc::UnboundedReceiver<AppEvent>,
    pub handle: AppHandle,
}

impl TestApp {
    pub async fn next_event(&mut self) -> AppEvent {
        timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("timed out waiting for app event")
            .unwrap()
    }

    pub async fn next_outbound(&mut self) -> OutboundMessage {
        timeout(Duration::from_secs(1), self.broker.rx_outbound.recv())
            .await
            .expect("timed out waiting for outbound message")
            .expect("client dropped")
    }

    pub fn assert_no_outbound(&mut self) {
        if let Ok(message) = self.broker.rx_outbound.try_recv() {
            panic!("unexpected outbound message {message:?}")
        }
    }

    /// Receive the next publish on the application's STATE topic
    pub async fn next_state(&mut self) -> StatePayload {
        match self.next_outbound().await {
            OutboundMessage::Publish {
                topic: Topic::State { host_id },
                payload,
            } => {
                assert_eq!(host_id, HOST);
                StatePayload::try_from(payload.as_slice()).unwrap()
            }
            message => panic!("expected STATE publish, got {message:?}"),
        }
    }

    /// Send Online and consume the subscription and STATE messages that follow
    pub async fn bring_online(&mut self) {
        self.broker.tx_event.send(Event::Online).unwrap();
        assert!(matches!(
            self.next_outbound().await,
            OutboundMessage::Subscribe(_)
        ));
        assert!(self.next_state().await.online);
        assert_eq!(self.next_event().await, AppEvent::Online);
    }

    pub fn deliver(&self, topic: Topic, payload: Vec<u8>) {
        self.broker.deliver(topic, payload)
    }
}

pub fn builder() -> (ApplicationBuilder, ChannelBroker) {
    let (eventloop, client, broker) = ChannelEventLoop::new();
    (configure(ApplicationBuilder::new(eventloop, client)), broker)
}

/// A builder whose client fails the first `subscribe_failures` subscribes
pub fn flaky_builder(subscribe_failures: usize) -> (ApplicationBuilder, ChannelBroker, FlakyClient) {
    let (eventloop, client, broker) = ChannelEventLoop::new();
    let client = FlakyClient {
        inner: client,
        subscribe_failures: Arc::new(AtomicUsize::new(subscribe_failures)),
    };
    let builder = configure(ApplicationBuilder::new(eventloop, client.clone()))
        .with_reconnect_backoff(Duration::from_millis(200));
    (builder, broker, client)
}

fn configure(builder: ApplicationBuilder) -> ApplicationBuilder {
    builder
        .with_host_id(HOST)
        .with_subscription(SubscriptionConfig::SingleGroup {
            group_id: "G1".into(),
        })
        .with_reconnect_backoff(Duration::from_millis(10))
        .with_auto_rebirth(false)
}

/// Build and spawn an application
pub fn start(builder: ApplicationBuilder, broker: ChannelBroker) -> TestApp {
    let (tx, events) = mpsc::unbounded_channel();
    let (app, handle) = builder
        .on_event(move |event| {
            let _ = tx.send(event);
        })
        .build()
        .unwrap();
    tokio::spawn(app.run());
    TestApp {
        broker,
        events,
        handle,
    }
}

/// A channel client whose subscribes time out a configurable number of times
#[derive(Clone)]
pub struct FlakyClient {
    inner: ChannelClient,
    pub subscribe_failures: Arc<AtomicUsize>,
}

impl FlakyClient {
    /// Wait until every injected failure has been consumed
    pub async fn failures_consumed(&self) {
        timeout(Duration::from_secs(1), async {
            while self.subscribe_failures.load(Ordering::SeqCst) > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("injected failure was never hit")
    }
}

#[async_trait]
impl Client for FlakyClient {
    async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.disconnect().await
    }

    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        self.inner.publish(topic, payload).await
    }

    async fn try_publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        self.inner.try_publish(topic, payload).await
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError> {
        let failed = self
            .subscribe_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ClientError::Timeout);
        }
        self.inner.subscribe_many(topics).await
    }
}
