use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use sparklet_client::{
    channel::{ChannelBroker, ChannelClient, OutboundMessage},
    Client, ClientError, Event,
};
use sparklet_types::{
    codec_for,
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    topic::{EdgeTopic, MessageKind, Topic, TopicFilter},
    utils::bdseq_from_metrics,
    Metric, MetricValue, Revision, SessionMeta,
};
use tokio::time::timeout;

pub async fn next_outbound(broker: &mut ChannelBroker) -> OutboundMessage {
    timeout(Duration::from_secs(1), broker.rx_outbound.recv())
        .await
        .expect("timed out waiting for outbound message")
        .expect("client dropped")
}

pub fn assert_no_outbound(broker: &mut ChannelBroker) {
    if let Ok(message) = broker.rx_outbound.try_recv() {
        panic!("unexpected outbound message {message:?}")
    }
}

/// Receive the next publish, check its kind and decode it
pub async fn expect_publish(
    broker: &mut ChannelBroker,
    revision: Revision,
    kind: MessageKind,
) -> (EdgeTopic, Vec<Metric>, SessionMeta) {
    let (topic, payload) = match next_outbound(broker).await {
        OutboundMessage::Publish { topic, payload } => (topic, payload),
        message => panic!("expected {kind:?} publish, got {message:?}"),
    };
    let edge = match topic {
        Topic::Edge(edge) => edge,
        topic => panic!("expected edge topic, got {topic}"),
    };
    assert_eq!(edge.kind, kind);
    assert_eq!(edge.revision, revision);
    let (metrics, meta) = codec_for(revision).decode(&payload).unwrap();
    (edge, metrics, meta)
}

pub fn encode_command(metrics: &[Metric]) -> Vec<u8> {
    codec_for(Revision::B)
        .encode(metrics, &SessionMeta::default())
        .unwrap()
}

pub fn node_cmd_topic(group_id: &str, node_id: &str) -> Topic {
    Topic::build(Revision::B, MessageKind::NCmd, group_id, node_id, None).unwrap()
}

pub fn device_cmd_topic(group_id: &str, node_id: &str, device_id: &str) -> Topic {
    Topic::build(
        Revision::B,
        MessageKind::DCmd,
        group_id,
        node_id,
        Some(device_id),
    )
    .unwrap()
}

pub fn verify_nbirth(metrics: &[Metric], meta: &SessionMeta, expected_bdseq: u64) {
    assert_eq!(meta.seq, Some(0));
    assert!(meta.timestamp.is_some());
    assert_eq!(bdseq_from_metrics(metrics), Some(expected_bdseq));
    let rebirth = metrics
        .iter()
        .find(|m| m.name() == Some(NODE_CONTROL_REBIRTH))
        .expect("birth must declare the rebirth metric");
    assert_eq!(rebirth.value, Some(MetricValue::Boolean(false)));
    for metric in metrics {
        assert!(metric.name.is_some(), "birth metrics must be named");
    }
}

/// Send Online and verify the subscription and node birth that follow
pub async fn bring_online(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    expected_bdseq: u64,
) -> Vec<Metric> {
    broker.tx_event.send(Event::Online).unwrap();
    let filters = match next_outbound(broker).await {
        OutboundMessage::Subscribe(filters) => filters,
        message => panic!("expected subscribe, got {message:?}"),
    };
    assert_eq!(
        filters,
        vec![
            TopicFilter::node_commands(Revision::B, group_id, node_id),
            TopicFilter::device_commands(Revision::B, group_id, node_id),
        ]
    );

    let (topic, metrics, meta) = expect_publish(broker, Revision::B, MessageKind::NBirth).await;
    assert_eq!(topic.group_id, group_id);
    assert_eq!(topic.node_id, node_id);
    verify_nbirth(&metrics, &meta, expected_bdseq);
    metrics
}

pub async fn verify_ndeath(broker: &mut ChannelBroker, revision: Revision, expected_bdseq: u64) {
    let (_, metrics, meta) = expect_publish(broker, revision, MessageKind::NDeath).await;
    assert_eq!(meta.seq, None);
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].name(), Some(BDSEQ));
    assert_eq!(bdseq_from_metrics(&metrics), Some(expected_bdseq));
}

/// A channel client whose subscribes and publishes time out a configurable number of times
#[derive(Clone)]
pub struct FlakyClient {
    inner: ChannelClient,
    pub subscribe_failures: Arc<AtomicUsize>,
    pub publish_failures: Arc<AtomicUsize>,
}

impl FlakyClient {
    pub fn new(inner: ChannelClient) -> Self {
        Self {
            inner,
            subscribe_failures: Arc::new(AtomicUsize::new(0)),
            publish_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fail(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Client for FlakyClient {
    async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.disconnect().await
    }

    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        if Self::fail(&self.publish_failures) {
            return Err(ClientError::Timeout);
        }
        self.inner.publish(topic, payload).await
    }

    async fn try_publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        self.publish(topic, payload).await
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError> {
        if Self::fail(&self.subscribe_failures) {
            return Err(ClientError::Timeout);
        }
        self.inner.subscribe_many(topics).await
    }
}

/// Wait until every injected failure of `counter` has been consumed
pub async fn failures_consumed(counter: &AtomicUsize) {
    timeout(Duration::from_secs(1), async {
        while counter.load(Ordering::SeqCst) > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("injected failure was never hit")
}
