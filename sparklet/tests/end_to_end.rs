use std::time::Duration;

use sparklet::{
    app::{AppEvent, ApplicationBuilder, NodeIdentifier, SubscriptionConfig},
    client::{
        channel::{ChannelBroker, ChannelEventLoop, OutboundMessage},
        Event,
    },
    eon::{CommandTarget, NodeBuilder},
    types::{topic::Topic, ConnectionStatus, Metric, MetricValue},
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::timeout,
};

/// Forward publishes from one in-memory connection to another, standing in for a broker
fn bridge(mut from: ChannelBroker, to: UnboundedSender<Event>, forward: fn(&Topic) -> bool) {
    tokio::spawn(async move {
        while let Some(message) = from.rx_outbound.recv().await {
            match message {
                OutboundMessage::Publish { topic, payload } if forward(&topic) => {
                    let _ = to.send(Event::Message { topic, payload });
                }
                OutboundMessage::Disconnect => break,
                _ => (),
            }
        }
    });
}

async fn wait_for<T, F>(rx: &mut UnboundedReceiver<T>, mut predicate: F) -> T
where
    F: FnMut(&T) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            let item = rx.recv().await.unwrap();
            if predicate(&item) {
                return item;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn node_and_application() {
    let (node_eventloop, node_client, node_broker) = ChannelEventLoop::new();
    let (app_eventloop, app_client, app_broker) = ChannelEventLoop::new();
    let node_events = node_broker.tx_event.clone();
    let app_events = app_broker.tx_event.clone();

    let (command_tx, mut commands) = mpsc::unbounded_channel();
    let (node, node_handle) = NodeBuilder::new(node_eventloop, node_client)
        .with_group_id("G1")
        .with_node_id("E1")
        .with_rebirth_cooldown(Duration::ZERO)
        .with_metrics(vec![Metric::new("temp", 20.0f64)])
        .with_device("D1", vec![Metric::new("level", 1i32)])
        .on_command(move |target, metric| {
            let _ = command_tx.send((target, metric));
        })
        .build()
        .unwrap();

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let (app, app_handle) = ApplicationBuilder::new(app_eventloop, app_client)
        .with_host_id("scada")
        .with_subscription(SubscriptionConfig::SingleGroup {
            group_id: "G1".into(),
        })
        .on_event(move |event| {
            let _ = event_tx.send(event);
        })
        .build()
        .unwrap();

    bridge(node_broker, app_events.clone(), |topic| {
        matches!(topic, Topic::Edge(_))
    });
    bridge(app_broker, node_events.clone(), |topic| match topic {
        Topic::Edge(edge) => edge.kind.as_str().ends_with("CMD"),
        Topic::State { .. } => false,
    });
    tokio::spawn(app.run());
    tokio::spawn(node.run());

    let id = NodeIdentifier::new("G1", "E1");
    app_events.send(Event::Online).unwrap();
    wait_for(&mut events, |e| *e == AppEvent::Online).await;
    node_events.send(Event::Online).unwrap();
    wait_for(&mut events, |e| {
        *e == AppEvent::DeviceBirth(id.clone(), "D1".into())
    })
    .await;
    assert_eq!(app_handle.node_status(&id).unwrap(), ConnectionStatus::Online);
    assert_eq!(app_handle.session(&id).unwrap(), 1);

    node_handle
        .publish(vec![Metric::new("temp", 21.5f64)])
        .await
        .unwrap();
    wait_for(&mut events, |e| *e == AppEvent::NodeData(id.clone())).await;
    let value = app_handle.metric_value(&id, None, "temp").unwrap();
    assert_eq!(value.value, Some(MetricValue::Double(21.5)));
    assert_eq!(value.session, 1);

    node_handle
        .publish_device("D1", vec![Metric::new("level", 5i32)])
        .await
        .unwrap();
    wait_for(&mut events, |e| {
        *e == AppEvent::DeviceData(id.clone(), "D1".into())
    })
    .await;
    let value = app_handle.metric_value(&id, Some("D1"), "level").unwrap();
    assert_eq!(value.value, Some(MetricValue::Int32(5)));

    app_handle
        .publish_device_command(&id, "D1", vec![Metric::new("level", 9i32)])
        .await
        .unwrap();
    let (target, metric) = wait_for(&mut commands, |_| true).await;
    assert_eq!(target, CommandTarget::Device("D1".into()));
    assert_eq!(metric.value, Some(MetricValue::Int32(9)));

    // a rebirth keeps the session and resets the sequence
    app_handle.request_rebirth(&id).await.unwrap();
    wait_for(&mut events, |e| *e == AppEvent::NodeBirth(id.clone())).await;
    wait_for(&mut events, |e| {
        *e == AppEvent::DeviceBirth(id.clone(), "D1".into())
    })
    .await;
    node_handle
        .publish(vec![Metric::new("temp", 22.0f64)])
        .await
        .unwrap();
    wait_for(&mut events, |e| *e == AppEvent::NodeData(id.clone())).await;
    assert_eq!(app_handle.node_status(&id).unwrap(), ConnectionStatus::Online);
    assert_eq!(app_handle.session(&id).unwrap(), 1);

    node_handle.cancel().await;
    wait_for(&mut events, |e| *e == AppEvent::NodeDeath(id.clone())).await;
    assert_eq!(app_handle.node_status(&id).unwrap(), ConnectionStatus::Offline);
    assert_eq!(
        app_handle.device_status(&id, "D1").unwrap(),
        ConnectionStatus::Offline
    );
    assert!(commands.try_recv().is_err());

    app_handle.cancel().await;
}
