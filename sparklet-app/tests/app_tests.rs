mod utils;

use sparklet_app::{AppEvent, CommandError, NodeIdentifier, QueryError, Rejection};
use sparklet_client::{channel::OutboundMessage, Event};
use sparklet_types::{
    codec_for,
    topic::{MessageKind, QoS, Topic, TopicFilter},
    ConnectionStatus, Metric, MetricValue, Revision, StatePayload,
};
use std::time::Duration;
use utils::{
    builder,
    payloads::{
        assert_payload_is_rebirth_request, device_topic, new_data_payload, new_nbirth_payload,
        new_ndeath_payload, node_id, node_topic, GROUP, NODE,
    },
    flaky_builder, start, TestApp, HOST,
};

async fn birth_node(app: &mut TestApp, session: u64) {
    app.deliver(
        node_topic(MessageKind::NBirth),
        new_nbirth_payload(session, vec![Metric::new("temp", 20.0f64)]),
    );
    assert_eq!(app.next_event().await, AppEvent::NodeBirth(node_id()));
}

fn expect_rejection(event: AppEvent) -> Rejection {
    match event {
        AppEvent::Rejected { reason, .. } => reason,
        event => panic!("expected rejection, got {event:?}"),
    }
}

#[tokio::test]
async fn app_states() {
    let (builder, broker) = builder();
    let mut app = start(builder, broker);

    app.broker.tx_event.send(Event::Online).unwrap();
    let filters = match app.next_outbound().await {
        OutboundMessage::Subscribe(filters) => filters,
        message => panic!("got {message:?}"),
    };
    assert_eq!(
        filters,
        vec![
            TopicFilter::group(Revision::B, GROUP),
            TopicFilter::state(HOST)
        ]
    );

    let will = app.broker.last_will().unwrap();
    assert!(will.retain);
    assert_eq!(will.qos, QoS::AtLeastOnce);
    assert_eq!(will.topic, format!("STATE/{HOST}"));
    let will_payload = StatePayload::try_from(will.payload.as_slice()).unwrap();
    assert!(!will_payload.online);

    // the online message carries the will's timestamp
    let state = app.next_state().await;
    assert_eq!(state, StatePayload::online(will_payload.timestamp));
    assert_eq!(app.next_event().await, AppEvent::Online);
    assert!(app.handle.is_online());

    // another host going offline is not our concern
    app.deliver(
        Topic::state("other").unwrap(),
        StatePayload::offline(0).into(),
    );
    // our own state reported offline is corrected
    app.deliver(
        Topic::state(HOST).unwrap(),
        StatePayload::offline(0).into(),
    );
    let state = app.next_state().await;
    assert_eq!(state, StatePayload::online(will_payload.timestamp));

    app.handle.cancel().await;
    let state = app.next_state().await;
    assert!(!state.online);
    assert_eq!(app.next_outbound().await, OutboundMessage::Disconnect);
    assert!(!app.handle.is_online());
}

#[tokio::test]
async fn reconnect_refreshes_will() {
    let (builder, broker) = builder();
    let mut app = start(builder, broker);
    app.bring_online().await;
    birth_node(&mut app, 1).await;

    let first = StatePayload::try_from(app.broker.last_will().unwrap().payload.as_slice()).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.broker.tx_event.send(Event::Offline).unwrap();
    assert_eq!(app.next_event().await, AppEvent::Offline);
    assert_eq!(
        app.handle.node_status(&node_id()).unwrap(),
        ConnectionStatus::Unknown
    );

    app.broker.tx_event.send(Event::Online).unwrap();
    assert!(matches!(
        app.next_outbound().await,
        OutboundMessage::Subscribe(_)
    ));
    let state = app.next_state().await;
    let will = StatePayload::try_from(app.broker.last_will().unwrap().payload.as_slice()).unwrap();
    assert!(will.timestamp > first.timestamp);
    assert_eq!(state, StatePayload::online(will.timestamp));
}

#[tokio::test]
async fn device_lifecycle() {
    let (builder, broker) = builder();
    let mut app = start(builder, broker);
    app.bring_online().await;
    birth_node(&mut app, 1).await;
    let id = node_id();
    assert_eq!(app.handle.node_status(&id).unwrap(), ConnectionStatus::Online);

    app.deliver(
        device_topic(MessageKind::DBirth, "D1"),
        new_data_payload(1, vec![Metric::new("level", 0i32)]),
    );
    assert_eq!(
        app.next_event().await,
        AppEvent::DeviceBirth(id.clone(), "D1".into())
    );
    assert_eq!(
        app.handle.device_status(&id, "D1").unwrap(),
        ConnectionStatus::Online
    );

    app.deliver(
        device_topic(MessageKind::DData, "D1"),
        new_data_payload(2, vec![Metric::new("level", 5i32)]),
    );
    assert_eq!(
        app.next_event().await,
        AppEvent::DeviceData(id.clone(), "D1".into())
    );
    let value = app.handle.metric_value(&id, Some("D1"), "level").unwrap();
    assert_eq!(value.value, Some(MetricValue::Int32(5)));
    assert_eq!(value.session, 1);

    app.deliver(device_topic(MessageKind::DDeath, "D1"), new_data_payload(3, vec![]));
    assert_eq!(
        app.next_event().await,
        AppEvent::DeviceDeath(id.clone(), "D1".into())
    );
    assert_eq!(
        app.handle.device_status(&id, "D1").unwrap(),
        ConnectionStatus::Offline
    );

    // data after death does not resurrect the device
    app.deliver(
        device_topic(MessageKind::DData, "D1"),
        new_data_payload(4, vec![Metric::new("level", 6i32)]),
    );
    assert_eq!(
        expect_rejection(app.next_event().await),
        Rejection::NotOnline(ConnectionStatus::Offline)
    );
    let value = app.handle.metric_value(&id, Some("D1"), "level").unwrap();
    assert_eq!(value.value, Some(MetricValue::Int32(5)));
    assert_eq!(
        app.handle.device_status(&id, "D2"),
        Err(QueryError::UnknownDevice("D2".into()))
    );
}

#[tokio::test]
async fn stale_session_death_discarded() {
    let (builder, broker) = builder();
    let mut app = start(builder, broker);
    app.bring_online().await;
    birth_node(&mut app, 1).await;
    birth_node(&mut app, 2).await;

    app.deliver(node_topic(MessageKind::NDeath), new_ndeath_payload(1));
    assert_eq!(
        expect_rejection(app.next_event().await),
        Rejection::StaleSession {
            received: 1,
            current: 2
        }
    );
    assert_eq!(
        app.handle.node_status(&node_id()).unwrap(),
        ConnectionStatus::Online
    );

    app.deliver(node_topic(MessageKind::NDeath), new_ndeath_payload(2));
    assert_eq!(app.next_event().await, AppEvent::NodeDeath(node_id()));
    assert_eq!(
        app.handle.node_status(&node_id()).unwrap(),
        ConnectionStatus::Offline
    );
}

#[tokio::test]
async fn restarted_node_is_accepted() {
    let (builder, broker) = builder();
    let mut app = start(builder.with_auto_rebirth(true), broker);
    app.bring_online().await;
    birth_node(&mut app, 5).await;
    app.deliver(node_topic(MessageKind::NDeath), new_ndeath_payload(5));
    assert_eq!(app.next_event().await, AppEvent::NodeDeath(node_id()));

    // the new process starts counting sessions at 1 again
    birth_node(&mut app, 1).await;
    assert_eq!(app.handle.session(&node_id()).unwrap(), 1);
    app.deliver(
        node_topic(MessageKind::NData),
        new_data_payload(1, vec![Metric::new("temp", 23.0f64)]),
    );
    assert_eq!(app.next_event().await, AppEvent::NodeData(node_id()));
    assert_eq!(
        app.handle.node_status(&node_id()).unwrap(),
        ConnectionStatus::Online
    );
    app.assert_no_outbound();
}

#[tokio::test]
async fn decode_error_does_not_affect_liveness() {
    let (builder, broker) = builder();
    let mut app = start(builder, broker);
    app.bring_online().await;
    birth_node(&mut app, 1).await;

    let mut truncated = new_data_payload(1, vec![Metric::new("temp", 21.5f64)]);
    truncated.pop();
    app.deliver(node_topic(MessageKind::NData), truncated);
    app.deliver(node_topic(MessageKind::NData), vec![0xff, 0xff, 0xff]);
    app.deliver(
        node_topic(MessageKind::NData),
        new_data_payload(1, vec![Metric::new("temp", 21.5f64)]),
    );

    // the bad payloads produce no events and do not consume sequence numbers
    assert_eq!(app.next_event().await, AppEvent::NodeData(node_id()));
    assert_eq!(
        app.handle.node_status(&node_id()).unwrap(),
        ConnectionStatus::Online
    );
    let value = app.handle.metric_value(&node_id(), None, "temp").unwrap();
    assert_eq!(value.value, Some(MetricValue::Double(21.5)));
}

#[tokio::test]
async fn sequence_gap_requests_rebirth() {
    let (builder, broker) = builder();
    let builder = builder
        .with_auto_rebirth(true)
        .with_rebirth_cooldown(Duration::from_secs(60));
    let mut app = start(builder, broker);
    app.bring_online().await;
    birth_node(&mut app, 1).await;

    app.deliver(
        node_topic(MessageKind::NData),
        new_data_payload(5, vec![Metric::new("temp", 1.0f64)]),
    );
    assert_eq!(
        expect_rejection(app.next_event().await),
        Rejection::SequenceGap {
            expected: 1,
            found: 5
        }
    );
    assert_eq!(
        app.handle.node_status(&node_id()).unwrap(),
        ConnectionStatus::Stale
    );
    assert_eq!(
        app.next_event().await,
        AppEvent::RebirthRequested(node_id())
    );
    match app.next_outbound().await {
        OutboundMessage::Publish { topic, payload } => {
            assert_eq!(topic, node_topic(MessageKind::NCmd));
            assert_payload_is_rebirth_request(&payload);
        }
        message => panic!("got {message:?}"),
    }

    // further rejections inside the cooldown do not request again
    app.deliver(
        node_topic(MessageKind::NData),
        new_data_payload(6, vec![Metric::new("temp", 1.0f64)]),
    );
    assert_eq!(
        expect_rejection(app.next_event().await),
        Rejection::NotOnline(ConnectionStatus::Stale)
    );
    birth_node(&mut app, 1).await;
    app.assert_no_outbound();
    assert_eq!(
        app.handle.node_status(&node_id()).unwrap(),
        ConnectionStatus::Online
    );
}

#[tokio::test]
async fn data_before_birth_requests_rebirth() {
    let (builder, broker) = builder();
    let mut app = start(builder.with_auto_rebirth(true), broker);
    app.bring_online().await;

    app.deliver(
        node_topic(MessageKind::NData),
        new_data_payload(3, vec![Metric::new("temp", 1.0f64)]),
    );
    assert_eq!(
        expect_rejection(app.next_event().await),
        Rejection::UnknownNode
    );
    assert_eq!(
        app.next_event().await,
        AppEvent::RebirthRequested(node_id())
    );
    match app.next_outbound().await {
        OutboundMessage::Publish { topic, payload } => {
            assert_eq!(topic, node_topic(MessageKind::NCmd));
            assert_payload_is_rebirth_request(&payload);
        }
        message => panic!("got {message:?}"),
    }
    assert!(app.handle.nodes().is_empty());
}

#[tokio::test]
async fn commands() {
    let (builder, broker) = builder();
    let mut app = start(builder, broker);
    let id = node_id();

    let res = app
        .handle
        .publish_node_command(&id, vec![Metric::new("temp", 1.0f64)])
        .await;
    assert!(matches!(res, Err(CommandError::Offline)));

    app.bring_online().await;
    let res = app
        .handle
        .publish_node_command(&id, vec![Metric::new("temp", 1.0f64)])
        .await;
    assert!(matches!(
        res,
        Err(CommandError::UnknownTarget(QueryError::UnknownNode(_)))
    ));

    birth_node(&mut app, 1).await;
    app.handle
        .publish_node_command(
            &id,
            vec![Metric::new("temp", 30.0f64), Metric::new("unknown", 1i32)],
        )
        .await
        .unwrap();
    let (topic, payload) = match app.next_outbound().await {
        OutboundMessage::Publish { topic, payload } => (topic, payload),
        message => panic!("got {message:?}"),
    };
    assert_eq!(topic, node_topic(MessageKind::NCmd));
    let (metrics, meta) = codec_for(Revision::B).decode(&payload).unwrap();
    assert_eq!(meta.seq, None);
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].name(), Some("temp"));

    app.deliver(
        device_topic(MessageKind::DBirth, "D1"),
        new_data_payload(1, vec![Metric::new("speed", 1u32)]),
    );
    app.next_event().await;
    app.handle
        .publish_device_command(&id, "D1", vec![Metric::new("speed", 10u32)])
        .await
        .unwrap();
    match app.next_outbound().await {
        OutboundMessage::Publish { topic, .. } => {
            assert_eq!(topic, device_topic(MessageKind::DCmd, "D1"))
        }
        message => panic!("got {message:?}"),
    }

    let other = NodeIdentifier::new(GROUP, "E9");
    app.handle.request_rebirth(&other).await.unwrap();
    assert_eq!(app.next_event().await, AppEvent::RebirthRequested(other));
    match app.next_outbound().await {
        OutboundMessage::Publish { topic, payload } => {
            assert_eq!(
                topic,
                Topic::build(Revision::B, MessageKind::NCmd, GROUP, "E9", None).unwrap()
            );
            assert_payload_is_rebirth_request(&payload);
        }
        message => panic!("got {message:?}"),
    }
}

#[tokio::test]
async fn snapshot_is_consistent() {
    let (builder, broker) = builder();
    let mut app = start(builder, broker);
    app.bring_online().await;
    birth_node(&mut app, 4).await;
    app.deliver(
        device_topic(MessageKind::DBirth, "D1"),
        new_data_payload(1, vec![Metric::new("level", 2i32)]),
    );
    app.next_event().await;

    let snapshot = app.handle.node_snapshot(&node_id()).unwrap();
    assert_eq!(snapshot.id, NodeIdentifier::new(GROUP, NODE));
    assert_eq!(snapshot.status, ConnectionStatus::Online);
    assert_eq!(snapshot.session, 4);
    assert_eq!(
        snapshot.metrics["temp"].value,
        Some(MetricValue::Double(20.0))
    );
    assert_eq!(snapshot.devices["D1"].status, ConnectionStatus::Online);
    assert_eq!(
        snapshot.devices["D1"].metrics["level"].value,
        Some(MetricValue::Int32(2))
    );
    assert_eq!(app.handle.nodes(), vec![node_id()]);
}

#[tokio::test]
async fn failed_subscribe_is_retried() {
    let (builder, broker, client) = flaky_builder(1);
    let mut app = start(builder, broker);

    app.broker.tx_event.send(Event::Online).unwrap();
    client.failures_consumed().await;
    assert!(!app.handle.is_online());
    let res = app.handle.request_rebirth(&node_id()).await;
    assert!(matches!(res, Err(CommandError::Offline)));

    // retried after the backoff without another transport event
    assert!(matches!(
        app.next_outbound().await,
        OutboundMessage::Subscribe(_)
    ));
    assert!(app.next_state().await.online);
    assert_eq!(app.next_event().await, AppEvent::Online);
    assert!(app.handle.is_online());
}

#[tokio::test]
async fn cancel_before_run() {
    let (builder, mut broker) = builder();
    let (app, handle) = builder.build().unwrap();
    handle.cancel().await;
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), broker.rx_outbound.recv())
            .await
            .unwrap(),
        Some(OutboundMessage::Disconnect)
    );

    tokio::time::timeout(Duration::from_secs(1), app.run())
        .await
        .expect("a cancelled application must not run");
    let _ = broker.tx_event.send(Event::Online);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(broker.rx_outbound.try_recv().is_err());
    assert!(!handle.is_online());
}
