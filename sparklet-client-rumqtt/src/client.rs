use async_trait::async_trait;
use log::{error, trace};
use rumqttc::{
    v5::{
        mqttbytes::{
            v5::{ConnectProperties, Filter, Packet},
            QoS,
        },
        AsyncClient as RuClient, ClientError as RuClientError, EventLoop as RuEventLoop,
        MqttOptions,
    },
    Outgoing,
};
use sparklet_client::{topic_and_payload_to_event, ClientError, Event, LastWill};
use sparklet_types::topic::{Topic, TopicFilter};

fn qos_to_mqtt_qos(qos: sparklet_types::topic::QoS) -> QoS {
    match qos {
        sparklet_types::topic::QoS::AtMostOnce => QoS::AtMostOnce,
        sparklet_types::topic::QoS::AtLeastOnce => QoS::AtLeastOnce,
        sparklet_types::topic::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn topic_filter_to_mqtt_filter(topic_filter: TopicFilter) -> Filter {
    Filter::new(topic_filter.filter, qos_to_mqtt_qos(topic_filter.qos))
}

fn map_error(e: RuClientError) -> ClientError {
    match e {
        RuClientError::TryRequest(_) => ClientError::QueueFull,
        RuClientError::Request(_) => ClientError::Disconnected,
    }
}

/// A [sparklet_client::Client] implementation using [rumqttc]
#[derive(Clone)]
pub struct Client {
    client: RuClient,
}

#[async_trait]
impl sparklet_client::Client for Client {
    async fn disconnect(&self) -> Result<(), ClientError> {
        self.client.disconnect().await.map_err(map_error)
    }

    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        let (qos, retain) = topic.publish_qos_retain();
        self.client
            .publish(topic.to_string(), qos_to_mqtt_qos(qos), retain, payload)
            .await
            .map_err(map_error)
    }

    async fn try_publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        let (qos, retain) = topic.publish_qos_retain();
        self.client
            .try_publish(topic.to_string(), qos_to_mqtt_qos(qos), retain, payload)
            .map_err(map_error)
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError> {
        let filters: Vec<Filter> = topics.into_iter().map(topic_filter_to_mqtt_filter).collect();
        self.client.subscribe_many(filters).await.map_err(map_error)
    }
}

enum ConnectionState {
    Disconnected,
    ManualDisconnected,
    Connected,
}

/// A [sparklet_client::EventLoop] implementation using [rumqttc]
pub struct EventLoop {
    state: ConnectionState,
    el: RuEventLoop,
}

impl EventLoop {
    /// Create a new `Eventloop`.
    ///
    /// `options` are the mqtt options to create the rumqtt client with. Clean start is forced on and the session expiry
    /// interval is forced to 0.
    ///
    /// `cap` specifies the capacity of the bounded async channel for the client handle.
    pub fn new(options: MqttOptions, cap: usize) -> (Self, Client) {
        let mut options = options;
        let mut connection_properties = options
            .connect_properties()
            .unwrap_or_else(ConnectProperties::new);
        connection_properties.session_expiry_interval = Some(0);

        options
            .set_clean_start(true)
            .set_connect_properties(connection_properties);

        let (client, eventloop) = RuClient::new(options, cap);
        (
            EventLoop {
                el: eventloop,
                state: ConnectionState::Disconnected,
            },
            Client { client },
        )
    }

    async fn poll_rumqtt(&mut self) -> Option<Event> {
        match self.el.poll().await {
            Ok(event) => {
                trace!("{event:?}");
                match event {
                    rumqttc::v5::Event::Incoming(Packet::ConnAck(_)) => {
                        self.state = ConnectionState::Connected;
                        Some(Event::Online)
                    }
                    rumqttc::v5::Event::Incoming(Packet::Disconnect(_)) => {
                        self.state = ConnectionState::Disconnected;
                        Some(Event::Offline)
                    }
                    rumqttc::v5::Event::Incoming(Packet::Publish(publish)) => Some(
                        topic_and_payload_to_event(&publish.topic, publish.payload.to_vec()),
                    ),
                    rumqttc::v5::Event::Outgoing(Outgoing::Disconnect) => {
                        self.state = ConnectionState::ManualDisconnected;
                        Some(Event::Offline)
                    }
                    _ => None,
                }
            }
            Err(e) => match self.state {
                ConnectionState::Connected => {
                    error!("Client error: {e}");
                    self.state = ConnectionState::Disconnected;
                    Some(Event::Offline)
                }
                ConnectionState::Disconnected => {
                    error!("Client error on reconnect attempt: {e}");
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    None
                }
                ConnectionState::ManualDisconnected => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                    None
                }
            },
        }
    }
}

#[async_trait]
impl sparklet_client::EventLoop for EventLoop {
    async fn poll(&mut self) -> Event {
        loop {
            if let Some(event) = self.poll_rumqtt().await {
                return event;
            }
        }
    }

    fn set_last_will(&mut self, will: LastWill) {
        let qos = qos_to_mqtt_qos(will.qos);
        let mqtt_will = rumqttc::v5::mqttbytes::v5::LastWill::new(
            will.topic,
            will.payload,
            qos,
            will.retain,
            None,
        );
        self.el.options.set_last_will(mqtt_will);
    }
}
