use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, error, info, warn};
use sparklet_client::{ClientError, DynClient, DynEventLoop, Event, LastWill};
use sparklet_types::{
    codec_for,
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    topic::{MessageKind, Topic, TopicFilter},
    CodecError, ConnectionStatus, Metric, MetricValue, PayloadCodec, SessionMeta,
};
use tokio::{
    select,
    sync::Mutex,
    time::{sleep, sleep_until, timeout, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    birth::BirthCertificate,
    config::NodeConfig,
    device::{Device, DeviceMap},
    error::{ConfigError, DeviceError, DeviceRegistrationError, PublishError},
    session::SessionManager,
};

/// The entity a received command is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    Node,
    Device(String),
}

/// Callback invoked once per metric of an accepted command
pub type CommandCallback = dyn Fn(CommandTarget, Metric) + Send + Sync;

#[derive(Debug, PartialEq)]
enum BirthType {
    Birth,
    Rebirth,
}

struct NodeState {
    session: SessionManager,
    status: ConnectionStatus,
    birthed: bool,
    node: BirthCertificate,
    devices: DeviceMap,
    last_rebirth_request: Option<Instant>,
}

impl NodeState {
    fn check_birthed(&self) -> Result<(), PublishError> {
        if !self.status.is_online() {
            return Err(PublishError::Offline);
        }
        if !self.birthed {
            return Err(PublishError::UnBirthed);
        }
        Ok(())
    }

    fn death(&mut self) {
        self.birthed = false;
        self.session.end_session();
        self.devices.on_death();
    }

    /// Undo a connect cycle that did not complete
    fn abandon(&mut self) {
        self.status = ConnectionStatus::Unknown;
        self.birthed = false;
        self.session.abandon_session();
        self.devices.on_death();
    }
}

struct NodeInner {
    config: NodeConfig,
    codec: Arc<dyn PayloadCodec>,
    client: Arc<DynClient>,
    state: Mutex<NodeState>,
    callback: Option<Box<CommandCallback>>,
    stopped: AtomicBool,
    stop: CancellationToken,
    nbirth_topic: Topic,
    ndeath_topic: Topic,
    ndata_topic: Topic,
}

impl NodeInner {
    /// Run a transport operation bounded by the operation timeout, aborting if the node is stopped.
    async fn call<F>(&self, operation: F) -> Result<(), ClientError>
    where
        F: Future<Output = Result<(), ClientError>>,
    {
        select! {
            biased;
            _ = self.stop.cancelled() => Err(ClientError::Disconnected),
            res = timeout(self.config.operation_timeout(), operation) => {
                res.unwrap_or(Err(ClientError::Timeout))
            }
        }
    }

    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> Result<(), ClientError> {
        self.call(self.client.publish(topic, payload)).await
    }

    fn device_topic(&self, kind: MessageKind, device_id: &str) -> Result<Topic, PublishError> {
        Ok(Topic::build(
            self.config.revision,
            kind,
            &self.config.group_id,
            &self.config.node_id,
            Some(device_id),
        )?)
    }

    fn death_payload(&self, session: u64) -> Result<Vec<u8>, CodecError> {
        self.codec.encode(
            &[Metric::new(BDSEQ, session as i64)],
            &SessionMeta::default(),
        )
    }

    fn last_will(&self, session: u64) -> Result<LastWill, CodecError> {
        Ok(LastWill::new(
            self.ndeath_topic.clone(),
            self.death_payload(session)?,
        ))
    }

    /// Encode a sequenced payload. The sequence number is only consumed if encoding succeeds.
    fn encode_sequenced(
        &self,
        session: &mut SessionManager,
        metrics: &[Metric],
    ) -> Result<Vec<u8>, PublishError> {
        let seq = session.peek_sequence()?;
        let payload = self.codec.encode(metrics, &SessionMeta::new(Some(seq)))?;
        session.next_sequence()?;
        Ok(payload)
    }

    async fn birth_device(
        &self,
        session: &mut SessionManager,
        device: &mut Device,
    ) -> Result<(), PublishError> {
        device.birthed = false;
        let topic = self.device_topic(MessageKind::DBirth, &device.id)?;
        let payload = self.encode_sequenced(session, &device.birth.birth_metrics())?;
        self.publish(topic, payload).await?;
        device.birthed = true;
        debug!(
            "Device birthed. node={} device={}",
            self.config.node_id, device.id
        );
        Ok(())
    }

    async fn death_device(
        &self,
        session: &mut SessionManager,
        device: &Device,
    ) -> Result<(), PublishError> {
        let topic = self.device_topic(MessageKind::DDeath, &device.id)?;
        let payload = self.encode_sequenced(session, &[])?;
        self.publish(topic, payload).await?;
        Ok(())
    }

    async fn birth(&self, state: &mut NodeState, birth_type: BirthType) -> Result<(), PublishError> {
        info!(
            "Birthing node. node={} session={} type={birth_type:?}",
            self.config.node_id,
            state.session.session()
        );
        state.birthed = false;
        state
            .node
            .set_value(Metric::new(BDSEQ, state.session.session() as i64));
        let seq = state.session.birth_sequence()?;
        let payload = self
            .codec
            .encode(&state.node.birth_metrics(), &SessionMeta::new(Some(seq)))?;
        self.publish(self.nbirth_topic.clone(), payload).await?;
        state.birthed = true;

        let NodeState {
            session, devices, ..
        } = state;
        for device in devices.iter_mut() {
            if let Err(e) = self.birth_device(session, device).await {
                error!(
                    "Publishing device birth failed. device={} error={e}",
                    device.id
                );
            }
        }
        Ok(())
    }

    async fn rebirth(&self, state: &mut NodeState) -> Result<(), PublishError> {
        if !state.status.is_online() || !state.session.is_active() {
            return Err(PublishError::Offline);
        }
        self.birth(state, BirthType::Rebirth).await
    }

    async fn rebirth_from_command(&self, state: &mut NodeState) {
        let now = Instant::now();
        if let Some(last) = state.last_rebirth_request {
            if now.duration_since(last) < self.config.rebirth_cooldown() {
                info!("Got Rebirth CMD but cooldown time not expired. Ignoring");
                return;
            }
        }
        state.last_rebirth_request = Some(now);
        info!("Got Rebirth CMD - Rebirthing Node");
        if let Err(e) = self.rebirth(state).await {
            error!("Rebirth failed. node={} error={e}", self.config.node_id);
        }
    }

    /// Run the connect cycle: subscribe to commands, start a session and birth.
    ///
    /// On error the node is left as it was before the cycle started.
    async fn on_online(&self) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        if state.status.is_online() {
            return Ok(());
        }

        let filters = vec![
            TopicFilter::node_commands(
                self.config.revision,
                &self.config.group_id,
                &self.config.node_id,
            ),
            TopicFilter::device_commands(
                self.config.revision,
                &self.config.group_id,
                &self.config.node_id,
            ),
        ];
        self.call(self.client.subscribe_many(filters)).await?;

        let session = state.session.start_session();
        state.status = ConnectionStatus::Online;
        info!(
            "Edge node online. node={} session={session}",
            self.config.node_id
        );
        if let Err(e) = self.birth(&mut state, BirthType::Birth).await {
            state.abandon();
            return Err(e);
        }
        Ok(())
    }

    /// Returns the last will for the next session if the node was online
    async fn on_offline(&self) -> Option<LastWill> {
        let mut state = self.state.lock().await;
        if !state.status.is_online() {
            return None;
        }
        info!("Edge node offline. node={}", self.config.node_id);
        state.status = ConnectionStatus::Unknown;
        state.death();
        match self.last_will(state.session.upcoming_session()) {
            Ok(will) => Some(will),
            Err(e) => {
                error!("Unable to create last will. error={e}");
                None
            }
        }
    }

    async fn on_message(&self, topic: Topic, payload: Vec<u8>) {
        let Topic::Edge(edge) = topic else {
            return;
        };
        if edge.group_id != self.config.group_id || edge.node_id != self.config.node_id {
            return;
        }
        let target = match (edge.kind, edge.device_id) {
            (MessageKind::NCmd, None) => CommandTarget::Node,
            (MessageKind::DCmd, Some(id)) => CommandTarget::Device(id),
            _ => return,
        };
        if edge.revision != self.codec.revision() {
            debug!("Ignoring command for revision {:?}", edge.revision);
            return;
        }

        let metrics = match self.codec.decode(&payload) {
            Ok((metrics, _)) => metrics,
            Err(e) => {
                warn!("Received invalid CMD payload - ignoring request. error={e}");
                return;
            }
        };

        let mut state = self.state.lock().await;
        let known = match &target {
            CommandTarget::Node => state.node.known(),
            CommandTarget::Device(id) => match state.devices.get(id) {
                Some(device) => device.birth.known(),
                None => {
                    warn!("Rejecting command for unregistered device. device={id}");
                    return;
                }
            },
        };
        let validated = known.validate_incoming(metrics);
        if !validated.all_known() {
            let rejected: Vec<String> = validated.rejected.iter().map(|m| m.display_id()).collect();
            warn!("Rejecting command with unknown metrics. target={target:?} metrics={rejected:?}");
            return;
        }

        let mut rebirth = false;
        let mut forwarded = Vec::with_capacity(validated.known.len());
        for metric in validated.known {
            if target == CommandTarget::Node && metric.name() == Some(NODE_CONTROL_REBIRTH) {
                match metric.value {
                    Some(MetricValue::Boolean(true)) => rebirth = true,
                    _ => warn!("Received invalid CMD Rebirth metric - ignoring request"),
                }
                continue;
            }
            forwarded.push(metric);
        }
        if rebirth {
            self.rebirth_from_command(&mut state).await;
        }
        drop(state);

        if let Some(callback) = &self.callback {
            for metric in forwarded {
                callback(target.clone(), metric);
            }
        }
    }

    async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Edge node stopping. node={}", self.config.node_id);
        let mut state = self.state.lock().await;
        if state.status.is_online() {
            match self.death_payload(state.session.session()) {
                Ok(payload) => {
                    if let Err(e) = self
                        .call(self.client.try_publish(self.ndeath_topic.clone(), payload))
                        .await
                    {
                        debug!("Unable to publish node death certificate on exit. error={e}");
                    }
                }
                Err(e) => error!("Unable to create node death certificate. error={e}"),
            }
        }
        state.status = ConnectionStatus::Offline;
        state.death();
        drop(state);

        self.stop.cancel();
        if timeout(self.config.operation_timeout(), self.client.disconnect())
            .await
            .is_err()
        {
            debug!("Disconnect timed out. node={}", self.config.node_id);
        }
    }
}

/// A handle for interacting with the Edge Node.
///
/// `NodeHandle` provides an interface for interacting with an edge node,
/// including device management, node lifecycle operations, and metric publishing.
#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<NodeInner>,
}

impl NodeHandle {
    /// Stop all operations, sending a death certificate and disconnect from the broker.
    ///
    /// This will cancel [EdgeNode::run()]
    pub async fn cancel(&self) {
        self.inner.shutdown().await
    }

    /// Manually trigger a rebirth of the node and all its devices. Not subject to the rebirth cooldown.
    pub async fn rebirth(&self) -> Result<(), PublishError> {
        let mut state = self.inner.state.lock().await;
        self.inner.rebirth(&mut state).await
    }

    /// Publish node metrics in an NDATA message.
    ///
    /// Metrics not declared in the node's birth certificate, or whose value does not match the declared type, are dropped.
    pub async fn publish(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        if metrics.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        let mut state = self.inner.state.lock().await;
        state.check_birthed()?;
        let count = metrics.len();
        let metrics = state.node.known().filter_outgoing(metrics);
        if metrics.len() < count {
            debug!(
                "Dropped {} unknown or mistyped metric(s). node={}",
                count - metrics.len(),
                self.inner.config.node_id
            );
        }
        if metrics.is_empty() {
            return Ok(());
        }
        let payload = self.inner.encode_sequenced(&mut state.session, &metrics)?;
        self.inner
            .publish(self.inner.ndata_topic.clone(), payload)
            .await?;
        state.node.record(&metrics);
        Ok(())
    }

    /// Publish device metrics in a DDATA message.
    ///
    /// Metrics not declared in the device's birth certificate, or whose value does not match the declared type, are dropped.
    pub async fn publish_device(
        &self,
        device_id: &str,
        metrics: Vec<Metric>,
    ) -> Result<(), PublishError> {
        if metrics.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        let mut state = self.inner.state.lock().await;
        state.check_birthed()?;
        let NodeState {
            session, devices, ..
        } = &mut *state;
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| PublishError::UnknownDevice(device_id.to_string()))?;
        if !device.birthed {
            return Err(PublishError::UnBirthed);
        }
        let count = metrics.len();
        let metrics = device.birth.known().filter_outgoing(metrics);
        if metrics.len() < count {
            debug!(
                "Dropped {} unknown or mistyped metric(s). device={device_id}",
                count - metrics.len()
            );
        }
        if metrics.is_empty() {
            return Ok(());
        }
        let topic = self.inner.device_topic(MessageKind::DData, device_id)?;
        let payload = self.inner.encode_sequenced(session, &metrics)?;
        self.inner.publish(topic, payload).await?;
        device.birth.record(&metrics);
        Ok(())
    }

    /// Registers a new device with the node.
    ///
    /// If the node is birthed the device is birthed immediately, otherwise it is birthed with the node.
    /// Returns an error if:
    ///   - A device with the same name is already registered
    ///   - The device name is invalid
    ///   - The birth metrics contain duplicate names or aliases
    pub async fn register_device<S: Into<String>>(
        &self,
        device_id: S,
        metrics: Vec<Metric>,
    ) -> Result<(), DeviceRegistrationError> {
        let mut state = self.inner.state.lock().await;
        let birth_now = state.status.is_online() && state.birthed;
        let NodeState {
            session, devices, ..
        } = &mut *state;
        let device = devices.add(device_id.into(), metrics)?;
        info!("Device registered. device={}", device.id);
        if birth_now {
            if let Err(e) = self.inner.birth_device(session, device).await {
                error!(
                    "Publishing device birth failed. device={} error={e}",
                    device.id
                );
            }
        }
        Ok(())
    }

    /// Unregister a device, publishing its death certificate if it was birthed.
    pub async fn unregister_device(&self, device_id: &str) -> Result<(), DeviceError> {
        let mut state = self.inner.state.lock().await;
        let device = state
            .devices
            .remove(device_id)
            .ok_or_else(|| DeviceError::Unknown(device_id.to_string()))?;
        info!("Device unregistered. device={device_id}");
        if device.birthed && state.status.is_online() {
            if let Err(e) = self.inner.death_device(&mut state.session, &device).await {
                error!("Publishing device death failed. device={device_id} error={e}");
            }
        }
        Ok(())
    }

    /// Liveness of the node as seen locally
    pub async fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().await.status
    }

    pub async fn device_status(&self, device_id: &str) -> Result<ConnectionStatus, DeviceError> {
        let state = self.inner.state.lock().await;
        let device = state
            .devices
            .get(device_id)
            .ok_or_else(|| DeviceError::Unknown(device_id.to_string()))?;
        let status = match state.status {
            ConnectionStatus::Online if device.birthed => ConnectionStatus::Online,
            ConnectionStatus::Online => ConnectionStatus::Offline,
            other => other,
        };
        Ok(status)
    }

    /// The current session number (`bdSeq`). 0 before the first connection.
    pub async fn session_number(&self) -> u64 {
        self.inner.state.lock().await.session.session()
    }
}

/// Structure that represents a Sparkplug Edge Node instance.
///
/// See [NodeBuilder](crate::NodeBuilder) on how to create an [EdgeNode] instance.
pub struct EdgeNode {
    eventloop: Box<DynEventLoop>,
    inner: Arc<NodeInner>,
    /// When to retry a connect cycle that failed while the transport stayed connected
    retry_at: Option<Instant>,
}

impl EdgeNode {
    pub(crate) fn new(
        config: NodeConfig,
        metrics: Vec<Metric>,
        devices: Vec<(String, Vec<Metric>)>,
        callback: Option<Box<CommandCallback>>,
        eventloop: Box<DynEventLoop>,
        client: Arc<DynClient>,
    ) -> Result<(Self, NodeHandle), ConfigError> {
        config.validate()?;
        for metric in &metrics {
            if let Some(name @ (BDSEQ | NODE_CONTROL_REBIRTH)) = metric.name() {
                return Err(ConfigError::ReservedMetric(name.to_string()));
            }
        }

        let mut node_metrics = vec![
            Metric::new(BDSEQ, 0i64),
            Metric::new(NODE_CONTROL_REBIRTH, false),
        ];
        node_metrics.extend(metrics);
        let node = BirthCertificate::new(node_metrics)?;

        let mut device_map = DeviceMap::new();
        for (id, metrics) in devices {
            device_map.add(id, metrics)?;
        }

        let topic = |kind| {
            Topic::build(
                config.revision,
                kind,
                &config.group_id,
                &config.node_id,
                None,
            )
        };
        let nbirth_topic = topic(MessageKind::NBirth)?;
        let ndeath_topic = topic(MessageKind::NDeath)?;
        let ndata_topic = topic(MessageKind::NData)?;

        let inner = Arc::new(NodeInner {
            codec: codec_for(config.revision),
            config,
            client,
            state: Mutex::new(NodeState {
                session: SessionManager::new(),
                status: ConnectionStatus::Unknown,
                birthed: false,
                node,
                devices: device_map,
                last_rebirth_request: None,
            }),
            callback,
            stopped: AtomicBool::new(false),
            stop: CancellationToken::new(),
            nbirth_topic,
            ndeath_topic,
            ndata_topic,
        });

        let handle = NodeHandle {
            inner: inner.clone(),
        };
        Ok((
            Self {
                eventloop,
                inner,
                retry_at: None,
            },
            handle,
        ))
    }

    async fn connect(&mut self) {
        self.retry_at = None;
        if let Err(e) = self.inner.on_online().await {
            error!(
                "Connect cycle failed, retrying. node={} error={e}",
                self.inner.config.node_id
            );
            self.retry_at = Some(Instant::now() + self.inner.config.reconnect_backoff());
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Online => self.connect().await,
            Event::Offline => {
                self.retry_at = None;
                if let Some(will) = self.inner.on_offline().await {
                    self.eventloop.set_last_will(will);
                }
                sleep(self.inner.config.reconnect_backoff()).await;
            }
            Event::Message { topic, payload } => self.inner.on_message(topic, payload).await,
            Event::InvalidPublish { reason, topic, .. } => debug!(
                "Ignoring publish on invalid topic {}: {reason}",
                String::from_utf8_lossy(&topic)
            ),
        }
    }

    /// Run the Edge Node
    ///
    /// Runs the Edge Node until [NodeHandle::cancel()] is called
    pub async fn run(self) {
        self.run_until_cancelled(CancellationToken::new()).await
    }

    /// Run the Edge Node until [NodeHandle::cancel()] is called or `cancel` is cancelled.
    ///
    /// In flight event handling is abandoned when either happens and the node is left Offline.
    pub async fn run_until_cancelled(mut self, cancel: CancellationToken) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            info!("Edge node already stopped. node={}", self.inner.config.node_id);
            return;
        }
        info!("Edge node running. node={}", self.inner.config.node_id);

        let upcoming = self.inner.state.lock().await.session.upcoming_session();
        match self.inner.last_will(upcoming) {
            Ok(will) => self.eventloop.set_last_will(will),
            Err(e) => error!("Unable to create last will. error={e}"),
        }

        let stop = self.inner.stop.clone();
        loop {
            let retry_at = self.retry_at;
            select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = stop.cancelled() => break,
                _ = retry_timer(retry_at) => {
                    select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = stop.cancelled() => break,
                        _ = self.connect() => (),
                    }
                }
                event = self.eventloop.poll() => {
                    select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = stop.cancelled() => break,
                        _ = self.handle_event(event) => (),
                    }
                }
            }
        }

        self.inner.shutdown().await;
        info!("Edge node stopped. node={}", self.inner.config.node_id);
    }
}

/// Completes at `at`, never if there is nothing to retry
async fn retry_timer(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
