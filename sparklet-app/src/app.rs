use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use sparklet_client::{ClientError, DynClient, DynEventLoop, Event, LastWill};
use sparklet_types::{
    codec_for,
    constants::NODE_CONTROL_REBIRTH,
    topic::{EdgeTopic, MessageKind, Topic, TopicFilter},
    utils::timestamp,
    ConnectionStatus, Metric, PayloadCodec, SessionMeta, StatePayload,
};
use tokio::{
    select,
    time::{sleep, sleep_until, timeout, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ApplicationConfig,
    error::{CommandError, ConfigError, QueryError},
    liveness::{LivenessTracker, Rejection},
    record::{MetricSnapshot, NodeSnapshot},
    NodeIdentifier,
};

/// Something the application observed, reported to the callback registered with
/// [ApplicationBuilder::on_event](crate::ApplicationBuilder::on_event)
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Connected to the broker and published the online STATE message
    Online,
    /// Lost the connection to the broker. Every tracked node and device is now [ConnectionStatus::Unknown]
    Offline,
    NodeBirth(NodeIdentifier),
    NodeDeath(NodeIdentifier),
    NodeData(NodeIdentifier),
    DeviceBirth(NodeIdentifier, String),
    DeviceDeath(NodeIdentifier, String),
    DeviceData(NodeIdentifier, String),
    /// A message was not applied to the liveness table
    Rejected {
        node: NodeIdentifier,
        device: Option<String>,
        kind: MessageKind,
        reason: Rejection,
    },
    /// A `Node Control/Rebirth` command was sent to a node
    RebirthRequested(NodeIdentifier),
}

/// Callback invoked for every [AppEvent]
pub type EventCallback = dyn Fn(AppEvent) + Send + Sync;

struct AppState {
    online: bool,
    will_timestamp: u64,
    rebirth_requests: HashMap<NodeIdentifier, Instant>,
}

struct AppInner {
    config: ApplicationConfig,
    codec: Arc<dyn PayloadCodec>,
    client: Arc<DynClient>,
    tracker: RwLock<LivenessTracker>,
    state: Mutex<AppState>,
    callback: Option<Box<EventCallback>>,
    stopped: AtomicBool,
    stop: CancellationToken,
    state_topic: Topic,
}

impl AppInner {
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

    fn emit(&self, event: AppEvent) {
        if let Some(callback) = &self.callback {
            callback(event)
        }
    }

    fn is_online(&self) -> bool {
        self.state.lock().online
    }

    fn last_will(&self) -> LastWill {
        let timestamp = self.state.lock().will_timestamp;
        LastWill::new(
            self.state_topic.clone(),
            StatePayload::offline(timestamp).into(),
        )
    }

    /// The online STATE message carries the same timestamp as the registered will
    async fn publish_online(&self) -> Result<(), ClientError> {
        let timestamp = self.state.lock().will_timestamp;
        self.call(
            self.client
                .publish_state_message(self.state_topic.clone(), StatePayload::online(timestamp)),
        )
        .await
    }

    async fn send_command(
        &self,
        id: &NodeIdentifier,
        device_id: Option<&str>,
        metrics: Vec<Metric>,
    ) -> Result<(), CommandError> {
        let kind = match device_id {
            Some(_) => MessageKind::DCmd,
            None => MessageKind::NCmd,
        };
        let topic = Topic::build(self.config.revision, kind, &id.group, &id.node, device_id)?;
        let payload = self.codec.encode(&metrics, &SessionMeta::default())?;
        self.call(self.client.publish(topic, payload)).await?;
        Ok(())
    }

    async fn request_rebirth(&self, id: &NodeIdentifier) -> Result<(), CommandError> {
        self.send_command(id, None, vec![Metric::new(NODE_CONTROL_REBIRTH, true)])
            .await?;
        info!("Requested rebirth. node={id}");
        self.emit(AppEvent::RebirthRequested(id.clone()));
        Ok(())
    }

    async fn auto_rebirth(&self, id: &NodeIdentifier) {
        {
            let mut state = self.state.lock();
            if !state.online {
                return;
            }
            let now = Instant::now();
            if let Some(last) = state.rebirth_requests.get(id) {
                if now.duration_since(*last) < self.config.rebirth_cooldown() {
                    debug!("Rebirth request cooldown not expired. node={id}");
                    return;
                }
            }
            state.rebirth_requests.insert(id.clone(), now);
        }
        if let Err(e) = self.request_rebirth(id).await {
            error!("Requesting rebirth failed. node={id} error={e}");
        }
    }

    /// Subscribe and publish the online STATE message. The application is only online once both succeed.
    async fn on_online(&self) -> Result<(), ClientError> {
        if self.is_online() {
            return Ok(());
        }
        let mut filters = self.config.subscription.filters(self.config.revision);
        filters.push(TopicFilter::state(&self.config.host_id));
        self.call(self.client.subscribe_many(filters)).await?;
        self.publish_online().await?;

        self.state.lock().online = true;
        info!("App online. host={}", self.config.host_id);
        self.emit(AppEvent::Online);
        Ok(())
    }

    /// Returns the last will for the next connection if the application was online
    fn on_offline(&self) -> Option<LastWill> {
        {
            let mut state = self.state.lock();
            if !state.online {
                return None;
            }
            state.online = false;
            state.will_timestamp = timestamp();
            state.rebirth_requests.clear();
        }
        info!("App offline. host={}", self.config.host_id);
        self.tracker.write().disconnect();
        self.emit(AppEvent::Offline);
        Some(self.last_will())
    }

    async fn on_state(&self, host_id: String, payload: Vec<u8>) {
        if host_id != self.config.host_id {
            debug!("Ignoring STATE message of another host. host={host_id}");
            return;
        }
        let state = match StatePayload::try_from(payload.as_slice()) {
            Ok(state) => state,
            Err(e) => {
                warn!("Invalid STATE message. error={e}");
                return;
            }
        };
        if !state.online && self.is_online() {
            info!("Observed own STATE reported offline - republishing online");
            if let Err(e) = self.publish_online().await {
                error!("Publishing online state failed. error={e}");
            }
        }
    }

    async fn on_edge(&self, edge: EdgeTopic, payload: Vec<u8>) {
        if edge.revision != self.config.revision {
            return;
        }
        let kind = edge.kind;
        if matches!(kind, MessageKind::NCmd | MessageKind::DCmd) {
            return;
        }

        let id = NodeIdentifier::new(edge.group_id, edge.node_id);
        let device = edge.device_id;
        let (metrics, meta) = match self.codec.decode(&payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    "Dropping message with invalid payload. topic={} node={id} error={e}",
                    kind.as_str()
                );
                return;
            }
        };

        let result = {
            let mut tracker = self.tracker.write();
            match (kind, device.as_deref()) {
                (MessageKind::NBirth, None) => tracker.node_birth(&id, metrics, &meta),
                (MessageKind::NDeath, None) => tracker.node_death(&id, &metrics),
                (MessageKind::NData, None) => tracker.node_data(&id, metrics, &meta),
                (MessageKind::DBirth, Some(d)) => tracker.device_birth(&id, d, metrics, &meta),
                (MessageKind::DDeath, Some(d)) => tracker.device_death(&id, d, &meta),
                (MessageKind::DData, Some(d)) => tracker.device_data(&id, d, metrics, &meta),
                _ => return,
            }
        };

        let reason = match result {
            Ok(()) => {
                let event = match (kind, device) {
                    (MessageKind::NBirth, _) => {
                        info!("Node online. node={id}");
                        AppEvent::NodeBirth(id)
                    }
                    (MessageKind::NDeath, _) => {
                        info!("Node offline. node={id}");
                        AppEvent::NodeDeath(id)
                    }
                    (MessageKind::DBirth, Some(d)) => AppEvent::DeviceBirth(id, d),
                    (MessageKind::DDeath, Some(d)) => AppEvent::DeviceDeath(id, d),
                    (MessageKind::DData, Some(d)) => AppEvent::DeviceData(id, d),
                    _ => AppEvent::NodeData(id),
                };
                self.emit(event);
                return;
            }
            Err(reason) => reason,
        };

        match reason {
            Rejection::StaleSession { .. } => {
                debug!("Discarding {} from an old session. node={id}", kind.as_str())
            }
            _ => warn!("Rejected {}. node={id} reason={reason}", kind.as_str()),
        }
        let rebirth = self.config.auto_rebirth
            && kind != MessageKind::NDeath
            && reason.requires_rebirth();
        self.emit(AppEvent::Rejected {
            node: id.clone(),
            device,
            kind,
            reason,
        });
        if rebirth {
            self.auto_rebirth(&id).await;
        }
    }

    async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("App stopping. host={}", self.config.host_id);
        let was_online = std::mem::replace(&mut self.state.lock().online, false);
        if was_online {
            let payload: Vec<u8> = StatePayload::offline(timestamp()).into();
            if let Err(e) = self
                .call(self.client.try_publish(self.state_topic.clone(), payload))
                .await
            {
                debug!("Unable to publish offline state on exit. error={e}");
            }
        }
        self.tracker.write().disconnect();

        self.stop.cancel();
        if timeout(self.config.operation_timeout(), self.client.disconnect())
            .await
            .is_err()
        {
            debug!("Disconnect timed out. host={}", self.config.host_id);
        }
    }
}

/// A handle for querying and interacting with the Application.
#[derive(Clone)]
pub struct AppHandle {
    inner: Arc<AppInner>,
}

impl AppHandle {
    /// Stop all operations, publishing the offline STATE message and disconnecting from the broker.
    ///
    /// This will cancel [Application::run()]
    pub async fn cancel(&self) {
        self.inner.shutdown().await
    }

    /// Whether the application is connected and has published its online STATE
    pub fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    /// Every node the application has observed a birth from
    pub fn nodes(&self) -> Vec<NodeIdentifier> {
        self.inner.tracker.read().nodes()
    }

    pub fn node_status(&self, id: &NodeIdentifier) -> Result<ConnectionStatus, QueryError> {
        self.inner.tracker.read().node_status(id)
    }

    pub fn device_status(
        &self,
        id: &NodeIdentifier,
        device_id: &str,
    ) -> Result<ConnectionStatus, QueryError> {
        self.inner.tracker.read().device_status(id, device_id)
    }

    /// The current session number of a node
    pub fn session(&self, id: &NodeIdentifier) -> Result<u64, QueryError> {
        self.inner.tracker.read().session(id)
    }

    /// The last observed value of a node metric, or of a device metric if `device_id` is given.
    ///
    /// The value is kept after the owner dies, compare [MetricSnapshot::session] and the owner's status
    /// to decide whether it is still current.
    pub fn metric_value(
        &self,
        id: &NodeIdentifier,
        device_id: Option<&str>,
        name: &str,
    ) -> Result<MetricSnapshot, QueryError> {
        self.inner.tracker.read().metric_value(id, device_id, name)
    }

    /// A consistent view of a node, its devices and their last values
    pub fn node_snapshot(&self, id: &NodeIdentifier) -> Result<NodeSnapshot, QueryError> {
        self.inner.tracker.read().snapshot(id)
    }

    async fn publish_command(
        &self,
        id: &NodeIdentifier,
        device_id: Option<&str>,
        metrics: Vec<Metric>,
    ) -> Result<(), CommandError> {
        if metrics.is_empty() {
            return Err(CommandError::NoMetrics);
        }
        if !self.inner.is_online() {
            return Err(CommandError::Offline);
        }
        let count = metrics.len();
        let metrics = self
            .inner
            .tracker
            .read()
            .known(id, device_id)?
            .filter_outgoing(metrics);
        if metrics.len() < count {
            debug!(
                "Dropped {} metric(s) not declared by the target. node={id} device={device_id:?}",
                count - metrics.len()
            );
        }
        if metrics.is_empty() {
            return Ok(());
        }
        self.inner.send_command(id, device_id, metrics).await
    }

    /// Publish an NCMD to a node.
    ///
    /// Metrics not declared in the node's current birth certificate are dropped.
    pub async fn publish_node_command(
        &self,
        id: &NodeIdentifier,
        metrics: Vec<Metric>,
    ) -> Result<(), CommandError> {
        self.publish_command(id, None, metrics).await
    }

    /// Publish a DCMD to a device.
    ///
    /// Metrics not declared in the device's current birth certificate are dropped.
    pub async fn publish_device_command(
        &self,
        id: &NodeIdentifier,
        device_id: &str,
        metrics: Vec<Metric>,
    ) -> Result<(), CommandError> {
        self.publish_command(id, Some(device_id), metrics).await
    }

    /// Ask a node to rebirth. The node does not need to be tracked.
    pub async fn request_rebirth(&self, id: &NodeIdentifier) -> Result<(), CommandError> {
        if !self.inner.is_online() {
            return Err(CommandError::Offline);
        }
        self.inner.request_rebirth(id).await
    }
}

/// Structure that represents a Sparkplug Host Application instance.
///
/// See [ApplicationBuilder](crate::ApplicationBuilder) on how to create an [Application] instance.
pub struct Application {
    eventloop: Box<DynEventLoop>,
    inner: Arc<AppInner>,
    /// When to retry going online after a failed subscribe or STATE publish
    retry_at: Option<Instant>,
}

impl Application {
    pub(crate) fn new(
        config: ApplicationConfig,
        callback: Option<Box<EventCallback>>,
        eventloop: Box<DynEventLoop>,
        client: Arc<DynClient>,
    ) -> Result<(Self, AppHandle), ConfigError> {
        config.validate()?;
        let state_topic = Topic::state(&config.host_id)
            .map_err(|e| ConfigError::InvalidHostId(e.to_string()))?;

        let inner = Arc::new(AppInner {
            codec: codec_for(config.revision),
            config,
            client,
            tracker: RwLock::new(LivenessTracker::new()),
            state: Mutex::new(AppState {
                online: false,
                will_timestamp: timestamp(),
                rebirth_requests: HashMap::new(),
            }),
            callback,
            stopped: AtomicBool::new(false),
            stop: CancellationToken::new(),
            state_topic,
        });
        let handle = AppHandle {
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
                "Going online failed, retrying. host={} error={e}",
                self.inner.config.host_id
            );
            self.retry_at = Some(Instant::now() + self.inner.config.reconnect_backoff());
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Online => self.connect().await,
            Event::Offline => {
                self.retry_at = None;
                if let Some(will) = self.inner.on_offline() {
                    self.eventloop.set_last_will(will);
                }
                sleep(self.inner.config.reconnect_backoff()).await;
            }
            Event::Message { topic, payload } => match topic {
                Topic::State { host_id } => self.inner.on_state(host_id, payload).await,
                Topic::Edge(edge) => self.inner.on_edge(edge, payload).await,
            },
            Event::InvalidPublish { reason, topic, .. } => debug!(
                "Ignoring publish on invalid topic {}: {reason}",
                String::from_utf8_lossy(&topic)
            ),
        }
    }

    /// Run the Application
    ///
    /// Runs the Application until [AppHandle::cancel()] is called
    pub async fn run(self) {
        self.run_until_cancelled(CancellationToken::new()).await
    }

    /// Run the Application until [AppHandle::cancel()] is called or `cancel` is cancelled.
    pub async fn run_until_cancelled(mut self, cancel: CancellationToken) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            info!("App already stopped. host={}", self.inner.config.host_id);
            return;
        }
        info!("App running. host={}", self.inner.config.host_id);
        let will = self.inner.last_will();
        self.eventloop.set_last_will(will);

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
        info!("App stopped. host={}", self.inner.config.host_id);
    }
}

/// Completes at `at`, never if there is nothing to retry
async fn retry_timer(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
