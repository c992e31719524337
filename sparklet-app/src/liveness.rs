use std::collections::{hash_map::Entry, HashMap};

use log::{debug, info, warn};
use sparklet_types::{
    utils::bdseq_from_metrics, ConnectionStatus, KnownMetricsStorage, Metric, RegistryError,
    SessionMeta,
};
use thiserror::Error;

use crate::{
    error::QueryError,
    record::{EntityRecord, MetricSnapshot, NodeRecord, NodeSnapshot},
    sequence::SequenceCheck,
    NodeIdentifier,
};

/// Why a message was not applied to the liveness table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("session {received} is older than the current session {current}")]
    StaleSession { received: u64, current: u64 },
    #[error("message does not carry a bdSeq session number")]
    MissingSession,
    #[error("message does not carry a sequence number")]
    MissingSequence,
    #[error("birth sequence number must be 0, got {0}")]
    BirthSequence(u8),
    #[error("expected sequence number {expected}, got {found}")]
    SequenceGap { expected: u8, found: u8 },
    #[error("node has not been birthed")]
    UnknownNode,
    #[error("device {0} has not been birthed")]
    UnknownDevice(String),
    #[error("entity is {0}, not online")]
    NotOnline(ConnectionStatus),
    #[error("invalid birth certificate: {0}")]
    InvalidBirth(#[from] RegistryError),
}

impl Rejection {
    /// Whether the rejection means the application's view of the node cannot be trusted until it rebirths
    pub fn requires_rebirth(&self) -> bool {
        matches!(
            self,
            Rejection::SequenceGap { .. }
                | Rejection::UnknownNode
                | Rejection::UnknownDevice(_)
                | Rejection::NotOnline(_)
        )
    }
}

/// Tracks the liveness of every node and device the application has seen.
///
/// Every operation applies one received message. Messages that would break the protocol's
/// session and sequence rules are rejected and leave the table untouched, except for sequence gaps
/// which mark the node [ConnectionStatus::Stale].
#[derive(Debug, Default)]
pub struct LivenessTracker {
    nodes: HashMap<NodeIdentifier, NodeRecord>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_birth(
        &mut self,
        id: &NodeIdentifier,
        metrics: Vec<Metric>,
        meta: &SessionMeta,
    ) -> Result<(), Rejection> {
        match meta.seq {
            Some(0) => (),
            Some(seq) => return Err(Rejection::BirthSequence(seq)),
            None => return Err(Rejection::MissingSequence),
        }
        let session = bdseq_from_metrics(&metrics).ok_or(Rejection::MissingSession)?;
        let known = KnownMetricsStorage::from_metrics(&metrics)?;

        let record = match self.nodes.entry(id.clone()) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                if session < record.session {
                    // a node that restarted counts its sessions from scratch again
                    if record.entity.status.is_online() {
                        return Err(Rejection::StaleSession {
                            received: session,
                            current: record.session,
                        });
                    }
                    info!(
                        "Node restarted its session count. node={id} session={session} previous={}",
                        record.session
                    );
                }
                record
            }
            Entry::Vacant(entry) => entry.insert(NodeRecord::new(session)),
        };
        record.session = session;
        record.sequence.birth(0);
        record.devices_down(ConnectionStatus::Offline);
        let metrics = known.validate_incoming(metrics).known;
        record.entity.birth(known, metrics, session);
        debug!("Node birth. node={id} session={session}");
        Ok(())
    }

    pub fn node_death(&mut self, id: &NodeIdentifier, metrics: &[Metric]) -> Result<(), Rejection> {
        let session = bdseq_from_metrics(metrics).ok_or(Rejection::MissingSession)?;
        let record = self.nodes.get_mut(id).ok_or(Rejection::UnknownNode)?;
        if session < record.session {
            debug!(
                "Discarding death from an old session. node={id} session={session} current={}",
                record.session
            );
            return Err(Rejection::StaleSession {
                received: session,
                current: record.session,
            });
        }
        record.session = session;
        record.sequence.reset();
        record.entity.death(ConnectionStatus::Offline);
        record.devices_down(ConnectionStatus::Offline);
        debug!("Node death. node={id} session={session}");
        Ok(())
    }

    /// Check the node is online and the message is the next in its sequence
    fn sequenced<'a>(
        nodes: &'a mut HashMap<NodeIdentifier, NodeRecord>,
        id: &NodeIdentifier,
        meta: &SessionMeta,
    ) -> Result<&'a mut NodeRecord, Rejection> {
        let record = nodes.get_mut(id).ok_or(Rejection::UnknownNode)?;
        if !record.entity.status.is_online() {
            return Err(Rejection::NotOnline(record.entity.status));
        }
        let seq = meta.seq.ok_or(Rejection::MissingSequence)?;
        if let SequenceCheck::Gap { expected, found } = record.sequence.check(seq) {
            warn!("Sequence gap, marking node stale. node={id} expected={expected} found={found}");
            record.entity.status = ConnectionStatus::Stale;
            record.devices_down(ConnectionStatus::Stale);
            return Err(Rejection::SequenceGap { expected, found });
        }
        Ok(record)
    }

    pub fn node_data(
        &mut self,
        id: &NodeIdentifier,
        metrics: Vec<Metric>,
        meta: &SessionMeta,
    ) -> Result<(), Rejection> {
        let record = Self::sequenced(&mut self.nodes, id, meta)?;
        let validated = record.entity.known.validate_incoming(metrics);
        if !validated.all_known() {
            debug!(
                "Ignoring {} unknown metric(s). node={id}",
                validated.rejected.len()
            );
        }
        record.entity.update(validated.known, record.session);
        Ok(())
    }

    pub fn device_birth(
        &mut self,
        id: &NodeIdentifier,
        device_id: &str,
        metrics: Vec<Metric>,
        meta: &SessionMeta,
    ) -> Result<(), Rejection> {
        let record = Self::sequenced(&mut self.nodes, id, meta)?;
        let known = KnownMetricsStorage::from_metrics(&metrics)?;
        let metrics = known.validate_incoming(metrics).known;
        let session = record.session;
        record
            .devices
            .entry(device_id.to_string())
            .or_default()
            .birth(known, metrics, session);
        debug!("Device birth. node={id} device={device_id}");
        Ok(())
    }

    pub fn device_death(
        &mut self,
        id: &NodeIdentifier,
        device_id: &str,
        meta: &SessionMeta,
    ) -> Result<(), Rejection> {
        let record = Self::sequenced(&mut self.nodes, id, meta)?;
        let device = record
            .devices
            .get_mut(device_id)
            .ok_or_else(|| Rejection::UnknownDevice(device_id.to_string()))?;
        device.death(ConnectionStatus::Offline);
        debug!("Device death. node={id} device={device_id}");
        Ok(())
    }

    pub fn device_data(
        &mut self,
        id: &NodeIdentifier,
        device_id: &str,
        metrics: Vec<Metric>,
        meta: &SessionMeta,
    ) -> Result<(), Rejection> {
        let record = Self::sequenced(&mut self.nodes, id, meta)?;
        let session = record.session;
        let device: &mut EntityRecord = record
            .devices
            .get_mut(device_id)
            .ok_or_else(|| Rejection::UnknownDevice(device_id.to_string()))?;
        if !device.status.is_online() {
            return Err(Rejection::NotOnline(device.status));
        }
        let validated = device.known.validate_incoming(metrics);
        if !validated.all_known() {
            debug!(
                "Ignoring {} unknown metric(s). node={id} device={device_id}",
                validated.rejected.len()
            );
        }
        device.update(validated.known, session);
        Ok(())
    }

    /// The connection to the broker was lost. Nothing can be said about any entity until it rebirths.
    pub fn disconnect(&mut self) {
        for record in self.nodes.values_mut() {
            record.sequence.reset();
            record.entity.death(ConnectionStatus::Unknown);
            for device in record.devices.values_mut() {
                device.death(ConnectionStatus::Unknown);
            }
        }
    }

    pub fn nodes(&self) -> Vec<NodeIdentifier> {
        self.nodes.keys().cloned().collect()
    }

    fn node(&self, id: &NodeIdentifier) -> Result<&NodeRecord, QueryError> {
        self.nodes
            .get(id)
            .ok_or_else(|| QueryError::UnknownNode(id.clone()))
    }

    fn entity(&self, id: &NodeIdentifier, device_id: Option<&str>) -> Result<&EntityRecord, QueryError> {
        let node = self.node(id)?;
        match device_id {
            None => Ok(&node.entity),
            Some(device_id) => node
                .devices
                .get(device_id)
                .ok_or_else(|| QueryError::UnknownDevice(device_id.to_string())),
        }
    }

    pub fn node_status(&self, id: &NodeIdentifier) -> Result<ConnectionStatus, QueryError> {
        Ok(self.node(id)?.entity.status)
    }

    pub fn device_status(
        &self,
        id: &NodeIdentifier,
        device_id: &str,
    ) -> Result<ConnectionStatus, QueryError> {
        Ok(self.entity(id, Some(device_id))?.status)
    }

    /// The current session number of a node
    pub fn session(&self, id: &NodeIdentifier) -> Result<u64, QueryError> {
        Ok(self.node(id)?.session)
    }

    /// The last value observed for a metric of a node, or of one of its devices
    pub fn metric_value(
        &self,
        id: &NodeIdentifier,
        device_id: Option<&str>,
        name: &str,
    ) -> Result<MetricSnapshot, QueryError> {
        self.entity(id, device_id)?
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::UnknownMetric(name.to_string()))
    }

    /// Whether a metric is declared by the current birth certificate of a node or device
    pub fn is_known(&self, id: &NodeIdentifier, device_id: Option<&str>, name: &str) -> bool {
        self.entity(id, device_id)
            .map(|entity| entity.known.get(name).is_some())
            .unwrap_or(false)
    }

    pub(crate) fn known(
        &self,
        id: &NodeIdentifier,
        device_id: Option<&str>,
    ) -> Result<&KnownMetricsStorage, QueryError> {
        Ok(&self.entity(id, device_id)?.known)
    }

    pub fn snapshot(&self, id: &NodeIdentifier) -> Result<NodeSnapshot, QueryError> {
        Ok(self.node(id)?.snapshot(id))
    }
}
