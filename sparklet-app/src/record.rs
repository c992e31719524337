use std::collections::HashMap;

use sparklet_types::{ConnectionStatus, DataType, KnownMetricsStorage, Metric, MetricValue};

use crate::{sequence::SequenceTracker, NodeIdentifier};

/// The last observed value of a metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    /// `None` if the metric was null
    pub value: Option<MetricValue>,
    pub datatype: DataType,
    pub timestamp: u64,
    /// The session (`bdSeq`) of the node the value was received under
    pub session: u64,
}

impl MetricSnapshot {
    fn new(metric: Metric, session: u64) -> Self {
        Self {
            value: metric.value,
            datatype: metric.datatype,
            timestamp: metric.timestamp,
            session,
        }
    }
}

/// A consistent view of a device at the time it was taken
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub status: ConnectionStatus,
    pub metrics: HashMap<String, MetricSnapshot>,
}

/// A consistent view of a node and its devices at the time it was taken
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeIdentifier,
    pub status: ConnectionStatus,
    pub session: u64,
    pub metrics: HashMap<String, MetricSnapshot>,
    pub devices: HashMap<String, DeviceSnapshot>,
}

/// Liveness, declared metrics and last values of a node or device
#[derive(Debug, Default)]
pub(crate) struct EntityRecord {
    pub(crate) status: ConnectionStatus,
    pub(crate) known: KnownMetricsStorage,
    pub(crate) values: HashMap<String, MetricSnapshot>,
}

impl EntityRecord {
    pub(crate) fn birth(&mut self, known: KnownMetricsStorage, metrics: Vec<Metric>, session: u64) {
        self.status = ConnectionStatus::Online;
        self.known = known;
        self.values.clear();
        self.update(metrics, session);
    }

    pub(crate) fn death(&mut self, status: ConnectionStatus) {
        self.status = status;
        self.known.clear();
    }

    /// Record values of metrics that have already been resolved against the known set
    pub(crate) fn update(&mut self, metrics: Vec<Metric>, session: u64) {
        for metric in metrics {
            if let Some(name) = metric.name.clone() {
                self.values.insert(name, MetricSnapshot::new(metric, session));
            }
        }
    }

    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            status: self.status,
            metrics: self.values.clone(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct NodeRecord {
    pub(crate) session: u64,
    pub(crate) sequence: SequenceTracker,
    pub(crate) entity: EntityRecord,
    pub(crate) devices: HashMap<String, EntityRecord>,
}

impl NodeRecord {
    pub(crate) fn new(session: u64) -> Self {
        Self {
            session,
            sequence: SequenceTracker::new(),
            entity: EntityRecord::default(),
            devices: HashMap::new(),
        }
    }

    /// Move every device that is online to `status`, clearing what they declared
    pub(crate) fn devices_down(&mut self, status: ConnectionStatus) {
        for device in self.devices.values_mut() {
            if device.status.is_online() {
                device.death(status);
            }
        }
    }

    pub(crate) fn snapshot(&self, id: &NodeIdentifier) -> NodeSnapshot {
        NodeSnapshot {
            id: id.clone(),
            status: self.entity.status,
            session: self.session,
            metrics: self.entity.values.clone(),
            devices: self
                .devices
                .iter()
                .map(|(name, device)| (name.clone(), device.snapshot()))
                .collect(),
        }
    }
}
