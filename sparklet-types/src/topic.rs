use std::fmt::{self, Display};

use thiserror::Error;

use crate::{
    constants::{DBIRTH, DCMD, DDATA, DDEATH, NBIRTH, NCMD, NDATA, NDEATH, STATE},
    utils::validate_name,
    Revision,
};

#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Topic has an invalid number of segments")]
    InvalidSegmentCount,
    #[error("Unknown namespace {0}")]
    UnknownNamespace(String),
    #[error("Unknown message type {0}")]
    UnknownMessageKind(String),
    #[error("Invalid topic segment: {0}")]
    InvalidSegment(String),
    #[error("Message type {0:?} requires a device id")]
    MissingDeviceId(MessageKind),
    #[error("Message type {0:?} does not take a device id")]
    UnexpectedDeviceId(MessageKind),
}

/// The different message types of the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    NBirth,
    NDeath,
    NData,
    NCmd,
    DBirth,
    DDeath,
    DData,
    DCmd,
    State,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::NBirth => NBIRTH,
            MessageKind::NDeath => NDEATH,
            MessageKind::NData => NDATA,
            MessageKind::NCmd => NCMD,
            MessageKind::DBirth => DBIRTH,
            MessageKind::DDeath => DDEATH,
            MessageKind::DData => DDATA,
            MessageKind::DCmd => DCMD,
            MessageKind::State => STATE,
        }
    }

    /// Does the message type address a device
    pub fn is_device(&self) -> bool {
        matches!(
            self,
            MessageKind::DBirth | MessageKind::DDeath | MessageKind::DData | MessageKind::DCmd
        )
    }

    fn from_segment(segment: &str) -> Result<Self, TopicError> {
        let kind = match segment {
            NBIRTH => MessageKind::NBirth,
            NDEATH => MessageKind::NDeath,
            NDATA => MessageKind::NData,
            NCMD => MessageKind::NCmd,
            DBIRTH => MessageKind::DBirth,
            DDEATH => MessageKind::DDeath,
            DDATA => MessageKind::DData,
            DCMD => MessageKind::DCmd,
            other => return Err(TopicError::UnknownMessageKind(other.to_string())),
        };
        Ok(kind)
    }
}

/// A topic addressing a node or one of its devices
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeTopic {
    pub revision: Revision,
    pub kind: MessageKind,
    pub group_id: String,
    pub node_id: String,
    pub device_id: Option<String>,
}

/// A fully qualified topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Edge(EdgeTopic),
    State { host_id: String },
}

impl Topic {
    /// Build a node or device topic.
    ///
    /// Device message kinds require a `device_id`, node message kinds must not be given one.
    pub fn build(
        revision: Revision,
        kind: MessageKind,
        group_id: &str,
        node_id: &str,
        device_id: Option<&str>,
    ) -> Result<Self, TopicError> {
        if kind == MessageKind::State {
            return Err(TopicError::UnknownMessageKind(STATE.to_string()));
        }
        match (kind.is_device(), device_id) {
            (true, None) => return Err(TopicError::MissingDeviceId(kind)),
            (false, Some(_)) => return Err(TopicError::UnexpectedDeviceId(kind)),
            _ => (),
        }
        validate_segment(group_id)?;
        validate_segment(node_id)?;
        if let Some(device_id) = device_id {
            validate_segment(device_id)?;
        }
        Ok(Topic::Edge(EdgeTopic {
            revision,
            kind,
            group_id: group_id.to_string(),
            node_id: node_id.to_string(),
            device_id: device_id.map(str::to_string),
        }))
    }

    /// Build the STATE topic for a host application
    pub fn state(host_id: &str) -> Result<Self, TopicError> {
        validate_segment(host_id)?;
        Ok(Topic::State {
            host_id: host_id.to_string(),
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Topic::Edge(edge) => edge.kind,
            Topic::State { .. } => MessageKind::State,
        }
    }

    /// Get the [QoS] and retain settings a message on this topic should be published with
    pub fn publish_qos_retain(&self) -> (QoS, bool) {
        match self {
            Topic::Edge(_) => (QoS::AtLeastOnce, false),
            Topic::State { .. } => (QoS::AtLeastOnce, true),
        }
    }

    /// Parse a topic string. The inverse of formatting a [Topic] with [Display].
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.first() == Some(&STATE) {
            if parts.len() != 2 {
                return Err(TopicError::InvalidSegmentCount);
            }
            return Topic::state(parts[1]);
        }

        if parts.len() != 4 && parts.len() != 5 {
            return Err(TopicError::InvalidSegmentCount);
        }

        let revision = Revision::from_namespace(parts[0])
            .ok_or_else(|| TopicError::UnknownNamespace(parts[0].to_string()))?;
        let kind = MessageKind::from_segment(parts[2])?;
        Topic::build(revision, kind, parts[1], parts[3], parts.get(4).copied())
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Edge(edge) => {
                write!(
                    f,
                    "{}/{}/{}/{}",
                    edge.revision.namespace(),
                    edge.group_id,
                    edge.kind.as_str(),
                    edge.node_id
                )?;
                if let Some(device_id) = &edge.device_id {
                    write!(f, "/{device_id}")?;
                }
                Ok(())
            }
            Topic::State { host_id } => write!(f, "{STATE}/{host_id}"),
        }
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.to_string()
    }
}

fn validate_segment(segment: &str) -> Result<(), TopicError> {
    validate_name(segment).map_err(TopicError::InvalidSegment)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// A subscription filter. May contain MQTT wildcards.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicFilter {
    pub filter: String,
    pub qos: QoS,
}

impl TopicFilter {
    pub fn new<S: Into<String>>(filter: S) -> Self {
        Self::new_with_qos(filter, QoS::AtLeastOnce)
    }

    pub fn new_with_qos<S: Into<String>>(filter: S, qos: QoS) -> Self {
        Self {
            filter: filter.into(),
            qos,
        }
    }

    /// Every message in the namespace
    pub fn namespace(revision: Revision) -> Self {
        Self::new(format!("{}/#", revision.namespace()))
    }

    /// Every message from a group
    pub fn group(revision: Revision, group_id: &str) -> Self {
        Self::new(format!("{}/{}/#", revision.namespace(), group_id))
    }

    /// Every message from a node and its devices
    pub fn node(revision: Revision, group_id: &str, node_id: &str) -> Self {
        Self::new(format!("{}/{}/+/{}/#", revision.namespace(), group_id, node_id))
    }

    /// Commands addressed to a node
    pub fn node_commands(revision: Revision, group_id: &str, node_id: &str) -> Self {
        Self::new(format!("{}/{}/{}/{}", revision.namespace(), group_id, NCMD, node_id))
    }

    /// Commands addressed to any device of a node
    pub fn device_commands(revision: Revision, group_id: &str, node_id: &str) -> Self {
        Self::new(format!(
            "{}/{}/{}/{}/+",
            revision.namespace(),
            group_id,
            DCMD,
            node_id
        ))
    }

    /// The STATE topic of a host application
    pub fn state(host_id: &str) -> Self {
        Self::new(format!("{STATE}/{host_id}"))
    }
}
