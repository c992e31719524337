use sparklet_client::ClientError;
use sparklet_types::{topic::TopicError, CodecError};
use thiserror::Error;

use crate::NodeIdentifier;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("host id must be provided")]
    MissingHostId,
    #[error("Invalid host id: {0}")]
    InvalidHostId(String),
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("Unable to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A query referenced something the application is not tracking
#[derive(Error, Debug, PartialEq)]
pub enum QueryError {
    #[error("Node {0} is not tracked")]
    UnknownNode(NodeIdentifier),
    #[error("Device {0} is not tracked")]
    UnknownDevice(String),
    #[error("Metric {0} is not known")]
    UnknownMetric(String),
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("The application is offline")]
    Offline,
    #[error("No metrics provided")]
    NoMetrics,
    #[error(transparent)]
    UnknownTarget(#[from] QueryError),
    #[error("Invalid topic: {0}")]
    Topic(#[from] TopicError),
    #[error("Unable to encode payload: {0}")]
    Encode(#[from] CodecError),
    #[error("Transport error: {0}")]
    Transport(#[from] ClientError),
}
