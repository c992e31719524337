use sparklet_client::ClientError;
use sparklet_types::{topic::TopicError, CodecError, RegistryError};
use thiserror::Error;

/// Misuse of the session/sequence manager
#[derive(Error, Debug, PartialEq)]
pub enum SequenceError {
    #[error("No session has been started")]
    NoSession,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("group id must be provided")]
    MissingGroupId,
    #[error("node id must be provided")]
    MissingNodeId,
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid topic: {0}")]
    Topic(#[from] TopicError),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("Metric name {0} is reserved")]
    ReservedMetric(String),
    #[error("Invalid birth metrics: {0}")]
    InvalidMetrics(#[from] RegistryError),
    #[error("Invalid device: {0}")]
    InvalidDevice(#[from] DeviceRegistrationError),
    #[error("Unable to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("The node is offline")]
    Offline,
    #[error("The node or device has not been birthed")]
    UnBirthed,
    #[error("No metrics provided")]
    NoMetrics,
    #[error("Device {0} is not registered")]
    UnknownDevice(String),
    #[error("Invalid topic: {0}")]
    Topic(#[from] TopicError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("Unable to encode payload: {0}")]
    Encode(#[from] CodecError),
    #[error("Transport error: {0}")]
    Transport(#[from] ClientError),
}

#[derive(Error, Debug)]
pub enum DeviceRegistrationError {
    #[error("Invalid device name: {0}")]
    InvalidName(String),
    #[error("Device {0} is already registered")]
    Duplicate(String),
    #[error("Invalid device metrics: {0}")]
    InvalidMetrics(#[from] RegistryError),
}

#[derive(Error, Debug, PartialEq)]
pub enum DeviceError {
    #[error("Device {0} is not registered")]
    Unknown(String),
}
