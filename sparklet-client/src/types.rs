use std::string::FromUtf8Error;

use sparklet_types::topic::{QoS, Topic, TopicError};
use thiserror::Error;

/// Errors produced when turning a received publish into an [Event]
#[derive(Error, Debug, PartialEq)]
pub enum MessageError {
    #[error("The topic was invalid: {0}")]
    InvalidTopic(#[from] TopicError),
    #[error("Topic utf8 decode error: {0}")]
    TopicUtf8Error(#[from] FromUtf8Error),
}

/// Errors returned by [Client](crate::Client) operations
#[derive(Error, Debug, PartialEq)]
pub enum ClientError {
    #[error("The client is disconnected")]
    Disconnected,
    #[error("The client request queue is full")]
    QueueFull,
    #[error("The operation timed out")]
    Timeout,
}

/// An enum that represents the different types of events an [EventLoop](crate::EventLoop) implementation can produce.
#[derive(Debug, PartialEq)]
pub enum Event {
    Offline,
    Online,
    /// A publish received on a valid topic. The payload has not been decoded.
    Message { topic: Topic, payload: Vec<u8> },
    InvalidPublish {
        reason: MessageError,
        topic: Vec<u8>,
        payload: Vec<u8>,
    },
}

/// Structure representing the last will of a Node or Application
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub retain: bool,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

impl LastWill {
    pub fn new(topic: Topic, payload: Vec<u8>) -> Self {
        let (qos, retain) = topic.publish_qos_retain();
        Self {
            topic: topic.to_string(),
            retain,
            qos,
            payload,
        }
    }
}
