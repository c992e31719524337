use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unable to decode state message as json: {0}")]
pub struct StatePayloadError(#[from] serde_json::Error);

/// The JSON certificate a host application publishes on its STATE topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    pub online: bool,
    pub timestamp: u64,
}

impl StatePayload {
    pub fn online(timestamp: u64) -> Self {
        Self {
            online: true,
            timestamp,
        }
    }

    pub fn offline(timestamp: u64) -> Self {
        Self {
            online: false,
            timestamp,
        }
    }
}

impl From<StatePayload> for Vec<u8> {
    fn from(value: StatePayload) -> Self {
        // serialising a struct of two primitive fields cannot fail
        serde_json::to_vec(&value).unwrap_or_default()
    }
}

impl TryFrom<&[u8]> for StatePayload {
    type Error = StatePayloadError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(serde_json::from_slice(value)?)
    }
}
