//! Part of sparklet, a Sparkplug client library.
//!
//! The Edge Node engine: birth/death/sequence discipline for a node and its devices, command
//! dispatch and reconnect handling.

mod birth;
mod builder;
mod config;
mod device;
mod error;
mod node;
mod session;

pub use builder::NodeBuilder;
pub use config::NodeConfig;
pub use error::{ConfigError, DeviceError, DeviceRegistrationError, PublishError, SequenceError};
pub use node::{CommandCallback, CommandTarget, EdgeNode, NodeHandle};
pub use session::SessionManager;
