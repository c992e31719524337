//! Part of sparklet, a Sparkplug client library.
//!
//! This library defines the transport traits and types the Edge Node and Host Application engines are built on.
//!
//! # Feature Flags
//!
//! - `channel-client`: Enables the channel based [EventLoop] and [Client] implementation. Disabled by default.
//!

mod traits;
mod types;
mod utils;

pub use traits::{Client, DynClient, DynEventLoop, EventLoop};
pub use types::*;
pub use utils::topic_and_payload_to_event;

/// A basic [EventLoop] and [Client] implementation based on channels
///
/// Useful for writing tests where it is not appropriate to be running a real MQTT client and broker setup
#[cfg(any(feature = "channel-client", test, doc))]
pub mod channel;
