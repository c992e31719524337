//! Part of sparklet, a Sparkplug client library.
//!
//! A [rumqttc] MQTT v5 implementation of the [sparklet_client] transport traits.

mod client;

pub use client::{Client, EventLoop};
pub use rumqttc::v5::MqttOptions;
