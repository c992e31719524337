//! sparklet is a [Sparkplug](https://sparkplug.eclipse.org/) client library.
//!
//! It implements both sides of the protocol on top of an MQTT transport:
//!
//! - [eon]: an Edge Node publishing metrics for itself and its devices under the birth, death and
//!   sequence discipline, handling commands and rebirth requests.
//! - [app]: a Host Application tracking the liveness and last values of every node and device it
//!   subscribes to, and issuing commands.
//!
//! Revision A (`spAv1.0`) and revision B (`spBv1.0`) payloads are supported through the same metric
//! model, see [types::Revision].
//!
//! # Feature Flags
//!
//! - `eon`: Edge Node engine. Enabled by default.
//! - `app`: Host Application engine. Enabled by default.
//! - `rumqtt-client`: [rumqttc](https://crates.io/crates/rumqttc) based transport. Enabled by default.
//!
//! # Example
//!
//! ```no_run
//! use sparklet::{
//!     client::mqtt_client::rumqtt,
//!     eon::NodeBuilder,
//!     types::Metric,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let opts = rumqtt::MqttOptions::new("node", "localhost", 1883);
//!     let (eventloop, client) = rumqtt::EventLoop::new(opts, 10);
//!
//!     let (node, handle) = NodeBuilder::new(eventloop, client)
//!         .with_group_id("foo")
//!         .with_node_id("bar")
//!         .with_metrics(vec![Metric::new("temperature", 20.5f64)])
//!         .on_command(|target, metric| println!("{target:?} {metric:?}"))
//!         .build()
//!         .unwrap();
//!
//!     tokio::spawn(node.run());
//!     handle
//!         .publish(vec![Metric::new("temperature", 21.0f64)])
//!         .await
//!         .ok();
//! }
//! ```

#[cfg(feature = "app")]
pub use sparklet_app as app;
#[cfg(feature = "eon")]
pub use sparklet_eon as eon;
pub use sparklet_types as types;

pub mod client {
    pub use sparklet_client::*;

    #[cfg(feature = "rumqtt-client")]
    pub mod mqtt_client {
        pub use sparklet_client_rumqtt as rumqtt;
    }
}
