//! Version independent Sparkplug metric model, topics and payload codecs.

pub mod constants;

mod generated {
    pub(crate) mod kura_payload;
    pub(crate) mod sparkplug_payload;
}

pub mod codec;
pub mod known;
pub mod topic;
pub mod utils;

mod metric;
mod state;
mod status;
mod value;

pub use codec::{codec_for, CodecError, PayloadCodec, Revision, SessionMeta};
pub use known::{KnownMetric, KnownMetricsStorage, RegistryError, Validated};
pub use metric::*;
pub use state::*;
pub use status::*;
pub use value::*;

/// Represents a unique identifier of a metric
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MetricId {
    Name(String),
    Alias(u64),
}
