use sparklet_app::NodeIdentifier;
use sparklet_types::{
    codec_for,
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    topic::{MessageKind, Topic},
    Metric, MetricValue, Revision, SessionMeta,
};

pub const GROUP: &str = "G1";
pub const NODE: &str = "E1";

pub fn node_id() -> NodeIdentifier {
    NodeIdentifier::new(GROUP, NODE)
}

pub fn node_topic(kind: MessageKind) -> Topic {
    Topic::build(Revision::B, kind, GROUP, NODE, None).unwrap()
}

pub fn device_topic(kind: MessageKind, device_id: &str) -> Topic {
    Topic::build(Revision::B, kind, GROUP, NODE, Some(device_id)).unwrap()
}

pub fn encode(metrics: &[Metric], seq: Option<u8>) -> Vec<u8> {
    codec_for(Revision::B)
        .encode(metrics, &SessionMeta::new(seq))
        .unwrap()
}

pub fn new_nbirth_payload(session: u64, metrics: Vec<Metric>) -> Vec<u8> {
    let mut payload_metrics = vec![
        Metric::new(BDSEQ, session as i64),
        Metric::new(NODE_CONTROL_REBIRTH, false),
    ];
    payload_metrics.extend(metrics);
    encode(&payload_metrics, Some(0))
}

pub fn new_ndeath_payload(session: u64) -> Vec<u8> {
    encode(&[Metric::new(BDSEQ, session as i64)], None)
}

pub fn new_data_payload(seq: u8, metrics: Vec<Metric>) -> Vec<u8> {
    encode(&metrics, Some(seq))
}

pub fn assert_payload_is_rebirth_request(payload: &[u8]) {
    let (metrics, meta) = codec_for(Revision::B).decode(payload).unwrap();
    assert_eq!(meta.seq, None);
    let rebirth = metrics
        .iter()
        .find(|m| m.name() == Some(NODE_CONTROL_REBIRTH))
        .expect("payload does not contain the rebirth metric");
    assert_eq!(rebirth.value, Some(MetricValue::Boolean(true)));
}
