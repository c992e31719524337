use sparklet_types::topic::Topic;

use crate::{Event, MessageError};

fn parse_topic(topic: &[u8]) -> Result<Topic, MessageError> {
    let topic = String::from_utf8(topic.to_vec())?;
    Ok(Topic::parse(&topic)?)
}

/// Convert a raw publish into an [Event]
///
/// Publishes on topics that cannot be parsed produce [Event::InvalidPublish].
pub fn topic_and_payload_to_event(topic: &[u8], payload: Vec<u8>) -> Event {
    match parse_topic(topic) {
        Ok(parsed) => Event::Message {
            topic: parsed,
            payload,
        },
        Err(reason) => Event::InvalidPublish {
            reason,
            topic: topic.to_vec(),
            payload,
        },
    }
}

#[cfg(test)]
mod tests {
    use sparklet_types::topic::{MessageKind, TopicError};

    use super::*;

    #[test]
    fn valid_topic() {
        let event = topic_and_payload_to_event(b"spBv1.0/G1/DDATA/E1/D1", vec![1, 2]);
        match event {
            Event::Message { topic, payload } => {
                assert_eq!(topic.kind(), MessageKind::DData);
                assert_eq!(payload, vec![1, 2]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn invalid_topic() {
        let event = topic_and_payload_to_event(b"spBv1.0/G1/NDATA", vec![]);
        assert_eq!(
            event,
            Event::InvalidPublish {
                reason: MessageError::InvalidTopic(TopicError::InvalidSegmentCount),
                topic: b"spBv1.0/G1/NDATA".to_vec(),
                payload: vec![],
            }
        );
        let event = topic_and_payload_to_event(&[0xff, 0xfe], vec![]);
        assert!(matches!(
            event,
            Event::InvalidPublish {
                reason: MessageError::TopicUtf8Error(_),
                ..
            }
        ));
    }
}
