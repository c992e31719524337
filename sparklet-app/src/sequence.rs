/// Result of checking the sequence number of a message
#[derive(Debug, PartialEq)]
pub(crate) enum SequenceCheck {
    InOrder,
    /// The message was not the next expected one. It may be late, duplicated or a message was missed.
    Gap { expected: u8, found: u8 },
}

/// Checks that a node's messages arrive with consecutive sequence numbers.
///
/// Out of order messages are not buffered or reassembled.
#[derive(Debug, Default)]
pub(crate) struct SequenceTracker {
    next: Option<u8>,
}

impl SequenceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A birth with sequence number `seq` was received
    pub(crate) fn birth(&mut self, seq: u8) {
        self.next = Some(seq.wrapping_add(1));
    }

    pub(crate) fn reset(&mut self) {
        self.next = None
    }

    pub(crate) fn expected(&self) -> Option<u8> {
        self.next
    }

    pub(crate) fn check(&mut self, seq: u8) -> SequenceCheck {
        let Some(expected) = self.next else {
            self.next = Some(seq.wrapping_add(1));
            return SequenceCheck::InOrder;
        };
        if seq != expected {
            return SequenceCheck::Gap {
                expected,
                found: seq,
            };
        }
        self.next = Some(expected.wrapping_add(1));
        SequenceCheck::InOrder
    }
}
