use crate::error::SequenceError;

/// Owns the session number and the wrapping sequence counter of a node.
///
/// The session number doubles as the `bdSeq` of the node's birth and death certificates.
#[derive(Debug, Default)]
pub struct SessionManager {
    session: u64,
    seq: u8,
    active: bool,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session. Must be called once per successful connect before the birth is built.
    pub fn start_session(&mut self) -> u64 {
        self.session += 1;
        self.seq = 0;
        self.active = true;
        self.session
    }

    /// End the current session
    pub fn end_session(&mut self) {
        self.active = false;
    }

    /// End a session that never got its birth out. Its number is handed out again by the next [SessionManager::start_session].
    pub fn abandon_session(&mut self) {
        if self.active {
            self.active = false;
            self.session -= 1;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The current session number. 0 if no session has ever been started.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// The session number the next death certificate registered with the transport belongs to
    pub fn upcoming_session(&self) -> u64 {
        if self.active {
            self.session
        } else {
            self.session + 1
        }
    }

    /// Sequence number for a birth. Always 0, the following message gets 1.
    pub fn birth_sequence(&mut self) -> Result<u8, SequenceError> {
        if !self.active {
            return Err(SequenceError::NoSession);
        }
        self.seq = 1;
        Ok(0)
    }

    /// The value the next call to [SessionManager::next_sequence] will return
    pub fn peek_sequence(&self) -> Result<u8, SequenceError> {
        if !self.active {
            return Err(SequenceError::NoSession);
        }
        Ok(self.seq)
    }

    /// Return the current sequence number and advance it, wrapping 255 to 0.
    pub fn next_sequence(&mut self) -> Result<u8, SequenceError> {
        let seq = self.peek_sequence()?;
        self.seq = seq.wrapping_add(1);
        Ok(seq)
    }
}
