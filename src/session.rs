//! Session state machine for a single accepted connection.
//!
//! A session starts in plaintext. Once compression is enabled both
//! directions go through the session's deflate contexts until the
//! connection closes; there is no way back to plaintext.

use std::borrow::Cow;

use crate::codec::{CodecError, DeflateCodec};

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Bytes on the wire are the payload.
    Plaintext,
    /// Bytes on the wire are raw deflate in both directions.
    Compressed,
    /// The handler loop has exited.
    Closed,
}

/// Transform and compression state for one connection.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    /// Allocated up front, used only in [`SessionState::Compressed`].
    codec: DeflateCodec,
}

impl Session {
    /// Create a new session in plaintext state.
    pub fn new() -> Self {
        Self {
            state: SessionState::Plaintext,
            codec: DeflateCodec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Turn bytes read from the socket into the logical payload.
    pub fn decode<'a>(&mut self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>, CodecError> {
        match self.state {
            SessionState::Compressed => Ok(Cow::Owned(self.codec.decompress(raw)?)),
            SessionState::Plaintext | SessionState::Closed => Ok(Cow::Borrowed(raw)),
        }
    }

    /// Turn a reply into the bytes written to the socket.
    pub fn encode<'a>(&mut self, reply: &'a [u8]) -> Result<Cow<'a, [u8]>, CodecError> {
        match self.state {
            SessionState::Compressed => Ok(Cow::Owned(self.codec.compress(reply)?)),
            SessionState::Plaintext | SessionState::Closed => Ok(Cow::Borrowed(reply)),
        }
    }

    /// Switch to compressed mode.
    ///
    /// Returns `true` on the actual transition; repeated requests leave the
    /// codec state untouched. A closed session stays closed.
    pub fn enable_compression(&mut self) -> bool {
        match self.state {
            SessionState::Plaintext => {
                self.state = SessionState::Compressed;
                true
            }
            SessionState::Compressed | SessionState::Closed => false,
        }
    }

    /// Mark the session closed.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
