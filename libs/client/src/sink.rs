//! Message sink: where committed frames go.
//!
//! Transport is an external collaborator; the builder only needs a place
//! to hand complete frames. Socket and file sinks live with the transport
//! code, the recording sink below backs tests.

use bytes::Bytes;

/// Receives complete wire frames from the builder.
pub trait MessageSink {
    /// Accept one complete frame (header plus payload).
    fn commit(&mut self, message: Bytes) -> std::io::Result<()>;
}

/// Sink that keeps every committed frame in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub messages: Vec<Bytes>,
}

impl MessageSink for RecordingSink {
    fn commit(&mut self, message: Bytes) -> std::io::Result<()> {
        self.messages.push(message);
        Ok(())
    }
}

impl<S: MessageSink> MessageSink for &mut S {
    fn commit(&mut self, message: Bytes) -> std::io::Result<()> {
        S::commit(self, message)
    }
}
