//! Per-application dispatch state and the process-wide sequencing lock.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use codec::{MeasOutHeader, MessageHeader, MessageType, TargetQubitHeader, TimeInfoHeader, Wire};
use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tracing::warn;

/// The single sequencing lock shared by every *blocking* factory in the
/// process. A deliberate global serialization point: a blocking factory
/// holds it for its whole iteration loop so no other blocking factory, on
/// any connection, can interleave with the backend in between.
pub(crate) static SEQUENCE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Value payload of an outgoing reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPayload {
    /// Bare reply (DONE, HELLO, errors).
    None,
    /// Qubit id of NEW_OK / RECV / EPR_OK.
    Qubit(TargetQubitHeader),
    /// Measurement outcome.
    MeasOut(MeasOutHeader),
    /// Qubit creation time.
    TimeInfo(TimeInfoHeader),
}

impl ReplyPayload {
    fn wire_size(&self) -> usize {
        match self {
            ReplyPayload::None => 0,
            ReplyPayload::Qubit(_) => TargetQubitHeader::WIRE_SIZE,
            ReplyPayload::MeasOut(_) => MeasOutHeader::WIRE_SIZE,
            ReplyPayload::TimeInfo(_) => TimeInfoHeader::WIRE_SIZE,
        }
    }
}

/// One queued outgoing reply, kept typed until the dispatch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub version: u8,
    pub msg_type: MessageType,
    pub app_id: u16,
    pub payload: ReplyPayload,
}

impl Reply {
    pub fn new(version: u8, msg_type: MessageType, app_id: u16) -> Self {
        Self {
            version,
            msg_type,
            app_id,
            payload: ReplyPayload::None,
        }
    }

    pub fn with_payload(version: u8, msg_type: MessageType, app_id: u16, payload: ReplyPayload) -> Self {
        Self {
            version,
            msg_type,
            app_id,
            payload,
        }
    }

    pub fn is_error(&self) -> bool {
        self.msg_type.is_error()
    }

    /// Serialize to a complete wire frame: message header plus payload.
    pub fn encode(&self) -> Bytes {
        let header = MessageHeader::new(
            self.version,
            self.msg_type,
            self.app_id,
            self.payload.wire_size() as u32,
        );
        let mut buf = BytesMut::with_capacity(MessageHeader::WIRE_SIZE + self.payload.wire_size());
        header.encode_into(&mut buf);
        match &self.payload {
            ReplyPayload::None => {}
            ReplyPayload::Qubit(h) => h.encode_into(&mut buf),
            ReplyPayload::MeasOut(h) => h.encode_into(&mut buf),
            ReplyPayload::TimeInfo(h) => h.encode_into(&mut buf),
        }
        buf.freeze()
    }
}

/// Per-application dispatch state: the reference table read by IF
/// evaluation and the reply queue of the message currently being handled.
#[derive(Debug, Default)]
pub(crate) struct AppContext {
    references: HashMap<u32, i64>,
    pub(crate) replies: Vec<Reply>,
}

impl AppContext {
    /// Record a measurement outcome under a reference handle. Handles are
    /// write-once: the first binding wins and later bindings are dropped,
    /// so a factory that re-measures into the same handle still completes.
    pub(crate) fn bind_reference(&mut self, ref_id: u32, outcome: i64) {
        match self.references.entry(ref_id) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(outcome);
            }
            std::collections::hash_map::Entry::Occupied(slot) => {
                warn!(ref_id, kept = *slot.get(), dropped = outcome, "duplicate reference binding");
            }
        }
    }

    pub(crate) fn lookup_reference(&self, ref_id: u32) -> Option<i64> {
        self.references.get(&ref_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_encoding_carries_payload_length() {
        let reply = Reply::with_payload(
            2,
            MessageType::MeasOut,
            7,
            ReplyPayload::MeasOut(MeasOutHeader::new(1)),
        );
        let bytes = reply.encode();
        assert_eq!(bytes.len(), MessageHeader::WIRE_SIZE + 1);

        let header = MessageHeader::decode(&bytes).unwrap();
        assert_eq!(header.message_type().unwrap(), MessageType::MeasOut);
        assert_eq!(header.length, 1);
        assert_eq!(bytes[MessageHeader::WIRE_SIZE], 1);
    }

    #[test]
    fn test_reference_table_is_write_once() {
        let mut ctx = AppContext::default();
        ctx.bind_reference(4, 1);
        ctx.bind_reference(4, 0);
        assert_eq!(ctx.lookup_reference(4), Some(1));
        assert_eq!(ctx.lookup_reference(5), None);
    }
}
