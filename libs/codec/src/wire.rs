//! # QCP Header Wire Formats
//!
//! Fixed-width big-endian encode/decode for every header variant. Decoding
//! is bounds-checked against each header's `WIRE_SIZE` and never reads past
//! the requested width, so headers can be peeled off the front of a larger
//! payload slice. Encoding appends to a [`BytesMut`] and cannot fail for
//! well-formed field values.
//!
//! The one version-dependent layout is [`CommHeader`]: protocol versions
//! below 2 ordered the fields app/node/port, version 2 orders them
//! app/port/node. Both layouts are 8 bytes; callers pass the negotiated
//! version explicitly.
//!
//! `Display` implementations are informational renderings for logs and
//! carry no wire contract.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::opt;
use crate::error::{CodecError, CodecResult};
use crate::types::{Instruction, LogicalOperator, MessageType, OperandKind};

/// Fixed-width wire encoding for a header.
pub trait Wire: Sized {
    /// Exact encoded width in bytes.
    const WIRE_SIZE: usize;

    /// Name used in truncation diagnostics.
    const CONTEXT: &'static str;

    /// Append the encoded header to `buf`.
    fn encode_into(&self, buf: &mut BytesMut);

    /// Decode from the first `WIRE_SIZE` bytes of `buf`.
    fn decode(buf: &[u8]) -> CodecResult<Self>;

    /// Encode into a fresh buffer.
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::WIRE_SIZE);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Bounds check shared by all `decode` implementations.
    fn check_len(buf: &[u8]) -> CodecResult<()> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(CodecError::truncated(Self::WIRE_SIZE, buf.len(), Self::CONTEXT));
        }
        Ok(())
    }
}

/// Top-level message header preceding every QCP message.
///
/// `length` is the byte count of the payload that follows this header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u8,
    /// Raw message type byte. An out-of-registry value is not a decode
    /// error; the dispatcher answers it with an unsupported-type reply.
    pub msg_type: u8,
    pub app_id: u16,
    pub length: u32,
}

impl MessageHeader {
    pub fn new(version: u8, msg_type: MessageType, app_id: u16, length: u32) -> Self {
        Self {
            version,
            msg_type: msg_type.into(),
            app_id,
            length,
        }
    }

    /// Resolve the raw type byte against the registry.
    pub fn message_type(&self) -> CodecResult<MessageType> {
        Ok(MessageType::try_from(self.msg_type)?)
    }
}

impl Wire for MessageHeader {
    const WIRE_SIZE: usize = 8;
    const CONTEXT: &'static str = "MessageHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.msg_type);
        buf.put_u16(self.app_id);
        buf.put_u32(self.length);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        Ok(Self {
            version: buf[0],
            msg_type: buf[1],
            app_id: BigEndian::read_u16(&buf[2..4]),
            length: BigEndian::read_u32(&buf[4..8]),
        })
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tp = MessageType::try_from(self.msg_type)
            .map(|t| t.name())
            .unwrap_or("?");
        write!(
            f,
            "MessageHeader version={} type={}({}) app_id={} length={}",
            self.version, tp, self.msg_type, self.app_id, self.length
        )
    }
}

/// Command header: one instruction applied to one qubit handle, plus the
/// notify/block/action option flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdHeader {
    pub qubit_id: u16,
    /// Raw instruction byte; resolved via [`CmdHeader::instruction`].
    pub instr: u8,
    pub notify: bool,
    pub block: bool,
    pub action: bool,
}

impl CmdHeader {
    pub fn new(qubit_id: u16, instruction: Instruction, notify: bool, block: bool) -> Self {
        Self {
            qubit_id,
            instr: instruction.into(),
            notify,
            block,
            action: false,
        }
    }

    /// Resolve the raw instruction byte against the registry.
    pub fn instruction(&self) -> CodecResult<Instruction> {
        Ok(Instruction::try_from(self.instr)?)
    }
}

impl Wire for CmdHeader {
    const WIRE_SIZE: usize = 4;
    const CONTEXT: &'static str = "CmdHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        let mut options = 0u8;
        if self.notify {
            options |= opt::NOTIFY;
        }
        if self.action {
            options |= opt::ACTION;
        }
        if self.block {
            options |= opt::BLOCK;
        }
        buf.put_u16(self.qubit_id);
        buf.put_u8(self.instr);
        buf.put_u8(options);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        let options = buf[3];
        Ok(Self {
            qubit_id: BigEndian::read_u16(&buf[0..2]),
            instr: buf[2],
            notify: options & opt::NOTIFY != 0,
            block: options & opt::BLOCK != 0,
            action: options & opt::ACTION != 0,
        })
    }
}

impl fmt::Display for CmdHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instr = Instruction::try_from(self.instr)
            .map(|i| i.name())
            .unwrap_or("?");
        write!(
            f,
            "CmdHeader qubit_id={} instr={}({}) notify={} block={} action={}",
            self.qubit_id, instr, self.instr, self.notify, self.block, self.action
        )
    }
}

/// Remote endpoint for SEND and EPR commands.
///
/// The only version-dependent header: not `Wire`, since decode and encode
/// need the negotiated protocol version to pick the field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommHeader {
    pub remote_app_id: u16,
    pub remote_node: u32,
    pub remote_port: u16,
}

impl CommHeader {
    /// Encoded width; identical for both layouts.
    pub const WIRE_SIZE: usize = 8;

    pub fn new(remote_app_id: u16, remote_node: u32, remote_port: u16) -> Self {
        Self {
            remote_app_id,
            remote_node,
            remote_port,
        }
    }

    pub fn encode_into(&self, buf: &mut BytesMut, version: u8) -> CodecResult<()> {
        match version {
            0 | 1 => {
                buf.put_u16(self.remote_app_id);
                buf.put_u32(self.remote_node);
                buf.put_u16(self.remote_port);
            }
            2 => {
                buf.put_u16(self.remote_app_id);
                buf.put_u16(self.remote_port);
                buf.put_u32(self.remote_node);
            }
            v => return Err(CodecError::UnsupportedVersion(v)),
        }
        Ok(())
    }

    pub fn decode(buf: &[u8], version: u8) -> CodecResult<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(CodecError::truncated(Self::WIRE_SIZE, buf.len(), "CommHeader"));
        }
        match version {
            0 | 1 => Ok(Self {
                remote_app_id: BigEndian::read_u16(&buf[0..2]),
                remote_node: BigEndian::read_u32(&buf[2..6]),
                remote_port: BigEndian::read_u16(&buf[6..8]),
            }),
            2 => Ok(Self {
                remote_app_id: BigEndian::read_u16(&buf[0..2]),
                remote_port: BigEndian::read_u16(&buf[2..4]),
                remote_node: BigEndian::read_u32(&buf[4..8]),
            }),
            v => Err(CodecError::UnsupportedVersion(v)),
        }
    }
}

impl fmt::Display for CommHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommHeader remote_app_id={} remote_node={} remote_port={}",
            self.remote_app_id, self.remote_node, self.remote_port
        )
    }
}

/// Second qubit of a two-qubit gate. The same layout carries the qubit id
/// of NEW_OK / RECV / EPR_OK replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetQubitHeader {
    pub qubit_id: u16,
}

impl TargetQubitHeader {
    pub fn new(qubit_id: u16) -> Self {
        Self { qubit_id }
    }
}

impl Wire for TargetQubitHeader {
    const WIRE_SIZE: usize = 2;
    const CONTEXT: &'static str = "TargetQubitHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u16(self.qubit_id);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        Ok(Self {
            qubit_id: BigEndian::read_u16(&buf[0..2]),
        })
    }
}

impl fmt::Display for TargetQubitHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetQubitHeader qubit_id={}", self.qubit_id)
    }
}

/// Rotation angle in 2pi/256 increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationHeader {
    pub step: u8,
}

impl RotationHeader {
    pub fn new(step: u8) -> Self {
        Self { step }
    }
}

impl Wire for RotationHeader {
    const WIRE_SIZE: usize = 1;
    const CONTEXT: &'static str = "RotationHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.step);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        Ok(Self { step: buf[0] })
    }
}

impl fmt::Display for RotationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RotationHeader step={}", self.step)
    }
}

/// Reference handle under which a measurement outcome is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignHeader {
    pub ref_id: u32,
}

impl AssignHeader {
    pub fn new(ref_id: u32) -> Self {
        Self { ref_id }
    }
}

impl Wire for AssignHeader {
    const WIRE_SIZE: usize = 4;
    const CONTEXT: &'static str = "AssignHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.ref_id);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        Ok(Self {
            ref_id: BigEndian::read_u32(&buf[0..4]),
        })
    }
}

impl fmt::Display for AssignHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssignHeader ref_id={}", self.ref_id)
    }
}

/// Loop construct: repeat the wrapped command list `num_iter` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryHeader {
    pub num_iter: u8,
    pub notify: bool,
    pub block: bool,
}

impl FactoryHeader {
    pub fn new(num_iter: u8, notify: bool, block: bool) -> Self {
        Self {
            num_iter,
            notify,
            block,
        }
    }
}

impl Wire for FactoryHeader {
    const WIRE_SIZE: usize = 2;
    const CONTEXT: &'static str = "FactoryHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        let mut options = 0u8;
        if self.notify {
            options |= opt::NOTIFY;
        }
        if self.block {
            options |= opt::BLOCK;
        }
        buf.put_u8(self.num_iter);
        buf.put_u8(options);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        let options = buf[1];
        Ok(Self {
            num_iter: buf[0],
            notify: options & opt::NOTIFY != 0,
            block: options & opt::BLOCK != 0,
        })
    }
}

impl fmt::Display for FactoryHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FactoryHeader num_iter={} notify={} block={}",
            self.num_iter, self.notify, self.block
        )
    }
}

/// Announces the type and length of the next embedded sub-message inside a
/// MIX payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeHeader {
    /// Raw message type byte of the sub-message.
    pub msg_type: u8,
    pub length: u32,
}

impl TypeHeader {
    pub fn new(msg_type: MessageType, length: u32) -> Self {
        Self {
            msg_type: msg_type.into(),
            length,
        }
    }

    /// Resolve the raw type byte against the registry.
    pub fn message_type(&self) -> CodecResult<MessageType> {
        Ok(MessageType::try_from(self.msg_type)?)
    }

    /// The top-level header this announcement stands in for; MIX dispatch
    /// re-enters the dispatcher with it.
    pub fn to_message_header(&self, version: u8, app_id: u16) -> MessageHeader {
        MessageHeader {
            version,
            msg_type: self.msg_type,
            app_id,
            length: self.length,
        }
    }
}

impl Wire for TypeHeader {
    const WIRE_SIZE: usize = 5;
    const CONTEXT: &'static str = "TypeHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.msg_type);
        buf.put_u32(self.length);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        Ok(Self {
            msg_type: buf[0],
            length: BigEndian::read_u32(&buf[1..5]),
        })
    }
}

impl fmt::Display for TypeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tp = MessageType::try_from(self.msg_type)
            .map(|t| t.name())
            .unwrap_or("?");
        write!(
            f,
            "TypeHeader type={}({}) length={}",
            tp, self.msg_type, self.length
        )
    }
}

/// Inline conditional: compare a recorded outcome against a literal or a
/// second recorded outcome; a false comparison skips `body_length` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfHeader {
    /// Reference handle of the first operand.
    pub first_operand: u32,
    pub operator: LogicalOperator,
    pub second_operand_kind: OperandKind,
    /// Literal value or reference handle, per `second_operand_kind`.
    pub second_operand: u32,
    /// Byte span of the conditional body that follows this header.
    pub body_length: u32,
}

impl IfHeader {
    pub fn new(
        first_operand: u32,
        operator: LogicalOperator,
        second_operand_kind: OperandKind,
        second_operand: u32,
        body_length: u32,
    ) -> Self {
        Self {
            first_operand,
            operator,
            second_operand_kind,
            second_operand,
            body_length,
        }
    }
}

impl Wire for IfHeader {
    const WIRE_SIZE: usize = 14;
    const CONTEXT: &'static str = "IfHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.first_operand);
        buf.put_u8(self.operator.into());
        buf.put_u8(self.second_operand_kind.into());
        buf.put_u32(self.second_operand);
        buf.put_u32(self.body_length);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        Ok(Self {
            first_operand: BigEndian::read_u32(&buf[0..4]),
            operator: LogicalOperator::try_from(buf[4])?,
            second_operand_kind: OperandKind::try_from(buf[5])?,
            second_operand: BigEndian::read_u32(&buf[6..10]),
            body_length: BigEndian::read_u32(&buf[10..14]),
        })
    }
}

impl fmt::Display for IfHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.second_operand_kind {
            OperandKind::Value => "value",
            OperandKind::Ref => "ref",
        };
        write!(
            f,
            "IfHeader ref={} operator={:?} {}={} body_length={}",
            self.first_operand, self.operator, kind, self.second_operand, self.body_length
        )
    }
}

/// Measurement outcome reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasOutHeader {
    pub outcome: u8,
}

impl MeasOutHeader {
    pub fn new(outcome: u8) -> Self {
        Self { outcome }
    }
}

impl Wire for MeasOutHeader {
    const WIRE_SIZE: usize = 1;
    const CONTEXT: &'static str = "MeasOutHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.outcome);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        Ok(Self { outcome: buf[0] })
    }
}

impl fmt::Display for MeasOutHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MeasOutHeader outcome={}", self.outcome)
    }
}

/// Qubit creation-time reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfoHeader {
    pub datetime: u64,
}

impl TimeInfoHeader {
    pub fn new(datetime: u64) -> Self {
        Self { datetime }
    }
}

impl Wire for TimeInfoHeader {
    const WIRE_SIZE: usize = 8;
    const CONTEXT: &'static str = "TimeInfoHeader";

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u64(self.datetime);
    }

    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Self::check_len(buf)?;
        Ok(Self {
            datetime: BigEndian::read_u64(&buf[0..8]),
        })
    }
}

impl fmt::Display for TimeInfoHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeInfoHeader datetime={}", self.datetime)
    }
}
