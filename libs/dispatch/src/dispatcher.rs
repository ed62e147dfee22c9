//! The per-connection message dispatcher.
//!
//! One [`CommandDispatcher`] serves one connection. Each inbound message is
//! handled to completion: the reply queue of the addressed application is
//! reset, the type handler runs, and the queued replies are encoded and
//! returned. MIX envelopes re-enter the dispatcher recursively through a
//! boxed future; IF evaluation steers the MIX cursor instead of
//! interpreting skipped bytes.

use std::collections::HashMap;

use bytes::Bytes;
use codec::{
    AssignHeader, CmdHeader, CodecError, CommHeader, FactoryHeader, IfHeader, MeasOutHeader,
    MessageHeader, MessageType, OperandKind, RotationHeader, TargetQubitHeader, TimeInfoHeader,
    TypeHeader, Instruction, Wire,
};
use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::backend::{QubitBackend, RemoteEndpoint, RotationAxis, SingleQubitGate, TwoQubitGate};
use crate::config::DispatchConfig;
use crate::context::{AppContext, Reply, ReplyPayload, SEQUENCE_LOCK};
use crate::error::{DispatchError, DispatchResult};

/// Outcome of one message-type handler.
enum Flow {
    /// Whether the terminal DONE reply should be appended.
    Notify(bool),
    /// Bytes the enclosing MIX cursor must skip (IF evaluation result).
    Skip(u32),
}

/// Server-side state machine over `{HELLO, COMMAND, FACTORY, GET_TIME, MIX,
/// IF}`, generic over the backend that executes individual commands.
pub struct CommandDispatcher<B> {
    backend: B,
    config: DispatchConfig,
    apps: HashMap<u16, AppContext>,
}

impl<B: QubitBackend> CommandDispatcher<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, DispatchConfig::default())
    }

    pub fn with_config(backend: B, config: DispatchConfig) -> Self {
        Self {
            backend,
            config,
            apps: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn app(&mut self, app_id: u16) -> &mut AppContext {
        self.apps.entry(app_id).or_default()
    }

    fn queue_reply(&mut self, version: u8, msg_type: MessageType, app_id: u16) {
        self.app(app_id).replies.push(Reply::new(version, msg_type, app_id));
    }

    fn queue_value_reply(
        &mut self,
        version: u8,
        msg_type: MessageType,
        app_id: u16,
        payload: ReplyPayload,
    ) {
        self.app(app_id)
            .replies
            .push(Reply::with_payload(version, msg_type, app_id, payload));
    }

    /// Handle one complete frame: message header plus at least `length`
    /// payload bytes. A malformed or truncated frame is a hard error for
    /// the connection's current read, distinct from the protocol error
    /// replies produced for failures inside a well-framed payload.
    pub async fn handle_frame(&mut self, frame: &[u8]) -> Result<Vec<Bytes>, CodecError> {
        let header = MessageHeader::decode(frame)?;
        let length = header.length as usize;
        if length > self.config.limits.max_payload_size {
            return Err(CodecError::PayloadTooLarge {
                size: length,
                limit: self.config.limits.max_payload_size,
            });
        }
        let end = MessageHeader::WIRE_SIZE + length;
        let payload = frame
            .get(MessageHeader::WIRE_SIZE..end)
            .ok_or(CodecError::Truncated {
                need: end,
                got: frame.len(),
                context: "message payload",
            })?;
        Ok(self.dispatch(header, payload).await)
    }

    /// Handle one decoded message and return the encoded replies, in order.
    pub async fn dispatch(&mut self, header: MessageHeader, payload: &[u8]) -> Vec<Bytes> {
        debug!(%header, "dispatching message");
        self.app(header.app_id).replies.clear();

        if header.version > self.config.limits.max_version {
            debug!(version = header.version, "protocol version too new");
            self.queue_reply(header.version, MessageType::ErrUnsupp, header.app_id);
        } else {
            match self.handle_by_type(header, payload).await {
                Ok(Flow::Notify(true)) => {
                    debug!("message successful, queueing DONE");
                    self.queue_reply(header.version, MessageType::Done, header.app_id);
                }
                Ok(Flow::Notify(false)) | Ok(Flow::Skip(_)) => {}
                Err(err) => {
                    error!(%err, "message handling failed");
                    self.queue_reply(header.version, err.reply_type(), header.app_id);
                }
            }
        }

        let replies: Vec<Bytes> = self
            .app(header.app_id)
            .replies
            .drain(..)
            .map(|reply| reply.encode())
            .collect();
        debug!(count = replies.len(), "returning replies");
        replies
    }

    /// Type dispatch, boxed so MIX handling can re-enter it recursively.
    fn handle_by_type<'a>(
        &'a mut self,
        header: MessageHeader,
        payload: &'a [u8],
    ) -> BoxFuture<'a, DispatchResult<Flow>> {
        Box::pin(async move {
            let msg_type = header
                .message_type()
                .map_err(|_| DispatchError::UnsupportedType(header.msg_type))?;
            match msg_type {
                MessageType::Hello => {
                    debug!(app_id = header.app_id, "alive check");
                    self.queue_reply(header.version, MessageType::Hello, header.app_id);
                    Ok(Flow::Notify(false))
                }
                MessageType::Command => self.handle_command(&header, payload).await,
                MessageType::Factory => self.handle_factory(&header, payload).await,
                MessageType::GetTime => self.handle_get_time(&header, payload).await,
                MessageType::Mix => self.handle_mix(&header, payload).await,
                MessageType::If => {
                    let skip = self.handle_conditional(&header, payload)?;
                    Ok(Flow::Skip(skip))
                }
                other => Err(DispatchError::UnsupportedType(other.into())),
            }
        })
    }

    async fn handle_command(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
    ) -> DispatchResult<Flow> {
        let (success, should_notify) = self
            .process_commands(header, header.length as usize, payload)
            .await;
        Ok(Flow::Notify(success && should_notify))
    }

    /// Run a command list; also the body of each factory iteration.
    ///
    /// The notify flag of the whole list is the OR of the individual
    /// commands' flags. The first failure drops the remaining commands and
    /// queues exactly one error reply of the mapped kind.
    async fn process_commands(
        &mut self,
        header: &MessageHeader,
        length: usize,
        data: &[u8],
    ) -> (bool, bool) {
        let mut cursor = 0usize;
        let mut should_notify = false;
        while cursor < length {
            match self.run_command(header, data, cursor).await {
                Ok((consumed, notify)) => {
                    should_notify = should_notify || notify;
                    cursor += consumed;
                }
                Err(err) => {
                    error!(%err, "command failed, aborting remainder of list");
                    self.queue_reply(header.version, err.reply_type(), header.app_id);
                    return (false, false);
                }
            }
        }
        (true, should_notify)
    }

    /// Decode and execute one command at `cursor`; returns the consumed
    /// byte count and the command's notify flag. The instruction match is
    /// exhaustive: adding an instruction without a backend call does not
    /// compile.
    async fn run_command(
        &mut self,
        header: &MessageHeader,
        data: &[u8],
        cursor: usize,
    ) -> DispatchResult<(usize, bool)> {
        let rest = data.get(cursor..).ok_or(CodecError::Truncated {
            need: cursor,
            got: data.len(),
            context: "command list",
        })?;
        let cmd = CmdHeader::decode(rest)?;
        debug!(%cmd, "executing command");
        let extra = &rest[CmdHeader::WIRE_SIZE..];
        let mut consumed = CmdHeader::WIRE_SIZE;

        let app_id = header.app_id;
        let instruction = cmd
            .instruction()
            .map_err(|_| DispatchError::UnsupportedInstruction(cmd.instr))?;

        match instruction {
            Instruction::I => self.backend.identity(app_id, cmd.qubit_id).await?,
            Instruction::X => {
                self.backend
                    .apply_gate(app_id, cmd.qubit_id, SingleQubitGate::X)
                    .await?
            }
            Instruction::Y => {
                self.backend
                    .apply_gate(app_id, cmd.qubit_id, SingleQubitGate::Y)
                    .await?
            }
            Instruction::Z => {
                self.backend
                    .apply_gate(app_id, cmd.qubit_id, SingleQubitGate::Z)
                    .await?
            }
            Instruction::T => {
                self.backend
                    .apply_gate(app_id, cmd.qubit_id, SingleQubitGate::T)
                    .await?
            }
            Instruction::H => {
                self.backend
                    .apply_gate(app_id, cmd.qubit_id, SingleQubitGate::H)
                    .await?
            }
            Instruction::K => {
                self.backend
                    .apply_gate(app_id, cmd.qubit_id, SingleQubitGate::K)
                    .await?
            }
            Instruction::RotX | Instruction::RotY | Instruction::RotZ => {
                let rotation = RotationHeader::decode(extra)?;
                consumed += RotationHeader::WIRE_SIZE;
                let axis = match instruction {
                    Instruction::RotX => RotationAxis::X,
                    Instruction::RotY => RotationAxis::Y,
                    _ => RotationAxis::Z,
                };
                self.backend
                    .apply_rotation(app_id, cmd.qubit_id, axis, rotation.step)
                    .await?;
            }
            Instruction::Cnot | Instruction::Cphase => {
                let target = TargetQubitHeader::decode(extra)?;
                consumed += TargetQubitHeader::WIRE_SIZE;
                let gate = if instruction == Instruction::Cnot {
                    TwoQubitGate::Cnot
                } else {
                    TwoQubitGate::Cphase
                };
                self.backend
                    .apply_two_qubit(app_id, gate, cmd.qubit_id, target.qubit_id)
                    .await?;
            }
            Instruction::Measure | Instruction::MeasureInplace => {
                let assign = AssignHeader::decode(extra)?;
                consumed += AssignHeader::WIRE_SIZE;
                let inplace = instruction == Instruction::MeasureInplace;
                let outcome = self.backend.measure(app_id, cmd.qubit_id, inplace).await?;
                self.app(app_id).bind_reference(assign.ref_id, i64::from(outcome));
                self.queue_value_reply(
                    header.version,
                    MessageType::MeasOut,
                    app_id,
                    ReplyPayload::MeasOut(MeasOutHeader::new(outcome)),
                );
            }
            Instruction::Reset => self.backend.reset(app_id, cmd.qubit_id).await?,
            Instruction::New => {
                let qubit_id = self.backend.new_qubit(app_id).await?;
                self.queue_value_reply(
                    header.version,
                    MessageType::NewOk,
                    app_id,
                    ReplyPayload::Qubit(TargetQubitHeader::new(qubit_id)),
                );
            }
            Instruction::Allocate => {
                // The qubit id field of an ALLOCATE carries the count.
                let qubit_ids = self.backend.allocate(app_id, cmd.qubit_id).await?;
                for qubit_id in qubit_ids {
                    self.queue_value_reply(
                        header.version,
                        MessageType::NewOk,
                        app_id,
                        ReplyPayload::Qubit(TargetQubitHeader::new(qubit_id)),
                    );
                }
            }
            Instruction::Release => self.backend.release(app_id, cmd.qubit_id).await?,
            Instruction::Send => {
                let comm = CommHeader::decode(extra, header.version)?;
                consumed += CommHeader::WIRE_SIZE;
                self.backend
                    .send_qubit(app_id, cmd.qubit_id, remote_endpoint(&comm))
                    .await?;
            }
            Instruction::Recv => {
                let qubit_id = self.backend.recv_qubit(app_id).await?;
                self.queue_value_reply(
                    header.version,
                    MessageType::Recv,
                    app_id,
                    ReplyPayload::Qubit(TargetQubitHeader::new(qubit_id)),
                );
            }
            Instruction::Epr => {
                let comm = CommHeader::decode(extra, header.version)?;
                consumed += CommHeader::WIRE_SIZE;
                let qubit_id = self
                    .backend
                    .create_epr(app_id, remote_endpoint(&comm))
                    .await?;
                self.queue_value_reply(
                    header.version,
                    MessageType::EprOk,
                    app_id,
                    ReplyPayload::Qubit(TargetQubitHeader::new(qubit_id)),
                );
            }
            Instruction::EprRecv => {
                let qubit_id = self.backend.recv_epr(app_id).await?;
                self.queue_value_reply(
                    header.version,
                    MessageType::EprOk,
                    app_id,
                    ReplyPayload::Qubit(TargetQubitHeader::new(qubit_id)),
                );
            }
        }

        Ok((consumed, cmd.notify))
    }

    /// FACTORY: repeat the wrapped command list `num_iter` times. A
    /// blocking factory holds the process-wide sequencing lock for the
    /// whole loop, released on success or failure alike.
    async fn handle_factory(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
    ) -> DispatchResult<Flow> {
        let length = header.length as usize;
        if payload.len() < length || length < FactoryHeader::WIRE_SIZE {
            debug!("missing header(s) in factory");
            self.queue_reply(header.version, MessageType::ErrUnsupp, header.app_id);
            return Ok(Flow::Notify(false));
        }
        let factory = match FactoryHeader::decode(payload) {
            Ok(factory) => factory,
            Err(_) => {
                self.queue_reply(header.version, MessageType::ErrUnsupp, header.app_id);
                return Ok(Flow::Notify(false));
            }
        };
        debug!(%factory, "running factory");

        let body = &payload[FactoryHeader::WIRE_SIZE..];
        let body_length = length - FactoryHeader::WIRE_SIZE;

        let guard = if factory.block {
            debug!("acquiring sequencing lock for blocking factory");
            Some(SEQUENCE_LOCK.lock().await)
        } else {
            None
        };

        let mut success = true;
        for iteration in 0..factory.num_iter {
            let (ok, _) = self.process_commands(header, body_length, body).await;
            if !ok {
                debug!(iteration, "factory iteration failed, aborting remainder");
                success = false;
                break;
            }
        }

        if guard.is_some() {
            debug!("releasing sequencing lock");
        }
        drop(guard);

        Ok(Flow::Notify(success && factory.notify))
    }

    /// GET_TIME: one command header selects the qubit; replies INF_TIME.
    async fn handle_get_time(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
    ) -> DispatchResult<Flow> {
        let cmd = CmdHeader::decode(payload)?;
        let datetime = self.backend.qubit_time(header.app_id, cmd.qubit_id).await?;
        self.queue_value_reply(
            header.version,
            MessageType::InfTime,
            header.app_id,
            ReplyPayload::TimeInfo(TimeInfoHeader::new(datetime)),
        );
        Ok(Flow::Notify(cmd.notify))
    }

    /// MIX: a sequence of (TypeHeader, sub-message) pairs, each re-entered
    /// as a fresh top-level message. When the body is consumed the reply
    /// queue collapses to the first error, or to a single DONE.
    async fn handle_mix(&mut self, header: &MessageHeader, payload: &[u8]) -> DispatchResult<Flow> {
        let length = header.length as usize;
        let mut cursor = 0usize;
        while cursor < length {
            match self.run_mix_entry(*header, payload, cursor).await {
                Ok(next) => cursor = next,
                Err(err) => {
                    error!(%err, "embedded message failed, aborting MIX body");
                    self.queue_reply(header.version, err.reply_type(), header.app_id);
                    break;
                }
            }
        }

        let collapsed = self
            .app(header.app_id)
            .replies
            .iter()
            .find(|reply| reply.is_error())
            .copied()
            .unwrap_or_else(|| Reply::new(header.version, MessageType::Done, header.app_id));
        debug!(reply = collapsed.msg_type.name(), "collapsed MIX replies");
        let app = self.app(header.app_id);
        app.replies.clear();
        app.replies.push(collapsed);

        // The collapse already decided the terminal reply.
        Ok(Flow::Notify(false))
    }

    /// One MIX entry: decode the announcement, re-enter the dispatcher,
    /// and return the next cursor position (announced length, plus the
    /// skip distance for IF sub-messages).
    async fn run_mix_entry(
        &mut self,
        header: MessageHeader,
        payload: &[u8],
        cursor: usize,
    ) -> DispatchResult<usize> {
        let rest = payload.get(cursor..).ok_or(CodecError::Truncated {
            need: cursor,
            got: payload.len(),
            context: "MIX body",
        })?;
        let type_header = TypeHeader::decode(rest)?;
        debug!(%type_header, "embedded message");

        let sub_header = type_header.to_message_header(header.version, header.app_id);
        let body = &rest[TypeHeader::WIRE_SIZE..];
        let flow = self.handle_by_type(sub_header, body).await?;

        let mut next = cursor + TypeHeader::WIRE_SIZE + type_header.length as usize;
        if let Flow::Skip(skip) = flow {
            next += skip as usize;
        }
        Ok(next)
    }

    /// IF: evaluate the comparison against the reference table. Returns 0
    /// when the body must run, or the body length the caller must skip.
    /// Branch-not-taken is pure cursor advancement; skipped commands are
    /// never interpreted.
    fn handle_conditional(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
    ) -> DispatchResult<u32> {
        let if_header = IfHeader::decode(payload)?;
        debug!(%if_header, "evaluating conditional");

        let app = self.app(header.app_id);
        let first = app.lookup_reference(if_header.first_operand);
        let second = match if_header.second_operand_kind {
            OperandKind::Value => Some(i64::from(if_header.second_operand)),
            OperandKind::Ref => app.lookup_reference(if_header.second_operand),
        };

        let (Some(first), Some(second)) = (first, second) else {
            debug!("unassigned reference handle, conditional evaluates to false");
            self.queue_reply(header.version, MessageType::ErrGeneral, header.app_id);
            return Ok(if_header.body_length);
        };

        if if_header.operator.holds(first, second) {
            Ok(0)
        } else {
            Ok(if_header.body_length)
        }
    }
}

fn remote_endpoint(comm: &CommHeader) -> RemoteEndpoint {
    RemoteEndpoint {
        app_id: comm.remote_app_id,
        node: comm.remote_node,
        port: comm.remote_port,
    }
}
