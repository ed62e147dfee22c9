//! The message builder: accumulates headers, back-patches body lengths,
//! and enforces qubit liveness before anything reaches the wire.
//!
//! Two transmission disciplines: immediate mode wraps every instruction in
//! its own COMMAND message and commits it; pend mode collects headers
//! until [`MessageBuilder::flush`] (or the close of a MIX program) wraps
//! them behind a single message header. Loops and conditionals exist only
//! inside MIX programs, where each instruction group is announced by a
//! type header so the dispatcher can re-frame it.

use std::collections::HashMap;

use bytes::BytesMut;
use codec::{
    AssignHeader, CmdHeader, CodecResult, CommHeader, FactoryHeader, IfHeader, Instruction,
    MessageHeader, MessageType, RotationHeader, TargetQubitHeader, TypeHeader, Wire,
    PROTOCOL_VERSION,
};
use tracing::{debug, warn};

use crate::error::{BuildError, BuildResult};
use crate::qubit::{Qubit, QubitState};
use crate::scope::{ScopeArena, ScopeId};
use crate::sink::MessageSink;
use crate::values::{Condition, ValueRef};

/// One not-yet-transmitted header. Kept typed so placeholder length fields
/// can be patched in place when a loop or conditional closes.
#[derive(Debug, Clone, Copy)]
enum PendingHeader {
    Cmd(CmdHeader),
    Comm(CommHeader),
    TargetQubit(TargetQubitHeader),
    Rotation(RotationHeader),
    Assign(AssignHeader),
    Factory(FactoryHeader),
    Type(TypeHeader),
    If(IfHeader),
}

impl PendingHeader {
    fn wire_size(&self) -> usize {
        match self {
            PendingHeader::Cmd(_) => CmdHeader::WIRE_SIZE,
            PendingHeader::Comm(_) => CommHeader::WIRE_SIZE,
            PendingHeader::TargetQubit(_) => TargetQubitHeader::WIRE_SIZE,
            PendingHeader::Rotation(_) => RotationHeader::WIRE_SIZE,
            PendingHeader::Assign(_) => AssignHeader::WIRE_SIZE,
            PendingHeader::Factory(_) => FactoryHeader::WIRE_SIZE,
            PendingHeader::Type(_) => TypeHeader::WIRE_SIZE,
            PendingHeader::If(_) => IfHeader::WIRE_SIZE,
        }
    }

    fn encode_into(&self, buf: &mut BytesMut, version: u8) -> CodecResult<()> {
        match self {
            PendingHeader::Cmd(header) => header.encode_into(buf),
            PendingHeader::Comm(header) => header.encode_into(buf, version)?,
            PendingHeader::TargetQubit(header) => header.encode_into(buf),
            PendingHeader::Rotation(header) => header.encode_into(buf),
            PendingHeader::Assign(header) => header.encode_into(buf),
            PendingHeader::Factory(header) => header.encode_into(buf),
            PendingHeader::Type(header) => header.encode_into(buf),
            PendingHeader::If(header) => header.encode_into(buf),
        }
        Ok(())
    }
}

/// Client-side builder for QCP programs.
///
/// Qubit handles predict sequential backend ids; when the transport reader
/// learns the real id from a NEW_OK reply, [`MessageBuilder::register_qubit`]
/// reconciles the table.
pub struct MessageBuilder<S> {
    sink: S,
    app_id: u16,
    version: u8,
    default_notify: bool,
    pend_mode: bool,
    in_mix: bool,
    /// Cleared inside factory bodies, which carry raw command headers.
    annotate_types: bool,
    pending: Vec<PendingHeader>,
    scopes: ScopeArena,
    current_scope: Option<ScopeId>,
    last_closed_if: Option<(Condition, Option<ScopeId>)>,
    next_ref_id: u32,
    next_qubit_id: u16,
    qubits: HashMap<u16, QubitState>,
}

impl<S: MessageSink> MessageBuilder<S> {
    pub fn new(sink: S, app_id: u16) -> Self {
        Self {
            sink,
            app_id,
            version: PROTOCOL_VERSION,
            default_notify: true,
            pend_mode: false,
            in_mix: false,
            annotate_types: false,
            pending: Vec::new(),
            scopes: ScopeArena::default(),
            current_scope: None,
            last_closed_if: None,
            next_ref_id: 0,
            next_qubit_id: 1,
            qubits: HashMap::new(),
        }
    }

    /// Set the default notify flag for subsequent commands.
    pub fn with_notify(mut self, notify: bool) -> Self {
        self.default_notify = notify;
        self
    }

    pub fn app_id(&self) -> u16 {
        self.app_id
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Switch between immediate and pend mode; stale pending headers are
    /// flushed first.
    pub fn set_pending(&mut self, pend: bool) -> BuildResult<()> {
        if !self.pending.is_empty() {
            warn!("pending headers were never flushed, flushing now");
            self.flush()?;
        }
        self.pend_mode = pend;
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.pend_mode
    }

    // ---- plain messages ----------------------------------------------

    /// Alive check.
    pub fn hello(&mut self) -> BuildResult<()> {
        let mut buf = BytesMut::with_capacity(MessageHeader::WIRE_SIZE);
        MessageHeader::new(self.version, MessageType::Hello, self.app_id, 0).encode_into(&mut buf);
        self.sink.commit(buf.freeze())?;
        Ok(())
    }

    /// Ask for the creation time of a qubit. A standalone request/reply,
    /// committed immediately even in pend mode.
    pub fn get_time(&mut self, qubit: Qubit) -> BuildResult<()> {
        let mut buf = BytesMut::with_capacity(MessageHeader::WIRE_SIZE + CmdHeader::WIRE_SIZE);
        MessageHeader::new(
            self.version,
            MessageType::GetTime,
            self.app_id,
            CmdHeader::WIRE_SIZE as u32,
        )
        .encode_into(&mut buf);
        CmdHeader::new(qubit.id(), Instruction::I, self.default_notify, true).encode_into(&mut buf);
        self.sink.commit(buf.freeze())?;
        Ok(())
    }

    // ---- qubit lifecycle ---------------------------------------------

    /// Ask the backend for one fresh qubit.
    pub fn new_qubit(&mut self) -> BuildResult<Qubit> {
        self.put_command(0, Instruction::New, self.default_notify, true, None)?;
        Ok(self.activate_fresh())
    }

    /// Reserve `count` qubits at once; the backend answers with one
    /// NEW_OK per qubit.
    pub fn allocate(&mut self, count: u16) -> BuildResult<Vec<Qubit>> {
        // The qubit id field of an ALLOCATE carries the count.
        self.put_command(count, Instruction::Allocate, self.default_notify, true, None)?;
        Ok((0..count).map(|_| self.activate_fresh()).collect())
    }

    /// Adopt a backend-assigned qubit id learned from a reply.
    pub fn register_qubit(&mut self, qubit_id: u16) -> Qubit {
        self.next_qubit_id = self.next_qubit_id.max(qubit_id.wrapping_add(1));
        self.qubits.insert(qubit_id, QubitState::active());
        Qubit::new(qubit_id)
    }

    /// Release a qubit back to the backend. Allowed on inactive handles.
    pub fn release(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.put_command(qubit.id(), Instruction::Release, self.default_notify, true, None)?;
        self.deactivate(qubit);
        Ok(())
    }

    /// Release every handle still active, lowest id first.
    pub fn release_all(&mut self) -> BuildResult<()> {
        let mut active: Vec<u16> = self
            .qubits
            .iter()
            .filter(|(_, state)| state.active)
            .map(|(id, _)| *id)
            .collect();
        active.sort_unstable();
        for id in active {
            self.release(Qubit::new(id))?;
        }
        Ok(())
    }

    // ---- gates --------------------------------------------------------

    pub fn i(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.single_gate(Instruction::I, qubit)
    }

    pub fn x(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.single_gate(Instruction::X, qubit)
    }

    pub fn y(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.single_gate(Instruction::Y, qubit)
    }

    pub fn z(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.single_gate(Instruction::Z, qubit)
    }

    pub fn t(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.single_gate(Instruction::T, qubit)
    }

    pub fn h(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.single_gate(Instruction::H, qubit)
    }

    pub fn k(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.single_gate(Instruction::K, qubit)
    }

    pub fn rot_x(&mut self, qubit: Qubit, step: u8) -> BuildResult<()> {
        self.rotation(Instruction::RotX, qubit, step)
    }

    pub fn rot_y(&mut self, qubit: Qubit, step: u8) -> BuildResult<()> {
        self.rotation(Instruction::RotY, qubit, step)
    }

    pub fn rot_z(&mut self, qubit: Qubit, step: u8) -> BuildResult<()> {
        self.rotation(Instruction::RotZ, qubit, step)
    }

    pub fn cnot(&mut self, control: Qubit, target: Qubit) -> BuildResult<()> {
        self.two_qubit(Instruction::Cnot, control, target)
    }

    pub fn cphase(&mut self, control: Qubit, target: Qubit) -> BuildResult<()> {
        self.two_qubit(Instruction::Cphase, control, target)
    }

    pub fn reset(&mut self, qubit: Qubit) -> BuildResult<()> {
        self.check_active(qubit)?;
        self.put_command(qubit.id(), Instruction::Reset, self.default_notify, true, None)
    }

    fn single_gate(&mut self, instruction: Instruction, qubit: Qubit) -> BuildResult<()> {
        self.check_active(qubit)?;
        self.put_command(qubit.id(), instruction, self.default_notify, true, None)
    }

    fn rotation(&mut self, instruction: Instruction, qubit: Qubit, step: u8) -> BuildResult<()> {
        self.check_active(qubit)?;
        self.put_command(
            qubit.id(),
            instruction,
            self.default_notify,
            true,
            Some(PendingHeader::Rotation(RotationHeader::new(step))),
        )
    }

    fn two_qubit(&mut self, instruction: Instruction, control: Qubit, target: Qubit) -> BuildResult<()> {
        if control == target {
            return Err(BuildError::SameQubitTwice);
        }
        self.check_active(control)?;
        self.check_active(target)?;
        self.put_command(
            control.id(),
            instruction,
            self.default_notify,
            true,
            Some(PendingHeader::TargetQubit(TargetQubitHeader::new(target.id()))),
        )
    }

    // ---- measurement --------------------------------------------------

    /// Destructive measurement; the handle goes inactive.
    pub fn measure(&mut self, qubit: Qubit) -> BuildResult<ValueRef> {
        self.measure_impl(qubit, false)
    }

    /// Measure and leave the qubit in the post-measurement state.
    pub fn measure_inplace(&mut self, qubit: Qubit) -> BuildResult<ValueRef> {
        self.measure_impl(qubit, true)
    }

    fn measure_impl(&mut self, qubit: Qubit, inplace: bool) -> BuildResult<ValueRef> {
        self.check_active(qubit)?;
        let instruction = if inplace {
            Instruction::MeasureInplace
        } else {
            Instruction::Measure
        };
        // Fresh reference handles only matter for pended programs; an
        // immediate measure is answered by a MEASOUT reply instead.
        let ref_id = if self.pend_mode {
            let id = self.next_ref_id;
            self.next_ref_id += 1;
            id
        } else {
            0
        };
        self.put_command(
            qubit.id(),
            instruction,
            false,
            true,
            Some(PendingHeader::Assign(AssignHeader::new(ref_id))),
        )?;
        if !inplace {
            self.deactivate(qubit);
        }
        Ok(ValueRef::new(ref_id))
    }

    // ---- qubit transfer and entanglement ------------------------------

    /// Send the qubit to a remote node; the handle goes inactive.
    pub fn send_qubit(
        &mut self,
        qubit: Qubit,
        remote_app_id: u16,
        remote_node: u32,
        remote_port: u16,
    ) -> BuildResult<()> {
        self.check_active(qubit)?;
        self.put_command(
            qubit.id(),
            Instruction::Send,
            self.default_notify,
            true,
            Some(PendingHeader::Comm(CommHeader::new(
                remote_app_id,
                remote_node,
                remote_port,
            ))),
        )?;
        self.deactivate(qubit);
        Ok(())
    }

    /// Receive a qubit sent by a remote node.
    pub fn recv_qubit(&mut self) -> BuildResult<Qubit> {
        self.put_command(0, Instruction::Recv, self.default_notify, true, None)?;
        Ok(self.activate_fresh())
    }

    /// Create an EPR pair with a remote node; returns the local half.
    pub fn create_epr(
        &mut self,
        remote_app_id: u16,
        remote_node: u32,
        remote_port: u16,
    ) -> BuildResult<Qubit> {
        self.put_command(
            0,
            Instruction::Epr,
            self.default_notify,
            true,
            Some(PendingHeader::Comm(CommHeader::new(
                remote_app_id,
                remote_node,
                remote_port,
            ))),
        )?;
        Ok(self.activate_fresh())
    }

    /// Receive the local half of an EPR pair created by a remote node.
    pub fn recv_epr(&mut self) -> BuildResult<Qubit> {
        self.put_command(0, Instruction::EprRecv, self.default_notify, true, None)?;
        Ok(self.activate_fresh())
    }

    // ---- MIX programs -------------------------------------------------

    /// Build a MIX program: a single message mixing commands, loops and
    /// conditionals. Pend mode is forced on for the closure's duration and
    /// the finished program commits as one message on success.
    pub fn mix<F>(&mut self, program: F) -> BuildResult<()>
    where
        F: FnOnce(&mut Self) -> BuildResult<()>,
    {
        if self.in_mix {
            return Err(BuildError::NestedMix);
        }
        if !self.pending.is_empty() {
            warn!("pending headers were never flushed, flushing before MIX");
            self.flush()?;
        }

        self.in_mix = true;
        self.annotate_types = true;
        self.pend_mode = true;
        self.current_scope = Some(self.scopes.push_root());

        let result = program(self);

        self.in_mix = false;
        self.annotate_types = false;
        self.pend_mode = false;
        self.current_scope = None;
        self.last_closed_if = None;

        match result {
            Ok(()) => self.commit_pending(MessageType::Mix),
            Err(err) => {
                self.pending.clear();
                Err(err)
            }
        }
    }

    /// Repeat the body `times` times, encoded as an embedded factory.
    pub fn loop_<F>(&mut self, times: u8, body: F) -> BuildResult<()>
    where
        F: FnOnce(&mut Self) -> BuildResult<()>,
    {
        if !self.in_mix {
            return Err(BuildError::OutsideMix("loop"));
        }
        let marker = self.pending.len();
        self.pending
            .push(PendingHeader::Type(TypeHeader::new(MessageType::Factory, 0)));
        self.pending
            .push(PendingHeader::Factory(FactoryHeader::new(times, false, false)));

        // Factory bodies carry raw command headers, no per-group
        // announcements; the dispatcher re-frames the whole body.
        let annotate = self.annotate_types;
        self.annotate_types = false;
        let result = body(self);
        self.annotate_types = annotate;
        result?;

        let body_length: usize = self.pending[marker + 1..]
            .iter()
            .map(PendingHeader::wire_size)
            .sum();
        if let PendingHeader::Type(type_header) = &mut self.pending[marker] {
            type_header.length = body_length as u32;
        }
        debug!(times, body_length, "closed loop");
        Ok(())
    }

    /// Conditional branch over a recorded outcome.
    pub fn if_<F>(&mut self, condition: Condition, body: F) -> BuildResult<()>
    where
        F: FnOnce(&mut Self) -> BuildResult<()>,
    {
        self.conditional(condition, false, body)
    }

    /// Branch taken when the directly preceding `if_` was not. Usage error
    /// when there is no closed `if_` in the same scope.
    pub fn else_<F>(&mut self, body: F) -> BuildResult<()>
    where
        F: FnOnce(&mut Self) -> BuildResult<()>,
    {
        let (condition, parent) = self.last_closed_if.take().ok_or(BuildError::ElseWithoutIf)?;
        if parent != self.current_scope {
            return Err(BuildError::ElseWithoutIf);
        }
        self.conditional(condition.negated(), true, body)
    }

    fn conditional<F>(&mut self, condition: Condition, is_else: bool, body: F) -> BuildResult<()>
    where
        F: FnOnce(&mut Self) -> BuildResult<()>,
    {
        if !self.in_mix {
            return Err(BuildError::OutsideMix("conditional"));
        }
        self.pending.push(PendingHeader::Type(TypeHeader::new(
            MessageType::If,
            IfHeader::WIRE_SIZE as u32,
        )));
        let marker = self.pending.len();
        self.pending.push(PendingHeader::If(condition.to_if_header(0)));

        let parent = self.current_scope;
        let scope = match parent {
            Some(parent) => self.scopes.push_child(parent),
            None => self.scopes.push_root(),
        };
        self.current_scope = Some(scope);
        let result = body(self);
        self.current_scope = parent;
        result?;

        let body_length: usize = self.pending[marker + 1..]
            .iter()
            .map(PendingHeader::wire_size)
            .sum();
        if let PendingHeader::If(if_header) = &mut self.pending[marker] {
            if_header.body_length = body_length as u32;
        }
        self.last_closed_if = if is_else { None } else { Some((condition, parent)) };
        debug!(body_length, is_else, "closed conditional");
        Ok(())
    }

    // ---- flushing -----------------------------------------------------

    /// Serialize everything pending behind one COMMAND header and commit.
    pub fn flush(&mut self) -> BuildResult<()> {
        self.flush_factory(1, false)
    }

    /// Flush the pending list as a factory of `num_iter` iterations. The
    /// factory notify bit is the OR of the pended commands' notify flags.
    pub fn flush_factory(&mut self, num_iter: u8, block: bool) -> BuildResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if num_iter == 1 {
            self.commit_pending(MessageType::Command)
        } else {
            let should_notify = self
                .pending
                .iter()
                .any(|header| matches!(header, PendingHeader::Cmd(cmd) if cmd.notify));
            self.pending.insert(
                0,
                PendingHeader::Factory(FactoryHeader::new(num_iter, should_notify, block)),
            );
            self.commit_pending(MessageType::Factory)
        }
    }

    fn commit_pending(&mut self, msg_type: MessageType) -> BuildResult<()> {
        let length: usize = self.pending.iter().map(PendingHeader::wire_size).sum();
        let mut buf = BytesMut::with_capacity(MessageHeader::WIRE_SIZE + length);
        MessageHeader::new(self.version, msg_type, self.app_id, length as u32)
            .encode_into(&mut buf);
        for header in &self.pending {
            header.encode_into(&mut buf, self.version)?;
        }
        self.pending.clear();
        debug!(
            app_id = self.app_id,
            tp = msg_type.name(),
            length,
            "committing message"
        );
        self.sink.commit(buf.freeze())?;
        Ok(())
    }

    // ---- internals ----------------------------------------------------

    fn put_command(
        &mut self,
        qubit_id: u16,
        instruction: Instruction,
        notify: bool,
        block: bool,
        extra: Option<PendingHeader>,
    ) -> BuildResult<()> {
        let cmd = PendingHeader::Cmd(CmdHeader::new(qubit_id, instruction, notify, block));
        let group_length = cmd.wire_size() + extra.map_or(0, |header| header.wire_size());

        if self.pend_mode {
            if self.in_mix && self.annotate_types {
                self.pending.push(PendingHeader::Type(TypeHeader::new(
                    MessageType::Command,
                    group_length as u32,
                )));
            }
            debug!(instr = instruction.name(), "pending command");
            self.pending.push(cmd);
            if let Some(extra) = extra {
                self.pending.push(extra);
            }
        } else {
            let mut buf = BytesMut::with_capacity(MessageHeader::WIRE_SIZE + group_length);
            MessageHeader::new(
                self.version,
                MessageType::Command,
                self.app_id,
                group_length as u32,
            )
            .encode_into(&mut buf);
            cmd.encode_into(&mut buf, self.version)?;
            if let Some(extra) = extra {
                extra.encode_into(&mut buf, self.version)?;
            }
            debug!(instr = instruction.name(), "sending command");
            self.sink.commit(buf.freeze())?;
        }
        Ok(())
    }

    fn activate_fresh(&mut self) -> Qubit {
        let id = self.next_qubit_id;
        self.next_qubit_id += 1;
        self.qubits.insert(id, QubitState::active());
        Qubit::new(id)
    }

    fn deactivate(&mut self, qubit: Qubit) {
        if let Some(state) = self.qubits.get_mut(&qubit.id()) {
            state.active = false;
            state.deactivation_scope = self.current_scope;
        }
    }

    /// The liveness check. An inactive handle is an error only when the
    /// deactivation is certain to have happened: outside any conditional,
    /// or in the current scope, an ancestor, or a descendant. A handle
    /// deactivated in a sibling branch stays usable, because static
    /// analysis cannot prove both branches execute.
    fn check_active(&self, qubit: Qubit) -> BuildResult<()> {
        let Some(state) = self.qubits.get(&qubit.id()) else {
            return Err(BuildError::QubitNotActive(qubit.id()));
        };
        if state.active {
            return Ok(());
        }
        let certain = match (self.current_scope, state.deactivation_scope) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(current), Some(deactivated)) => self.scopes.related(current, deactivated),
        };
        if certain {
            Err(BuildError::QubitNotActive(qubit.id()))
        } else {
            Ok(())
        }
    }
}
