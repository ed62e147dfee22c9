//! The command-handler contract consumed from the external qubit backend.
//!
//! The dispatcher owns the exhaustive instruction match; the backend is
//! grouped by operation family so an implementation cannot forget a gate
//! without failing to compile. Every method may suspend on I/O with the
//! actual quantum hardware or simulator. An `Err` aborts the remainder of
//! the enclosing command list and is mapped onto an error reply by kind.

use async_trait::async_trait;

use crate::error::DispatchResult;

/// Single-qubit gates without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleQubitGate {
    X,
    Y,
    Z,
    T,
    H,
    K,
}

/// Axis of a parameterized rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAxis {
    X,
    Y,
    Z,
}

/// Two-qubit gates; the command qubit is the control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoQubitGate {
    Cnot,
    Cphase,
}

/// Remote peer of a SEND or EPR command, as carried in the communication
/// header. Resolution of symbolic node names happens outside this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub app_id: u16,
    pub node: u32,
    pub port: u16,
}

/// Contract the quantum backend must satisfy.
///
/// Qubit ids are scoped per application id. Implementations handle their
/// own interior mutability; the dispatcher only holds `&self`.
#[async_trait]
pub trait QubitBackend: Send + Sync {
    /// Identity: do nothing for one step.
    async fn identity(&self, app_id: u16, qubit_id: u16) -> DispatchResult<()>;

    /// Apply a parameterless single-qubit gate.
    async fn apply_gate(
        &self,
        app_id: u16,
        qubit_id: u16,
        gate: SingleQubitGate,
    ) -> DispatchResult<()>;

    /// Rotate by `step` * 2pi/256 around the given axis.
    async fn apply_rotation(
        &self,
        app_id: u16,
        qubit_id: u16,
        axis: RotationAxis,
        step: u8,
    ) -> DispatchResult<()>;

    /// Apply a two-qubit gate with `control` as the control qubit.
    async fn apply_two_qubit(
        &self,
        app_id: u16,
        gate: TwoQubitGate,
        control: u16,
        target: u16,
    ) -> DispatchResult<()>;

    /// Measure in the standard basis; destructive unless `inplace`.
    async fn measure(&self, app_id: u16, qubit_id: u16, inplace: bool) -> DispatchResult<u8>;

    /// Reset the qubit to |0>.
    async fn reset(&self, app_id: u16, qubit_id: u16) -> DispatchResult<()>;

    /// Create one fresh qubit and return its id.
    async fn new_qubit(&self, app_id: u16) -> DispatchResult<u16>;

    /// Reserve `count` qubits; one NEW_OK reply is emitted per returned id.
    async fn allocate(&self, app_id: u16, count: u16) -> DispatchResult<Vec<u16>>;

    /// Release a qubit back to the backend.
    async fn release(&self, app_id: u16, qubit_id: u16) -> DispatchResult<()>;

    /// Send the qubit to a remote node.
    async fn send_qubit(
        &self,
        app_id: u16,
        qubit_id: u16,
        remote: RemoteEndpoint,
    ) -> DispatchResult<()>;

    /// Receive a qubit sent by a remote node; returns the local id.
    async fn recv_qubit(&self, app_id: u16) -> DispatchResult<u16>;

    /// Create an EPR pair with the remote node; returns the local half's id.
    async fn create_epr(&self, app_id: u16, remote: RemoteEndpoint) -> DispatchResult<u16>;

    /// Receive the local half of an EPR pair created by a remote node.
    async fn recv_epr(&self, app_id: u16) -> DispatchResult<u16>;

    /// Creation timestamp of the qubit.
    async fn qubit_time(&self, app_id: u16, qubit_id: u16) -> DispatchResult<u64>;
}
