//! Dispatch errors and their mapping onto protocol error replies.

use codec::{CodecError, MessageType};
use thiserror::Error;

/// Failure raised while executing a message or a single command.
///
/// The variant selects the error reply the dispatcher emits: exactly one
/// reply per failed top-level message, never a DONE.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No qubit with this id is known for the application.
    #[error("unknown qubit id {qubit_id}")]
    UnknownQubit { qubit_id: u16 },

    /// Instruction byte outside the registry, or known but not implemented
    /// by the backend.
    #[error("unsupported instruction {0}")]
    UnsupportedInstruction(u8),

    /// Message type the state machine does not handle.
    #[error("unsupported message type {0}")]
    UnsupportedType(u8),

    /// The backend has no free qubits left.
    #[error("no qubits available")]
    NoQubitsAvailable,

    /// The qubit is blocked by another operation.
    #[error("qubit {0} already in use")]
    QubitInUse(u16),

    /// The backend did not complete in time.
    #[error("backend operation timed out")]
    Timeout,

    /// Any other backend failure.
    #[error("backend failure: {0}")]
    Backend(String),

    /// Malformed bytes inside a message payload.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl DispatchError {
    /// The error reply type this failure surfaces as.
    pub fn reply_type(&self) -> MessageType {
        match self {
            DispatchError::UnknownQubit { .. } => MessageType::ErrUnknown,
            DispatchError::UnsupportedInstruction(_) | DispatchError::UnsupportedType(_) => {
                MessageType::ErrUnsupp
            }
            DispatchError::NoQubitsAvailable => MessageType::ErrNoQubit,
            DispatchError::QubitInUse(_) => MessageType::ErrInUse,
            DispatchError::Timeout => MessageType::ErrTimeout,
            DispatchError::Backend(_) | DispatchError::Codec(_) => MessageType::ErrGeneral,
        }
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
