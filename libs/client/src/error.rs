//! Local build and usage errors.
//!
//! These are raised client-side while assembling a program and are never
//! transmitted; a failed builder call leaves nothing on the wire.

use codec::CodecError;
use thiserror::Error;

/// Errors raised while building a QCP program.
#[derive(Debug, Error)]
pub enum BuildError {
    /// `else_` with no directly preceding closed `if_` in the same scope.
    #[error("cannot use an else with no if directly before it")]
    ElseWithoutIf,

    /// The qubit was sent, destructively measured, released, or never
    /// activated, and that deactivation is certain at this point.
    #[error("qubit {0} is not active")]
    QubitNotActive(u16),

    /// The application id is already claimed on this node.
    #[error("app id {0} is already in use")]
    AppIdInUse(u16),

    /// Loops and conditionals only exist inside a MIX program.
    #[error("{0} is only available inside a MIX program")]
    OutsideMix(&'static str),

    /// MIX programs cannot be nested.
    #[error("MIX programs cannot be nested")]
    NestedMix,

    /// A two-qubit gate needs two distinct qubits.
    #[error("two-qubit gate applied to a single qubit")]
    SameQubitTwice,

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The sink rejected the committed message.
    #[error("sink error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for builder operations.
pub type BuildResult<T> = std::result::Result<T, BuildError>;
