//! Decode errors for QCP headers.
//!
//! Every variant carries enough context to tell a truncated read apart from
//! a byte that does not map into one of the closed type registries. Decode
//! errors at the framing layer are non-recoverable for the connection's
//! current read; decode errors inside a payload are classified by the
//! dispatcher into protocol error replies.

use thiserror::Error;

/// Header decode errors with diagnostic context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer is too small to contain the requested fixed-width header.
    #[error("buffer too short for {context}: need {need} bytes, got {got}")]
    Truncated {
        need: usize,
        got: usize,
        context: &'static str,
    },

    /// Message type byte is not in the registry.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// Instruction byte is not in the registry.
    #[error("unknown instruction {0}")]
    UnknownInstruction(u8),

    /// Logical operator byte of an IF header is not EQ/NEQ.
    #[error("unknown logical operator {0}")]
    UnknownOperator(u8),

    /// Second-operand kind byte of an IF header is not VALUE/REF.
    #[error("unknown operand kind {0}")]
    UnknownOperandKind(u8),

    /// Protocol version for which no wire layout is defined; layout
    /// selection for version-dependent headers would be ambiguous.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Announced payload exceeds the configured limit.
    #[error("payload too large: {size} bytes exceeds limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl CodecError {
    /// Truncation error with the fixed context string of the header being read.
    pub fn truncated(need: usize, got: usize, context: &'static str) -> Self {
        Self::Truncated { need, got, context }
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;
