//! # QCP Protocol Codec
//!
//! ## Purpose
//!
//! Encoding and decoding rules for every QCP header. QCP is a binary
//! application-layer protocol through which a classical control program
//! drives a remote qubit-processing backend: qubit allocation, gates,
//! measurement, qubit transfer, entanglement generation, and — encoded
//! directly in the wire format — loops (factories) and conditional
//! branches (IF).
//!
//! ## What This Crate Contains
//!
//! - Fixed-width big-endian header types with `encode`/`decode` (§ [`wire`])
//! - The closed type registries: message types, instructions, logical
//!   operators (§ [`types`])
//! - Protocol constants: version, command option bits (§ [`constants`])
//! - Decode error types with diagnostic context (§ [`error`])
//!
//! ## What This Crate Does NOT Contain
//!
//! - Server-side dispatch logic (belongs in `dispatch`)
//! - Client-side message construction and scope tracking (belongs in `client`)
//! - Network transport, connection management, address resolution
//!
//! ## Framing
//!
//! ```text
//! ┌────────────────────┬──────────────────────────────────────┐
//! │ MessageHeader (8B) │ payload (exactly `length` bytes)     │
//! └────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! Every message on the wire is a [`wire::MessageHeader`] followed by exactly
//! `length` payload bytes. No header's length field covers its own bytes;
//! lengths always refer to *following* bytes.

pub mod constants;
pub mod error;
pub mod types;
pub mod wire;

// Re-export key types for convenience
pub use constants::{opt, PROTOCOL_VERSION};
pub use error::{CodecError, CodecResult};
pub use types::{ExtraHeaderKind, Instruction, LogicalOperator, MessageType, OperandKind};
pub use wire::{
    AssignHeader, CmdHeader, CommHeader, FactoryHeader, IfHeader, MeasOutHeader, MessageHeader,
    RotationHeader, TargetQubitHeader, TimeInfoHeader, TypeHeader, Wire,
};
