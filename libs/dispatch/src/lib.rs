//! # QCP Command Dispatcher
//!
//! ## Purpose
//!
//! Server-side engine of the QCP protocol. Consumes one framed message at a
//! time, dispatches on the message type, executes command lists against an
//! externally supplied [`QubitBackend`], recursively unwraps factory loops
//! and MIX envelopes, and evaluates inline conditionals against outcomes
//! recorded earlier on the same application.
//!
//! ## Architecture Role
//!
//! ```text
//! client builder → binary frames → [CommandDispatcher] → QubitBackend
//!                                        ↓
//!                                  reply frames (DONE / ERR_* / values)
//! ```
//!
//! Execution is single-threaded cooperative per connection: decoding,
//! sub-dispatch and conditional evaluation run to completion; the only
//! suspension points are backend calls. Blocking factories serialize across
//! all connections through one process-wide sequencing lock.
//!
//! ## What This Crate Does NOT Contain
//!
//! - Socket accept/read loops, reconnect, address resolution
//! - The quantum state itself — gates and measurement are behind the
//!   [`QubitBackend`] contract

pub mod backend;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;

pub use backend::{QubitBackend, RemoteEndpoint, RotationAxis, SingleQubitGate, TwoQubitGate};
pub use config::{ConfigError, DispatchConfig};
pub use context::{Reply, ReplyPayload};
pub use dispatcher::CommandDispatcher;
pub use error::{DispatchError, DispatchResult};
