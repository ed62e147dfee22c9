//! # QCP Message Builder
//!
//! ## Purpose
//!
//! Client-side construction of QCP programs. The builder accumulates
//! outgoing headers, computes and back-patches the length fields of loop
//! and conditional bodies, and tracks a scope tree so qubit handles can be
//! checked for liveness across nested conditionals before anything is
//! transmitted.
//!
//! ## Architecture Role
//!
//! ```text
//! application code → [MessageBuilder] → MessageSink → transport (elsewhere)
//!                          ↓
//!                 byte-identical frames the dispatcher consumes
//! ```
//!
//! ## What This Crate Does NOT Contain
//!
//! - Socket setup, retries, address-book resolution
//! - Reading reply messages (a transport-level reader decodes them with
//!   the `codec` crate)
//!
//! ## Usage
//!
//! ```no_run
//! use client::{MessageBuilder, RecordingSink};
//!
//! let mut builder = MessageBuilder::new(RecordingSink::default(), 1);
//! let q = builder.new_qubit().unwrap();
//! builder.mix(|program| {
//!     let outcome = program.measure_inplace(q)?;
//!     program.if_(outcome.equals(1), |body| body.x(q))?;
//!     program.else_(|body| body.h(q))
//! }).unwrap();
//! ```

pub mod app_id;
pub mod builder;
pub mod error;
pub mod qubit;
pub mod scope;
pub mod sink;
pub mod values;

pub use app_id::AppIdPool;
pub use builder::MessageBuilder;
pub use error::{BuildError, BuildResult};
pub use qubit::Qubit;
pub use scope::{ScopeArena, ScopeId};
pub use sink::{MessageSink, RecordingSink};
pub use values::{Condition, ValueRef};
