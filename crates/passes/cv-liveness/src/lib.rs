//! Last-use and escape resolution.
//!
//! [`Liveness`] runs a backward dataflow over a body's bindings and classifies
//! every use as the last or a continued use of the value it reads. Bundle
//! resolution reads the receiver classification through [`usage_context`],
//! and copy diagnostics read [`find_escapes`] for values that outlive their
//! source.

mod escape;
mod liveness;
mod usage;

pub use escape::{
    Consumption, Escape, EscapeKind, Extent, find_escapes, source_extent, storage_extent,
};
pub use liveness::{Effects, LiveSet, Liveness, UseKind, statement_effects, terminator_uses};
pub use usage::{UsageContext, usage_context};
