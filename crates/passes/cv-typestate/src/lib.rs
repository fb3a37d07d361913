//! Binding typestate tracking.
//!
//! Every binding moves through `Uninitialized`, `Initialized`,
//! `PartiallyConsumed` and `Consumed` as statements write, move and consume
//! it. [`TypestateAnalysis`] runs the forward fixpoint and reports reads of
//! values that are not there, bindings whose state depends on the path taken
//! to a join, and bindings leaving scope with parts moved out.

mod analysis;
mod error;
mod state;
mod transfer;

pub use analysis::{DEFAULT_MAX_ITERATIONS, TypestateAnalysis, TypestateResults, check_typestate};
pub use error::TypestateError;
pub use state::{BindingState, Cause, FlowState, MissingParts, TypeState};
pub use transfer::Transfer;
