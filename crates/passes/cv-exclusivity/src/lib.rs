//! Exclusivity and convention checking.
//!
//! [`ExclusivityChecker`] validates every call argument, assignment and
//! projection against the convention it is made under: `inout` arguments
//! carry the mutation marker and name mutable storage, `set` targets hold no
//! value, overlapping accesses never coexist with an exclusive one, and
//! `inout`/`set` storage holds a value again when the callee or projection
//! ends.

mod access;
mod checker;
mod error;

pub use access::{Access, AccessSet};
pub use checker::{DEFAULT_MAX_ITERATIONS, ExclusivityChecker, check_exclusivity};
pub use error::{ExclusivityError, ExclusivityResult};
