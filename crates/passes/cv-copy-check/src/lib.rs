//! Copy diagnostics.
//!
//! Turns escapes found by liveness into missing-copy errors (or illegal
//! escapes when the value cannot be copied), flags explicit copies of values
//! at their last use, and records how each explicit copy is lowered.

mod checker;
mod error;

pub use checker::{CopyChecker, CopyConfig, CopyLint, CopyLowering, CopyReport};
pub use error::CopyError;
