//! Bundle resolution and synthesis.
//!
//! A bundle declares some subset of the `let`, `inout`, `sink` and `set`
//! variants of one member. [`BundleTable`] closes the declared subset under
//! the synthesis rewrites, [`BundleResolver`] picks the variant each call site
//! needs from the receiver's usage context, and [`VariantFns`] evaluates
//! variants over concrete values.
//!
//! [`BundleResolution`] doubles as the [`cv_cfg::ConventionOracle`] the
//! typestate and exclusivity passes consult for receiver conventions.

mod error;
mod reference;
mod resolve;
mod synthesis;

pub use error::BundleError;
pub use reference::{EvalError, VariantFns};
pub use resolve::{BundleConfig, BundleResolution, BundleResolver, ResolvedVariant, resolve_bundles};
pub use synthesis::{BundleTable, ReceiverFacts, Step, Synthesis, VariantImpl, synthesize};
