//! Which convention each call argument is passed with.

use crate::body::{CallSite, Callee, FunctionBody, Location};
use crate::convention::Convention;
use crate::Module;

/// Answers the convention every argument of a call is passed with.
///
/// Plain functions answer from their signature. Bundle receivers depend on
/// the variant chosen for the call site, which is why this is a seam: the
/// bundle resolver provides the implementation used by the full pipeline.
pub trait ConventionOracle {
    /// Conventions for `call`'s arguments, in argument order.
    fn argument_conventions(&self, location: Location, call: &CallSite) -> Vec<Convention>;
}

/// Oracle that answers from declarations only; bundle receivers use `let`.
#[derive(Debug, Clone, Copy)]
pub struct DeclaredConventions<'m> {
    module: &'m Module,
}

impl<'m> DeclaredConventions<'m> {
    /// Creates an oracle over `module`.
    #[must_use]
    pub fn new(module: &'m Module) -> Self {
        Self { module }
    }
}

impl ConventionOracle for DeclaredConventions<'_> {
    fn argument_conventions(&self, _location: Location, call: &CallSite) -> Vec<Convention> {
        declared_conventions(self.module, call, Convention::Let)
    }
}

/// Declared conventions of `call`'s arguments, with `receiver` standing in
/// for a bundle receiver.
#[must_use]
pub fn declared_conventions(module: &Module, call: &CallSite, receiver: Convention) -> Vec<Convention> {
    let declared: Vec<Convention> = match call.callee {
        Callee::Function(signature) => module.signatures[signature]
            .params
            .iter()
            .map(|param| param.convention)
            .collect(),
        Callee::Bundle(bundle) => std::iter::once(receiver)
            .chain(module.bundles[bundle].params.iter().map(|param| param.convention))
            .collect(),
    };

    // Arity is checked by the type checker; surplus arguments read as `let`.
    call.args
        .iter()
        .enumerate()
        .map(|(index, _)| declared.get(index).copied().unwrap_or(Convention::Let))
        .collect()
}

/// Every call site in `body` with its location.
pub fn call_sites(body: &FunctionBody) -> impl Iterator<Item = (Location, &CallSite)> {
    body.basic_blocks.iter().flat_map(|block| {
        block
            .statements
            .iter()
            .enumerate()
            .filter_map(move |(index, statement)| match &statement.kind {
                crate::StatementKind::Call(call) => Some((Location::new(block.id, index), call)),
                _ => None,
            })
    })
}
