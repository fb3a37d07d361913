//! Control-flow IR consumed by the ownership analyses.
//!
//! A [`Module`] holds the type facts, callee declarations, and one
//! [`FunctionBody`] per function. Bodies are graphs of [`BasicBlock`]s whose
//! statements name storage through [`Place`]s rooted at [`Binding`]s. Every
//! binding belongs to a lexical [`Scope`]; the end of a scope is an explicit
//! statement so that the analyses see lifetimes as ordinary program points.

mod body;
mod builder;
mod convention;
mod oracle;
mod signature;
mod types;

pub use body::*;
pub use builder::BodyBuilder;
pub use convention::{Convention, ConventionMap, ConventionSet};
pub use oracle::{ConventionOracle, DeclaredConventions, call_sites, declared_conventions};
pub use signature::*;
pub use types::{TypeFacts, TypeId, TypeInfo, TypePart, TypeTable};

use la_arena::Arena;

/// Everything the analyses need to know about one compilation unit
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Type facts
    pub types: TypeTable,
    /// Plain function signatures
    pub signatures: Arena<Signature>,
    /// Bundle declarations
    pub bundles: Arena<BundleDecl>,
    /// Function bodies to analyze
    pub functions: Vec<FunctionBody>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a plain function signature.
    pub fn add_signature(&mut self, name: impl Into<String>, params: Vec<ParamDecl>) -> SignatureId {
        self.signatures.alloc(Signature {
            name: name.into(),
            params,
        })
    }

    /// Declares a bundle.
    pub fn add_bundle(&mut self, bundle: BundleDecl) -> BundleId {
        self.bundles.alloc(bundle)
    }

    /// Adds a function body.
    pub fn add_function(&mut self, body: FunctionBody) {
        self.functions.push(body);
    }

    /// Display name of a callee.
    #[must_use]
    pub fn callee_name(&self, callee: Callee) -> &str {
        match callee {
            Callee::Function(signature) => &self.signatures[signature].name,
            Callee::Bundle(bundle) => &self.bundles[bundle].name,
        }
    }
}
