//! Callee declarations: plain signatures and bundles.

use cv_span::FileSpan;
use la_arena::Idx;

use crate::convention::{Convention, ConventionSet};
use crate::types::TypeId;

/// Identifier of a [`Signature`]
pub type SignatureId = Idx<Signature>;

/// Identifier of a [`BundleDecl`]
pub type BundleId = Idx<BundleDecl>;

/// A declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    /// Parameter name
    pub name: String,
    /// Declared convention
    pub convention: Convention,
    /// Declared type
    pub ty: TypeId,
}

impl ParamDecl {
    /// Creates a parameter declaration.
    pub fn new(name: impl Into<String>, convention: Convention, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            convention,
            ty,
        }
    }
}

/// Signature of a plain (non-bundle) function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Function name
    pub name: String,
    /// Parameters in order
    pub params: Vec<ParamDecl>,
}

/// What a bundle implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKind {
    /// Method bundle
    Method,
    /// Subscript bundle
    Subscript,
    /// Property bundle
    Property,
}

/// A bundle: convention-keyed implementations of one method, subscript or
/// property. Only the set of declared receiver conventions matters to the
/// analyses; the bodies themselves live with code generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDecl {
    /// Member name
    pub name: String,
    /// Kind of member
    pub kind: BundleKind,
    /// Receiver type
    pub receiver_ty: TypeId,
    /// Non-receiver parameters, shared by every variant
    pub params: Vec<ParamDecl>,
    /// Receiver conventions with a declared implementation
    pub declared: ConventionSet,
    /// Declaration site
    pub span: FileSpan,
}
