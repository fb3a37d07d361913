//! Type facts supplied by the type checker.
//!
//! The analyses never inspect type structure beyond what is needed to name
//! parts of aggregates; conformance questions are answered as booleans.

use la_arena::{Arena, Idx};

/// Identifier of a type in a [`TypeTable`]
pub type TypeId = Idx<TypeInfo>;

/// A part (field or element) of an aggregate type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePart {
    /// Field name, or `None` for positional elements
    pub label: Option<String>,
    /// Type of the part
    pub ty: TypeId,
}

/// Resolved facts about one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Type name (for diagnostics)
    pub name: String,
    /// Supports explicit duplication
    pub copyable: bool,
    /// Supports ownership transfer
    pub movable: bool,
    /// Parts of the aggregate, empty for scalars
    pub parts: Vec<TypePart>,
}

impl TypeInfo {
    /// A copyable and movable scalar.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            copyable: true,
            movable: true,
            parts: Vec::new(),
        }
    }

    /// A movable but non-copyable scalar.
    pub fn linear(name: impl Into<String>) -> Self {
        Self {
            copyable: false,
            ..Self::scalar(name)
        }
    }

    /// Sets whether the type is copyable.
    #[must_use]
    pub fn copyable(mut self, copyable: bool) -> Self {
        self.copyable = copyable;
        self
    }

    /// Sets whether the type is movable.
    #[must_use]
    pub fn movable(mut self, movable: bool) -> Self {
        self.movable = movable;
        self
    }

    /// Adds a named field.
    #[must_use]
    pub fn field(mut self, label: impl Into<String>, ty: TypeId) -> Self {
        self.parts.push(TypePart {
            label: Some(label.into()),
            ty,
        });
        self
    }

    /// Adds a positional element.
    #[must_use]
    pub fn element(mut self, ty: TypeId) -> Self {
        self.parts.push(TypePart { label: None, ty });
        self
    }
}

/// Conformance facts the analyses need about types.
pub trait TypeFacts {
    /// Is the type copyable?
    fn is_copyable(&self, ty: TypeId) -> bool;

    /// Is the type movable (sinkable)?
    fn is_movable(&self, ty: TypeId) -> bool;

    /// Parts of an aggregate type.
    fn parts(&self, ty: TypeId) -> &[TypePart];

    /// Display name of the type.
    fn type_name(&self, ty: TypeId) -> &str;

    /// Type reached by following `path` from `ty`, if the path is valid.
    fn part_type(&self, ty: TypeId, path: &[u32]) -> Option<TypeId> {
        let mut current = ty;
        for part in path {
            current = self.parts(current).get(*part as usize)?.ty;
        }
        Some(current)
    }
}

/// Table of all types referenced by a module
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Arena<TypeInfo>,
}

impl TypeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type and returns its identifier.
    pub fn add(&mut self, info: TypeInfo) -> TypeId {
        self.types.alloc(info)
    }

    /// Looks up a type.
    #[must_use]
    pub fn get(&self, ty: TypeId) -> &TypeInfo {
        &self.types[ty]
    }
}

impl TypeFacts for TypeTable {
    fn is_copyable(&self, ty: TypeId) -> bool {
        self.types[ty].copyable
    }

    fn is_movable(&self, ty: TypeId) -> bool {
        self.types[ty].movable
    }

    fn parts(&self, ty: TypeId) -> &[TypePart] {
        &self.types[ty].parts
    }

    fn type_name(&self, ty: TypeId) -> &str {
        &self.types[ty].name
    }
}
