//! Active projection tracking.

use cv_cfg::{BindingId, Convention, FunctionBody, Place, ScopeId};
use cv_span::FileSpan;
use indexmap::IndexMap;

/// Access held by a projection while it is in scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    /// The projected place
    pub place: Place,
    /// Convention the projection was bound with
    pub convention: Convention,
    /// The projection binding
    pub holder: BindingId,
    /// Where the projection was bound
    pub span: FileSpan,
}

impl Access {
    /// Whether a new access to `place` under `convention` conflicts with this one.
    ///
    /// Two `let` accesses coexist; every other pair on overlapping storage
    /// conflicts.
    #[must_use]
    pub fn conflicts_with(&self, place: &Place, convention: Convention) -> bool {
        let shared = self.convention == Convention::Let && convention == Convention::Let;
        !shared && self.place.overlaps(place)
    }
}

/// Projections active at a program point, keyed by their binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSet {
    accesses: IndexMap<BindingId, Access>,
}

impl AccessSet {
    /// Creates an empty access set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First active access that conflicts with accessing `place` under `convention`.
    #[must_use]
    pub fn conflict(&self, place: &Place, convention: Convention) -> Option<&Access> {
        self.accesses
            .values()
            .find(|access| access.conflicts_with(place, convention))
    }

    /// Starts tracking a projection. `sink` projections consume their source
    /// and hold nothing.
    pub fn project(&mut self, access: Access) {
        if access.convention != Convention::Sink {
            self.accesses.insert(access.holder, access);
        }
    }

    /// Ends every projection bound in `scope`.
    pub fn end_scope(&mut self, body: &FunctionBody, scope: ScopeId) {
        self.accesses
            .retain(|holder, _| body.binding(*holder).scope != scope);
    }

    /// Adds the accesses of `other` that are not yet present.
    pub fn union(&mut self, other: &Self) {
        for (holder, access) in &other.accesses {
            self.accesses
                .entry(*holder)
                .or_insert_with(|| access.clone());
        }
    }

    /// Active accesses in the order they were bound.
    pub fn iter(&self) -> impl Iterator<Item = &Access> {
        self.accesses.values()
    }

    /// Number of active accesses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    /// Returns `true` if no projection is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }
}
