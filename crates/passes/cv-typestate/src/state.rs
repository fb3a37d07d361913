//! Typestate lattice and per-point flow state.

use std::collections::BTreeSet;
use std::fmt;

use cv_cfg::{BindingId, TypeFacts, TypeId, paths_overlap};
use cv_span::FileSpan;
use indexmap::IndexMap;

/// Part paths that no longer hold a value
pub type MissingParts = BTreeSet<Vec<u32>>;

/// Ownership state of one binding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeState {
    /// Declared, no value yet
    Uninitialized,
    /// Holds a complete value
    Initialized,
    /// Holds a value with the listed parts missing
    PartiallyConsumed(MissingParts),
    /// Value given away
    Consumed,
}

impl TypeState {
    /// Whether the whole value is present.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Initialized)
    }

    /// Whether any part of the value is present.
    #[must_use]
    pub fn holds_value(&self) -> bool {
        matches!(self, Self::Initialized | Self::PartiallyConsumed(_))
    }
}

impl fmt::Display for TypeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Initialized => f.write_str("initialized"),
            Self::PartiallyConsumed(missing) => {
                write!(f, "partially consumed ({} parts missing)", missing.len())
            }
            Self::Consumed => f.write_str("consumed"),
        }
    }
}

/// What produced a binding's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cause {
    /// The declaration (parts never written)
    Declared,
    /// A write
    Initialized,
    /// A move or `sink` use
    Consumed,
}

/// State of one binding together with the site that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingState {
    /// Current state
    pub state: TypeState,
    /// What produced it
    pub cause: Cause,
    /// Where it was produced
    pub origin: FileSpan,
}

impl BindingState {
    /// Creates a binding state.
    #[must_use]
    pub fn new(state: TypeState, cause: Cause, origin: FileSpan) -> Self {
        Self {
            state,
            cause,
            origin,
        }
    }
}

/// States of every binding in scope at one program point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
    bindings: IndexMap<BindingId, BindingState>,
}

impl FlowState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `binding`, if it is in scope.
    #[must_use]
    pub fn get(&self, binding: BindingId) -> Option<&BindingState> {
        self.bindings.get(&binding)
    }

    /// Typestate of `binding`, if it is in scope.
    #[must_use]
    pub fn state(&self, binding: BindingId) -> Option<&TypeState> {
        self.get(binding).map(|entry| &entry.state)
    }

    /// Sets the state of `binding`.
    pub fn set(&mut self, binding: BindingId, state: BindingState) {
        self.bindings.insert(binding, state);
    }

    /// Removes `binding` from scope.
    pub fn remove(&mut self, binding: BindingId) -> Option<BindingState> {
        self.bindings.shift_remove(&binding)
    }

    /// Bindings in scope, in the order they entered it.
    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &BindingState)> {
        self.bindings.iter().map(|(binding, state)| (*binding, state))
    }

    /// Number of bindings in scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if no binding is in scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Number of parts at `prefix` inside a value of type `ty`.
fn part_count(types: &dyn TypeFacts, ty: TypeId, prefix: &[u32]) -> u32 {
    types
        .part_type(ty, prefix)
        .map_or(0, |part| types.parts(part).len() as u32)
}

/// Sibling paths of every step of `path` below `prefix`: the parts still
/// missing after writing `path` into a value missing everything at `prefix`.
pub fn complement(
    types: &dyn TypeFacts,
    ty: TypeId,
    prefix: &[u32],
    path: &[u32],
) -> MissingParts {
    let mut missing = MissingParts::new();
    for depth in prefix.len()..path.len() {
        let parent = &path[..depth];
        for index in 0..part_count(types, ty, parent) {
            if index != path[depth] {
                let mut sibling = parent.to_vec();
                sibling.push(index);
                missing.insert(sibling);
            }
        }
    }
    missing
}

/// Adds `path` to a missing set, folding paths it covers.
pub fn add_missing(missing: &mut MissingParts, path: &[u32]) {
    if missing.iter().any(|existing| path.starts_with(existing)) {
        return;
    }
    missing.retain(|existing| !existing.starts_with(path));
    missing.insert(path.to_vec());
}

/// Removes `path` from a missing set after it was written.
pub fn remove_missing(
    types: &dyn TypeFacts,
    ty: TypeId,
    missing: &mut MissingParts,
    path: &[u32],
) {
    missing.retain(|existing| !existing.starts_with(path));
    let enclosing: Vec<Vec<u32>> = missing
        .iter()
        .filter(|existing| path.starts_with(existing) && existing.len() < path.len())
        .cloned()
        .collect();
    for prefix in enclosing {
        missing.remove(&prefix);
        missing.extend(complement(types, ty, &prefix, path));
    }
}

/// The state of a value of type `ty` whose `missing` parts are gone.
#[must_use]
pub fn normalize(types: &dyn TypeFacts, ty: TypeId, missing: MissingParts) -> TypeState {
    if missing.is_empty() {
        return TypeState::Initialized;
    }
    let top = part_count(types, ty, &[]);
    let all_gone = top > 0 && (0..top).all(|index| missing.contains(&vec![index]));
    if all_gone || missing.iter().any(Vec::is_empty) {
        TypeState::Consumed
    } else {
        TypeState::PartiallyConsumed(missing)
    }
}

/// First missing path that overlaps `path`.
#[must_use]
pub fn overlapping_missing<'m>(missing: &'m MissingParts, path: &[u32]) -> Option<&'m Vec<u32>> {
    missing.iter().find(|existing| paths_overlap(existing, path))
}
