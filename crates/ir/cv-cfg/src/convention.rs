//! Parameter-passing conventions and per-convention tables.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Ownership/access contract of a parameter or receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Convention {
    /// Immutable borrow
    Let,
    /// Exclusive mutable borrow, restored on exit
    Inout,
    /// Ownership transfer into the callee
    Sink,
    /// Initialization of uninitialized storage
    Set,
}

impl Convention {
    /// All conventions in table order.
    pub const ALL: [Self; 4] = [Self::Let, Self::Inout, Self::Sink, Self::Set];

    /// Slot of this convention in a [`ConventionMap`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Let => 0,
            Self::Inout => 1,
            Self::Sink => 2,
            Self::Set => 3,
        }
    }

    /// Whether the access needs exclusive use of the storage.
    #[must_use]
    pub fn is_exclusive(self) -> bool {
        !matches!(self, Self::Let)
    }

    /// Whether the access writes through to the caller's storage.
    #[must_use]
    pub fn writes_storage(self) -> bool {
        matches!(self, Self::Inout | Self::Set)
    }

    /// Source-level keyword.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Let => "let",
            Self::Inout => "inout",
            Self::Sink => "sink",
            Self::Set => "set",
        }
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Set of conventions, stored as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConventionSet(u8);

impl ConventionSet {
    /// The empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from a list of conventions.
    #[must_use]
    pub fn of(conventions: &[Convention]) -> Self {
        let mut set = Self::empty();
        for convention in conventions {
            set.insert(*convention);
        }
        set
    }

    /// Adds a convention.
    pub fn insert(&mut self, convention: Convention) {
        self.0 |= 1 << convention.index();
    }

    /// Returns `true` if `convention` is a member.
    #[must_use]
    pub fn contains(self, convention: Convention) -> bool {
        self.0 & (1 << convention.index()) != 0
    }

    /// Returns `true` if no convention is a member.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in table order.
    pub fn iter(self) -> impl Iterator<Item = Convention> {
        Convention::ALL
            .into_iter()
            .filter(move |convention| self.contains(*convention))
    }
}

impl fmt::Display for ConventionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(Convention::keyword).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Fixed-size table with one slot per convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConventionMap<T>([T; 4]);

impl<T> ConventionMap<T> {
    /// Builds a table by evaluating `init` for every convention.
    pub fn from_fn(mut init: impl FnMut(Convention) -> T) -> Self {
        Self(Convention::ALL.map(&mut init))
    }

    /// Slots paired with their convention, in table order.
    pub fn iter(&self) -> impl Iterator<Item = (Convention, &T)> {
        Convention::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<Convention> for ConventionMap<T> {
    type Output = T;

    fn index(&self, convention: Convention) -> &T {
        &self.0[convention.index()]
    }
}

impl<T> IndexMut<Convention> for ConventionMap<T> {
    fn index_mut(&mut self, convention: Convention) -> &mut T {
        &mut self.0[convention.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convention_set_membership() {
        let set = ConventionSet::of(&[Convention::Inout, Convention::Set]);
        assert!(set.contains(Convention::Inout));
        assert!(set.contains(Convention::Set));
        assert!(!set.contains(Convention::Let));
        assert_eq!(set.to_string(), "{inout, set}");
    }

    #[test]
    fn test_convention_map_slots() {
        let mut map = ConventionMap::from_fn(|convention| convention.index() * 10);
        map[Convention::Sink] = 7;
        assert_eq!(map[Convention::Inout], 10);
        assert_eq!(map[Convention::Sink], 7);
        assert_eq!(map.iter().count(), 4);
    }
}
