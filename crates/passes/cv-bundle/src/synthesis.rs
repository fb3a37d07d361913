//! Variant synthesis table.
//!
//! A missing variant is built from a declared one by a fixed rewrite:
//!
//! | Target  | Source  | Rewrite                                       | Requires |
//! |---------|---------|-----------------------------------------------|----------|
//! | `sink`  | `inout` | move receiver in, call `inout`, return it     | movable  |
//! | `sink`  | `let`   | call `let` on the moved-in receiver           | movable  |
//! | `inout` | `sink`  | `receiver = sink(receiver)`                   | movable  |
//! | `inout` | `let`   | the `sink` route through `let`                | movable  |
//! | `let`   | `inout` | copy receiver, call `inout`, return the copy  | copyable |
//! | `let`   | `sink`  | copy receiver, call `sink` on the copy        | copyable |
//!
//! `set` is never synthesized and never used as a source. Rows are tried top
//! to bottom for each target.

use std::fmt;

use cv_cfg::{Convention, ConventionMap, ConventionSet};
use serde::Serialize;

/// One step of a synthesized variant body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Step {
    /// `var local = receiver.copy()`
    CopyReceiver,
    /// `var local = receiver` (ownership moves into the local)
    MoveReceiverIn,
    /// Invoke the declared variant on the local
    Invoke(Convention),
    /// `receiver = local`
    AssignBackToReceiver,
    /// `return local`
    ReturnLocal,
}

/// A synthesized variant, named `<target>From<source>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Synthesis {
    /// `sink` from `inout`
    SinkFromInout,
    /// `sink` from `let`
    SinkFromLet,
    /// `inout` from `sink`
    InoutFromSink,
    /// `inout` from `let`, through the `sink` route
    InoutFromLet,
    /// `let` from `inout`
    LetFromInout,
    /// `let` from `sink`
    LetFromSink,
}

impl Synthesis {
    /// Convention the synthesized variant provides.
    #[must_use]
    pub fn target(self) -> Convention {
        match self {
            Self::SinkFromInout | Self::SinkFromLet => Convention::Sink,
            Self::InoutFromSink | Self::InoutFromLet => Convention::Inout,
            Self::LetFromInout | Self::LetFromSink => Convention::Let,
        }
    }

    /// Declared convention the rewrite calls.
    #[must_use]
    pub fn source(self) -> Convention {
        match self {
            Self::InoutFromSink | Self::LetFromSink => Convention::Sink,
            Self::SinkFromInout | Self::LetFromInout => Convention::Inout,
            Self::SinkFromLet | Self::InoutFromLet => Convention::Let,
        }
    }

    /// Whether the rewrite duplicates the receiver.
    #[must_use]
    pub fn requires_copy(self) -> bool {
        self.target() == Convention::Let
    }

    /// The rewritten body.
    #[must_use]
    pub fn steps(self) -> &'static [Step] {
        match self {
            Self::SinkFromInout => &[
                Step::MoveReceiverIn,
                Step::Invoke(Convention::Inout),
                Step::ReturnLocal,
            ],
            Self::SinkFromLet => &[
                Step::MoveReceiverIn,
                Step::Invoke(Convention::Let),
                Step::ReturnLocal,
            ],
            Self::InoutFromSink => &[
                Step::MoveReceiverIn,
                Step::Invoke(Convention::Sink),
                Step::AssignBackToReceiver,
            ],
            Self::InoutFromLet => &[
                Step::MoveReceiverIn,
                Step::Invoke(Convention::Let),
                Step::AssignBackToReceiver,
            ],
            Self::LetFromInout => &[
                Step::CopyReceiver,
                Step::Invoke(Convention::Inout),
                Step::ReturnLocal,
            ],
            Self::LetFromSink => &[
                Step::CopyReceiver,
                Step::Invoke(Convention::Sink),
                Step::ReturnLocal,
            ],
        }
    }

    /// Candidate rewrites for `target`, in preference order.
    fn candidates(target: Convention) -> &'static [Self] {
        match target {
            Convention::Sink => &[Self::SinkFromInout, Self::SinkFromLet],
            Convention::Inout => &[Self::InoutFromSink, Self::InoutFromLet],
            Convention::Let => &[Self::LetFromInout, Self::LetFromSink],
            Convention::Set => &[],
        }
    }
}

impl fmt::Display for Synthesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.target(), self.source())
    }
}

/// How a variant is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VariantImpl {
    /// Written by the bundle's author
    Declared(Convention),
    /// Built from a declared variant
    Synthesized(Synthesis),
}

impl VariantImpl {
    /// Convention the variant provides.
    #[must_use]
    pub fn convention(self) -> Convention {
        match self {
            Self::Declared(convention) => convention,
            Self::Synthesized(synthesis) => synthesis.target(),
        }
    }
}

impl fmt::Display for VariantImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared(convention) => write!(f, "{convention} (declared)"),
            Self::Synthesized(synthesis) => write!(
                f,
                "{} (synthesized from {})",
                synthesis.target(),
                synthesis.source()
            ),
        }
    }
}

/// Conformance facts of a bundle's receiver type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverFacts {
    /// Receiver can be duplicated
    pub copyable: bool,
    /// Receiver can be moved
    pub movable: bool,
}

/// Picks the rewrite that provides `target` from `declared`, if any.
#[must_use]
pub fn synthesize(
    target: Convention,
    declared: ConventionSet,
    facts: ReceiverFacts,
) -> Option<Synthesis> {
    Synthesis::candidates(target).iter().copied().find(|synthesis| {
        let allowed = if synthesis.requires_copy() {
            facts.copyable
        } else {
            facts.movable
        };
        allowed && declared.contains(synthesis.source())
    })
}

/// One slot per convention: the variant that answers it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleTable {
    variants: ConventionMap<Option<VariantImpl>>,
}

impl BundleTable {
    /// Fills the table from the declared subset, synthesizing the rest when
    /// `allow_synthesis` is set.
    #[must_use]
    pub fn build(declared: ConventionSet, facts: ReceiverFacts, allow_synthesis: bool) -> Self {
        let variants = ConventionMap::from_fn(|convention| {
            if declared.contains(convention) {
                Some(VariantImpl::Declared(convention))
            } else if allow_synthesis {
                synthesize(convention, declared, facts).map(VariantImpl::Synthesized)
            } else {
                None
            }
        });
        Self { variants }
    }

    /// Variant answering `convention`.
    #[must_use]
    pub fn get(&self, convention: Convention) -> Option<VariantImpl> {
        self.variants[convention]
    }

    /// Conventions with a declared or synthesized variant.
    #[must_use]
    pub fn available(&self) -> ConventionSet {
        let mut set = ConventionSet::empty();
        for (convention, variant) in self.variants.iter() {
            if variant.is_some() {
                set.insert(convention);
            }
        }
        set
    }

    /// Conventions whose variant is synthesized.
    #[must_use]
    pub fn synthesized(&self) -> ConventionSet {
        let mut set = ConventionSet::empty();
        for (convention, variant) in self.variants.iter() {
            if matches!(variant, Some(VariantImpl::Synthesized(_))) {
                set.insert(convention);
            }
        }
        set
    }
}
