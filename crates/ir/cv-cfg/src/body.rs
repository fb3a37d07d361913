//! Function bodies: bindings, scopes, and the control-flow graph.

use cv_span::FileSpan;
use serde::{Deserialize, Serialize};

use crate::convention::Convention;
use crate::signature::{BundleId, SignatureId};
use crate::types::{TypeFacts, TypeId};

/// Basic block ID
pub type BasicBlockId = usize;

/// Binding ID (index into [`FunctionBody::bindings`])
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BindingId(pub u32);

impl BindingId {
    /// Index into the binding table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lexical scope ID (index into [`FunctionBody::scopes`])
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// The function's root scope, which holds the parameters.
    pub const ROOT: Self = Self(0);

    /// Index into the scope table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a binding holds its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Mutable owned local (`var`)
    Var,
    /// Immutable owned local (`let`)
    Let,
    /// Parameter passed under a convention
    Param(Convention),
    /// Non-owning view of another binding under a convention
    Projection(Convention),
}

/// Ownership class of a binding's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The binding owns its value and may give it away
    Owned,
    /// Immutable borrow; the value can be read but never consumed
    BorrowedImmutable,
    /// Mutable borrow; the value can be moved out but must be restored
    BorrowedMutable,
}

impl BindingKind {
    /// Ownership class of the binding.
    #[must_use]
    pub fn ownership(self) -> Ownership {
        match self {
            Self::Var | Self::Let => Ownership::Owned,
            Self::Param(convention) | Self::Projection(convention) => match convention {
                Convention::Sink => Ownership::Owned,
                Convention::Let => Ownership::BorrowedImmutable,
                Convention::Inout | Convention::Set => Ownership::BorrowedMutable,
            },
        }
    }

    /// Whether the binding's storage may be written after initialization.
    #[must_use]
    pub fn is_mutable(self) -> bool {
        match self {
            Self::Var => true,
            Self::Let => false,
            Self::Param(convention) | Self::Projection(convention) => convention != Convention::Let,
        }
    }

    /// Whether the binding is `let`-bound (borrowed immutably).
    #[must_use]
    pub fn is_let_bound(self) -> bool {
        self.ownership() == Ownership::BorrowedImmutable
    }

    /// Convention of a parameter, if this is one.
    #[must_use]
    pub fn param_convention(self) -> Option<Convention> {
        match self {
            Self::Param(convention) => Some(convention),
            _ => None,
        }
    }
}

/// A named storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Binding ID
    pub id: BindingId,
    /// Source name
    pub name: String,
    /// Declared type
    pub ty: TypeId,
    /// How the binding holds its value
    pub kind: BindingKind,
    /// Scope the binding is declared in
    pub scope: ScopeId,
    /// Declaration site
    pub span: FileSpan,
}

/// A lexical scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Scope ID
    pub id: ScopeId,
    /// Enclosing scope
    pub parent: Option<ScopeId>,
    /// Nesting depth; the root scope has depth 0
    pub depth: u32,
}

/// A binding or a part of one
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Place {
    /// Root binding
    pub binding: BindingId,
    /// Part indices from the root, empty for the whole binding
    pub path: Vec<u32>,
}

impl Place {
    /// The whole binding.
    #[must_use]
    pub fn from_binding(binding: BindingId) -> Self {
        Self {
            binding,
            path: Vec::new(),
        }
    }

    /// A sub-part of this place.
    #[must_use]
    pub fn part(mut self, index: u32) -> Self {
        self.path.push(index);
        self
    }

    /// Whether the place denotes the whole binding.
    #[must_use]
    pub fn is_whole(&self) -> bool {
        self.path.is_empty()
    }

    /// Two places overlap when they share a root and one path is a prefix of
    /// the other.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.binding == other.binding && paths_overlap(&self.path, &other.path)
    }
}

/// Whether one part path is a prefix of the other.
#[must_use]
pub fn paths_overlap(left: &[u32], right: &[u32]) -> bool {
    left.iter().zip(right).all(|(lhs, rhs)| lhs == rhs)
}

/// A value flowing into a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A new owned value (literal, constructor, arithmetic)
    Fresh,
    /// A `let`-convention use of a place
    Borrow(Place),
    /// Explicit transfer of ownership out of a place
    Move(Place),
    /// Explicit `.copy()` of a place
    Copy(Place),
}

impl Value {
    /// Place read by the value, if any.
    #[must_use]
    pub fn place(&self) -> Option<&Place> {
        match self {
            Self::Fresh => None,
            Self::Borrow(place) | Self::Move(place) | Self::Copy(place) => Some(place),
        }
    }
}

/// A value with its source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    /// The value
    pub value: Value,
    /// Location of the value expression
    pub span: FileSpan,
}

impl Operand {
    /// A fresh owned value.
    #[must_use]
    pub fn fresh(span: FileSpan) -> Self {
        Self {
            value: Value::Fresh,
            span,
        }
    }

    /// A `let` use of `place`.
    #[must_use]
    pub fn borrow(place: Place, span: FileSpan) -> Self {
        Self {
            value: Value::Borrow(place),
            span,
        }
    }

    /// A move out of `place`.
    #[must_use]
    pub fn moved(place: Place, span: FileSpan) -> Self {
        Self {
            value: Value::Move(place),
            span,
        }
    }

    /// An explicit copy of `place`.
    #[must_use]
    pub fn copy(place: Place, span: FileSpan) -> Self {
        Self {
            value: Value::Copy(place),
            span,
        }
    }
}

/// An argument at a call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Storage passed, or `None` for a temporary
    pub place: Option<Place>,
    /// Whether the argument carries the explicit mutation marker (`&x`)
    pub mutation_marker: bool,
    /// Location of the argument expression
    pub span: FileSpan,
}

impl Argument {
    /// An unmarked place argument.
    #[must_use]
    pub fn place(place: Place, span: FileSpan) -> Self {
        Self {
            place: Some(place),
            mutation_marker: false,
            span,
        }
    }

    /// A place argument with the mutation marker.
    #[must_use]
    pub fn marked(place: Place, span: FileSpan) -> Self {
        Self {
            place: Some(place),
            mutation_marker: true,
            span,
        }
    }

    /// A temporary value.
    #[must_use]
    pub fn temporary(span: FileSpan) -> Self {
        Self {
            place: None,
            mutation_marker: false,
            span,
        }
    }
}

/// Resolved callee of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    /// A plain function with fixed conventions
    Function(SignatureId),
    /// A bundle; the first argument is the receiver
    Bundle(BundleId),
}

/// A call with resolved callee and arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Callee
    pub callee: Callee,
    /// Arguments in declaration order (receiver first for bundles)
    pub args: Vec<Argument>,
    /// Storage receiving the result, if any
    pub destination: Option<Place>,
    /// Location of the whole call
    pub span: FileSpan,
}

impl CallSite {
    /// Receiver of a bundle call.
    #[must_use]
    pub fn receiver(&self) -> Option<&Argument> {
        match self.callee {
            Callee::Bundle(_) => self.args.first(),
            Callee::Function(_) => None,
        }
    }
}

/// MIR-style statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// What the statement does
    pub kind: StatementKind,
    /// Source location
    pub span: FileSpan,
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// A binding enters its scope, uninitialized
    Declare(BindingId),
    /// Store a value into a place
    Assign {
        /// Destination
        dest: Place,
        /// Value being stored
        value: Operand,
    },
    /// Call a function or bundle
    Call(CallSite),
    /// Plain `let` use of a place
    Read(Place),
    /// Bind a projection of `source` under `convention`
    Project {
        /// The projection binding
        binding: BindingId,
        /// The viewed place
        source: Place,
        /// Access the projection holds
        convention: Convention,
    },
    /// Capture a value into a closure
    Capture {
        /// Captured value
        value: Operand,
        /// Whether the closure may outlive the function
        escaping: bool,
    },
    /// End of a lexical scope
    ScopeEnd(ScopeId),
    /// No-op
    Nop,
}

/// Block terminator (control flow)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump
    Goto(BasicBlockId),
    /// Multi-way branch
    Branch {
        /// Place read to decide the branch
        condition: Option<Place>,
        /// Possible targets
        targets: Vec<BasicBlockId>,
    },
    /// Return from the function
    Return {
        /// Returned value
        value: Option<Operand>,
    },
    /// Code that will never be reached
    Unreachable,
}

impl Terminator {
    /// Successor blocks.
    #[must_use]
    pub fn successors(&self) -> Vec<BasicBlockId> {
        match self {
            Self::Goto(target) => vec![*target],
            Self::Branch { targets, .. } => targets.clone(),
            Self::Return { .. } | Self::Unreachable => Vec::new(),
        }
    }
}

/// Basic block in control flow graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Block ID
    pub id: BasicBlockId,
    /// Statements in this block
    pub statements: Vec<Statement>,
    /// Block terminator
    pub terminator: Terminator,
    /// Location of the terminator
    pub terminator_span: FileSpan,
}

/// A point in the CFG; the terminator sits at `statements.len()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Block
    pub block: BasicBlockId,
    /// Statement index within the block
    pub statement_index: usize,
}

impl Location {
    /// Creates a location.
    #[must_use]
    pub fn new(block: BasicBlockId, statement_index: usize) -> Self {
        Self {
            block,
            statement_index,
        }
    }
}

/// A function body as delivered by the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBody {
    /// Function name
    pub name: String,
    /// Location of the function
    pub span: FileSpan,
    /// All bindings; parameters come first
    pub bindings: Vec<Binding>,
    /// Parameter bindings in declaration order
    pub params: Vec<BindingId>,
    /// Scope tree; index 0 is the root scope
    pub scopes: Vec<Scope>,
    /// Basic blocks
    pub basic_blocks: Vec<BasicBlock>,
    /// Entry block ID
    pub entry_block: BasicBlockId,
}

impl FunctionBody {
    /// Looks up a binding.
    #[must_use]
    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.index()]
    }

    /// Looks up a scope.
    #[must_use]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// Nesting depth of the scope a binding lives in.
    #[must_use]
    pub fn binding_depth(&self, id: BindingId) -> u32 {
        self.scope(self.binding(id).scope).depth
    }

    /// Predecessor lists for every block.
    #[must_use]
    pub fn predecessors(&self) -> Vec<Vec<BasicBlockId>> {
        let mut preds = vec![Vec::new(); self.basic_blocks.len()];
        for block in &self.basic_blocks {
            for succ in block.terminator.successors() {
                if !preds[succ].contains(&block.id) {
                    preds[succ].push(block.id);
                }
            }
        }
        preds
    }

    /// Blocks reachable from the entry, in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BasicBlockId> {
        let mut visited = vec![false; self.basic_blocks.len()];
        let mut postorder = Vec::with_capacity(self.basic_blocks.len());
        // Explicit stack of (block, next successor index) to avoid recursion.
        let mut stack = vec![(self.entry_block, 0usize)];
        visited[self.entry_block] = true;

        while let Some((block, next)) = stack.pop() {
            let succs = self.basic_blocks[block].terminator.successors();
            if let Some(&succ) = succs.get(next) {
                stack.push((block, next + 1));
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
            }
        }

        postorder.reverse();
        postorder
    }

    /// Renders a place the way the source spells it, e.g. `self.origin` or
    /// `buffer[1]`.
    #[must_use]
    pub fn place_text(&self, place: &Place, types: &dyn TypeFacts) -> String {
        let binding = self.binding(place.binding);
        let mut text = binding.name.clone();
        let mut ty = Some(binding.ty);

        for index in &place.path {
            let part = ty.and_then(|current| types.parts(current).get(*index as usize));
            match part.and_then(|part| part.label.as_deref()) {
                Some(label) => {
                    text.push('.');
                    text.push_str(label);
                }
                None => text.push_str(&format!("[{index}]")),
            }
            ty = part.map(|part| part.ty);
        }
        text
    }
}
