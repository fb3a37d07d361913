//! Builder for constructing function bodies.

use cv_span::FileSpan;

use crate::body::{
    BasicBlock, BasicBlockId, Binding, BindingId, BindingKind, CallSite, FunctionBody, Operand,
    Place, Scope, ScopeId, Statement, StatementKind, Terminator,
};
use crate::convention::Convention;
use crate::types::TypeId;

/// Builder for constructing function bodies
pub struct BodyBuilder {
    body: FunctionBody,
    current_block: Option<BasicBlockId>,
    current_scope: ScopeId,
}

impl BodyBuilder {
    /// Creates a builder with a root scope and an entry block that returns.
    #[must_use]
    pub fn new(name: impl Into<String>, span: FileSpan) -> Self {
        let entry_block = BasicBlock {
            id: 0,
            statements: Vec::new(),
            terminator: Terminator::Return { value: None },
            terminator_span: span,
        };

        Self {
            body: FunctionBody {
                name: name.into(),
                span,
                bindings: Vec::new(),
                params: Vec::new(),
                scopes: vec![Scope {
                    id: ScopeId::ROOT,
                    parent: None,
                    depth: 0,
                }],
                basic_blocks: vec![entry_block],
                entry_block: 0,
            },
            current_block: Some(0),
            current_scope: ScopeId::ROOT,
        }
    }

    fn alloc_binding(
        &mut self,
        name: impl Into<String>,
        ty: TypeId,
        kind: BindingKind,
        scope: ScopeId,
        span: FileSpan,
    ) -> BindingId {
        let id = BindingId(self.body.bindings.len() as u32);
        self.body.bindings.push(Binding {
            id,
            name: name.into(),
            ty,
            kind,
            scope,
            span,
        });
        id
    }

    /// Declares a parameter in the root scope.
    pub fn param(
        &mut self,
        name: impl Into<String>,
        convention: Convention,
        ty: TypeId,
        span: FileSpan,
    ) -> BindingId {
        let id = self.alloc_binding(name, ty, BindingKind::Param(convention), ScopeId::ROOT, span);
        self.body.params.push(id);
        id
    }

    /// Opens a scope nested in the current one.
    pub fn enter_scope(&mut self) -> ScopeId {
        let parent = self.body.scope(self.current_scope);
        let scope = Scope {
            id: ScopeId(self.body.scopes.len() as u32),
            parent: Some(parent.id),
            depth: parent.depth + 1,
        };
        let id = scope.id;
        self.body.scopes.push(scope);
        self.current_scope = id;
        id
    }

    /// Closes the current scope, emitting its `ScopeEnd` in the current block.
    pub fn exit_scope(&mut self, span: FileSpan) {
        let scope = self.current_scope;
        self.push(StatementKind::ScopeEnd(scope), span);
        if let Some(parent) = self.body.scope(scope).parent {
            self.current_scope = parent;
        }
    }

    /// The scope new bindings are declared in.
    #[must_use]
    pub fn current_scope(&self) -> ScopeId {
        self.current_scope
    }

    /// Declares a local in the current scope and emits its `Declare`.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        ty: TypeId,
        kind: BindingKind,
        span: FileSpan,
    ) -> BindingId {
        let id = self.alloc_binding(name, ty, kind, self.current_scope, span);
        self.push(StatementKind::Declare(id), span);
        id
    }

    /// Binds a projection of `source` in the current scope.
    pub fn project(
        &mut self,
        name: impl Into<String>,
        ty: TypeId,
        source: Place,
        convention: Convention,
        span: FileSpan,
    ) -> BindingId {
        let binding = self.alloc_binding(
            name,
            ty,
            BindingKind::Projection(convention),
            self.current_scope,
            span,
        );
        self.push(
            StatementKind::Project {
                binding,
                source,
                convention,
            },
            span,
        );
        binding
    }

    /// Creates a new basic block and returns its ID
    pub fn new_block(&mut self) -> BasicBlockId {
        let id = self.body.basic_blocks.len();
        self.body.basic_blocks.push(BasicBlock {
            id,
            statements: Vec::new(),
            terminator: Terminator::Unreachable,
            terminator_span: self.body.span,
        });
        id
    }

    /// Sets the current block for adding statements
    pub fn set_current_block(&mut self, block_id: BasicBlockId) {
        self.current_block = Some(block_id);
    }

    /// Adds a statement to the current block
    pub fn push(&mut self, kind: StatementKind, span: FileSpan) {
        if let Some(block_id) = self.current_block {
            self.body.basic_blocks[block_id]
                .statements
                .push(Statement { kind, span });
        }
    }

    /// Stores `value` into `dest`.
    pub fn assign(&mut self, dest: Place, value: Operand, span: FileSpan) {
        self.push(StatementKind::Assign { dest, value }, span);
    }

    /// Emits a call.
    pub fn call(&mut self, call: CallSite) {
        let span = call.span;
        self.push(StatementKind::Call(call), span);
    }

    /// Emits a plain read of `place`.
    pub fn read(&mut self, place: Place, span: FileSpan) {
        self.push(StatementKind::Read(place), span);
    }

    /// Emits a closure capture.
    pub fn capture(&mut self, value: Operand, escaping: bool, span: FileSpan) {
        self.push(StatementKind::Capture { value, escaping }, span);
    }

    /// Sets the terminator for the current block
    pub fn set_terminator(&mut self, terminator: Terminator, span: FileSpan) {
        if let Some(block_id) = self.current_block {
            let block = &mut self.body.basic_blocks[block_id];
            block.terminator = terminator;
            block.terminator_span = span;
        }
    }

    /// Terminates the current block with a jump.
    pub fn goto(&mut self, target: BasicBlockId, span: FileSpan) {
        self.set_terminator(Terminator::Goto(target), span);
    }

    /// Terminates the current block with a branch.
    pub fn branch(&mut self, condition: Option<Place>, targets: Vec<BasicBlockId>, span: FileSpan) {
        self.set_terminator(Terminator::Branch { condition, targets }, span);
    }

    /// Terminates the current block with a return.
    pub fn ret(&mut self, value: Option<Operand>, span: FileSpan) {
        self.set_terminator(Terminator::Return { value }, span);
    }

    /// Finishes building and returns the body
    #[must_use]
    pub fn finish(self) -> FunctionBody {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeInfo, TypeTable};
    use cv_span::{FileId, Span};

    fn span(start: u32) -> FileSpan {
        FileSpan::new(FileId(0), Span::new(start, start + 1))
    }

    #[test]
    fn test_builder_tracks_scopes_and_blocks() {
        let mut types = TypeTable::new();
        let int = types.add(TypeInfo::scalar("Int"));

        let mut builder = BodyBuilder::new("f", span(0));
        let param = builder.param("p", Convention::Let, int, span(1));
        let inner = builder.enter_scope();
        let local = builder.declare("x", int, BindingKind::Var, span(2));
        builder.exit_scope(span(3));
        let exit = builder.new_block();
        builder.goto(exit, span(4));
        builder.set_current_block(exit);
        builder.ret(None, span(5));
        let body = builder.finish();

        assert_eq!(body.params, vec![param]);
        assert_eq!(body.binding(local).scope, inner);
        assert_eq!(body.binding_depth(local), 1);
        assert_eq!(body.binding_depth(param), 0);
        assert_eq!(body.basic_blocks[0].statements.len(), 2);
        assert_eq!(body.reverse_postorder(), vec![0, exit]);
        assert_eq!(body.predecessors()[exit], vec![0]);
    }
}
