//! Escape detection.
//!
//! A borrowed value escapes when it flows somewhere that outlives the binding
//! it was read from: the caller (by return, an escaping capture, or a store
//! into caller-provided storage) or a binding in an enclosing scope. Taking
//! ownership of a `let`-bound value escapes it too, since the borrow cannot
//! give away what it does not own. Assigning such a value into an owned
//! binding takes ownership.
//!
//! Reading an owned binding at its last use transfers ownership, so it never
//! escapes.

use cv_cfg::{
    BindingKind, Convention, ConventionOracle, FunctionBody, Location, Operand, Ownership, Place,
    StatementKind, Terminator, Value,
};
use cv_span::FileSpan;
use tracing::debug;

use crate::liveness::Liveness;

/// How long a storage location lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extent {
    /// Storage owned by the caller; outlives the whole body
    Caller,
    /// Storage owned by a scope of the given depth
    Scope(u32),
}

impl Extent {
    /// Whether `self` strictly outlives `other`.
    #[must_use]
    pub fn outlives(self, other: Self) -> bool {
        match (self, other) {
            (Self::Caller, Self::Scope(_)) => true,
            (Self::Scope(outer), Self::Scope(inner)) => outer < inner,
            (Self::Caller | Self::Scope(_), Self::Caller) => false,
        }
    }
}

/// Extent of the storage a value is read from.
#[must_use]
pub fn source_extent(body: &FunctionBody, place: &Place) -> Extent {
    Extent::Scope(body.binding_depth(place.binding))
}

/// Extent of the storage a value is written to. Writes through `inout` and
/// `set` parameters land in the caller's storage.
#[must_use]
pub fn storage_extent(body: &FunctionBody, place: &Place) -> Extent {
    match body.binding(place.binding).kind {
        BindingKind::Param(convention) if convention.writes_storage() => Extent::Caller,
        _ => Extent::Scope(body.binding_depth(place.binding)),
    }
}

/// How ownership of a borrowed value was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consumption {
    /// Explicit move
    Move,
    /// Passed as a `sink` argument
    SinkArgument,
    /// Bound by a `sink` projection
    SinkProjection,
}

/// Where a value escaped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscapeKind {
    /// Returned to the caller
    Returned,
    /// Stored into longer-lived storage
    Stored {
        /// The destination
        dest: Place,
    },
    /// Captured by an escaping closure
    Captured,
    /// Ownership taken from a `let`-bound binding
    Consumed(Consumption),
}

/// A value outliving the storage it was borrowed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escape {
    /// Statement or terminator where the escape happens
    pub location: Location,
    /// The escaping place
    pub source: Place,
    /// Where it escapes to
    pub kind: EscapeKind,
    /// Location of the escaping value expression
    pub span: FileSpan,
    /// Location of the whole statement
    pub site: FileSpan,
}

struct EscapeFinder<'a> {
    body: &'a FunctionBody,
    liveness: &'a Liveness,
    escapes: Vec<Escape>,
}

impl EscapeFinder<'_> {
    fn is_let_bound(&self, place: &Place) -> bool {
        self.body.binding(place.binding).kind.is_let_bound()
    }

    /// Owned bindings read at their last use hand their value over.
    fn transfers(&self, location: Location, place: &Place) -> bool {
        self.body.binding(place.binding).kind.ownership() == Ownership::Owned
            && self.liveness.is_last_use(location, place.binding)
    }

    fn push(
        &mut self,
        location: Location,
        source: &Place,
        kind: EscapeKind,
        span: FileSpan,
        site: FileSpan,
    ) {
        debug!(?location, ?source, ?kind, "escape");
        self.escapes.push(Escape {
            location,
            source: source.clone(),
            kind,
            span,
            site,
        });
    }

    /// Checks a value flowing into storage of extent `dest`.
    fn check_flow(
        &mut self,
        location: Location,
        operand: &Operand,
        dest: Extent,
        kind: EscapeKind,
        site: FileSpan,
    ) {
        if let Value::Borrow(place) = &operand.value {
            if !self.transfers(location, place) && dest.outlives(source_extent(self.body, place)) {
                self.push(location, place, kind, operand.span, site);
            }
        }
        self.check_move(location, operand, site);
    }

    /// A `let`-bound value stored into owned storage that does not
    /// outlive it would otherwise become owned without a copy.
    fn check_owned_store(
        &mut self,
        location: Location,
        dest: &Place,
        operand: &Operand,
        site: FileSpan,
    ) {
        let Value::Borrow(place) = &operand.value else {
            return;
        };
        let dest_owned = self.body.binding(dest.binding).kind.ownership() == Ownership::Owned;
        if dest_owned
            && self.is_let_bound(place)
            && !storage_extent(self.body, dest).outlives(source_extent(self.body, place))
        {
            self.push(
                location,
                place,
                EscapeKind::Consumed(Consumption::Move),
                operand.span,
                site,
            );
        }
    }

    fn check_move(&mut self, location: Location, operand: &Operand, site: FileSpan) {
        if let Value::Move(place) = &operand.value {
            if self.is_let_bound(place) {
                self.push(
                    location,
                    place,
                    EscapeKind::Consumed(Consumption::Move),
                    operand.span,
                    site,
                );
            }
        }
    }

    fn check_statement(
        &mut self,
        location: Location,
        kind: &StatementKind,
        site: FileSpan,
        oracle: &dyn ConventionOracle,
    ) {
        match kind {
            StatementKind::Assign { dest, value } => {
                let extent = storage_extent(self.body, dest);
                self.check_flow(
                    location,
                    value,
                    extent,
                    EscapeKind::Stored { dest: dest.clone() },
                    site,
                );
                self.check_owned_store(location, dest, value, site);
            }
            StatementKind::Capture { value, escaping: true } => {
                self.check_flow(location, value, Extent::Caller, EscapeKind::Captured, site);
            }
            StatementKind::Capture { value, escaping: false } => {
                self.check_move(location, value, site);
            }
            StatementKind::Call(call) => {
                let conventions = oracle.argument_conventions(location, call);
                for (arg, convention) in call.args.iter().zip(conventions) {
                    let Some(place) = &arg.place else { continue };
                    if convention == Convention::Sink && self.is_let_bound(place) {
                        self.push(
                            location,
                            place,
                            EscapeKind::Consumed(Consumption::SinkArgument),
                            arg.span,
                            site,
                        );
                    }
                }
            }
            StatementKind::Project {
                source,
                convention: Convention::Sink,
                ..
            } if self.is_let_bound(source) => {
                self.push(
                    location,
                    source,
                    EscapeKind::Consumed(Consumption::SinkProjection),
                    site,
                    site,
                );
            }
            StatementKind::Declare(_)
            | StatementKind::Read(_)
            | StatementKind::Project { .. }
            | StatementKind::ScopeEnd(_)
            | StatementKind::Nop => {}
        }
    }
}

/// Finds every escape in `body`, in block then statement order.
#[must_use]
pub fn find_escapes(
    body: &FunctionBody,
    liveness: &Liveness,
    oracle: &dyn ConventionOracle,
) -> Vec<Escape> {
    let mut finder = EscapeFinder {
        body,
        liveness,
        escapes: Vec::new(),
    };

    for block in &body.basic_blocks {
        for (index, statement) in block.statements.iter().enumerate() {
            finder.check_statement(
                Location::new(block.id, index),
                &statement.kind,
                statement.span,
                oracle,
            );
        }
        if let Terminator::Return { value: Some(value) } = &block.terminator {
            finder.check_flow(
                Location::new(block.id, block.statements.len()),
                value,
                Extent::Caller,
                EscapeKind::Returned,
                block.terminator_span,
            );
        }
    }
    finder.escapes
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_cfg::{
        Argument, BodyBuilder, CallSite, Callee, DeclaredConventions, Module, ParamDecl, TypeInfo,
    };
    use cv_span::{FileId, Span};

    fn span(start: u32) -> FileSpan {
        FileSpan::new(FileId(0), Span::new(start, start + 1))
    }

    #[test]
    fn test_extent_ordering() {
        assert!(Extent::Caller.outlives(Extent::Scope(0)));
        assert!(Extent::Scope(0).outlives(Extent::Scope(1)));
        assert!(!Extent::Scope(1).outlives(Extent::Scope(1)));
        assert!(!Extent::Scope(0).outlives(Extent::Caller));
        assert!(!Extent::Caller.outlives(Extent::Caller));
    }

    #[test]
    fn test_store_of_let_element_into_set_field_escapes() {
        let mut module = Module::new();
        let int = module.types.add(TypeInfo::scalar("Int"));
        let buffer_ty = module.types.add(TypeInfo::linear("Buffer").element(int).element(int));
        let pair = module.types.add(TypeInfo::linear("Pair").field("first", int));

        let mut builder = BodyBuilder::new("init", span(0));
        let this = builder.param("self", Convention::Set, pair, span(1));
        let buffer = builder.param("buffer", Convention::Let, buffer_ty, span(2));
        let element = Place::from_binding(buffer).part(1);
        builder.assign(
            Place::from_binding(this).part(0),
            Operand::borrow(element.clone(), span(3)),
            span(4),
        );
        let body = builder.finish();
        let liveness = Liveness::compute(&body, 16);

        let escapes = find_escapes(&body, &liveness, &DeclaredConventions::new(&module));
        assert_eq!(escapes.len(), 1);
        assert_eq!(escapes[0].source, element);
        assert_eq!(escapes[0].span, span(3));
        assert_eq!(
            escapes[0].kind,
            EscapeKind::Stored {
                dest: Place::from_binding(this).part(0)
            }
        );
    }

    #[test]
    fn test_owned_last_use_return_transfers() {
        let mut module = Module::new();
        let int = module.types.add(TypeInfo::scalar("Int"));

        let mut builder = BodyBuilder::new("f", span(0));
        let local = builder.declare("space", int, BindingKind::Let, span(1));
        builder.assign(Place::from_binding(local), Operand::fresh(span(2)), span(2));
        builder.ret(
            Some(Operand::borrow(Place::from_binding(local), span(3))),
            span(3),
        );
        let body = builder.finish();
        let liveness = Liveness::compute(&body, 16);

        assert!(find_escapes(&body, &liveness, &DeclaredConventions::new(&module)).is_empty());
    }

    #[test]
    fn test_sink_argument_of_let_param_escapes() {
        let mut module = Module::new();
        let token_ty = module.types.add(TypeInfo::linear("Token"));
        let consume = module.add_signature(
            "consume",
            vec![ParamDecl::new("t", Convention::Sink, token_ty)],
        );

        let mut builder = BodyBuilder::new("f", span(0));
        let token = builder.param("token", Convention::Let, token_ty, span(1));
        builder.call(CallSite {
            callee: Callee::Function(consume),
            args: vec![Argument::place(Place::from_binding(token), span(2))],
            destination: None,
            span: span(3),
        });
        let body = builder.finish();
        let liveness = Liveness::compute(&body, 16);

        let escapes = find_escapes(&body, &liveness, &DeclaredConventions::new(&module));
        assert_eq!(escapes.len(), 1);
        assert_eq!(
            escapes[0].kind,
            EscapeKind::Consumed(Consumption::SinkArgument)
        );
    }

    #[test]
    fn test_let_param_assigned_into_local_takes_ownership() {
        let mut module = Module::new();
        let buffer_ty = module.types.add(TypeInfo::linear("Buffer"));

        // var x = buffer; return x
        let mut builder = BodyBuilder::new("f", span(0));
        let buffer = builder.param("buffer", Convention::Let, buffer_ty, span(1));
        let x = builder.declare("x", buffer_ty, BindingKind::Var, span(2));
        builder.assign(
            Place::from_binding(x),
            Operand::borrow(Place::from_binding(buffer), span(3)),
            span(4),
        );
        builder.ret(Some(Operand::borrow(Place::from_binding(x), span(5))), span(5));
        let body = builder.finish();
        let liveness = Liveness::compute(&body, 16);

        let escapes = find_escapes(&body, &liveness, &DeclaredConventions::new(&module));
        assert_eq!(escapes.len(), 1);
        assert_eq!(escapes[0].location, Location::new(0, 1));
        assert_eq!(escapes[0].source, Place::from_binding(buffer));
        assert_eq!(escapes[0].span, span(3));
        assert_eq!(escapes[0].kind, EscapeKind::Consumed(Consumption::Move));
    }

    #[test]
    fn test_store_into_enclosing_scope_escapes() {
        let mut module = Module::new();
        let int = module.types.add(TypeInfo::scalar("Int"));

        // var kept; { var inner = 1; kept = inner; print(inner) }
        let mut builder = BodyBuilder::new("f", span(0));
        let kept = builder.declare("kept", int, BindingKind::Var, span(1));
        builder.enter_scope();
        let inner = builder.declare("inner", int, BindingKind::Var, span(2));
        builder.assign(Place::from_binding(inner), Operand::fresh(span(3)), span(3));
        builder.assign(
            Place::from_binding(kept),
            Operand::borrow(Place::from_binding(inner), span(4)),
            span(5),
        );
        builder.read(Place::from_binding(inner), span(6));
        builder.exit_scope(span(7));
        let body = builder.finish();
        let liveness = Liveness::compute(&body, 16);

        let escapes = find_escapes(&body, &liveness, &DeclaredConventions::new(&module));
        assert_eq!(escapes.len(), 1);
        assert_eq!(escapes[0].source, Place::from_binding(inner));
        assert_eq!(
            escapes[0].kind,
            EscapeKind::Stored {
                dest: Place::from_binding(kept)
            }
        );
    }

    #[test]
    fn test_last_use_store_into_enclosing_scope_transfers() {
        let mut module = Module::new();
        let int = module.types.add(TypeInfo::scalar("Int"));

        let mut builder = BodyBuilder::new("f", span(0));
        let kept = builder.declare("kept", int, BindingKind::Var, span(1));
        builder.enter_scope();
        let inner = builder.declare("inner", int, BindingKind::Var, span(2));
        builder.assign(Place::from_binding(inner), Operand::fresh(span(3)), span(3));
        builder.assign(
            Place::from_binding(kept),
            Operand::borrow(Place::from_binding(inner), span(4)),
            span(5),
        );
        builder.exit_scope(span(7));
        let body = builder.finish();
        let liveness = Liveness::compute(&body, 16);

        assert!(find_escapes(&body, &liveness, &DeclaredConventions::new(&module)).is_empty());
    }

    #[test]
    fn test_escaping_capture_of_let_param_escapes() {
        let mut module = Module::new();
        let token_ty = module.types.add(TypeInfo::linear("Token"));

        let mut builder = BodyBuilder::new("f", span(0));
        let token = builder.param("token", Convention::Let, token_ty, span(1));
        builder.capture(
            Operand::borrow(Place::from_binding(token), span(2)),
            true,
            span(3),
        );
        let body = builder.finish();
        let liveness = Liveness::compute(&body, 16);

        let escapes = find_escapes(&body, &liveness, &DeclaredConventions::new(&module));
        assert_eq!(escapes.len(), 1);
        assert_eq!(escapes[0].kind, EscapeKind::Captured);
        assert_eq!(escapes[0].span, span(2));
        assert_eq!(escapes[0].site, span(3));
    }

    #[test]
    fn test_non_escaping_capture_stays_local() {
        let mut module = Module::new();
        let token_ty = module.types.add(TypeInfo::linear("Token"));

        let mut builder = BodyBuilder::new("f", span(0));
        let token = builder.param("token", Convention::Let, token_ty, span(1));
        builder.capture(
            Operand::borrow(Place::from_binding(token), span(2)),
            false,
            span(3),
        );
        let body = builder.finish();
        let liveness = Liveness::compute(&body, 16);

        assert!(find_escapes(&body, &liveness, &DeclaredConventions::new(&module)).is_empty());
    }
}
