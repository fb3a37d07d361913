//! Statement transfer functions.

use cv_cfg::{
    BasicBlock, BindingId, BindingKind, CallSite, Convention, ConventionOracle, FunctionBody,
    Location, Operand, Ownership, Place, ScopeId, Statement, StatementKind, Terminator, TypeFacts,
    Value,
};
use cv_span::FileSpan;

use crate::error::TypestateError;
use crate::state::{
    BindingState, Cause, FlowState, MissingParts, TypeState, add_missing, complement, normalize,
    overlapping_missing, remove_missing,
};

/// Applies the effect of statements and terminators to a [`FlowState`].
///
/// Errors are appended to the caller's buffer; passing a scratch buffer
/// replays a block without reporting.
#[derive(Clone, Copy)]
pub struct Transfer<'a> {
    body: &'a FunctionBody,
    types: &'a dyn TypeFacts,
    oracle: &'a dyn ConventionOracle,
}

impl<'a> Transfer<'a> {
    /// Creates transfer functions for `body`.
    #[must_use]
    pub fn new(
        body: &'a FunctionBody,
        types: &'a dyn TypeFacts,
        oracle: &'a dyn ConventionOracle,
    ) -> Self {
        Self {
            body,
            types,
            oracle,
        }
    }

    /// The body being analyzed.
    #[must_use]
    pub fn body(&self) -> &'a FunctionBody {
        self.body
    }

    /// State on function entry: every parameter except `set` holds a value.
    #[must_use]
    pub fn entry_state(&self) -> FlowState {
        let mut state = FlowState::new();
        for param in &self.body.params {
            let binding = self.body.binding(*param);
            let entry = match binding.kind {
                BindingKind::Param(Convention::Set) => {
                    BindingState::new(TypeState::Uninitialized, Cause::Declared, binding.span)
                }
                _ => BindingState::new(TypeState::Initialized, Cause::Initialized, binding.span),
            };
            state.set(*param, entry);
        }
        state
    }

    fn missing_error(
        &self,
        place: Place,
        entry: &BindingState,
        span: FileSpan,
    ) -> TypestateError {
        let place = self.body.place_text(&place, self.types);
        if entry.cause == Cause::Declared {
            TypestateError::UninitializedUse {
                place,
                span,
                declared: entry.origin,
            }
        } else {
            TypestateError::UseAfterConsume {
                place,
                span,
                consumed: entry.origin,
            }
        }
    }

    /// Checks that `place` holds a value, reporting otherwise.
    pub fn check_read(
        &self,
        state: &FlowState,
        place: &Place,
        span: FileSpan,
        errors: &mut Vec<TypestateError>,
    ) -> bool {
        let Some(entry) = state.get(place.binding) else {
            return true;
        };
        let error = match &entry.state {
            TypeState::Initialized => return true,
            TypeState::Uninitialized => TypestateError::UninitializedUse {
                place: self.body.place_text(place, self.types),
                span,
                declared: entry.origin,
            },
            TypeState::Consumed => self.missing_error(place.clone(), entry, span),
            TypeState::PartiallyConsumed(missing) => {
                match overlapping_missing(missing, &place.path) {
                    None => return true,
                    Some(path) => {
                        // Name the larger of the two places.
                        let reported = if path.len() < place.path.len() {
                            Place {
                                binding: place.binding,
                                path: path.clone(),
                            }
                        } else {
                            place.clone()
                        };
                        self.missing_error(reported, entry, span)
                    }
                }
            }
        };
        errors.push(error);
        false
    }

    fn mark_consumed(&self, state: &mut FlowState, place: &Place, span: FileSpan) {
        let Some(entry) = state.get(place.binding) else {
            return;
        };
        let next = if place.is_whole() {
            TypeState::Consumed
        } else {
            let mut missing = match &entry.state {
                TypeState::PartiallyConsumed(missing) => missing.clone(),
                _ => MissingParts::new(),
            };
            add_missing(&mut missing, &place.path);
            normalize(self.types, self.body.binding(place.binding).ty, missing)
        };
        state.set(place.binding, BindingState::new(next, Cause::Consumed, span));
    }

    /// Moves the value out of `place` if it holds one.
    pub fn consume(
        &self,
        state: &mut FlowState,
        place: &Place,
        span: FileSpan,
        errors: &mut Vec<TypestateError>,
    ) {
        if self.check_read(state, place, span, errors) {
            self.mark_consumed(state, place, span);
        }
    }

    /// Writes a value into `place`.
    pub fn initialize(&self, state: &mut FlowState, place: &Place, span: FileSpan) {
        let Some(entry) = state.get(place.binding) else {
            return;
        };
        if place.is_whole() {
            state.set(
                place.binding,
                BindingState::new(TypeState::Initialized, Cause::Initialized, span),
            );
            return;
        }

        let ty = self.body.binding(place.binding).ty;
        let (missing, cause) = match &entry.state {
            TypeState::Initialized => return,
            TypeState::Uninitialized => (
                complement(self.types, ty, &[], &place.path),
                Cause::Declared,
            ),
            TypeState::Consumed => (complement(self.types, ty, &[], &place.path), entry.cause),
            TypeState::PartiallyConsumed(missing) => {
                let mut missing = missing.clone();
                remove_missing(self.types, ty, &mut missing, &place.path);
                (missing, entry.cause)
            }
        };
        let next = normalize(self.types, ty, missing);
        let updated = if next.is_initialized() {
            BindingState::new(next, Cause::Initialized, span)
        } else {
            BindingState::new(next, cause, entry.origin)
        };
        state.set(place.binding, updated);
    }

    fn apply_operand(
        &self,
        state: &mut FlowState,
        operand: &Operand,
        errors: &mut Vec<TypestateError>,
    ) {
        match &operand.value {
            Value::Fresh => {}
            Value::Borrow(place) | Value::Copy(place) => {
                self.check_read(state, place, operand.span, errors);
            }
            Value::Move(place) => self.consume(state, place, operand.span, errors),
        }
    }

    fn apply_call(
        &self,
        state: &mut FlowState,
        location: Location,
        call: &CallSite,
        errors: &mut Vec<TypestateError>,
    ) {
        let conventions = self.oracle.argument_conventions(location, call);
        let arguments: Vec<(&Place, FileSpan, Convention)> = call
            .args
            .iter()
            .zip(conventions)
            .filter_map(|(arg, convention)| {
                arg.place.as_ref().map(|place| (place, arg.span, convention))
            })
            .collect();

        // Every argument is checked against the state before the call.
        let mut readable = Vec::with_capacity(arguments.len());
        for (place, span, convention) in &arguments {
            let ok = *convention == Convention::Set || self.check_read(state, place, *span, errors);
            readable.push(ok);
        }

        for ((place, span, convention), ok) in arguments.iter().zip(readable) {
            if *convention == Convention::Sink && ok {
                self.mark_consumed(state, place, *span);
            }
        }
        for (place, span, convention) in &arguments {
            if *convention == Convention::Set {
                self.initialize(state, place, *span);
            }
        }
        if let Some(dest) = &call.destination {
            self.initialize(state, dest, call.span);
        }
    }

    fn end_scope(
        &self,
        state: &mut FlowState,
        scope: ScopeId,
        span: FileSpan,
        errors: &mut Vec<TypestateError>,
    ) {
        let ending: Vec<BindingId> = state
            .iter()
            .map(|(binding, _)| binding)
            .filter(|binding| {
                let decl = self.body.binding(*binding);
                decl.scope == scope && decl.kind.param_convention().is_none()
            })
            .collect();

        for binding in ending {
            let Some(entry) = state.remove(binding) else {
                continue;
            };
            if let TypeState::PartiallyConsumed(missing) = &entry.state {
                if !self.is_mutable_borrow(binding) {
                    errors.push(self.partial_at_exit(binding, missing, &entry, span));
                }
            }
        }
    }

    /// `inout` and `set` bindings must be restored, which the exclusivity
    /// pass checks.
    fn is_mutable_borrow(&self, binding: BindingId) -> bool {
        self.body.binding(binding).kind.ownership() == Ownership::BorrowedMutable
    }

    fn partial_at_exit(
        &self,
        binding: BindingId,
        missing: &MissingParts,
        entry: &BindingState,
        span: FileSpan,
    ) -> TypestateError {
        let parts = missing
            .iter()
            .map(|path| {
                self.body.place_text(
                    &Place {
                        binding,
                        path: path.clone(),
                    },
                    self.types,
                )
            })
            .collect();
        TypestateError::PartiallyConsumedAtExit {
            name: self.body.binding(binding).name.clone(),
            parts,
            span,
            consumed: entry.origin,
        }
    }

    /// Applies one statement.
    pub fn apply_statement(
        &self,
        state: &mut FlowState,
        location: Location,
        statement: &Statement,
        errors: &mut Vec<TypestateError>,
    ) {
        let span = statement.span;
        match &statement.kind {
            StatementKind::Declare(binding) => state.set(
                *binding,
                BindingState::new(TypeState::Uninitialized, Cause::Declared, span),
            ),
            StatementKind::Assign { dest, value } => {
                self.apply_operand(state, value, errors);
                self.initialize(state, dest, span);
            }
            StatementKind::Call(call) => self.apply_call(state, location, call, errors),
            StatementKind::Read(place) => {
                self.check_read(state, place, span, errors);
            }
            StatementKind::Project {
                binding,
                source,
                convention,
            } => {
                let initial = match convention {
                    Convention::Let | Convention::Inout => {
                        self.check_read(state, source, span, errors);
                        BindingState::new(TypeState::Initialized, Cause::Initialized, span)
                    }
                    Convention::Sink => {
                        self.consume(state, source, span, errors);
                        BindingState::new(TypeState::Initialized, Cause::Initialized, span)
                    }
                    Convention::Set => {
                        self.initialize(state, source, span);
                        BindingState::new(TypeState::Uninitialized, Cause::Declared, span)
                    }
                };
                state.set(*binding, initial);
            }
            StatementKind::Capture { value, .. } => self.apply_operand(state, value, errors),
            StatementKind::ScopeEnd(scope) => self.end_scope(state, *scope, span, errors),
            StatementKind::Nop => {}
        }
    }

    /// Applies a block's terminator.
    pub fn apply_terminator(
        &self,
        state: &mut FlowState,
        block: &BasicBlock,
        errors: &mut Vec<TypestateError>,
    ) {
        let span = block.terminator_span;
        match &block.terminator {
            Terminator::Branch {
                condition: Some(place),
                ..
            } => {
                self.check_read(state, place, span, errors);
            }
            Terminator::Return { value } => {
                if let Some(value) = value {
                    self.apply_operand(state, value, errors);
                }
                let leftover: Vec<(BindingId, MissingParts, BindingState)> = state
                    .iter()
                    .filter(|(binding, _)| !self.is_mutable_borrow(*binding))
                    .filter_map(|(binding, entry)| match &entry.state {
                        TypeState::PartiallyConsumed(missing) => {
                            Some((binding, missing.clone(), entry.clone()))
                        }
                        _ => None,
                    })
                    .collect();
                for (binding, missing, entry) in leftover {
                    errors.push(self.partial_at_exit(binding, &missing, &entry, span));
                }
            }
            Terminator::Branch { condition: None, .. }
            | Terminator::Goto(_)
            | Terminator::Unreachable => {}
        }
    }

    /// Applies every statement of `block` and then its terminator.
    pub fn apply_block(
        &self,
        state: &mut FlowState,
        block: &BasicBlock,
        errors: &mut Vec<TypestateError>,
    ) {
        for (index, statement) in block.statements.iter().enumerate() {
            self.apply_statement(state, Location::new(block.id, index), statement, errors);
        }
        self.apply_terminator(state, block, errors);
    }
}
