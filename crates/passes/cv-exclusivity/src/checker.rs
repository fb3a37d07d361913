//! Convention and exclusivity checking over a body.

use cv_cfg::{
    BasicBlock, Binding, BindingKind, CallSite, Convention, ConventionOracle, FunctionBody,
    Location, Operand, Place, Statement, StatementKind, Terminator, TypeFacts, Value,
};
use cv_span::FileSpan;
use cv_typestate::{BindingState, Cause, FlowState, Transfer, TypeState, TypestateResults};
use tracing::{debug, debug_span, warn};

use crate::access::{Access, AccessSet};
use crate::error::{ExclusivityError, ExclusivityResult};

/// Default cap on fixpoint sweeps.
pub const DEFAULT_MAX_ITERATIONS: usize = 256;

/// Whether `path` of a binding in `entry` holds any part of a value.
fn holds_part(entry: &BindingState, path: &[u32]) -> bool {
    match &entry.state {
        TypeState::Uninitialized | TypeState::Consumed => false,
        TypeState::Initialized => true,
        TypeState::PartiallyConsumed(missing) => {
            !missing.iter().any(|gone| path.starts_with(gone))
        }
    }
}

/// Whether `path` of a `let` local can still receive its first value.
fn never_written(entry: &BindingState, path: &[u32]) -> bool {
    match &entry.state {
        TypeState::Uninitialized => true,
        TypeState::Initialized => false,
        TypeState::Consumed => entry.cause == Cause::Declared,
        TypeState::PartiallyConsumed(missing) => {
            entry.cause == Cause::Declared && missing.iter().any(|gone| path.starts_with(gone))
        }
    }
}

/// Exclusivity and convention checker.
///
/// Validates every access against the convention it is made under, using
/// the binding states computed by the typestate pass and the projections
/// active at each point.
pub struct ExclusivityChecker<'a> {
    body: &'a FunctionBody,
    types: &'a dyn TypeFacts,
    oracle: &'a dyn ConventionOracle,
    typestate: &'a TypestateResults,
    max_iterations: usize,
}

impl<'a> ExclusivityChecker<'a> {
    /// Creates a checker for `body`.
    #[must_use]
    pub fn new(
        body: &'a FunctionBody,
        types: &'a dyn TypeFacts,
        oracle: &'a dyn ConventionOracle,
        typestate: &'a TypestateResults,
    ) -> Self {
        Self {
            body,
            types,
            oracle,
            typestate,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Caps the number of fixpoint sweeps.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Checks the body, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns all violations found in the body.
    pub fn check(&self) -> ExclusivityResult<()> {
        let _span = debug_span!("exclusivity", function = %self.body.name).entered();
        let transfer = Transfer::new(self.body, self.types, self.oracle);
        let entry_accesses = self.active_projections();

        let mut errors = Vec::new();
        let mut scratch = Vec::new();
        for block in self.body.reverse_postorder() {
            let (Some(state), Some(accesses)) = (
                self.typestate.entry_state(block),
                entry_accesses[block].as_ref(),
            ) else {
                continue;
            };
            let mut state = state.clone();
            let mut accesses = accesses.clone();
            let basic_block = &self.body.basic_blocks[block];

            for (index, statement) in basic_block.statements.iter().enumerate() {
                let location = Location::new(block, index);
                self.check_statement(&state, &accesses, location, statement, &mut errors);
                transfer.apply_statement(&mut state, location, statement, &mut scratch);
                self.apply_projections(&mut accesses, statement);
            }
            self.check_terminator(&transfer, state, &accesses, basic_block, &mut errors);
            scratch.clear();
        }

        debug!(function = %self.body.name, errors = errors.len(), "exclusivity checked");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Forward fixpoint of the projections active on entry to each block.
    fn active_projections(&self) -> Vec<Option<AccessSet>> {
        let order = self.body.reverse_postorder();
        let preds = self.body.predecessors();
        let block_count = self.body.basic_blocks.len();
        let mut entry: Vec<Option<AccessSet>> = vec![None; block_count];
        let mut exit: Vec<Option<AccessSet>> = vec![None; block_count];

        let mut iterations = 0;
        loop {
            iterations += 1;
            let mut changed = false;
            for &block in &order {
                let mut input = (block == self.body.entry_block).then(AccessSet::new);
                for pred in &preds[block] {
                    if let Some(pred_exit) = &exit[*pred] {
                        input.get_or_insert_with(AccessSet::new).union(pred_exit);
                    }
                }
                let Some(input) = input else {
                    continue;
                };

                let mut accesses = input.clone();
                for statement in &self.body.basic_blocks[block].statements {
                    self.apply_projections(&mut accesses, statement);
                }
                if entry[block].as_ref() != Some(&input) {
                    entry[block] = Some(input);
                    changed = true;
                }
                if exit[block].as_ref() != Some(&accesses) {
                    exit[block] = Some(accesses);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            if iterations >= self.max_iterations {
                warn!(function = %self.body.name, iterations, "projection tracking did not converge");
                break;
            }
        }
        debug!(function = %self.body.name, iterations, "projection tracking converged");
        entry
    }

    fn apply_projections(&self, accesses: &mut AccessSet, statement: &Statement) {
        match &statement.kind {
            StatementKind::Project {
                binding,
                source,
                convention,
            } => accesses.project(Access {
                place: source.clone(),
                convention: *convention,
                holder: *binding,
                span: statement.span,
            }),
            StatementKind::ScopeEnd(scope) => accesses.end_scope(self.body, *scope),
            _ => {}
        }
    }

    fn place_text(&self, place: &Place) -> String {
        self.body.place_text(place, self.types)
    }

    fn check_access(
        &self,
        accesses: &AccessSet,
        place: &Place,
        convention: Convention,
        span: FileSpan,
        errors: &mut Vec<ExclusivityError>,
    ) {
        if let Some(existing) = accesses.conflict(place, convention) {
            errors.push(ExclusivityError::OverlappingAccess {
                place: self.place_text(place),
                convention,
                span,
                held: existing.convention,
                projected: existing.span,
            });
        }
    }

    fn check_operand(
        &self,
        accesses: &AccessSet,
        operand: &Operand,
        errors: &mut Vec<ExclusivityError>,
    ) {
        let (place, convention) = match &operand.value {
            Value::Fresh => return,
            Value::Borrow(place) | Value::Copy(place) => (place, Convention::Let),
            Value::Move(place) => (place, Convention::Sink),
        };
        self.check_access(accesses, place, convention, operand.span, errors);
    }

    fn check_write(
        &self,
        state: &FlowState,
        accesses: &AccessSet,
        dest: &Place,
        span: FileSpan,
        errors: &mut Vec<ExclusivityError>,
    ) {
        self.check_access(accesses, dest, Convention::Set, span, errors);

        let binding = self.body.binding(dest.binding);
        let allowed = match binding.kind {
            BindingKind::Let => state
                .get(dest.binding)
                .is_none_or(|entry| never_written(entry, &dest.path)),
            kind => kind.is_mutable(),
        };
        if !allowed {
            errors.push(ExclusivityError::AssignToImmutable {
                place: self.place_text(dest),
                span,
                declared: binding.span,
            });
        }
    }

    /// Checks that storage can be mutated or initialized under `convention`.
    fn check_mutable(
        &self,
        state: &FlowState,
        place: &Place,
        convention: Convention,
        span: FileSpan,
        errors: &mut Vec<ExclusivityError>,
    ) {
        let binding = self.body.binding(place.binding);
        let allowed = match binding.kind {
            // A `let` local may be initialized once through `set`.
            BindingKind::Let => {
                convention == Convention::Set
                    && state
                        .get(place.binding)
                        .is_none_or(|entry| never_written(entry, &place.path))
            }
            kind => kind.is_mutable(),
        };
        if !allowed {
            errors.push(ExclusivityError::ImmutableArgument {
                place: self.place_text(place),
                convention,
                span,
                declared: binding.span,
            });
        }
    }

    fn check_set_target(
        &self,
        state: &FlowState,
        place: &Place,
        span: FileSpan,
        errors: &mut Vec<ExclusivityError>,
    ) {
        if let Some(entry) = state.get(place.binding) {
            if holds_part(entry, &place.path) {
                errors.push(ExclusivityError::SetOnInitialized {
                    place: self.place_text(place),
                    span,
                    initialized: entry.origin,
                });
            }
        }
    }

    fn check_call(
        &self,
        state: &FlowState,
        accesses: &AccessSet,
        location: Location,
        call: &CallSite,
        errors: &mut Vec<ExclusivityError>,
    ) {
        let conventions = self.oracle.argument_conventions(location, call);
        let mut passed: Vec<(&Place, Convention, FileSpan)> = Vec::new();

        for (arg, convention) in call.args.iter().zip(conventions) {
            let Some(place) = &arg.place else {
                if convention.writes_storage() {
                    errors.push(ExclusivityError::TemporaryArgument {
                        convention,
                        span: arg.span,
                    });
                }
                continue;
            };

            self.check_access(accesses, place, convention, arg.span, errors);
            if convention == Convention::Inout && !arg.mutation_marker {
                errors.push(ExclusivityError::MissingMutationMarker {
                    place: self.place_text(place),
                    span: arg.span,
                });
            }
            if convention.writes_storage() {
                self.check_mutable(state, place, convention, arg.span, errors);
            }
            if convention == Convention::Set {
                self.check_set_target(state, place, arg.span, errors);
            }

            let overlapping = passed.iter().find(|(other, other_convention, _)| {
                (convention.is_exclusive() || other_convention.is_exclusive())
                    && other.overlaps(place)
            });
            if let Some((other, other_convention, other_span)) = overlapping {
                errors.push(ExclusivityError::ArgumentOverlap {
                    place: self.place_text(place),
                    convention,
                    span: arg.span,
                    other: self.place_text(other),
                    other_convention: *other_convention,
                    other_span: *other_span,
                });
            }
            passed.push((place, convention, arg.span));
        }

        if let Some(dest) = &call.destination {
            self.check_write(state, accesses, dest, call.span, errors);
        }
    }

    /// Reports mutable projections of `scope` that do not hold a value.
    fn check_projections_restored(
        &self,
        state: &FlowState,
        ending: impl Fn(&Binding) -> bool,
        span: FileSpan,
        errors: &mut Vec<ExclusivityError>,
    ) {
        for (binding, entry) in state.iter() {
            let decl = self.body.binding(binding);
            let BindingKind::Projection(convention) = decl.kind else {
                continue;
            };
            if convention.writes_storage() && ending(decl) && !entry.state.is_initialized() {
                errors.push(ExclusivityError::UnrestoredProjection {
                    name: decl.name.clone(),
                    convention,
                    span,
                    origin: entry.origin,
                });
            }
        }
    }

    fn check_statement(
        &self,
        state: &FlowState,
        accesses: &AccessSet,
        location: Location,
        statement: &Statement,
        errors: &mut Vec<ExclusivityError>,
    ) {
        let span = statement.span;
        match &statement.kind {
            StatementKind::Assign { dest, value } => {
                self.check_operand(accesses, value, errors);
                self.check_write(state, accesses, dest, span, errors);
            }
            StatementKind::Call(call) => self.check_call(state, accesses, location, call, errors),
            StatementKind::Read(place) => {
                self.check_access(accesses, place, Convention::Let, span, errors);
            }
            StatementKind::Project {
                source, convention, ..
            } => {
                self.check_access(accesses, source, *convention, span, errors);
                if convention.writes_storage() {
                    self.check_mutable(state, source, *convention, span, errors);
                }
                if *convention == Convention::Set {
                    self.check_set_target(state, source, span, errors);
                }
            }
            StatementKind::Capture { value, .. } => self.check_operand(accesses, value, errors),
            StatementKind::ScopeEnd(scope) => {
                self.check_projections_restored(state, |decl| decl.scope == *scope, span, errors);
            }
            StatementKind::Declare(_) | StatementKind::Nop => {}
        }
    }

    fn check_terminator(
        &self,
        transfer: &Transfer<'_>,
        mut state: FlowState,
        accesses: &AccessSet,
        block: &BasicBlock,
        errors: &mut Vec<ExclusivityError>,
    ) {
        let span = block.terminator_span;
        match &block.terminator {
            Terminator::Branch {
                condition: Some(place),
                ..
            } => self.check_access(accesses, place, Convention::Let, span, errors),
            Terminator::Return { value } => {
                if let Some(value) = value {
                    self.check_operand(accesses, value, errors);
                }
                let mut scratch = Vec::new();
                transfer.apply_terminator(&mut state, block, &mut scratch);
                self.check_exit(&state, span, errors);
            }
            Terminator::Branch {
                condition: None, ..
            }
            | Terminator::Goto(_)
            | Terminator::Unreachable => {}
        }
    }

    /// `inout` and `set` parameters, and mutable projections still in scope,
    /// must hold a value when the function returns.
    fn check_exit(&self, state: &FlowState, span: FileSpan, errors: &mut Vec<ExclusivityError>) {
        for param in &self.body.params {
            let decl = self.body.binding(*param);
            let Some(entry) = state.get(*param) else {
                continue;
            };
            if entry.state.is_initialized() {
                continue;
            }
            match decl.kind {
                BindingKind::Param(Convention::Inout) => {
                    errors.push(ExclusivityError::UnrestoredInout {
                        name: decl.name.clone(),
                        span,
                        taken: entry.origin,
                    });
                }
                BindingKind::Param(Convention::Set) => {
                    errors.push(ExclusivityError::SetNotInitialized {
                        name: decl.name.clone(),
                        span,
                        declared: decl.span,
                    });
                }
                _ => {}
            }
        }
        self.check_projections_restored(state, |_| true, span, errors);
    }
}

/// Checks `body` against its typestate results.
///
/// # Errors
///
/// Returns all violations found in the body.
pub fn check_exclusivity(
    body: &FunctionBody,
    types: &dyn TypeFacts,
    oracle: &dyn ConventionOracle,
    typestate: &TypestateResults,
    max_iterations: usize,
) -> ExclusivityResult<()> {
    ExclusivityChecker::new(body, types, oracle, typestate)
        .with_max_iterations(max_iterations)
        .check()
}
