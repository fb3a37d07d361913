//! Forward fixpoint over the typestate lattice.

use cv_cfg::{BasicBlockId, ConventionOracle, FunctionBody, Location, TypeFacts};
use cv_liveness::Liveness;
use tracing::{debug, debug_span, warn};

use crate::error::TypestateError;
use crate::state::{BindingState, Cause, FlowState, TypeState};
use crate::transfer::Transfer;

/// Default cap on fixpoint sweeps.
pub const DEFAULT_MAX_ITERATIONS: usize = 256;

/// Typestate facts for one body
#[derive(Debug, Clone)]
pub struct TypestateResults {
    entry: Vec<Option<FlowState>>,
    errors: Vec<TypestateError>,
}

impl TypestateResults {
    /// State on entry to `block`, or `None` if the block is unreachable.
    #[must_use]
    pub fn entry_state(&self, block: BasicBlockId) -> Option<&FlowState> {
        self.entry.get(block).and_then(Option::as_ref)
    }

    /// State just before the statement (or terminator) at `location`.
    #[must_use]
    pub fn state_before(&self, transfer: &Transfer<'_>, location: Location) -> Option<FlowState> {
        let mut state = self.entry_state(location.block)?.clone();
        let block = &transfer.body().basic_blocks[location.block];
        let mut scratch = Vec::new();
        for (index, statement) in block
            .statements
            .iter()
            .enumerate()
            .take(location.statement_index)
        {
            transfer.apply_statement(
                &mut state,
                Location::new(block.id, index),
                statement,
                &mut scratch,
            );
        }
        Some(state)
    }

    /// Errors found, in block order.
    #[must_use]
    pub fn errors(&self) -> &[TypestateError] {
        &self.errors
    }

    /// Consumes the results, returning the errors.
    #[must_use]
    pub fn into_errors(self) -> Vec<TypestateError> {
        self.errors
    }
}

/// Binding state tracker for one function body.
pub struct TypestateAnalysis<'a> {
    transfer: Transfer<'a>,
    liveness: &'a Liveness,
    max_iterations: usize,
}

impl<'a> TypestateAnalysis<'a> {
    /// Creates the analysis.
    #[must_use]
    pub fn new(
        body: &'a FunctionBody,
        types: &'a dyn TypeFacts,
        oracle: &'a dyn ConventionOracle,
        liveness: &'a Liveness,
    ) -> Self {
        Self {
            transfer: Transfer::new(body, types, oracle),
            liveness,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Caps the number of fixpoint sweeps.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Transfer functions used by the analysis.
    #[must_use]
    pub fn transfer(&self) -> Transfer<'a> {
        self.transfer
    }

    /// Runs the analysis to a fixpoint and reports errors from one final
    /// sweep over the stable states.
    #[must_use]
    pub fn run(&self) -> TypestateResults {
        let body = self.transfer.body();
        let _span = debug_span!("typestate", function = %body.name).entered();

        let order = body.reverse_postorder();
        let preds = body.predecessors();
        let block_count = body.basic_blocks.len();
        let mut entry: Vec<Option<FlowState>> = vec![None; block_count];
        let mut exit: Vec<Option<FlowState>> = vec![None; block_count];
        let mut scratch = Vec::new();

        let mut iterations = 0;
        loop {
            iterations += 1;
            let mut changed = false;
            for &block in &order {
                let Some(input) = self.join(block, &preds[block], &exit, &mut scratch) else {
                    continue;
                };
                let mut state = input.clone();
                self.transfer
                    .apply_block(&mut state, &body.basic_blocks[block], &mut scratch);
                scratch.clear();

                if entry[block].as_ref() != Some(&input) {
                    entry[block] = Some(input);
                    changed = true;
                }
                if exit[block].as_ref() != Some(&state) {
                    exit[block] = Some(state);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            if iterations >= self.max_iterations {
                warn!(function = %body.name, iterations, "typestate did not converge");
                break;
            }
        }

        let mut errors = Vec::new();
        for &block in &order {
            if self.join(block, &preds[block], &exit, &mut errors).is_none() {
                continue;
            }
            if let Some(input) = &entry[block] {
                let mut state = input.clone();
                self.transfer
                    .apply_block(&mut state, &body.basic_blocks[block], &mut errors);
            }
        }
        debug!(
            function = %body.name,
            iterations,
            errors = errors.len(),
            "typestate converged"
        );

        TypestateResults { entry, errors }
    }

    /// Merges the exit states of the computed predecessors of `block`.
    fn join(
        &self,
        block: BasicBlockId,
        preds: &[BasicBlockId],
        exit: &[Option<FlowState>],
        errors: &mut Vec<TypestateError>,
    ) -> Option<FlowState> {
        let body = self.transfer.body();
        let entry_state = (block == body.entry_block).then(|| self.transfer.entry_state());
        let inputs: Vec<&FlowState> = entry_state
            .iter()
            .chain(preds.iter().filter_map(|pred| exit[*pred].as_ref()))
            .collect();
        let (first, rest) = inputs.split_first()?;
        if rest.is_empty() {
            return Some((*first).clone());
        }

        let basic_block = &body.basic_blocks[block];
        let join_span = basic_block
            .statements
            .first()
            .map_or(basic_block.terminator_span, |statement| statement.span);
        let live = self.liveness.live_in(block);

        let mut merged = FlowState::new();
        for (binding, state) in first.iter() {
            let Some(others) = rest
                .iter()
                .map(|other| other.get(binding))
                .collect::<Option<Vec<&BindingState>>>()
            else {
                continue;
            };
            if others.iter().all(|other| other.state == state.state) {
                merged.set(binding, state.clone());
                continue;
            }

            let all = || std::iter::once(state).chain(others.iter().copied());
            let diverged = all()
                .find(|candidate| !candidate.state.is_initialized())
                .unwrap_or(state);

            if live.contains(&binding) {
                errors.push(TypestateError::InconsistentJoin {
                    name: body.binding(binding).name.clone(),
                    span: join_span,
                    diverged: diverged.origin,
                });
                // Reported once at the join; later reads of it stay quiet.
                merged.set(
                    binding,
                    BindingState::new(TypeState::Initialized, Cause::Initialized, join_span),
                );
            } else {
                let consumed =
                    BindingState::new(TypeState::Consumed, Cause::Consumed, diverged.origin);
                // Dead here; keep a partial state so the scope-exit check still sees it.
                let partial = all()
                    .find(|candidate| matches!(candidate.state, TypeState::PartiallyConsumed(_)));
                merged.set(binding, partial.cloned().unwrap_or(consumed));
            }
        }
        Some(merged)
    }
}

/// Runs the binding state tracker over `body`.
#[must_use]
pub fn check_typestate(
    body: &FunctionBody,
    types: &dyn TypeFacts,
    oracle: &dyn ConventionOracle,
    liveness: &Liveness,
    max_iterations: usize,
) -> TypestateResults {
    TypestateAnalysis::new(body, types, oracle, liveness)
        .with_max_iterations(max_iterations)
        .run()
}
