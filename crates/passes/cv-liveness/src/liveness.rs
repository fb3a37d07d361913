//! Backward liveness over bindings and last-use classification.

use cv_cfg::{
    BasicBlockId, BindingId, BindingKind, Convention, FunctionBody, Location, StatementKind,
    Terminator,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

/// Set of live bindings
pub type LiveSet = FxHashSet<BindingId>;

/// Whether a use is the final use of the value it reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseKind {
    /// No later use reads the same value
    LastUse,
    /// The value is read again on some path
    ContinuedUse,
}

/// Bindings a statement reads and the bindings it wholly redefines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    /// Roots of every place read
    pub uses: Vec<BindingId>,
    /// Bindings whose whole value is replaced
    pub kills: Vec<BindingId>,
}

/// Read/redefine effects of a statement.
#[must_use]
pub fn statement_effects(kind: &StatementKind) -> Effects {
    let mut effects = Effects::default();
    match kind {
        StatementKind::Declare(binding) => effects.kills.push(*binding),
        StatementKind::Assign { dest, value } => {
            effects.uses.extend(value.value.place().map(|place| place.binding));
            if dest.is_whole() {
                effects.kills.push(dest.binding);
            }
        }
        StatementKind::Call(call) => {
            effects.uses.extend(
                call.args
                    .iter()
                    .filter_map(|arg| arg.place.as_ref())
                    .map(|place| place.binding),
            );
            if let Some(dest) = call.destination.as_ref().filter(|dest| dest.is_whole()) {
                effects.kills.push(dest.binding);
            }
        }
        StatementKind::Read(place) => effects.uses.push(place.binding),
        StatementKind::Project { binding, source, .. } => {
            effects.uses.push(source.binding);
            effects.kills.push(*binding);
        }
        StatementKind::Capture { value, .. } => {
            effects.uses.extend(value.value.place().map(|place| place.binding));
        }
        StatementKind::ScopeEnd(_) | StatementKind::Nop => {}
    }
    effects
}

/// Bindings a terminator reads. A return also reads every `inout` and `set`
/// parameter, since the caller observes them afterwards.
#[must_use]
pub fn terminator_uses(body: &FunctionBody, terminator: &Terminator) -> Vec<BindingId> {
    match terminator {
        Terminator::Branch { condition, .. } => {
            condition.iter().map(|place| place.binding).collect()
        }
        Terminator::Return { value } => {
            let mut uses: Vec<BindingId> = value
                .iter()
                .filter_map(|operand| operand.value.place())
                .map(|place| place.binding)
                .collect();
            uses.extend(body.params.iter().copied().filter(|param| {
                matches!(
                    body.binding(*param).kind,
                    BindingKind::Param(Convention::Inout | Convention::Set)
                )
            }));
            uses
        }
        Terminator::Goto(_) | Terminator::Unreachable => Vec::new(),
    }
}

/// Liveness facts for one function body
#[derive(Debug, Clone)]
pub struct Liveness {
    live_in: Vec<LiveSet>,
    uses: FxHashMap<(Location, BindingId), UseKind>,
}

impl Liveness {
    /// Computes liveness for `body`, sweeping at most `max_iterations` times.
    #[must_use]
    pub fn compute(body: &FunctionBody, max_iterations: usize) -> Self {
        let block_count = body.basic_blocks.len();
        let mut gen_sets = vec![LiveSet::default(); block_count];
        let mut kill_sets = vec![LiveSet::default(); block_count];

        for block in &body.basic_blocks {
            let mut gen_set = LiveSet::default();
            let mut kill_set = LiveSet::default();
            for statement in &block.statements {
                let effects = statement_effects(&statement.kind);
                for binding in effects.uses {
                    if !kill_set.contains(&binding) {
                        gen_set.insert(binding);
                    }
                }
                kill_set.extend(effects.kills);
            }
            for binding in terminator_uses(body, &block.terminator) {
                if !kill_set.contains(&binding) {
                    gen_set.insert(binding);
                }
            }
            gen_sets[block.id] = gen_set;
            kill_sets[block.id] = kill_set;
        }

        let mut live_in = vec![LiveSet::default(); block_count];
        let mut live_out = vec![LiveSet::default(); block_count];
        let order: Vec<BasicBlockId> = body.reverse_postorder().into_iter().rev().collect();

        let mut iterations = 0;
        loop {
            iterations += 1;
            let mut changed = false;
            for &block in &order {
                let mut out = LiveSet::default();
                for succ in body.basic_blocks[block].terminator.successors() {
                    out.extend(live_in[succ].iter().copied());
                }
                let mut input = gen_sets[block].clone();
                input.extend(out.iter().filter(|binding| !kill_sets[block].contains(*binding)));

                changed |= live_out[block] != out || live_in[block] != input;
                live_out[block] = out;
                live_in[block] = input;
            }
            if !changed {
                break;
            }
            if iterations >= max_iterations {
                warn!(function = %body.name, iterations, "liveness did not converge");
                break;
            }
        }
        debug!(function = %body.name, iterations, "liveness converged");

        let uses = classify_uses(body, &live_out);
        Self { live_in, uses }
    }

    /// Bindings live on entry to `block`.
    #[must_use]
    pub fn live_in(&self, block: BasicBlockId) -> &LiveSet {
        &self.live_in[block]
    }

    /// Classification of the use of `binding` at `location`, if there is one.
    #[must_use]
    pub fn use_kind(&self, location: Location, binding: BindingId) -> Option<UseKind> {
        self.uses.get(&(location, binding)).copied()
    }

    /// Whether the use of `binding` at `location` is its last.
    #[must_use]
    pub fn is_last_use(&self, location: Location, binding: BindingId) -> bool {
        self.use_kind(location, binding) == Some(UseKind::LastUse)
    }
}

/// Walks every block backwards from its live-out set and classifies each use.
fn classify_uses(
    body: &FunctionBody,
    live_out: &[LiveSet],
) -> FxHashMap<(Location, BindingId), UseKind> {
    let mut uses = FxHashMap::default();

    for block in &body.basic_blocks {
        let mut live = live_out[block.id].clone();

        let terminator_location = Location::new(block.id, block.statements.len());
        let terminator_reads = terminator_uses(body, &block.terminator);
        for binding in &terminator_reads {
            uses.insert((terminator_location, *binding), kind_for(&live, &[], *binding));
        }
        live.extend(terminator_reads);

        for (index, statement) in block.statements.iter().enumerate().rev() {
            let location = Location::new(block.id, index);
            let effects = statement_effects(&statement.kind);
            for binding in &effects.uses {
                let kind = kind_for(&live, &effects.kills, *binding);
                trace!(?location, ?binding, ?kind, "classified use");
                uses.insert((location, *binding), kind);
            }
            for binding in &effects.kills {
                live.remove(binding);
            }
            live.extend(effects.uses);
        }
    }
    uses
}

fn kind_for(live_after: &LiveSet, kills: &[BindingId], binding: BindingId) -> UseKind {
    if kills.contains(&binding) || !live_after.contains(&binding) {
        UseKind::LastUse
    } else {
        UseKind::ContinuedUse
    }
}
