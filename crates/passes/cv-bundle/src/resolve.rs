//! Per-call-site variant selection.

use cv_cfg::{
    Argument, BundleId, CallSite, Callee, Convention, ConventionOracle, FunctionBody, Location,
    Module, Ownership, TypeFacts, call_sites, declared_conventions,
};
use cv_liveness::{Liveness, UsageContext, usage_context};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::{debug, debug_span};

use crate::error::BundleError;
use crate::synthesis::{BundleTable, ReceiverFacts, VariantImpl};

/// Bundle resolution settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleConfig {
    /// Allow synthesized variants; when off only declared variants resolve
    pub synthesize: bool,
    /// Select `sink` for receivers at their last use
    pub prefer_sink_at_last_use: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            synthesize: true,
            prefer_sink_at_last_use: true,
        }
    }
}

/// The variant chosen for one bundle call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedVariant {
    /// The bundle called
    pub bundle: BundleId,
    /// How the receiver is used
    pub context: UsageContext,
    /// Convention the usage context asked for
    pub requested: Convention,
    /// Variant that will be invoked
    pub variant: VariantImpl,
}

/// Outcome of resolving every call in one body
#[derive(Debug, Clone, Default)]
pub struct BundleResolution {
    conventions: FxHashMap<Location, Vec<Convention>>,
    variants: IndexMap<Location, ResolvedVariant>,
    errors: Vec<BundleError>,
}

impl BundleResolution {
    /// Variant chosen for the bundle call at `location`.
    #[must_use]
    pub fn variant(&self, location: Location) -> Option<&ResolvedVariant> {
        self.variants.get(&location)
    }

    /// All resolved bundle calls in program order.
    pub fn variants(&self) -> impl Iterator<Item = (Location, &ResolvedVariant)> {
        self.variants
            .iter()
            .map(|(location, variant)| (*location, variant))
    }

    /// Calls whose required variant is unavailable.
    #[must_use]
    pub fn errors(&self) -> &[BundleError] {
        &self.errors
    }
}

impl ConventionOracle for BundleResolution {
    fn argument_conventions(&self, location: Location, call: &CallSite) -> Vec<Convention> {
        self.conventions
            .get(&location)
            .cloned()
            .unwrap_or_else(|| vec![Convention::Let; call.args.len()])
    }
}

/// Selects bundle variants for call sites, caching one table per bundle.
pub struct BundleResolver<'m> {
    module: &'m Module,
    config: BundleConfig,
    tables: FxHashMap<BundleId, BundleTable>,
}

impl<'m> BundleResolver<'m> {
    /// Creates a resolver over `module`.
    #[must_use]
    pub fn new(module: &'m Module, config: BundleConfig) -> Self {
        Self {
            module,
            config,
            tables: FxHashMap::default(),
        }
    }

    /// Declared and synthesizable variants of `bundle`.
    pub fn table(&mut self, bundle: BundleId) -> &BundleTable {
        let module = self.module;
        let synthesize = self.config.synthesize;
        self.tables.entry(bundle).or_insert_with(|| {
            let decl = &module.bundles[bundle];
            let facts = ReceiverFacts {
                copyable: module.types.is_copyable(decl.receiver_ty),
                movable: module.types.is_movable(decl.receiver_ty),
            };
            BundleTable::build(decl.declared, facts, synthesize)
        })
    }

    /// Resolves every call in `body`.
    pub fn resolve(&mut self, body: &FunctionBody, liveness: &Liveness) -> BundleResolution {
        let _span = debug_span!("resolve_bundles", function = %body.name).entered();
        let mut resolution = BundleResolution::default();

        for (location, call) in call_sites(body) {
            let receiver = match call.callee {
                Callee::Bundle(bundle) => {
                    match self.select(body, liveness, location, call, bundle) {
                        Ok(Some(resolved)) => {
                            resolution.variants.insert(location, resolved);
                            resolved.variant.convention()
                        }
                        Ok(None) => Convention::Let,
                        Err((requested, error)) => {
                            resolution.errors.push(error);
                            requested
                        }
                    }
                }
                Callee::Function(_) => Convention::Let,
            };
            resolution
                .conventions
                .insert(location, declared_conventions(self.module, call, receiver));
        }
        resolution
    }

    fn select(
        &mut self,
        body: &FunctionBody,
        liveness: &Liveness,
        location: Location,
        call: &CallSite,
        bundle: BundleId,
    ) -> Result<Option<ResolvedVariant>, (Convention, BundleError)> {
        let (Some(receiver), Some(context)) =
            (call.receiver(), usage_context(liveness, location, call))
        else {
            return Ok(None);
        };

        let requested = match context {
            UsageContext::Mutating => Convention::Inout,
            UsageContext::LastUse
                if self.config.prefer_sink_at_last_use && is_consumable(body, receiver) =>
            {
                Convention::Sink
            }
            UsageContext::LastUse | UsageContext::ContinuedUse => Convention::Let,
        };

        let variant = self.table(bundle).get(requested);

        let decl = &self.module.bundles[bundle];
        match variant {
            Some(variant) => {
                debug!(
                    bundle = %decl.name,
                    ?location,
                    %context,
                    %variant,
                    "resolved bundle variant"
                );
                Ok(Some(ResolvedVariant {
                    bundle,
                    context,
                    requested,
                    variant,
                }))
            }
            None => Err((
                requested,
                BundleError::VariantUnavailable {
                    bundle: decl.name.clone(),
                    requested,
                    declared: decl.declared,
                    context,
                    receiver_ty: self.module.types.type_name(decl.receiver_ty).to_owned(),
                    span: call.span,
                    declaration: decl.span,
                },
            )),
        }
    }
}

/// A receiver can be given away if it is a temporary or a whole owned binding.
fn is_consumable(body: &FunctionBody, receiver: &Argument) -> bool {
    receiver.place.as_ref().is_none_or(|place| {
        place.is_whole() && body.binding(place.binding).kind.ownership() == Ownership::Owned
    })
}

/// Resolves every bundle call in `body` with a fresh resolver.
#[must_use]
pub fn resolve_bundles(
    module: &Module,
    body: &FunctionBody,
    liveness: &Liveness,
    config: BundleConfig,
) -> BundleResolution {
    BundleResolver::new(module, config).resolve(body, liveness)
}
