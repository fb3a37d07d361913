//! Per-call-site annotations handed to code generation.

use cv_bundle::{BundleResolution, Step, VariantImpl};
use cv_cfg::{ConventionOracle, Convention, FunctionBody, Location, Module, call_sites};
use cv_copy_check::{CopyLowering, CopyReport};
use cv_liveness::{Liveness, UsageContext, usage_context};
use serde::Serialize;

/// The chosen variant of a bundle call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantAnnotation {
    /// Bundle name
    pub bundle: String,
    /// Convention the usage context asked for
    pub requested: Convention,
    /// Declared or synthesized implementation
    pub implementation: VariantImpl,
    /// Rewrite steps of a synthesized variant; empty when declared
    pub steps: Vec<Step>,
}

/// Conventions and variant choice for one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallAnnotation {
    /// Location of the call statement
    pub location: Location,
    /// Callee name
    pub callee: String,
    /// Convention of each argument, receiver first
    pub conventions: Vec<Convention>,
    /// Usage context of the receiver, for bundle calls
    pub context: Option<UsageContext>,
    /// Resolved variant, for bundle calls that resolved
    pub variant: Option<VariantAnnotation>,
}

/// Lowering of one explicit copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CopyAnnotation {
    /// Location of the copying statement
    pub location: Location,
    /// Fresh or in-place
    pub lowering: CopyLowering,
}

/// A function body's call and copy annotations, in program order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedBody {
    /// Function name
    pub function: String,
    /// One entry per call statement
    pub calls: Vec<CallAnnotation>,
    /// One entry per explicit copy
    pub copies: Vec<CopyAnnotation>,
}

impl AnnotatedBody {
    /// Collects the annotations of `body`.
    #[must_use]
    pub fn build(
        module: &Module,
        body: &FunctionBody,
        liveness: &Liveness,
        resolution: &BundleResolution,
        copies: &CopyReport,
    ) -> Self {
        let calls = call_sites(body)
            .map(|(location, call)| {
                let variant = resolution.variant(location).map(|resolved| {
                    let steps = match resolved.variant {
                        VariantImpl::Declared(_) => Vec::new(),
                        VariantImpl::Synthesized(synthesis) => synthesis.steps().to_vec(),
                    };
                    VariantAnnotation {
                        bundle: module.bundles[resolved.bundle].name.clone(),
                        requested: resolved.requested,
                        implementation: resolved.variant,
                        steps,
                    }
                });
                CallAnnotation {
                    location,
                    callee: module.callee_name(call.callee).to_owned(),
                    conventions: resolution.argument_conventions(location, call),
                    context: usage_context(liveness, location, call),
                    variant,
                }
            })
            .collect();

        let copies = copies
            .lowerings()
            .map(|(location, lowering)| CopyAnnotation { location, lowering })
            .collect();

        Self {
            function: body.name.clone(),
            calls,
            copies,
        }
    }

    /// Annotation of the call at `location`.
    #[must_use]
    pub fn call(&self, location: Location) -> Option<&CallAnnotation> {
        self.calls.iter().find(|call| call.location == location)
    }

    /// Lowering of the copy at `location`.
    #[must_use]
    pub fn copy(&self, location: Location) -> Option<CopyLowering> {
        self.copies
            .iter()
            .find(|copy| copy.location == location)
            .map(|copy| copy.lowering)
    }
}
