//! The per-function analysis pipeline.

use cv_bundle::BundleResolver;
use cv_cfg::{FunctionBody, Module};
use cv_copy_check::CopyChecker;
use cv_diagnostics::{Diagnostic, IntoDiagnostic, sort_diagnostics};
use cv_exclusivity::check_exclusivity;
use cv_liveness::{Liveness, find_escapes};
use cv_typestate::TypestateAnalysis;
use tracing::{debug, info_span};

use crate::annotate::AnnotatedBody;
use crate::config::AnalysisConfig;
use crate::report::{FunctionReport, ModuleReport};

/// Runs every analysis over the functions of one module.
///
/// Functions are analyzed independently; an error in one never stops the
/// others.
pub struct Analyzer<'m> {
    module: &'m Module,
    config: AnalysisConfig,
}

impl<'m> Analyzer<'m> {
    /// Creates an analyzer with the given settings.
    #[must_use]
    pub fn new(module: &'m Module, config: AnalysisConfig) -> Self {
        Self { module, config }
    }

    /// Analyzes every function of the module, in module order.
    #[must_use]
    pub fn analyze_module(&self) -> ModuleReport {
        let mut resolver = BundleResolver::new(self.module, self.config.bundle_config());
        let functions = self
            .module
            .functions
            .iter()
            .map(|body| self.run(body, &mut resolver))
            .collect();
        ModuleReport { functions }
    }

    /// Analyzes a single function body.
    #[must_use]
    pub fn analyze_function(&self, body: &FunctionBody) -> FunctionReport {
        let mut resolver = BundleResolver::new(self.module, self.config.bundle_config());
        self.run(body, &mut resolver)
    }

    fn run(&self, body: &FunctionBody, resolver: &mut BundleResolver<'m>) -> FunctionReport {
        let _span = info_span!("analyze", function = %body.name).entered();
        let max_iterations = self.config.dataflow.max_iterations;
        let types = &self.module.types;

        let liveness = Liveness::compute(body, max_iterations);
        let resolution = resolver.resolve(body, &liveness);

        let typestate = TypestateAnalysis::new(body, types, &resolution, &liveness)
            .with_max_iterations(max_iterations)
            .run();
        let exclusivity = check_exclusivity(body, types, &resolution, &typestate, max_iterations)
            .err()
            .unwrap_or_default();

        let escapes = find_escapes(body, &liveness, &resolution);
        let copies = CopyChecker::new(
            body,
            types,
            &resolution,
            &liveness,
            &typestate,
            self.config.copy_config(),
        )
        .check(&escapes);

        let annotations = AnnotatedBody::build(self.module, body, &liveness, &resolution, &copies);

        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        diagnostics.extend(resolution.errors().iter().cloned().map(IntoDiagnostic::into_diagnostic));
        diagnostics.extend(typestate.into_errors().into_iter().map(IntoDiagnostic::into_diagnostic));
        diagnostics.extend(exclusivity.into_iter().map(IntoDiagnostic::into_diagnostic));
        let (copy_errors, _) = copies.into_parts();
        diagnostics.extend(copy_errors.into_iter().map(IntoDiagnostic::into_diagnostic));
        sort_diagnostics(&mut diagnostics);

        debug!(diagnostics = diagnostics.len(), "analysis finished");
        FunctionReport {
            name: body.name.clone(),
            diagnostics,
            annotations,
        }
    }
}

/// Analyzes every function of `module`.
#[must_use]
pub fn analyze_module(module: &Module, config: &AnalysisConfig) -> ModuleReport {
    Analyzer::new(module, config.clone()).analyze_module()
}

/// Analyzes one function of `module`.
#[must_use]
pub fn analyze_function(
    module: &Module,
    body: &FunctionBody,
    config: &AnalysisConfig,
) -> FunctionReport {
    Analyzer::new(module, config.clone()).analyze_function(body)
}
