//! Integration test utilities for the convention analyses
//!
//! A [`TestFixture`] pairs a module under construction with the source text
//! it pretends to come from, so spans can be looked up by snippet and
//! rendered diagnostics point at real text.

use anyhow::Result;
use codespan_reporting::files::SimpleFiles;
use cv_cfg::{
    Argument, BindingId, BodyBuilder, BundleDecl, BundleId, BundleKind, CallSite, Callee, Convention,
    ConventionSet, FunctionBody, Module, ParamDecl, Place, SignatureId, TypeId, TypeInfo,
};
use cv_driver::{AnalysisConfig, ModuleReport, analyze_module, render_diagnostics};
use cv_span::{FileId, FileSpan, Span};

/// Test fixture helper
pub struct TestFixture {
    /// Module being built
    pub module: Module,
    /// Settings used by [`TestFixture::analyze`]
    pub config: AnalysisConfig,
    source: String,
}

impl TestFixture {
    /// Creates a fixture over `source` with the default settings.
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            module: Module::new(),
            config: AnalysisConfig::default(),
            source: source.to_owned(),
        }
    }

    /// Replaces the settings with ones parsed from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not parse.
    pub fn with_config(mut self, toml: &str) -> Result<Self> {
        self.config = AnalysisConfig::from_toml_str(toml)?;
        Ok(self)
    }

    /// Span of the `nth` occurrence (zero-based) of `snippet` in the source.
    ///
    /// # Panics
    ///
    /// Panics if the source has fewer occurrences; fixtures are written
    /// against their own text.
    #[must_use]
    pub fn span_nth(&self, snippet: &str, nth: usize) -> FileSpan {
        let Some((start, _)) = self.source.match_indices(snippet).nth(nth) else {
            panic!("occurrence {nth} of `{snippet}` not found in fixture source");
        };
        let end = start + snippet.len();
        FileSpan::new(FileId(0), Span::new(start as u32, end as u32))
    }

    /// Span of the first occurrence of `snippet` in the source.
    #[must_use]
    pub fn span(&self, snippet: &str) -> FileSpan {
        self.span_nth(snippet, 0)
    }

    /// Span covering the whole source.
    #[must_use]
    pub fn whole(&self) -> FileSpan {
        FileSpan::new(FileId(0), Span::new(0, self.source.len() as u32))
    }

    /// Adds a type.
    pub fn ty(&mut self, info: TypeInfo) -> TypeId {
        self.module.types.add(info)
    }

    /// Declares a plain function.
    pub fn signature(
        &mut self,
        name: &str,
        params: &[(&str, Convention, TypeId)],
    ) -> SignatureId {
        self.module.add_signature(name, param_decls(params))
    }

    /// Declares a method bundle with the given receiver variants, spanned at
    /// the first occurrence of its name.
    pub fn bundle(
        &mut self,
        name: &str,
        receiver_ty: TypeId,
        declared: &[Convention],
        params: &[(&str, Convention, TypeId)],
    ) -> BundleId {
        let span = self.span(name);
        self.module.add_bundle(BundleDecl {
            name: name.to_owned(),
            kind: BundleKind::Method,
            receiver_ty,
            params: param_decls(params),
            declared: ConventionSet::of(declared),
            span,
        })
    }

    /// Starts a body spanning the whole source.
    #[must_use]
    pub fn body(&self, name: &str) -> BodyBuilder {
        BodyBuilder::new(name, self.whole())
    }

    /// Adds a finished body to the module.
    pub fn add(&mut self, body: FunctionBody) {
        self.module.add_function(body);
    }

    /// Runs every analysis over the module.
    #[must_use]
    pub fn analyze(&self) -> ModuleReport {
        analyze_module(&self.module, &self.config)
    }

    /// Renders every diagnostic of `report` against the fixture source.
    ///
    /// # Errors
    ///
    /// Returns an error if a diagnostic does not point into the source.
    pub fn render(&self, report: &ModuleReport) -> Result<String> {
        let mut files = SimpleFiles::new();
        files.add("main.hylo".to_owned(), self.source.clone());
        let diagnostics: Vec<_> = report.diagnostics().cloned().collect();
        Ok(render_diagnostics(&files, &diagnostics)?)
    }
}

fn param_decls(params: &[(&str, Convention, TypeId)]) -> Vec<ParamDecl> {
    params
        .iter()
        .map(|(name, convention, ty)| ParamDecl::new(*name, *convention, *ty))
        .collect()
}

/// A call of `callee` without a result.
#[must_use]
pub fn call(callee: Callee, args: Vec<Argument>, span: FileSpan) -> CallSite {
    CallSite {
        callee,
        args,
        destination: None,
        span,
    }
}

/// A call of `callee` storing its result into `destination`.
#[must_use]
pub fn call_into(
    callee: Callee,
    args: Vec<Argument>,
    destination: Place,
    span: FileSpan,
) -> CallSite {
    CallSite {
        callee,
        args,
        destination: Some(destination),
        span,
    }
}

/// Shorthand for the whole of `binding`.
#[must_use]
pub fn whole(binding: BindingId) -> Place {
    Place::from_binding(binding)
}
