//! Analysis driver.
//!
//! Runs the convention analyses over a [`cv_cfg::Module`] in dependency
//! order: liveness, bundle resolution, binding typestate, exclusivity and
//! finally copy diagnostics. Every function gets a [`FunctionReport`] with
//! its ordered diagnostics and the [`AnnotatedBody`] code generation needs.
//!
//! ```rust,ignore
//! let config = AnalysisConfig::from_file(Path::new("analysis.toml"))?;
//! let report = analyze_module(&module, &config);
//! report.ensure_codegen_ready()?;
//! ```

mod analyze;
mod annotate;
mod config;
mod error;
mod render;
mod report;

pub use analyze::{Analyzer, analyze_function, analyze_module};
pub use annotate::{AnnotatedBody, CallAnnotation, CopyAnnotation, VariantAnnotation};
pub use config::{AnalysisConfig, BundleSettings, CopySettings, DataflowConfig};
pub use error::DriverError;
pub use render::render_diagnostics;
pub use report::{FunctionReport, ModuleReport};

pub use cv_copy_check::{CopyLint, CopyLowering};

#[cfg(test)]
mod tests {
    use super::*;
    use cv_bundle::{Synthesis, VariantImpl};
    use cv_cfg::{
        Argument, BindingKind, BodyBuilder, BundleDecl, BundleKind, CallSite, Callee, Convention,
        ConventionSet, Location, Module, Operand, ParamDecl, Place, TypeInfo,
    };
    use cv_liveness::UsageContext;
    use cv_span::{FileId, FileSpan, Span};
    use expect_test::expect;

    fn span(start: u32) -> FileSpan {
        FileSpan::new(FileId(0), Span::new(start, start + 1))
    }

    /// `offset(by:)` declares only `inout`; `consume` takes its argument `sink`.
    fn module() -> Module {
        let mut module = Module::new();
        let int = module.types.add(TypeInfo::scalar("Int"));
        let vector = module.types.add(TypeInfo::scalar("Vector2").field("x", int));
        let offset = module.add_bundle(BundleDecl {
            name: "offset".to_owned(),
            kind: BundleKind::Method,
            receiver_ty: vector,
            params: vec![ParamDecl::new("by", Convention::Let, int)],
            declared: ConventionSet::of(&[Convention::Inout]),
            span: span(90),
        });
        let consume = module.add_signature(
            "consume",
            vec![ParamDecl::new("value", Convention::Sink, vector)],
        );

        // var v = Vector2(); let r = v.offset(by: 1); return r
        let mut builder = BodyBuilder::new("shift", span(0));
        let v = builder.declare("v", vector, BindingKind::Var, span(1));
        builder.assign(Place::from_binding(v), Operand::fresh(span(2)), span(2));
        let r = builder.declare("r", vector, BindingKind::Let, span(3));
        builder.call(CallSite {
            callee: Callee::Bundle(offset),
            args: vec![
                Argument::place(Place::from_binding(v), span(4)),
                Argument::temporary(span(5)),
            ],
            destination: Some(Place::from_binding(r)),
            span: span(6),
        });
        builder.ret(Some(Operand::borrow(Place::from_binding(r), span(7))), span(7));
        module.add_function(builder.finish());

        // var v = Vector2(); consume(v); print(v)
        let mut builder = BodyBuilder::new("reuse", span(20));
        let v = builder.declare("v", vector, BindingKind::Var, span(21));
        builder.assign(Place::from_binding(v), Operand::fresh(span(22)), span(22));
        builder.call(CallSite {
            callee: Callee::Function(consume),
            args: vec![Argument::place(Place::from_binding(v), span(23))],
            destination: None,
            span: span(24),
        });
        builder.read(Place::from_binding(v), span(25));
        module.add_function(builder.finish());

        module
    }

    #[test]
    fn test_module_report_separates_functions() {
        let module = module();
        let report = analyze_module(&module, &AnalysisConfig::default());

        let shift = report.function("shift").unwrap();
        assert!(shift.codegen_ready());
        assert!(shift.diagnostics.is_empty());

        let reuse = report.function("reuse").unwrap();
        assert!(!reuse.codegen_ready());
        expect![[r#"
            error[use-after-consume]: use of consumed value `v`
        "#]]
        .assert_eq(&reuse.summaries());

        let error = report.ensure_codegen_ready().unwrap_err();
        assert_eq!(error.to_string(), "1 error(s) in reuse");
    }

    #[test]
    fn test_last_use_receiver_gets_synthesized_sink() {
        let module = module();
        let report = analyze_function(&module, &module.functions[0], &AnalysisConfig::default());

        let call = report.annotations.call(Location::new(0, 3)).unwrap();
        assert_eq!(call.callee, "offset");
        assert_eq!(call.context, Some(UsageContext::LastUse));
        assert_eq!(call.conventions, vec![Convention::Sink, Convention::Let]);

        let variant = call.variant.as_ref().unwrap();
        assert_eq!(variant.requested, Convention::Sink);
        assert_eq!(
            variant.implementation,
            VariantImpl::Synthesized(Synthesis::SinkFromInout)
        );
        assert_eq!(variant.steps, Synthesis::SinkFromInout.steps().to_vec());
    }

    #[test]
    fn test_without_synthesis_the_call_is_rejected() {
        let module = module();
        let config = AnalysisConfig::from_toml_str("[bundles]\nsynthesize = false\n").unwrap();
        let report = analyze_function(&module, &module.functions[0], &config);

        assert!(report.has_errors());
        expect![[r#"
            error[bundle-variant-unavailable]: no `sink` variant of `offset` is available
        "#]]
        .assert_eq(&report.summaries());
    }
}
