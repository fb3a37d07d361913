//! Missing and unnecessary copy detection.

use cv_cfg::{
    BindingKind, Convention, ConventionOracle, FunctionBody, Location, Operand, Ownership, Place,
    StatementKind, Terminator, TypeFacts, Value, paths_overlap,
};
use cv_diagnostics::SuggestedEdit;
use cv_liveness::{Consumption, Escape, EscapeKind, Liveness};
use cv_span::FileSpan;
use cv_typestate::{Transfer, TypeState, TypestateResults};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace};

use crate::error::CopyError;

/// Whether unnecessary copies are reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyLint {
    /// Not reported
    Allow,
    /// Reported as a warning
    #[default]
    Warn,
}

/// Copy diagnostic settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyConfig {
    /// Reporting level for unnecessary copies
    pub unnecessary_copy: CopyLint,
    /// Suggest in-place copy assignment when the destination holds a value
    pub suggest_in_place_assignment: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            unnecessary_copy: CopyLint::Warn,
            suggest_in_place_assignment: true,
        }
    }
}

/// How an explicit copy is lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CopyLowering {
    /// Into fresh storage
    Fresh,
    /// Over a destination that already holds a value
    InPlace,
}

/// Copy findings for one body
#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    errors: Vec<CopyError>,
    lowerings: IndexMap<Location, CopyLowering>,
}

impl CopyReport {
    /// Missing and unnecessary copies, in program order.
    #[must_use]
    pub fn errors(&self) -> &[CopyError] {
        &self.errors
    }

    /// Lowering of the explicit copy at `location`.
    #[must_use]
    pub fn lowering(&self, location: Location) -> Option<CopyLowering> {
        self.lowerings.get(&location).copied()
    }

    /// Every explicit copy in program order.
    pub fn lowerings(&self) -> impl Iterator<Item = (Location, CopyLowering)> + '_ {
        self.lowerings
            .iter()
            .map(|(location, lowering)| (*location, *lowering))
    }

    /// Splits the report into its errors and lowerings.
    #[must_use]
    pub fn into_parts(self) -> (Vec<CopyError>, IndexMap<Location, CopyLowering>) {
        (self.errors, self.lowerings)
    }
}

/// A copy expression and where its value goes
struct CopySite<'b> {
    location: Location,
    source: &'b Place,
    span: FileSpan,
    site: FileSpan,
    target: CopyTarget<'b>,
}

enum CopyTarget<'b> {
    Assign(&'b Place),
    Return,
    Capture,
}

/// Copy diagnostic engine for one body.
pub struct CopyChecker<'a> {
    body: &'a FunctionBody,
    types: &'a dyn TypeFacts,
    liveness: &'a Liveness,
    typestate: &'a TypestateResults,
    transfer: Transfer<'a>,
    config: CopyConfig,
}

impl<'a> CopyChecker<'a> {
    /// Creates a checker for `body`.
    #[must_use]
    pub fn new(
        body: &'a FunctionBody,
        types: &'a dyn TypeFacts,
        oracle: &'a dyn ConventionOracle,
        liveness: &'a Liveness,
        typestate: &'a TypestateResults,
        config: CopyConfig,
    ) -> Self {
        Self {
            body,
            types,
            liveness,
            typestate,
            transfer: Transfer::new(body, types, oracle),
            config,
        }
    }

    /// Reports missing copies for `escapes` and checks every explicit copy.
    #[must_use]
    pub fn check(&self, escapes: &[Escape]) -> CopyReport {
        let _span = debug_span!("copies", function = %self.body.name).entered();
        let mut report = CopyReport::default();

        for escape in escapes {
            report.errors.push(self.missing_copy(escape));
        }

        for copy in self.copy_sites() {
            let lowering = self.lowering(&copy);
            trace!(location = ?copy.location, ?lowering, "explicit copy");
            report.lowerings.insert(copy.location, lowering);
            if self.config.unnecessary_copy == CopyLint::Warn {
                if let Some(error) = self.unnecessary_copy(&copy, lowering) {
                    report.errors.push(error);
                }
            }
        }

        debug!(
            function = %self.body.name,
            escapes = escapes.len(),
            copies = report.lowerings.len(),
            "copies checked"
        );
        report
    }

    fn place_text(&self, place: &Place) -> String {
        self.body.place_text(place, self.types)
    }

    fn site_label(&self, kind: &EscapeKind) -> String {
        match kind {
            EscapeKind::Returned => "returned here".to_owned(),
            EscapeKind::Stored { dest } => format!("stored into `{}` here", self.place_text(dest)),
            EscapeKind::Captured => "captured by an escaping closure here".to_owned(),
            EscapeKind::Consumed(_) => "ownership taken here".to_owned(),
        }
    }

    fn missing_copy(&self, escape: &Escape) -> CopyError {
        let place = self.place_text(&escape.source);
        let root = self.body.binding(escape.source.binding);
        let ty = self
            .types
            .part_type(root.ty, &escape.source.path)
            .unwrap_or(root.ty);
        let site_label = self.site_label(&escape.kind);

        if self.types.is_copyable(ty) {
            // A `sink` projection has no value expression to wrap.
            let fix = (escape.kind != EscapeKind::Consumed(Consumption::SinkProjection)).then(|| {
                SuggestedEdit::new(escape.span, format!("{place}.copy()"), "copy the value")
            });
            return CopyError::MissingCopy {
                place,
                span: escape.span,
                site: escape.site,
                site_label,
                fix,
            };
        }

        let fix = (root.kind == BindingKind::Param(Convention::Let)).then(|| {
            SuggestedEdit::new(
                root.span,
                format!("{}: sink {}", root.name, self.types.type_name(root.ty)),
                "take ownership of the parameter",
            )
        });
        CopyError::IllegalEscape {
            place,
            ty: self.types.type_name(ty).to_owned(),
            span: escape.span,
            site: escape.site,
            site_label,
            fix,
        }
    }

    fn copy_sites(&self) -> Vec<CopySite<'a>> {
        let body = self.body;
        let mut sites = Vec::new();
        let mut push = |location: Location,
                        operand: &'a Operand,
                        site: FileSpan,
                        target: CopyTarget<'a>| {
            if let Value::Copy(source) = &operand.value {
                sites.push(CopySite {
                    location,
                    source,
                    span: operand.span,
                    site,
                    target,
                });
            }
        };

        for block in &body.basic_blocks {
            for (index, statement) in block.statements.iter().enumerate() {
                let location = Location::new(block.id, index);
                match &statement.kind {
                    StatementKind::Assign { dest, value } => {
                        push(location, value, statement.span, CopyTarget::Assign(dest));
                    }
                    StatementKind::Capture { value, .. } => {
                        push(location, value, statement.span, CopyTarget::Capture);
                    }
                    _ => {}
                }
            }
            if let Terminator::Return { value: Some(value) } = &block.terminator {
                push(
                    Location::new(block.id, block.statements.len()),
                    value,
                    block.terminator_span,
                    CopyTarget::Return,
                );
            }
        }
        sites
    }

    fn lowering(&self, copy: &CopySite<'_>) -> CopyLowering {
        let CopyTarget::Assign(dest) = copy.target else {
            return CopyLowering::Fresh;
        };
        let holds_value = self
            .typestate
            .state_before(&self.transfer, copy.location)
            .and_then(|state| state.state(dest.binding).cloned())
            .is_some_and(|state| match state {
                TypeState::Initialized => true,
                TypeState::PartiallyConsumed(missing) => {
                    !missing.iter().any(|gone| paths_overlap(gone, &dest.path))
                }
                TypeState::Uninitialized | TypeState::Consumed => false,
            });
        if holds_value {
            CopyLowering::InPlace
        } else {
            CopyLowering::Fresh
        }
    }

    fn unnecessary_copy(&self, copy: &CopySite<'_>, lowering: CopyLowering) -> Option<CopyError> {
        let source = copy.source;
        let root = self.body.binding(source.binding);
        let transferable = source.is_whole()
            && root.kind.ownership() == Ownership::Owned
            && self.types.is_movable(root.ty)
            && self.liveness.is_last_use(copy.location, source.binding);
        if !transferable {
            return None;
        }

        let place = self.place_text(source);
        let fix = match copy.target {
            CopyTarget::Assign(dest) if dest.overlaps(source) => return None,
            CopyTarget::Assign(dest)
                if lowering == CopyLowering::InPlace && self.config.suggest_in_place_assignment =>
            {
                SuggestedEdit::new(
                    copy.site,
                    format!("{}.copy_assign(from: {place})", self.place_text(dest)),
                    "assign in place",
                )
            }
            CopyTarget::Return => {
                SuggestedEdit::new(copy.site, format!("return {place}"), "return the value directly")
            }
            CopyTarget::Assign(_) | CopyTarget::Capture => {
                SuggestedEdit::new(copy.span, place.clone(), "remove the copy")
            }
        };
        Some(CopyError::UnnecessaryCopy {
            place,
            span: copy.span,
            fix,
        })
    }
}
