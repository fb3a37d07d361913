//! Analysis configuration.

use std::path::Path;

use anyhow::{Context, Result};
use cv_bundle::BundleConfig;
use cv_copy_check::{CopyConfig, CopyLint};
use miette::{NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Analysis settings, usually loaded from a TOML file.
///
/// ```toml
/// [dataflow]
/// max_iterations = 256
///
/// [bundles]
/// synthesize = true
/// prefer_sink_at_last_use = true
///
/// [copies]
/// unnecessary_copy = "warn"
/// suggest_in_place_assignment = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Fixpoint settings shared by every pass
    pub dataflow: DataflowConfig,
    /// Bundle variant selection
    pub bundles: BundleSettings,
    /// Copy diagnostics
    pub copies: CopySettings,
}

/// Fixpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataflowConfig {
    /// Cap on fixpoint sweeps per pass
    pub max_iterations: usize,
}

impl Default for DataflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: 256,
        }
    }
}

/// Bundle variant selection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleSettings {
    /// Allow synthesized variants
    pub synthesize: bool,
    /// Select `sink` for receivers at their last use
    pub prefer_sink_at_last_use: bool,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            synthesize: true,
            prefer_sink_at_last_use: true,
        }
    }
}

/// Copy diagnostic settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopySettings {
    /// `allow` or `warn`
    pub unnecessary_copy: CopyLint,
    /// Suggest in-place copy assignment when the destination holds a value
    pub suggest_in_place_assignment: bool,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            unnecessary_copy: CopyLint::Warn,
            suggest_in_place_assignment: true,
        }
    }
}

impl AnalysisConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] if the text is not valid TOML,
    /// names an unknown key, or sets an out-of-range value.
    pub fn from_toml_str(source: &str) -> Result<Self, DriverError> {
        Self::parse("analysis.toml", source)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not parse.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read analysis config: {}", path.display()))?;

        Self::parse(&path.display().to_string(), &contents)
            .with_context(|| format!("Failed to parse analysis config: {}", path.display()))
    }

    fn parse(name: &str, source: &str) -> Result<Self, DriverError> {
        let invalid = |message: String, span: Option<SourceSpan>| DriverError::InvalidConfig {
            message,
            span,
            src: NamedSource::new(name, source.to_owned()),
        };

        let config: Self = toml::from_str(source)
            .map_err(|error| invalid(error.message().to_owned(), error.span().map(Into::into)))?;
        if config.dataflow.max_iterations == 0 {
            return Err(invalid(
                "`dataflow.max_iterations` must be at least 1".to_owned(),
                None,
            ));
        }
        Ok(config)
    }

    /// Settings for bundle resolution.
    #[must_use]
    pub fn bundle_config(&self) -> BundleConfig {
        BundleConfig {
            synthesize: self.bundles.synthesize,
            prefer_sink_at_last_use: self.bundles.prefer_sink_at_last_use,
        }
    }

    /// Settings for copy diagnostics.
    #[must_use]
    pub fn copy_config(&self) -> CopyConfig {
        CopyConfig {
            unnecessary_copy: self.copies.unnecessary_copy,
            suggest_in_place_assignment: self.copies.suggest_in_place_assignment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.dataflow.max_iterations, 256);
        assert_eq!(config.bundle_config(), BundleConfig::default());
        assert_eq!(config.copy_config(), CopyConfig::default());
    }

    #[test]
    fn test_partial_sections_override_defaults() {
        let config = AnalysisConfig::from_toml_str(
            "[bundles]\nsynthesize = false\n\n[copies]\nunnecessary_copy = \"allow\"\n",
        )
        .unwrap();
        assert!(!config.bundles.synthesize);
        assert!(config.bundles.prefer_sink_at_last_use);
        assert_eq!(config.copies.unnecessary_copy, CopyLint::Allow);
        assert!(config.copies.suggest_in_place_assignment);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let error = AnalysisConfig::from_toml_str("[dataflow]\nmax_iter = 3\n").unwrap_err();
        let DriverError::InvalidConfig { span, .. } = error else {
            panic!("expected an invalid config error");
        };
        assert!(span.is_some());
    }

    #[test]
    fn test_zero_iterations_is_rejected() {
        let error = AnalysisConfig::from_toml_str("[dataflow]\nmax_iterations = 0\n").unwrap_err();
        assert!(error.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let error = AnalysisConfig::from_file(Path::new("/nonexistent/analysis.toml")).unwrap_err();
        assert!(format!("{error}").contains("/nonexistent/analysis.toml"));
    }
}
