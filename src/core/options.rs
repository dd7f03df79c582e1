//! Compilation and analyzer options

use super::types::{Diagnostic, DiagnosticSeverity, ReportDiagnostic};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Diagnostic configuration of a compilation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilationOptions {
    /// Applied to every diagnostic without a specific option
    pub general_diagnostic_option: ReportDiagnostic,

    /// Per-id overrides
    pub specific_diagnostic_options: HashMap<String, ReportDiagnostic>,

    /// Id patterns that are disabled (`"CA*"` matches by prefix)
    pub disabled_patterns: Vec<String>,

    /// Keep suppressed diagnostics, flagged, instead of dropping them
    pub report_suppressed_diagnostics: bool,
}

impl CompilationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_general_option(mut self, option: ReportDiagnostic) -> Self {
        self.general_diagnostic_option = option;
        self
    }

    pub fn with_specific_option(mut self, id: impl Into<String>, option: ReportDiagnostic) -> Self {
        self.specific_diagnostic_options.insert(id.into(), option);
        self
    }

    pub fn with_disabled_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.disabled_patterns.push(pattern.into());
        self
    }

    pub fn with_report_suppressed_diagnostics(mut self, report: bool) -> Self {
        self.report_suppressed_diagnostics = report;
        self
    }

    /// The option configured for `id`, counting disabled patterns as `Suppress`
    pub fn specific_option(&self, id: &str) -> Option<ReportDiagnostic> {
        if let Some(option) = self.specific_diagnostic_options.get(id) {
            return Some(*option);
        }
        if self.disabled_patterns.iter().any(|p| matches_pattern(id, p)) {
            return Some(ReportDiagnostic::Suppress);
        }
        None
    }

    /// Apply the options to a diagnostic
    ///
    /// Returns `None` when the diagnostic must not be reported, otherwise the
    /// diagnostic with its effective severity.
    pub fn filter(&self, diagnostic: Diagnostic) -> Option<Diagnostic> {
        let descriptor = diagnostic.descriptor.clone();
        if descriptor.is_not_configurable() {
            return Some(diagnostic);
        }

        if let Some(option) = self.specific_option(diagnostic.id()) {
            return match option {
                ReportDiagnostic::Suppress => None,
                ReportDiagnostic::Default if !descriptor.is_enabled_by_default => None,
                ReportDiagnostic::Default => Some(diagnostic),
                other => other
                    .to_severity()
                    .map(|severity| diagnostic.with_severity(severity)),
            };
        }

        if !descriptor.is_enabled_by_default {
            return None;
        }

        if diagnostic.severity == DiagnosticSeverity::Error {
            return Some(diagnostic);
        }

        match self.general_diagnostic_option {
            ReportDiagnostic::Suppress => None,
            ReportDiagnostic::Error if diagnostic.severity == DiagnosticSeverity::Warning => {
                Some(diagnostic.with_severity(DiagnosticSeverity::Error))
            }
            _ => Some(diagnostic),
        }
    }
}

/// Check an id against a pattern; a trailing `*` matches any suffix
pub fn matches_pattern(id: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => id.starts_with(prefix),
        None => id == pattern,
    }
}

/// Options handed to analyzers
///
/// Compared by value: two compilations with equal options share one
/// compilation-scope registration per analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerOptions {
    /// Paths of non-source files available to analyzers
    pub additional_files: Vec<String>,

    /// Free-form key/value settings
    pub properties: BTreeMap<String, String>,
}

impl AnalyzerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_additional_file(mut self, path: impl Into<String>) -> Self {
        self.additional_files.push(path.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
