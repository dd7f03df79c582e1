//! Core types shared by the engine: spans, locations, severities, descriptors, diagnostics

use super::localizable::LocalizableString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Half-open character range `[start, end)` in a source unit
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    /// Create a span; `end` is clamped so it never precedes `start`
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `position` lies inside the span
    pub fn contains(&self, position: usize) -> bool {
        position >= self.start && position < self.end
    }

    pub fn contains_span(&self, other: TextSpan) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Whether the spans share at least one position
    pub fn overlaps_with(&self, other: TextSpan) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    /// Like [`overlaps_with`](Self::overlaps_with), but touching spans also intersect
    pub fn intersects_with(&self, other: TextSpan) -> bool {
        other.start <= self.end && other.end >= self.start
    }
}

impl fmt::Display for TextSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}

/// Where a diagnostic was reported
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Location {
    /// Not tied to any source position
    #[default]
    None,
    /// A span inside the source unit identified by `path`
    Source { path: Arc<str>, span: TextSpan },
}

impl Location {
    pub fn source(path: impl Into<Arc<str>>, span: TextSpan) -> Self {
        Location::Source {
            path: path.into(),
            span,
        }
    }

    pub fn is_in_source(&self) -> bool {
        matches!(self, Location::Source { .. })
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Location::Source { path, .. } => Some(path),
            Location::None => None,
        }
    }

    pub fn span(&self) -> Option<TextSpan> {
        match self {
            Location::Source { span, .. } => Some(*span),
            Location::None => None,
        }
    }
}

/// Diagnostic severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Not surfaced to users, visible to tooling only
    Hidden,
    Info,
    #[default]
    Warning,
    Error,
}

impl DiagnosticSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticSeverity::Hidden => "hidden",
            DiagnosticSeverity::Info => "info",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Error => "error",
        }
    }

    /// Warning level a diagnostic of this severity is reported at
    pub fn default_warning_level(self) -> u8 {
        match self {
            DiagnosticSeverity::Error => 0,
            DiagnosticSeverity::Warning => 1,
            DiagnosticSeverity::Info | DiagnosticSeverity::Hidden => 4,
        }
    }
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DiagnosticSeverity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hidden" => Ok(DiagnosticSeverity::Hidden),
            "info" | "note" => Ok(DiagnosticSeverity::Info),
            "warning" | "warn" => Ok(DiagnosticSeverity::Warning),
            "error" => Ok(DiagnosticSeverity::Error),
            _ => Err(()),
        }
    }
}

/// How a diagnostic id is configured by compilation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportDiagnostic {
    /// Use the descriptor's own severity and enabled state
    #[default]
    Default,
    Error,
    Warn,
    Info,
    Hidden,
    /// Do not report at all
    Suppress,
}

impl ReportDiagnostic {
    /// The severity this option rewrites a diagnostic to, if any
    pub fn to_severity(self) -> Option<DiagnosticSeverity> {
        match self {
            ReportDiagnostic::Error => Some(DiagnosticSeverity::Error),
            ReportDiagnostic::Warn => Some(DiagnosticSeverity::Warning),
            ReportDiagnostic::Info => Some(DiagnosticSeverity::Info),
            ReportDiagnostic::Hidden => Some(DiagnosticSeverity::Hidden),
            ReportDiagnostic::Default | ReportDiagnostic::Suppress => None,
        }
    }
}

/// Custom tags with engine-level meaning
pub mod well_known_tags {
    /// Diagnostics that compilation options cannot reconfigure
    pub const NOT_CONFIGURABLE: &str = "NotConfigurable";
    /// Diagnostics produced by the compiler itself
    pub const COMPILER: &str = "Compiler";
    /// Diagnostics describing an analyzer failure
    pub const ANALYZER_EXCEPTION: &str = "AnalyzerException";
}

/// Static description of a diagnostic an analyzer may produce
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticDescriptor {
    pub id: String,
    pub title: LocalizableString,
    /// Message with `{0}`, `{1}`... placeholders
    pub message_format: LocalizableString,
    pub category: String,
    pub default_severity: DiagnosticSeverity,
    pub is_enabled_by_default: bool,
    pub description: LocalizableString,
    pub custom_tags: Vec<String>,
}

impl DiagnosticDescriptor {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<LocalizableString>,
        message_format: impl Into<LocalizableString>,
        category: impl Into<String>,
        default_severity: DiagnosticSeverity,
        is_enabled_by_default: bool,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message_format: message_format.into(),
            category: category.into(),
            default_severity,
            is_enabled_by_default,
            description: LocalizableString::default(),
            custom_tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<LocalizableString>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_custom_tag(mut self, tag: impl Into<String>) -> Self {
        self.custom_tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.custom_tags.iter().any(|t| t == tag)
    }

    pub fn is_not_configurable(&self) -> bool {
        self.has_tag(well_known_tags::NOT_CONFIGURABLE)
    }

    /// Every localizable string carried by the descriptor
    pub fn localizable_strings(&self) -> [&LocalizableString; 3] {
        [&self.title, &self.message_format, &self.description]
    }
}

/// A reported diagnostic
///
/// The engine filters on [`id`](Self::id) and [`location`](Self::location)
/// only; the message is carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub descriptor: Arc<DiagnosticDescriptor>,
    pub severity: DiagnosticSeverity,
    pub location: Location,
    pub message: String,
    pub warning_level: u8,
    /// Set when the diagnostic is kept despite a matching suppression
    pub is_suppressed: bool,
}

impl Diagnostic {
    /// Create a diagnostic whose message takes no arguments
    pub fn new(descriptor: &Arc<DiagnosticDescriptor>, location: Location) -> Self {
        Self::create::<&str>(descriptor, location, &[])
    }

    /// Create a diagnostic, substituting `args` into the descriptor's message format
    pub fn create<A: fmt::Display>(
        descriptor: &Arc<DiagnosticDescriptor>,
        location: Location,
        args: &[A],
    ) -> Self {
        let mut message = descriptor.message_format.to_string();
        for (index, arg) in args.iter().enumerate() {
            message = message.replace(&format!("{{{}}}", index), &arg.to_string());
        }

        Self {
            descriptor: descriptor.clone(),
            severity: descriptor.default_severity,
            location,
            message,
            warning_level: descriptor.default_severity.default_warning_level(),
            is_suppressed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn with_severity(mut self, severity: DiagnosticSeverity) -> Self {
        self.severity = severity;
        self.warning_level = severity.default_warning_level();
        self
    }

    pub fn with_suppressed(mut self, suppressed: bool) -> Self {
        self.is_suppressed = suppressed;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Location::Source { path, span } => write!(
                f,
                "{}{}: {} {}: {}",
                path,
                span,
                self.severity,
                self.id(),
                self.message
            ),
            Location::None => write!(f, "{} {}: {}", self.severity, self.id(), self.message),
        }
    }
}
