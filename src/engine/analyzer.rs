//! The analyzer plug-in surface

use super::context::AnalysisContext;
use crate::core::options::AnalyzerOptions;
use crate::core::types::DiagnosticDescriptor;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// A pluggable unit of diagnostic logic
///
/// Analyzers are untrusted: any method may fail, panic, or run long, and the
/// engine contains all of that. `initialize` is called at most once per
/// analyzer instance for the life of an [`AnalyzerManager`](super::manager::AnalyzerManager).
pub trait DiagnosticAnalyzer: Send + Sync {
    /// Name used in logs and fault diagnostics
    fn name(&self) -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }

    /// Every diagnostic this analyzer may ever report
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor>;

    /// Register actions against `context`
    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()>;
}

/// Shared handle to an analyzer, compared by identity
#[derive(Clone)]
pub struct AnalyzerRef(Arc<dyn DiagnosticAnalyzer>);

impl AnalyzerRef {
    pub fn new<A: DiagnosticAnalyzer + 'static>(analyzer: A) -> Self {
        AnalyzerRef(Arc::new(analyzer))
    }

    pub fn from_arc(analyzer: Arc<dyn DiagnosticAnalyzer>) -> Self {
        AnalyzerRef(analyzer)
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Deref for AnalyzerRef {
    type Target = dyn DiagnosticAnalyzer;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for AnalyzerRef {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for AnalyzerRef {}

impl Hash for AnalyzerRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for AnalyzerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnalyzerRef({})", self.name())
    }
}

/// An analyzer together with the options it runs with
///
/// Keys the compilation-scope cache: the same analyzer may be configured
/// differently across compilations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalyzerAndOptions {
    pub analyzer: AnalyzerRef,
    pub options: AnalyzerOptions,
}

impl AnalyzerAndOptions {
    pub fn new(analyzer: AnalyzerRef, options: AnalyzerOptions) -> Self {
        Self { analyzer, options }
    }
}
