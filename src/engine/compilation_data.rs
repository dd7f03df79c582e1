//! Per-compilation analysis state
//!
//! Everything cached for one compilation lives here and is released with it:
//! the suppression state and the compilation-scope registrations of every
//! analyzer that has compilation-start actions.

use super::analyzer::AnalyzerAndOptions;
use super::manager::CachedScope;
use super::scope::HostCompilationStartAnalysisScope;
use crate::core::suppression::SuppressMessageAttributeState;
use crate::model::CompilationRef;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

pub struct CompilationData {
    compilation: CompilationRef,
    suppression: Arc<SuppressMessageAttributeState>,
    compilation_scopes: DashMap<AnalyzerAndOptions, CachedScope<HostCompilationStartAnalysisScope>>,
}

impl CompilationData {
    pub fn new(compilation: CompilationRef) -> Self {
        Self {
            suppression: Arc::new(SuppressMessageAttributeState::new(compilation.clone())),
            compilation,
            compilation_scopes: DashMap::new(),
        }
    }

    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }

    pub fn suppression_state(&self) -> &Arc<SuppressMessageAttributeState> {
        &self.suppression
    }

    pub(crate) fn compilation_scopes(
        &self,
    ) -> &DashMap<AnalyzerAndOptions, CachedScope<HostCompilationStartAnalysisScope>> {
        &self.compilation_scopes
    }

    /// Number of analyzers with a cached compilation scope
    pub fn cached_scope_count(&self) -> usize {
        self.compilation_scopes.len()
    }
}

impl fmt::Debug for CompilationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationData")
            .field("compilation", &self.compilation.id())
            .field("cached_scopes", &self.compilation_scopes.len())
            .finish()
    }
}
