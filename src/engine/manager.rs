//! Long-lived caches of analyzer registrations and descriptors
//!
//! One [`AnalyzerManager`] is shared by every compilation analyzed with the
//! same set of analyzers. It guarantees that `initialize` runs once per
//! analyzer and that `supported_diagnostics` is computed once, however many
//! compilations and threads ask concurrently.
//!
//! In-flight initializations are shared futures: the first caller starts the
//! work and every concurrent caller awaits the same result. A computation that
//! ends in cancellation is evicted so the next caller starts over.

use super::actions::AnalyzerActions;
use super::analyzer::{AnalyzerAndOptions, AnalyzerRef};
use super::compilation_data::CompilationData;
use super::executor::AnalyzerExecutor;
use super::scope::{HostCompilationStartAnalysisScope, HostSessionStartAnalysisScope};
use crate::core::cancellation::OperationCanceled;
use crate::core::localizable::LocalizableString;
use crate::core::options::CompilationOptions;
use crate::core::types::{Diagnostic, DiagnosticDescriptor, ReportDiagnostic};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

type ScopeFuture<T> = Shared<BoxFuture<'static, Result<Arc<T>, OperationCanceled>>>;

/// A scope computation, tagged with the generation that started it
pub(crate) struct CachedScope<T> {
    generation: u64,
    future: ScopeFuture<T>,
}

impl<T> Clone for CachedScope<T> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            future: self.future.clone(),
        }
    }
}

#[derive(Default)]
struct DescriptorEntry {
    descriptors: OnceLock<Arc<[DiagnosticDescriptor]>>,
    /// Exception handlers subscribed on the descriptors' resource strings
    subscriptions: Mutex<Vec<(LocalizableString, u64)>>,
}

/// Caches analyzer state across compilations
#[derive(Default)]
pub struct AnalyzerManager {
    session_scopes: DashMap<AnalyzerRef, CachedScope<HostSessionStartAnalysisScope>>,
    descriptors: DashMap<AnalyzerRef, Arc<DescriptorEntry>>,
    next_generation: AtomicU64,
}

impl AnalyzerManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Registrations made by `analyzer`'s `initialize`, computed once
    pub async fn get_session_scope(
        &self,
        analyzer: &AnalyzerRef,
        executor: &Arc<AnalyzerExecutor>,
    ) -> Result<Arc<HostSessionStartAnalysisScope>, OperationCanceled> {
        get_or_compute(
            &self.session_scopes,
            analyzer.clone(),
            executor,
            || self.next_generation(),
            || {
                log::debug!("initializing analyzer {}", analyzer.name());
                let analyzer = analyzer.clone();
                let executor = executor.clone();
                move || {
                    let mut scope = HostSessionStartAnalysisScope::new();
                    executor.execute_initialize(&analyzer, &mut scope)?;
                    Ok(Arc::new(scope))
                }
            },
        )
        .await
    }

    /// Registrations made by `analyzer`'s compilation-start actions for one compilation
    pub async fn get_compilation_scope(
        &self,
        analyzer: &AnalyzerRef,
        session_scope: Arc<HostSessionStartAnalysisScope>,
        compilation_data: &CompilationData,
        executor: &Arc<AnalyzerExecutor>,
    ) -> Result<Arc<HostCompilationStartAnalysisScope>, OperationCanceled> {
        let key = AnalyzerAndOptions::new(analyzer.clone(), executor.options().as_ref().clone());
        get_or_compute(
            compilation_data.compilation_scopes(),
            key,
            executor,
            || self.next_generation(),
            || {
                log::debug!("running compilation-start actions of {}", analyzer.name());
                let analyzer = analyzer.clone();
                let executor = executor.clone();
                let session_scope = session_scope.clone();
                move || {
                    let actions: Vec<_> = session_scope
                        .compilation_start_actions()
                        .iter()
                        .filter(|a| a.analyzer == analyzer)
                        .cloned()
                        .collect();
                    let mut scope = HostCompilationStartAnalysisScope::new(session_scope);
                    executor.execute_compilation_start_actions(&actions, &mut scope)?;
                    Ok(Arc::new(scope))
                }
            },
        )
        .await
    }

    /// Every action `analyzer` registered that applies to the executor's compilation
    pub async fn get_analyzer_actions(
        &self,
        analyzer: &AnalyzerRef,
        compilation_data: &CompilationData,
        executor: &Arc<AnalyzerExecutor>,
    ) -> Result<AnalyzerActions, OperationCanceled> {
        let session_scope = self.get_session_scope(analyzer, executor).await?;
        if !session_scope.has_compilation_start_actions(analyzer) {
            return Ok(session_scope.get_analyzer_actions(analyzer));
        }

        let compilation_scope = self
            .get_compilation_scope(analyzer, session_scope, compilation_data, executor)
            .await?;
        Ok(compilation_scope.get_analyzer_actions(analyzer))
    }

    /// `analyzer`'s descriptors, computed once
    ///
    /// A faulting `supported_diagnostics` is reported through the executor
    /// and cached as an empty list.
    pub fn get_supported_diagnostics(
        &self,
        analyzer: &AnalyzerRef,
        executor: &AnalyzerExecutor,
    ) -> Arc<[DiagnosticDescriptor]> {
        // Clone the entry out so analyzer code never runs under a map lock
        let entry = self.descriptors.entry(analyzer.clone()).or_default().clone();
        entry
            .descriptors
            .get_or_init(|| {
                let descriptors = executor.execute_supported_diagnostics(analyzer);
                let handler = executor.localizable_error_handler(analyzer);
                let mut subscriptions = entry.subscriptions.lock();
                for descriptor in &descriptors {
                    for string in descriptor.localizable_strings() {
                        if let Some(id) = string.add_exception_handler(handler.clone()) {
                            subscriptions.push((string.clone(), id));
                        }
                    }
                }
                Arc::from(descriptors)
            })
            .clone()
    }

    pub fn is_supported_diagnostic(
        &self,
        analyzer: &AnalyzerRef,
        diagnostic: &Diagnostic,
        executor: &AnalyzerExecutor,
    ) -> bool {
        if executor.is_compiler_analyzer(analyzer) {
            return true;
        }
        self.get_supported_diagnostics(analyzer, executor)
            .iter()
            .any(|d| d.id == diagnostic.id())
    }

    /// Whether every diagnostic `analyzer` can report is turned off by `options`
    ///
    /// Such analyzers are never initialized. The compiler analyzer is never
    /// suppressed, and a non-configurable descriptor that is enabled by
    /// default keeps its analyzer alive regardless of options.
    pub fn is_diagnostic_analyzer_suppressed(
        &self,
        analyzer: &AnalyzerRef,
        options: &CompilationOptions,
        executor: &AnalyzerExecutor,
    ) -> bool {
        if executor.is_compiler_analyzer(analyzer) {
            return false;
        }

        let descriptors = self.get_supported_diagnostics(analyzer, executor);
        for descriptor in descriptors.iter() {
            if descriptor.is_not_configurable() {
                if descriptor.is_enabled_by_default {
                    return false;
                }
                continue;
            }

            let suppressed = match options.specific_option(&descriptor.id) {
                Some(option) => option == ReportDiagnostic::Suppress,
                None => !descriptor.is_enabled_by_default,
            };
            if !suppressed {
                return false;
            }
        }
        true
    }

    /// Whether `initialize` has completed for `analyzer`
    pub fn is_initialized(&self, analyzer: &AnalyzerRef) -> bool {
        self.session_scopes
            .get(analyzer)
            .map(|cached| matches!(cached.future.peek(), Some(Ok(_))))
            .unwrap_or(false)
    }

    /// Forget everything cached for `analyzers`
    ///
    /// Unsubscribes the exception handlers attached to their descriptors'
    /// resource strings; a retired analyzer would otherwise stay reachable
    /// from its own strings.
    pub fn clear_analyzer_state(&self, analyzers: &[AnalyzerRef]) {
        for analyzer in analyzers {
            if let Some((_, entry)) = self.descriptors.remove(analyzer) {
                for (string, id) in entry.subscriptions.lock().drain(..) {
                    string.remove_exception_handler(id);
                }
            }
            self.session_scopes.remove(analyzer);
            log::debug!("cleared cached state of {}", analyzer.name());
        }
    }
}

/// Await the cached computation for `key`, starting it if absent
///
/// `compute` runs on the blocking pool. When the shared computation ends in
/// cancellation its entry is evicted; if the caller's own request is still
/// live the computation is retried once on its behalf.
async fn get_or_compute<K, T, M, W>(
    cache: &DashMap<K, CachedScope<T>>,
    key: K,
    executor: &Arc<AnalyzerExecutor>,
    next_generation: impl Fn() -> u64,
    make_work: M,
) -> Result<Arc<T>, OperationCanceled>
where
    K: Eq + Hash + Clone,
    T: Send + Sync + 'static,
    M: Fn() -> W,
    W: FnOnce() -> Result<Arc<T>, OperationCanceled> + Send + 'static,
{
    let mut retried = false;
    loop {
        let cached = cache
            .entry(key.clone())
            .or_insert_with(|| CachedScope {
                generation: next_generation(),
                future: run_blocking(make_work(), executor).boxed().shared(),
            })
            .clone();

        match cached.future.await {
            Ok(scope) => return Ok(scope),
            Err(canceled) => {
                cache.remove_if(&key, |_, entry| entry.generation == cached.generation);
                let own = executor.cancellation_token();
                if own.is_cancellation_requested() || canceled.token_id == own.id() {
                    return Err(own.error());
                }
                if retried {
                    log::debug!("shared computation was cancelled again by another request");
                    return Err(canceled);
                }
                retried = true;
                log::debug!("shared computation was cancelled by another request, retrying");
            }
        }
    }
}

fn run_blocking<T, W>(
    work: W,
    executor: &Arc<AnalyzerExecutor>,
) -> impl Future<Output = Result<Arc<T>, OperationCanceled>> + Send + 'static
where
    T: Send + Sync + 'static,
    W: FnOnce() -> Result<Arc<T>, OperationCanceled> + Send + 'static,
{
    let token = executor.cancellation_token().clone();
    async move {
        tokio::task::spawn_blocking(work)
            .await
            .unwrap_or_else(|_| Err(token.error()))
    }
}
