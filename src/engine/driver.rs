//! The analyzer driver
//!
//! An [`AnalyzerDriver`] consumes the compilation events produced by a front
//! end and dispatches them to the actions registered by a fixed set of
//! analyzers:
//!
//! 1. The first event must be `CompilationStarted`. The driver then decides
//!    which analyzers are worth running, fetches their actions, and indexes
//!    them by what they subscribe to.
//! 2. Syntax-tree actions start immediately, one task per tree.
//! 3. A pool of workers drains the event queue. Declarations fan out to
//!    symbol, syntax-node, and code-block actions; completed units fan out to
//!    semantic-model actions.
//! 4. `CompilationCompleted` is handled last: once every worker and tree task
//!    has finished, compilation-end actions run and the diagnostic queue is
//!    completed.
//!
//! Diagnostics are retrieved with [`AnalyzerDriver::get_diagnostics`], which
//! applies the compilation's options and source suppressions.

use super::actions::*;
use super::analyzer::AnalyzerRef;
use super::compilation_data::CompilationData;
use super::context::DiagnosticSink;
use super::events::{CompilationEvent, CompilationUnitCompletedEvent, SymbolDeclaredEvent};
use super::executor::{
    create_driver_exception_diagnostic, default_exception_handler, AnalyzerExceptionHandler,
    AnalyzerExecutor, AnalyzerTiming, FaultCause,
};
use super::manager::AnalyzerManager;
use crate::core::cancellation::{CancellationToken, OperationCanceled};
use crate::core::options::AnalyzerOptions;
use crate::core::queue::{AsyncQueue, DequeueError, QueueError};
use crate::core::suppression::SuppressMessageAttributeState;
use crate::core::types::Diagnostic;
use crate::model::{
    descendant_nodes_and_self_where, CompilationRef, SemanticModelRef, SymbolKind, SymbolRef,
    SyntaxNode, SyntaxNodeRef,
};
use futures::future::join_all;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Symbol kinds above this value are ignored when indexing symbol actions
pub const MAX_SYMBOL_KIND: u16 = 100;

/// Maps a syntax node to the host language's kind
pub type SyntaxKindClassifier<K> = Arc<dyn Fn(&dyn SyntaxNode) -> K + Send + Sync>;

/// Classifier using the node's raw kind value
pub fn raw_kind_classifier() -> SyntaxKindClassifier<u16> {
    Arc::new(|node: &dyn SyntaxNode| node.raw_kind())
}

/// Errors that terminate a driver run
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error(transparent)]
    Cancelled(#[from] OperationCanceled),

    #[error("event queue faulted: {0}")]
    EventQueueFaulted(Arc<anyhow::Error>),

    #[error("failed to enqueue compilation event: {0}")]
    Queue(#[from] QueueError),

    #[error("analyzer driver worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl DriverError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DriverError::Cancelled(_))
    }
}

/// Driver behavior settings
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Number of event workers (0 = one per CPU)
    pub worker_count: usize,
    /// Run the actions triggered by one event concurrently
    pub concurrent_analysis: bool,
    /// Record and log per-analyzer execution time
    pub log_analyzer_execution_time: bool,
    /// Names of analyzers whose callbacks must never run concurrently
    pub non_thread_safe_analyzers: Vec<String>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            worker_count: 0,
            concurrent_analysis: true,
            log_analyzer_execution_time: false,
            non_thread_safe_analyzers: Vec::new(),
        }
    }
}

impl DriverOptions {
    pub fn effective_worker_count(&self) -> usize {
        if !self.concurrent_analysis {
            1
        } else if self.worker_count == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_count
        }
    }
}

type Unit = Box<dyn FnOnce() -> Result<(), OperationCanceled> + Send>;

/// One analyzer's actions that run per declaration
struct DeclarationActions<K> {
    code_block_start_actions: Vec<CodeBlockStartAction<K>>,
    code_block_actions: Vec<CodeBlockAction>,
    syntax_node_actions_by_kind: HashMap<K, Vec<SyntaxNodeAction<K>>>,
}

impl<K> DeclarationActions<K> {
    fn has_code_block_actions(&self) -> bool {
        !self.code_block_start_actions.is_empty() || !self.code_block_actions.is_empty()
    }

    fn is_empty(&self) -> bool {
        !self.has_code_block_actions() && self.syntax_node_actions_by_kind.is_empty()
    }
}

/// Everything the driver derives from the `CompilationStarted` event
struct DriverState<K> {
    compilation_data: Arc<CompilationData>,
    executor: Arc<AnalyzerExecutor>,
    action_counts: HashMap<AnalyzerRef, AnalyzerActionCounts>,
    symbol_actions_by_kind: Vec<Vec<SymbolAction>>,
    semantic_model_actions: Vec<SemanticModelAction>,
    syntax_tree_actions: Vec<SyntaxTreeAction>,
    compilation_end_actions: Vec<CompilationEndAction>,
    declaration_actions: Vec<Arc<DeclarationActions<K>>>,
}

impl<K: SyntaxKind> DriverState<K> {
    fn build(
        compilation_data: Arc<CompilationData>,
        executor: Arc<AnalyzerExecutor>,
        analyzer_actions: Vec<(AnalyzerRef, AnalyzerActions)>,
    ) -> Self {
        let mut symbol_actions_by_kind: Vec<Vec<SymbolAction>> = Vec::new();
        let mut semantic_model_actions = Vec::new();
        let mut syntax_tree_actions = Vec::new();
        let mut compilation_end_actions = Vec::new();
        let mut declaration_actions = Vec::new();

        for (analyzer, actions) in &analyzer_actions {
            for action in actions.symbol_actions() {
                let mut kinds = action.kinds.clone();
                kinds.sort();
                kinds.dedup();
                for kind in kinds {
                    if kind.0 > MAX_SYMBOL_KIND {
                        log::warn!(
                            "ignoring symbol action of {} registered for unsupported kind {}",
                            analyzer.name(),
                            kind
                        );
                        continue;
                    }
                    let index = kind.as_index();
                    if symbol_actions_by_kind.len() <= index {
                        symbol_actions_by_kind.resize_with(index + 1, Vec::new);
                    }
                    symbol_actions_by_kind[index].push(action.clone());
                }
            }

            semantic_model_actions.extend_from_slice(actions.semantic_model_actions());
            syntax_tree_actions.extend_from_slice(actions.syntax_tree_actions());
            compilation_end_actions.extend_from_slice(actions.compilation_end_actions());

            let declaration = DeclarationActions {
                code_block_start_actions: actions.code_block_start_actions::<K>(),
                code_block_actions: actions.code_block_actions().to_vec(),
                syntax_node_actions_by_kind: get_node_actions_by_kind(&actions.syntax_node_actions::<K>()),
            };
            if !declaration.is_empty() {
                declaration_actions.push(Arc::new(declaration));
            }
        }

        let action_counts = analyzer_actions
            .iter()
            .map(|(analyzer, actions)| (analyzer.clone(), actions.counts()))
            .collect();

        Self {
            compilation_data,
            executor,
            action_counts,
            symbol_actions_by_kind,
            semantic_model_actions,
            syntax_tree_actions,
            compilation_end_actions,
            declaration_actions,
        }
    }
}

/// Builder for [`AnalyzerDriver`]
pub struct AnalyzerDriverBuilder<K> {
    analyzers: Vec<AnalyzerRef>,
    get_kind: SyntaxKindClassifier<K>,
    manager: Arc<AnalyzerManager>,
    options: DriverOptions,
    analyzer_options: AnalyzerOptions,
    compiler_analyzer: Option<AnalyzerRef>,
    non_thread_safe: Vec<AnalyzerRef>,
    on_analyzer_exception: Option<AnalyzerExceptionHandler>,
    cancellation_token: Option<CancellationToken>,
}

impl<K: SyntaxKind> AnalyzerDriverBuilder<K> {
    pub fn options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn analyzer_options(mut self, options: AnalyzerOptions) -> Self {
        self.analyzer_options = options;
        self
    }

    /// The analyzer that reports the front end's own diagnostics
    pub fn compiler_analyzer(mut self, analyzer: AnalyzerRef) -> Self {
        self.compiler_analyzer = Some(analyzer);
        self
    }

    /// Never run two callbacks of `analyzer` at the same time
    pub fn non_thread_safe(mut self, analyzer: AnalyzerRef) -> Self {
        self.non_thread_safe.push(analyzer);
        self
    }

    /// Receive analyzer faults instead of having them reported as diagnostics
    pub fn on_analyzer_exception(mut self, handler: AnalyzerExceptionHandler) -> Self {
        self.on_analyzer_exception = Some(handler);
        self
    }

    /// Cancel the driver whenever `token` is cancelled
    pub fn cancellation_token(mut self, token: &CancellationToken) -> Self {
        self.cancellation_token = Some(token.clone());
        self
    }

    pub fn build(self) -> AnalyzerDriver<K> {
        let cancellation = match &self.cancellation_token {
            Some(token) => token.child_token(),
            None => CancellationToken::new(),
        };

        let event_queue = Arc::new(AsyncQueue::new());
        let queue = event_queue.clone();
        cancellation.register(move || {
            queue.try_complete();
        });

        AnalyzerDriver {
            inner: Arc::new(DriverInner {
                analyzers: self.analyzers,
                manager: self.manager,
                get_kind: self.get_kind,
                options: self.options,
                analyzer_options: Arc::new(self.analyzer_options),
                compiler_analyzer: self.compiler_analyzer,
                non_thread_safe: self.non_thread_safe,
                on_analyzer_exception: self.on_analyzer_exception,
                event_queue,
                diagnostic_queue: Arc::new(AsyncQueue::new()),
                cancellation,
                state: OnceLock::new(),
            }),
        }
    }
}

/// Drives analyzers over the events of one compilation
///
/// Dropping the driver cancels any work still in flight.
pub struct AnalyzerDriver<K: SyntaxKind> {
    inner: Arc<DriverInner<K>>,
}

impl<K: SyntaxKind> AnalyzerDriver<K> {
    pub fn builder(
        analyzers: Vec<AnalyzerRef>,
        get_kind: SyntaxKindClassifier<K>,
        manager: Arc<AnalyzerManager>,
    ) -> AnalyzerDriverBuilder<K> {
        AnalyzerDriverBuilder {
            analyzers,
            get_kind,
            manager,
            options: DriverOptions::default(),
            analyzer_options: AnalyzerOptions::new(),
            compiler_analyzer: None,
            non_thread_safe: Vec::new(),
            on_analyzer_exception: None,
            cancellation_token: None,
        }
    }

    /// Queue the front end feeds compilation events into
    pub fn event_queue(&self) -> &Arc<AsyncQueue<CompilationEvent>> {
        &self.inner.event_queue
    }

    /// Queue receiving every reported diagnostic, unfiltered
    pub fn diagnostic_queue(&self) -> &Arc<AsyncQueue<Diagnostic>> {
        &self.inner.diagnostic_queue
    }

    /// The driver's own token, cancelled by [`dispose`](Self::dispose)
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    /// Process events until the compilation completes
    pub async fn run(&self) -> Result<(), DriverError> {
        self.inner.clone().run().await
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn start(&self) -> JoinHandle<Result<(), DriverError>> {
        tokio::spawn(self.inner.clone().run())
    }

    /// Drain reported diagnostics, applying compilation options and source suppressions
    pub fn get_diagnostics(&self) -> Vec<Diagnostic> {
        let diagnostics = self.inner.diagnostic_queue.drain();
        match self.inner.state.get() {
            Some(state) => filter_diagnostics(
                diagnostics,
                state.compilation_data.compilation(),
                state.compilation_data.suppression_state(),
            ),
            None => diagnostics,
        }
    }

    /// Action counts of `analyzer`, once the driver has initialized
    ///
    /// `None` if the driver has not started or the analyzer was skipped
    /// because all of its diagnostics are suppressed.
    pub fn analyzer_action_counts(&self, analyzer: &AnalyzerRef) -> Option<AnalyzerActionCounts> {
        self.inner
            .state
            .get()
            .and_then(|state| state.action_counts.get(analyzer).copied())
    }

    pub fn analyzer_timings(&self) -> Vec<AnalyzerTiming> {
        self.inner
            .state
            .get()
            .map(|state| state.executor.analyzer_timings())
            .unwrap_or_default()
    }

    pub fn compilation_data(&self) -> Option<&Arc<CompilationData>> {
        self.inner.state.get().map(|state| &state.compilation_data)
    }

    /// Cancel in-flight work and complete the event queue
    pub fn dispose(&self) {
        self.inner.cancellation.cancel();
    }
}

impl<K: SyntaxKind> Drop for AnalyzerDriver<K> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Keep diagnostics that survive `compilation`'s options and source suppressions
///
/// Suppressed diagnostics are kept, marked as suppressed, when the options
/// ask for suppressed diagnostics to be reported.
pub fn filter_diagnostics(
    diagnostics: Vec<Diagnostic>,
    compilation: &CompilationRef,
    suppression: &SuppressMessageAttributeState,
) -> Vec<Diagnostic> {
    let report_suppressed = compilation.options().report_suppressed_diagnostics;
    diagnostics
        .into_par_iter()
        .filter_map(|diagnostic| {
            let diagnostic = compilation.filter_diagnostic(diagnostic)?;
            if suppression.is_diagnostic_syntactically_suppressed(diagnostic.id(), &diagnostic.location) {
                return report_suppressed.then(|| diagnostic.with_suppressed(true));
            }
            Some(diagnostic)
        })
        .collect()
}

struct DriverInner<K> {
    analyzers: Vec<AnalyzerRef>,
    manager: Arc<AnalyzerManager>,
    get_kind: SyntaxKindClassifier<K>,
    options: DriverOptions,
    analyzer_options: Arc<AnalyzerOptions>,
    compiler_analyzer: Option<AnalyzerRef>,
    non_thread_safe: Vec<AnalyzerRef>,
    on_analyzer_exception: Option<AnalyzerExceptionHandler>,
    event_queue: Arc<AsyncQueue<CompilationEvent>>,
    diagnostic_queue: Arc<AsyncQueue<Diagnostic>>,
    cancellation: CancellationToken,
    state: OnceLock<Arc<DriverState<K>>>,
}

impl<K: SyntaxKind> DriverInner<K> {
    async fn run(self: Arc<Self>) -> Result<(), DriverError> {
        let result = self.clone().run_core().await;
        match &result {
            Ok(()) => log::debug!("analyzer driver completed"),
            Err(DriverError::Cancelled(_)) => log::debug!("analyzer driver cancelled"),
            Err(err) => log::error!("analyzer driver failed: {}", err),
        }

        if self.options.log_analyzer_execution_time {
            if let Some(state) = self.state.get() {
                for timing in state.executor.analyzer_timings() {
                    log::info!(
                        "{}: {:?} total, {} invocations, {:?} average",
                        timing.analyzer,
                        timing.total_time,
                        timing.invocation_count,
                        timing.avg_time()
                    );
                }
            }
        }

        self.diagnostic_queue.try_complete();
        result
    }

    async fn run_core(self: Arc<Self>) -> Result<(), DriverError> {
        let started = match self.next_event().await? {
            Some(CompilationEvent::CompilationStarted(event)) => event,
            Some(other) => {
                return Err(self.protocol_violation(format!(
                    "expected CompilationStarted as the first event, got {}",
                    other.kind_name()
                )))
            }
            None => return Ok(()),
        };

        let state = self.initialize(started.compilation().clone()).await?;
        let _ = self.state.set(state.clone());

        let tree_tasks = self.spawn_syntax_tree_actions(&state);
        let worker_count = self.options.effective_worker_count();
        log::debug!(
            "analyzing with {} analyzers on {} workers",
            state.action_counts.len(),
            worker_count
        );
        let workers: Vec<_> = (0..worker_count)
            .map(|_| tokio::spawn(self.clone().worker(state.clone())))
            .collect();

        let worker_results = join_all(workers).await;
        let tree_results = join_all(tree_tasks).await;

        let mut completed = false;
        let mut failure: Option<DriverError> = None;
        for result in worker_results {
            match result {
                Ok(Ok(saw_completed)) => completed |= saw_completed,
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(join_error) => {
                    let err = self.worker_panicked(join_error);
                    failure.get_or_insert(err);
                }
            }
        }
        for result in tree_results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(canceled)) => {
                    failure.get_or_insert(canceled.into());
                }
                Err(join_error) => {
                    let err = self.worker_panicked(join_error);
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        self.cancellation.check()?;
        if completed {
            self.run_compilation_end_actions(&state).await?;
        }
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<CompilationEvent>, DriverError> {
        match self.event_queue.dequeue().await {
            Ok(event) => Ok(Some(event)),
            Err(DequeueError::Cancelled) => {
                self.cancellation.check()?;
                Ok(None)
            }
            Err(DequeueError::Faulted(cause)) => Err(DriverError::EventQueueFaulted(cause)),
        }
    }

    fn protocol_violation(&self, message: String) -> DriverError {
        let discarded = self.event_queue.drain().len();
        self.event_queue.try_complete();
        self.diagnostic_queue.try_complete();
        log::error!("{} ({} pending events discarded)", message, discarded);
        DriverError::ProtocolViolation(message)
    }

    fn worker_panicked(&self, error: tokio::task::JoinError) -> DriverError {
        let message = if error.is_panic() {
            FaultCause::from_panic(error.into_panic().as_ref())
                .message()
                .to_string()
        } else {
            error.to_string()
        };
        let _ = self
            .diagnostic_queue
            .enqueue(create_driver_exception_diagnostic(&message));
        DriverError::WorkerPanicked(message)
    }

    fn create_executor(&self, compilation_data: &CompilationData) -> AnalyzerExecutor {
        let queue = self.diagnostic_queue.clone();
        let sink: DiagnosticSink = Arc::new(move |diagnostic| {
            if queue.enqueue(diagnostic).is_err() {
                log::warn!("dropped a diagnostic reported after the driver completed");
            }
        });
        let on_exception = self
            .on_analyzer_exception
            .clone()
            .unwrap_or_else(|| default_exception_handler(sink.clone()));

        let mut executor = AnalyzerExecutor::new(
            compilation_data.compilation().clone(),
            self.analyzer_options.clone(),
            sink,
            on_exception,
            self.manager.clone(),
            self.cancellation.clone(),
        )
        .with_suppression_state(compilation_data.suppression_state().clone())
        .with_execution_timing(self.options.log_analyzer_execution_time);

        if let Some(compiler) = &self.compiler_analyzer {
            executor = executor.with_compiler_analyzer(compiler.clone());
        }
        for analyzer in &self.analyzers {
            let by_name = self
                .options
                .non_thread_safe_analyzers
                .iter()
                .any(|name| *name == analyzer.name());
            if by_name || self.non_thread_safe.contains(analyzer) {
                executor = executor.with_non_thread_safe_analyzer(analyzer.clone());
            }
        }
        executor
    }

    async fn initialize(&self, compilation: CompilationRef) -> Result<Arc<DriverState<K>>, DriverError> {
        let compilation_data = Arc::new(CompilationData::new(compilation.clone()));
        let executor = Arc::new(self.create_executor(&compilation_data));
        let compilation_options = Arc::new(compilation.options().clone());

        let pending = self.analyzers.iter().map(|analyzer| {
            let analyzer = analyzer.clone();
            let manager = self.manager.clone();
            let executor = executor.clone();
            let compilation_data = compilation_data.clone();
            let compilation_options = compilation_options.clone();
            async move {
                let suppressed = {
                    let analyzer = analyzer.clone();
                    let manager = manager.clone();
                    let executor = executor.clone();
                    tokio::task::spawn_blocking(move || {
                        manager.is_diagnostic_analyzer_suppressed(&analyzer, &compilation_options, &executor)
                    })
                    .await
                    .unwrap_or(false)
                };
                if suppressed {
                    log::debug!(
                        "skipping analyzer {}: all of its diagnostics are suppressed",
                        analyzer.name()
                    );
                    return Ok(None);
                }

                let actions = manager
                    .get_analyzer_actions(&analyzer, &compilation_data, &executor)
                    .await?;
                Ok::<_, OperationCanceled>(Some((analyzer, actions)))
            }
        });

        let mut analyzer_actions = Vec::new();
        for result in join_all(pending).await {
            if let Some(entry) = result? {
                analyzer_actions.push(entry);
            }
        }

        Ok(Arc::new(DriverState::build(
            compilation_data,
            executor,
            analyzer_actions,
        )))
    }

    fn spawn_syntax_tree_actions(
        &self,
        state: &Arc<DriverState<K>>,
    ) -> Vec<JoinHandle<Result<(), OperationCanceled>>> {
        if state.syntax_tree_actions.is_empty() {
            return Vec::new();
        }

        state
            .compilation_data
            .compilation()
            .syntax_trees()
            .into_iter()
            .map(|tree| {
                let state = state.clone();
                tokio::task::spawn_blocking(move || {
                    for action in &state.syntax_tree_actions {
                        state.executor.execute_syntax_tree_action(action, &tree)?;
                    }
                    Ok::<(), OperationCanceled>(())
                })
            })
            .collect()
    }

    /// Returns whether this worker saw `CompilationCompleted`
    async fn worker(self: Arc<Self>, state: Arc<DriverState<K>>) -> Result<bool, DriverError> {
        log::trace!("event worker started");
        let result = self.process_events(&state).await;
        log::trace!("event worker stopped");
        if result.is_err() {
            // Release the other workers
            self.event_queue.try_complete();
        }
        result
    }

    async fn process_events(&self, state: &Arc<DriverState<K>>) -> Result<bool, DriverError> {
        let mut saw_completed = false;
        while let Some(event) = self.next_event().await? {
            match event {
                CompilationEvent::SymbolDeclared(event) => {
                    self.process_symbol_declared(state, &event).await?;
                }
                CompilationEvent::CompilationUnitCompleted(event) => {
                    self.process_compilation_unit_completed(state, &event).await?;
                }
                CompilationEvent::CompilationCompleted(_) => {
                    log::debug!("compilation completed");
                    saw_completed = true;
                    self.event_queue.try_complete();
                }
                CompilationEvent::CompilationStarted(_) => {
                    return Err(self.protocol_violation(
                        "CompilationStarted received more than once".to_string(),
                    ));
                }
            }
        }
        Ok(saw_completed)
    }

    async fn process_symbol_declared(
        &self,
        state: &Arc<DriverState<K>>,
        event: &Arc<SymbolDeclaredEvent>,
    ) -> Result<(), DriverError> {
        let result = self.analyze_symbol(state, event).await;
        event.flush_cache();
        result
    }

    async fn analyze_symbol(
        &self,
        state: &Arc<DriverState<K>>,
        event: &Arc<SymbolDeclaredEvent>,
    ) -> Result<(), DriverError> {
        let symbol = event.symbol();
        if is_redundant_declaration(event) {
            log::trace!("skipping secondary declaration of {}", symbol.name());
            return Ok(());
        }

        let mut units: Vec<Unit> = Vec::new();
        if let Some(actions) = state.symbol_actions_by_kind.get(symbol.kind().as_index()) {
            for action in actions {
                let executor = state.executor.clone();
                let action = action.clone();
                let symbol = symbol.clone();
                units.push(Box::new(move || executor.execute_symbol_action(&action, &symbol)));
            }
        }

        if !state.declaration_actions.is_empty() {
            let owns_code_block = is_code_block_owner(symbol);
            for reference in event.declaring_references() {
                let model = event.semantic_model(reference.tree());
                let declaration = reference.syntax().clone();
                let mut nodes: Option<Arc<Vec<SyntaxNodeRef>>> = None;

                for actions in &state.declaration_actions {
                    let runs_code_blocks = owns_code_block && actions.has_code_block_actions();
                    if actions.syntax_node_actions_by_kind.is_empty() && !runs_code_blocks {
                        continue;
                    }
                    let nodes = nodes
                        .get_or_insert_with(|| Arc::new(nodes_in_declaration(&model, &declaration, symbol)))
                        .clone();

                    let executor = state.executor.clone();
                    let actions = actions.clone();
                    let model = model.clone();
                    let declaration = declaration.clone();
                    let symbol = symbol.clone();
                    let get_kind = self.get_kind.clone();
                    units.push(Box::new(move || {
                        executor.execute_syntax_node_actions(
                            &nodes,
                            &actions.syntax_node_actions_by_kind,
                            &model,
                            &symbol,
                            get_kind.as_ref(),
                        )?;
                        if runs_code_blocks {
                            executor.execute_code_block_actions(
                                &actions.code_block_start_actions,
                                &actions.code_block_actions,
                                &declaration,
                                &symbol,
                                &nodes,
                                &model,
                                get_kind.as_ref(),
                            )?;
                        }
                        Ok(())
                    }));
                }
            }
        }

        self.run_units(units).await
    }

    async fn process_compilation_unit_completed(
        &self,
        state: &Arc<DriverState<K>>,
        event: &Arc<CompilationUnitCompletedEvent>,
    ) -> Result<(), DriverError> {
        let units: Vec<Unit> = if state.semantic_model_actions.is_empty() {
            Vec::new()
        } else {
            let model = event.semantic_model();
            state
                .semantic_model_actions
                .iter()
                .map(|action| {
                    let executor = state.executor.clone();
                    let action = action.clone();
                    let model = model.clone();
                    Box::new(move || executor.execute_semantic_model_action(&action, &model)) as Unit
                })
                .collect()
        };

        let result = self.run_units(units).await;
        event.flush_cache();
        result
    }

    async fn run_compilation_end_actions(&self, state: &Arc<DriverState<K>>) -> Result<(), DriverError> {
        let units = state
            .compilation_end_actions
            .iter()
            .map(|action| {
                let executor = state.executor.clone();
                let action = action.clone();
                Box::new(move || executor.execute_compilation_end_action(&action)) as Unit
            })
            .collect();
        self.run_units(units).await
    }

    /// Run `units` on the blocking pool and wait for all of them
    async fn run_units(&self, units: Vec<Unit>) -> Result<(), DriverError> {
        if units.is_empty() {
            return Ok(());
        }

        let results = if self.options.concurrent_analysis {
            join_all(units.into_iter().map(tokio::task::spawn_blocking)).await
        } else {
            let mut results = Vec::with_capacity(units.len());
            for unit in units {
                results.push(tokio::task::spawn_blocking(unit).await);
            }
            results
        };

        let mut failure: Option<DriverError> = None;
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(canceled)) => {
                    failure.get_or_insert(canceled.into());
                }
                Err(join_error) => {
                    let err = self.worker_panicked(join_error);
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A declaration event for one of several declarations of a symbol, other than the first
fn is_redundant_declaration(event: &SymbolDeclaredEvent) -> bool {
    let Some(declaration) = event.declaration() else {
        return false;
    };
    let references = event.symbol().declaring_syntax_references();
    if references.len() <= 1 {
        return false;
    }
    let first = &references[0];
    let same_tree = first.tree().path() == declaration.tree().path();
    !(same_tree && first.span().overlaps_with(declaration.span()))
}

fn is_code_block_owner(symbol: &SymbolRef) -> bool {
    match symbol.kind() {
        SymbolKind::METHOD | SymbolKind::FIELD => true,
        SymbolKind::EVENT => symbol.is_field_like_event(),
        _ => false,
    }
}

/// Nodes of `declaration`, excluding subtrees that declare other symbols
fn nodes_in_declaration(
    model: &SemanticModelRef,
    declaration: &SyntaxNodeRef,
    symbol: &SymbolRef,
) -> Vec<SyntaxNodeRef> {
    let id = symbol.id();
    descendant_nodes_and_self_where(declaration, |child| match model.declared_symbol(child) {
        Some(other) => other.id() == id,
        None => true,
    })
}
