//! Contained execution of analyzer callbacks
//!
//! Every analyzer callback runs through [`AnalyzerExecutor::execute_and_contain`].
//! Errors and panics raised by the callback are classified: cancellation of
//! the request's own token propagates as [`OperationCanceled`], anything else
//! is a fault of the analyzer and becomes an `AD0001` diagnostic while the
//! engine carries on.

use super::actions::*;
use super::analyzer::AnalyzerRef;
use super::context::*;
use super::manager::AnalyzerManager;
use super::scope::{
    HostCodeBlockStartAnalysisScope, HostCompilationStartAnalysisScope,
    HostSessionStartAnalysisScope,
};
use crate::core::cancellation::{CancellationToken, OperationCanceled};
use crate::core::localizable::LocalizableErrorHandler;
use crate::core::options::AnalyzerOptions;
use crate::core::suppression::SuppressMessageAttributeState;
use crate::core::types::{
    well_known_tags, Diagnostic, DiagnosticDescriptor, DiagnosticSeverity, Location,
};
use crate::model::{CompilationRef, SemanticModelRef, SymbolRef, SyntaxNode, SyntaxNodeRef, SyntaxTreeRef};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Id of the diagnostic reported when an analyzer faults
pub const ANALYZER_EXCEPTION_DIAGNOSTIC_ID: &str = "AD0001";

/// Id of the diagnostic reported when the driver itself fails
pub const ANALYZER_DRIVER_EXCEPTION_DIAGNOSTIC_ID: &str = "AD0002";

/// Told about every analyzer fault, with the `AD0001` diagnostic describing it
pub type AnalyzerExceptionHandler = Arc<dyn Fn(&FaultCause, &AnalyzerRef, Diagnostic) + Send + Sync>;

/// What went wrong inside an analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCause {
    /// The callback returned an error
    Error { message: String, detail: String },
    /// The callback panicked
    Panic { message: String },
}

impl FaultCause {
    pub fn from_error(error: &anyhow::Error) -> Self {
        FaultCause::Error {
            message: error.to_string(),
            detail: format!("{:?}", error),
        }
    }

    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            message.to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        FaultCause::Panic { message }
    }

    /// Short name of the failure type
    pub fn kind(&self) -> &'static str {
        match self {
            FaultCause::Error { .. } => "error",
            FaultCause::Panic { .. } => "panic",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FaultCause::Error { message, .. } | FaultCause::Panic { message } => message,
        }
    }

    /// Full description, including the error chain when there is one
    pub fn detail(&self) -> &str {
        match self {
            FaultCause::Error { detail, .. } => detail,
            FaultCause::Panic { message } => message,
        }
    }
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

/// Classification of a failed callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The request was cancelled; stop the surrounding work
    AmbientCancellation(OperationCanceled),
    /// The analyzer failed; report and continue
    AnalyzerFault(FaultCause),
}

impl FailureKind {
    /// Only cancellation of `ambient` itself counts as ambient cancellation
    pub fn classify_error(error: anyhow::Error, ambient: &CancellationToken) -> Self {
        if let Some(canceled) = error.downcast_ref::<OperationCanceled>() {
            if is_ambient(canceled, ambient) {
                return FailureKind::AmbientCancellation(*canceled);
            }
        }
        FailureKind::AnalyzerFault(FaultCause::from_error(&error))
    }

    pub fn classify_panic(payload: Box<dyn Any + Send>, ambient: &CancellationToken) -> Self {
        if let Some(canceled) = payload.downcast_ref::<OperationCanceled>() {
            if is_ambient(canceled, ambient) {
                return FailureKind::AmbientCancellation(*canceled);
            }
        }
        FailureKind::AnalyzerFault(FaultCause::from_panic(payload.as_ref()))
    }
}

fn is_ambient(canceled: &OperationCanceled, ambient: &CancellationToken) -> bool {
    canceled.token_id == ambient.id() && ambient.is_cancellation_requested()
}

/// How a contained callback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Faulted,
}

impl ExecutionOutcome {
    pub fn is_completed(self) -> bool {
        self == ExecutionOutcome::Completed
    }
}

/// Time spent in one analyzer's callbacks
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerTiming {
    pub analyzer: String,
    pub total_time: Duration,
    pub invocation_count: usize,
}

impl AnalyzerTiming {
    pub fn new(analyzer: &str) -> Self {
        Self {
            analyzer: analyzer.to_string(),
            ..Default::default()
        }
    }

    pub fn avg_time(&self) -> Duration {
        if self.invocation_count > 0 {
            self.total_time / self.invocation_count as u32
        } else {
            Duration::ZERO
        }
    }
}

/// Build the `AD0001` diagnostic describing a fault of `analyzer`
pub fn create_analyzer_exception_diagnostic(analyzer: &AnalyzerRef, cause: &FaultCause) -> Diagnostic {
    let descriptor = Arc::new(
        DiagnosticDescriptor::new(
            ANALYZER_EXCEPTION_DIAGNOSTIC_ID,
            "Analyzer threw an exception",
            "Analyzer '{0}' threw an exception of type '{1}' with message '{2}'.",
            well_known_tags::COMPILER,
            DiagnosticSeverity::Info,
            true,
        )
        .with_description(cause.detail().to_string())
        .with_custom_tag(well_known_tags::ANALYZER_EXCEPTION),
    );
    Diagnostic::create(
        &descriptor,
        Location::None,
        &[analyzer.name(), cause.kind().to_string(), cause.message().to_string()],
    )
}

/// Build the `AD0002` diagnostic describing a failure of the driver itself
pub fn create_driver_exception_diagnostic(message: &str) -> Diagnostic {
    let descriptor = Arc::new(
        DiagnosticDescriptor::new(
            ANALYZER_DRIVER_EXCEPTION_DIAGNOSTIC_ID,
            "Analyzer driver threw an exception",
            "Analyzer driver threw an exception with message '{0}'.",
            well_known_tags::COMPILER,
            DiagnosticSeverity::Error,
            true,
        )
        .with_custom_tag(well_known_tags::ANALYZER_EXCEPTION),
    );
    Diagnostic::create(&descriptor, Location::None, &[message])
}

/// Exception handler that forwards fault diagnostics to `sink`
pub fn default_exception_handler(sink: DiagnosticSink) -> AnalyzerExceptionHandler {
    Arc::new(move |_cause, _analyzer, diagnostic| sink(diagnostic))
}

fn notify_exception(handler: &AnalyzerExceptionHandler, cause: &FaultCause, analyzer: &AnalyzerRef) {
    let diagnostic = create_analyzer_exception_diagnostic(analyzer, cause);
    let notified = panic::catch_unwind(AssertUnwindSafe(|| handler(cause, analyzer, diagnostic)));
    if notified.is_err() {
        log::error!("exception handler panicked while reporting a fault of {}", analyzer.name());
    }
}

/// Runs analyzer callbacks for one compilation
pub struct AnalyzerExecutor {
    compilation: CompilationRef,
    options: Arc<AnalyzerOptions>,
    add_diagnostic: DiagnosticSink,
    on_analyzer_exception: AnalyzerExceptionHandler,
    manager: Arc<AnalyzerManager>,
    compiler_analyzer: Option<AnalyzerRef>,
    gates: HashMap<AnalyzerRef, Mutex<()>>,
    suppression: Option<Arc<SuppressMessageAttributeState>>,
    cancellation_token: CancellationToken,
    timings: Option<DashMap<AnalyzerRef, AnalyzerTiming>>,
}

impl AnalyzerExecutor {
    pub fn new(
        compilation: CompilationRef,
        options: Arc<AnalyzerOptions>,
        add_diagnostic: DiagnosticSink,
        on_analyzer_exception: AnalyzerExceptionHandler,
        manager: Arc<AnalyzerManager>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            compilation,
            options,
            add_diagnostic,
            on_analyzer_exception,
            manager,
            compiler_analyzer: None,
            gates: HashMap::new(),
            suppression: None,
            cancellation_token,
            timings: None,
        }
    }

    /// Mark the analyzer whose diagnostics bypass support checks and suppression
    pub fn with_compiler_analyzer(mut self, analyzer: AnalyzerRef) -> Self {
        self.compiler_analyzer = Some(analyzer);
        self
    }

    /// Serialize every callback of `analyzer`
    pub fn with_non_thread_safe_analyzer(mut self, analyzer: AnalyzerRef) -> Self {
        self.gates.insert(analyzer, Mutex::new(()));
        self
    }

    /// Drop diagnostics suppressed on the symbol they are reported against
    pub fn with_suppression_state(mut self, state: Arc<SuppressMessageAttributeState>) -> Self {
        self.suppression = Some(state);
        self
    }

    /// Record per-analyzer execution time
    pub fn with_execution_timing(mut self, enabled: bool) -> Self {
        self.timings = enabled.then(DashMap::new);
        self
    }

    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }

    pub fn options(&self) -> &Arc<AnalyzerOptions> {
        &self.options
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn manager(&self) -> &Arc<AnalyzerManager> {
        &self.manager
    }

    pub fn is_compiler_analyzer(&self, analyzer: &AnalyzerRef) -> bool {
        self.compiler_analyzer.as_ref() == Some(analyzer)
    }

    pub fn is_non_thread_safe(&self, analyzer: &AnalyzerRef) -> bool {
        self.gates.contains_key(analyzer)
    }

    /// Timing statistics sorted by total time, slowest first
    pub fn analyzer_timings(&self) -> Vec<AnalyzerTiming> {
        let Some(timings) = &self.timings else {
            return Vec::new();
        };
        let mut result: Vec<_> = timings.iter().map(|e| e.value().clone()).collect();
        result.sort_by(|a, b| b.total_time.cmp(&a.total_time));
        result
    }

    /// Run `action` on behalf of `analyzer`, containing its failures
    ///
    /// Returns `Err` only when the ambient token is (or becomes) cancelled.
    pub fn execute_and_contain<F>(
        &self,
        analyzer: &AnalyzerRef,
        action: F,
    ) -> Result<ExecutionOutcome, OperationCanceled>
    where
        F: FnOnce() -> ActionResult,
    {
        self.cancellation_token.check()?;
        self.invoke_contained(analyzer, action)
    }

    /// Like [`execute_and_contain`](Self::execute_and_contain) without the up-front cancellation check
    fn invoke_contained<F>(&self, analyzer: &AnalyzerRef, action: F) -> Result<ExecutionOutcome, OperationCanceled>
    where
        F: FnOnce() -> ActionResult,
    {
        let result = {
            let _gate = self.gates.get(analyzer).map(|gate| gate.lock());
            let started = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(action));
            if let Some(timings) = &self.timings {
                let mut timing = timings
                    .entry(analyzer.clone())
                    .or_insert_with(|| AnalyzerTiming::new(&analyzer.name()));
                timing.total_time += started.elapsed();
                timing.invocation_count += 1;
            }
            result
        };

        let failure = match result {
            Ok(Ok(())) => return Ok(ExecutionOutcome::Completed),
            Ok(Err(error)) => FailureKind::classify_error(error, &self.cancellation_token),
            Err(payload) => FailureKind::classify_panic(payload, &self.cancellation_token),
        };

        match failure {
            FailureKind::AmbientCancellation(canceled) => {
                log::debug!("analysis cancelled while running {}", analyzer.name());
                Err(canceled)
            }
            FailureKind::AnalyzerFault(cause) => {
                self.report_analyzer_exception(analyzer, &cause);
                Ok(ExecutionOutcome::Faulted)
            }
        }
    }

    /// Log a fault and hand its `AD0001` diagnostic to the exception handler
    pub fn report_analyzer_exception(&self, analyzer: &AnalyzerRef, cause: &FaultCause) {
        log::warn!("analyzer {} failed: {}", analyzer.name(), cause);
        notify_exception(&self.on_analyzer_exception, cause, analyzer);
    }

    /// Handler reporting failed resource strings of `analyzer`'s descriptors
    pub fn localizable_error_handler(&self, analyzer: &AnalyzerRef) -> LocalizableErrorHandler {
        let handler = self.on_analyzer_exception.clone();
        let analyzer = analyzer.clone();
        Arc::new(move |error: &anyhow::Error| {
            let cause = FaultCause::from_error(error);
            log::warn!("resource string of analyzer {} failed: {}", analyzer.name(), cause);
            notify_exception(&handler, &cause, &analyzer);
        })
    }

    /// `supported_diagnostics` of `analyzer`, or nothing if it faults
    pub fn execute_supported_diagnostics(&self, analyzer: &AnalyzerRef) -> Vec<DiagnosticDescriptor> {
        let mut descriptors = Vec::new();
        let outcome = self.invoke_contained(analyzer, || {
            descriptors = analyzer.supported_diagnostics();
            Ok(())
        });
        match outcome {
            Ok(ExecutionOutcome::Completed) => descriptors,
            _ => Vec::new(),
        }
    }

    /// Run `initialize`; a faulted initialization leaves `scope` empty
    pub fn execute_initialize(
        &self,
        analyzer: &AnalyzerRef,
        scope: &mut HostSessionStartAnalysisScope,
    ) -> Result<(), OperationCanceled> {
        let outcome = self.execute_and_contain(analyzer, || {
            let mut context = AnalysisContext::new(analyzer.clone(), &mut *scope);
            analyzer.initialize(&mut context)
        })?;
        if outcome == ExecutionOutcome::Faulted {
            *scope = HostSessionStartAnalysisScope::new();
        }
        Ok(())
    }

    /// Run compilation-start actions; a faulted action contributes no registrations
    pub fn execute_compilation_start_actions(
        &self,
        actions: &[CompilationStartAction],
        scope: &mut HostCompilationStartAnalysisScope,
    ) -> Result<(), OperationCanceled> {
        for action in actions {
            let snapshot = scope.own_actions().clone();
            let outcome = self.execute_and_contain(&action.analyzer, || {
                let mut context = CompilationStartAnalysisContext::new(
                    action.analyzer.clone(),
                    &mut *scope,
                    self.compilation.clone(),
                    self.options.clone(),
                    self.cancellation_token.clone(),
                );
                (action.callback)(&mut context)
            })?;
            if outcome == ExecutionOutcome::Faulted {
                scope.restore(snapshot);
            }
        }
        Ok(())
    }

    pub fn execute_compilation_end_action(&self, action: &CompilationEndAction) -> Result<(), OperationCanceled> {
        let context = CompilationAnalysisContext {
            compilation: self.compilation.clone(),
            options: self.options.clone(),
            reporter: self.reporter(&action.analyzer, self.add_diagnostic.clone()),
            cancellation_token: self.cancellation_token.clone(),
        };
        self.execute_and_contain(&action.analyzer, || (action.callback)(&context))?;
        Ok(())
    }

    pub fn execute_symbol_action(&self, action: &SymbolAction, symbol: &SymbolRef) -> Result<(), OperationCanceled> {
        let context = SymbolAnalysisContext {
            symbol: symbol.clone(),
            compilation: self.compilation.clone(),
            options: self.options.clone(),
            reporter: self.reporter(&action.analyzer, self.symbol_sink(symbol)),
            cancellation_token: self.cancellation_token.clone(),
        };
        self.execute_and_contain(&action.analyzer, || (action.callback)(&context))?;
        Ok(())
    }

    pub fn execute_semantic_model_action(
        &self,
        action: &SemanticModelAction,
        semantic_model: &SemanticModelRef,
    ) -> Result<(), OperationCanceled> {
        let context = SemanticModelAnalysisContext {
            semantic_model: semantic_model.clone(),
            compilation: self.compilation.clone(),
            options: self.options.clone(),
            reporter: self.reporter(&action.analyzer, self.add_diagnostic.clone()),
            cancellation_token: self.cancellation_token.clone(),
        };
        self.execute_and_contain(&action.analyzer, || (action.callback)(&context))?;
        Ok(())
    }

    pub fn execute_syntax_tree_action(
        &self,
        action: &SyntaxTreeAction,
        tree: &SyntaxTreeRef,
    ) -> Result<(), OperationCanceled> {
        let context = SyntaxTreeAnalysisContext {
            tree: tree.clone(),
            options: self.options.clone(),
            reporter: self.reporter(&action.analyzer, self.add_diagnostic.clone()),
            cancellation_token: self.cancellation_token.clone(),
        };
        self.execute_and_contain(&action.analyzer, || (action.callback)(&context))?;
        Ok(())
    }

    /// Dispatch `nodes` to the actions registered for their kind
    ///
    /// Nodes are visited in order; each node's actions run in registration order.
    pub fn execute_syntax_node_actions<K: SyntaxKind>(
        &self,
        nodes: &[SyntaxNodeRef],
        actions_by_kind: &HashMap<K, Vec<SyntaxNodeAction<K>>>,
        semantic_model: &SemanticModelRef,
        containing_symbol: &SymbolRef,
        get_kind: &(dyn Fn(&dyn SyntaxNode) -> K + Send + Sync),
    ) -> Result<(), OperationCanceled> {
        if actions_by_kind.is_empty() {
            return Ok(());
        }

        let sink = self.symbol_sink(containing_symbol);
        let mut reporters: HashMap<AnalyzerRef, DiagnosticReporter> = HashMap::new();
        for node in nodes {
            let kind = get_kind(node.as_ref());
            let Some(actions) = actions_by_kind.get(&kind) else {
                continue;
            };
            for action in actions {
                let reporter = reporters
                    .entry(action.analyzer.clone())
                    .or_insert_with(|| self.reporter(&action.analyzer, sink.clone()))
                    .clone();
                let context = SyntaxNodeAnalysisContext {
                    node: node.clone(),
                    semantic_model: semantic_model.clone(),
                    containing_symbol: Some(containing_symbol.clone()),
                    options: self.options.clone(),
                    reporter,
                    cancellation_token: self.cancellation_token.clone(),
                };
                self.execute_and_contain(&action.analyzer, || (action.callback)(&context))?;
            }
        }
        Ok(())
    }

    /// Analyze one code block
    ///
    /// Runs every code-block-start action first, keeping the registrations of
    /// those that completed. Then runs the collected syntax-node actions over
    /// `nodes`, and finally the code-block-end actions followed by the plain
    /// code-block actions.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_code_block_actions<K: SyntaxKind>(
        &self,
        code_block_start_actions: &[CodeBlockStartAction<K>],
        code_block_actions: &[CodeBlockAction],
        declared_node: &SyntaxNodeRef,
        declared_symbol: &SymbolRef,
        nodes: &[SyntaxNodeRef],
        semantic_model: &SemanticModelRef,
        get_kind: &(dyn Fn(&dyn SyntaxNode) -> K + Send + Sync),
    ) -> Result<(), OperationCanceled> {
        let mut end_actions: Vec<CodeBlockAction> = Vec::new();
        let mut node_actions: Vec<SyntaxNodeAction<K>> = Vec::new();

        for start in code_block_start_actions {
            let mut scope = HostCodeBlockStartAnalysisScope::new();
            let outcome = self.execute_and_contain(&start.analyzer, || {
                let mut context = CodeBlockStartAnalysisContext::new(
                    start.analyzer.clone(),
                    &mut scope,
                    declared_node.clone(),
                    declared_symbol.clone(),
                    semantic_model.clone(),
                    self.options.clone(),
                    self.cancellation_token.clone(),
                );
                (start.callback)(&mut context)
            })?;
            if outcome.is_completed() {
                let (ends, nodes) = scope.into_parts();
                end_actions.extend(ends);
                node_actions.extend(nodes);
            }
        }

        if !node_actions.is_empty() {
            let by_kind = get_node_actions_by_kind(&node_actions);
            self.execute_syntax_node_actions(nodes, &by_kind, semantic_model, declared_symbol, get_kind)?;
        }

        end_actions.extend(code_block_actions.iter().cloned());
        if end_actions.is_empty() {
            return Ok(());
        }

        let sink = self.symbol_sink(declared_symbol);
        for action in &end_actions {
            let context = CodeBlockAnalysisContext {
                code_block: declared_node.clone(),
                owning_symbol: declared_symbol.clone(),
                semantic_model: semantic_model.clone(),
                options: self.options.clone(),
                reporter: self.reporter(&action.analyzer, sink.clone()),
                cancellation_token: self.cancellation_token.clone(),
            };
            self.execute_and_contain(&action.analyzer, || (action.callback)(&context))?;
        }
        Ok(())
    }

    fn reporter(&self, analyzer: &AnalyzerRef, sink: DiagnosticSink) -> DiagnosticReporter {
        let is_supported: SupportedDiagnosticPredicate = if self.is_compiler_analyzer(analyzer) {
            Arc::new(|_: &Diagnostic| true)
        } else {
            let descriptors = self.manager.get_supported_diagnostics(analyzer, self);
            Arc::new(move |diagnostic: &Diagnostic| descriptors.iter().any(|d| d.id == diagnostic.id()))
        };
        DiagnosticReporter::new(sink, is_supported)
    }

    /// Sink that drops diagnostics suppressed on `symbol` or its containers
    fn symbol_sink(&self, symbol: &SymbolRef) -> DiagnosticSink {
        let Some(state) = &self.suppression else {
            return self.add_diagnostic.clone();
        };
        let state = state.clone();
        let symbol = symbol.clone();
        let sink = self.add_diagnostic.clone();
        Arc::new(move |diagnostic: Diagnostic| {
            if state.is_diagnostic_suppressed(&diagnostic, Some(&symbol)) {
                log::trace!("{} suppressed on {}", diagnostic.id(), symbol.name());
            } else {
                sink(diagnostic);
            }
        })
    }
}

impl fmt::Debug for AnalyzerExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerExecutor")
            .field("compilation", &self.compilation.id())
            .field("compiler_analyzer", &self.compiler_analyzer)
            .field("non_thread_safe", &self.gates.len())
            .field("cancellation_token", &self.cancellation_token)
            .finish()
    }
}
