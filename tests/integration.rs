//! Integration tests for the analyzer driver

use analyzer_driver::engine::{
    compilation_events, raw_kind_classifier, AnalysisContext, AnalyzerDriver, AnalyzerManager,
    AnalyzerRef, CompilationEvent, DiagnosticAnalyzer, DriverError, DriverOptions, FaultCause,
    ANALYZER_EXCEPTION_DIAGNOSTIC_ID,
};
use analyzer_driver::engine::events::{CompilationUnitCompletedEvent, SymbolDeclaredEvent};
use analyzer_driver::model::memory::{MemoryCompilation, MemoryNode, MemorySymbol, MemoryTree};
use analyzer_driver::model::{AttributeData, CompilationRef, SymbolKind, SymbolRef};
use analyzer_driver::{
    get_diagnostics, get_diagnostics_async, is_diagnostic_suppressed, CancellationToken,
    CompilationOptions, Diagnostic, DiagnosticDescriptor, DiagnosticSeverity, Location,
    ReportDiagnostic, TextSpan,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CLASS: u16 = 1;
const METHOD: u16 = 2;
const STATEMENT: u16 = 3;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn descriptor(id: &str) -> DiagnosticDescriptor {
    DiagnosticDescriptor::new(
        id,
        "Test diagnostic",
        "Found {0}",
        "Usage",
        DiagnosticSeverity::Warning,
        true,
    )
}

fn declaration_location(symbol: &SymbolRef) -> Location {
    match symbol.declaring_syntax_references().first() {
        Some(reference) => Location::source(reference.tree().path(), reference.span()),
        None => Location::None,
    }
}

/// `Program.cs` with one class declaring `count` methods, each with one statement
fn class_with_methods(id: u64, count: usize) -> CompilationRef {
    build_class(id, count, CompilationOptions::new(), |_, builder| builder)
}

fn build_class<F>(id: u64, count: usize, options: CompilationOptions, decorate: F) -> CompilationRef
where
    F: Fn(usize, analyzer_driver::model::memory::MemorySymbolBuilder) -> analyzer_driver::model::memory::MemorySymbolBuilder,
{
    let mut methods = Vec::new();
    let mut class_node = MemoryNode::new(CLASS, TextSpan::new(0, 20 + count * 20));
    for i in 0..count {
        let start = 10 + i * 20;
        let statement = MemoryNode::new(STATEMENT, TextSpan::new(start + 5, start + 10)).into_ref();
        let method = MemoryNode::new(METHOD, TextSpan::new(start, start + 15))
            .with_child(statement)
            .into_ref();
        class_node = class_node.with_child(method.clone());
        methods.push(method);
    }
    let class_node = class_node.into_ref();
    let tree = MemoryTree::new("Program.cs", class_node.clone());

    let class = MemorySymbol::builder(1, "Program", SymbolKind::NAMED_TYPE)
        .declared_at(&tree, &class_node)
        .build();
    let mut builder = MemoryCompilation::builder(id)
        .tree(tree.clone())
        .symbol(class.clone())
        .options(options);
    for (i, method) in methods.iter().enumerate() {
        let symbol = MemorySymbol::builder(2 + i as u64, format!("M{}", i), SymbolKind::METHOD)
            .containing(&class)
            .declared_at(&tree, method);
        builder = builder.symbol(decorate(i, symbol).build());
    }
    builder.build()
}

/// Reports `M1` on every method
struct MethodReporter;

impl DiagnosticAnalyzer for MethodReporter {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("M1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let descriptor = Arc::new(descriptor("M1"));
        context.register_symbol_action(
            move |symbol_context| {
                let symbol = symbol_context.symbol();
                symbol_context.report_diagnostic(Diagnostic::create(
                    &descriptor,
                    declaration_location(symbol),
                    &[symbol.name()],
                ))?;
                Ok(())
            },
            [SymbolKind::METHOD],
        );
        Ok(())
    }
}

/// Fails on every method, by error or by panic
struct FaultingAnalyzer {
    panics: bool,
}

impl DiagnosticAnalyzer for FaultingAnalyzer {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("F1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let panics = self.panics;
        context.register_symbol_action(
            move |symbol_context| {
                if panics {
                    panic!("cannot analyze {}", symbol_context.symbol().name());
                }
                anyhow::bail!("cannot analyze {}", symbol_context.symbol().name())
            },
            [SymbolKind::METHOD],
        );
        Ok(())
    }
}

/// Counts calls into the analyzer and its compilation-start action
#[derive(Default)]
struct CountingAnalyzer {
    supported_calls: AtomicUsize,
    initialize_calls: Arc<AtomicUsize>,
    compilation_starts: Arc<AtomicUsize>,
}

impl DiagnosticAnalyzer for CountingAnalyzer {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        self.supported_calls.fetch_add(1, Ordering::SeqCst);
        vec![descriptor("C1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));

        let starts = self.compilation_starts.clone();
        context.register_compilation_start_action(move |start| {
            starts.fetch_add(1, Ordering::SeqCst);
            start.register_symbol_action(|_| Ok(()), [SymbolKind::METHOD]);
            Ok(())
        });
        Ok(())
    }
}

fn ids(diagnostics: &[Diagnostic]) -> Vec<String> {
    let mut ids: Vec<String> = diagnostics.iter().map(|d| d.id().to_string()).collect();
    ids.sort();
    ids
}

#[test]
fn test_reports_one_diagnostic_per_method() {
    init_logger();
    let compilation = class_with_methods(1, 3);

    let diagnostics = get_diagnostics(
        &compilation,
        vec![AnalyzerRef::new(MethodReporter)],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(ids(&diagnostics), vec!["M1", "M1", "M1"]);
    let mut messages: Vec<_> = diagnostics.iter().map(|d| d.message.clone()).collect();
    messages.sort();
    assert_eq!(messages, vec!["Found M0", "Found M1", "Found M2"]);
}

#[test]
fn test_sequential_analysis_matches_concurrent() {
    init_logger();
    let compilation = class_with_methods(1, 5);
    let options = DriverOptions {
        concurrent_analysis: false,
        ..Default::default()
    };

    let diagnostics = get_diagnostics(
        &compilation,
        vec![AnalyzerRef::new(MethodReporter)],
        options,
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(diagnostics.len(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_first_event_not_compilation_started() {
    init_logger();
    let compilation = class_with_methods(1, 2);
    let manager = Arc::new(AnalyzerManager::new());
    let analyzer = AnalyzerRef::new(MethodReporter);
    let driver = AnalyzerDriver::builder(vec![analyzer.clone()], raw_kind_classifier(), manager.clone()).build();

    let mut events = compilation_events(&compilation);
    events.rotate_left(1);
    assert!(matches!(events[0], CompilationEvent::SymbolDeclared(_)));
    for event in events {
        driver.event_queue().enqueue(event).unwrap();
    }

    let result = driver.run().await;
    assert!(matches!(result, Err(DriverError::ProtocolViolation(_))));
    assert!(driver.get_diagnostics().is_empty());
    assert!(!manager.is_initialized(&analyzer));
}

#[test]
fn test_faulting_analyzer_does_not_stop_others() {
    init_logger();
    let compilation = class_with_methods(1, 3);

    let diagnostics = get_diagnostics(
        &compilation,
        vec![
            AnalyzerRef::new(FaultingAnalyzer { panics: false }),
            AnalyzerRef::new(FaultingAnalyzer { panics: true }),
            AnalyzerRef::new(MethodReporter),
        ],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    let faults: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.id() == ANALYZER_EXCEPTION_DIAGNOSTIC_ID)
        .collect();
    assert_eq!(faults.len(), 6);
    assert!(faults
        .iter()
        .any(|d| d.message.contains("of type 'panic'") && d.message.contains("FaultingAnalyzer")));
    assert!(faults.iter().any(|d| d.message.contains("of type 'error'")));
    assert_eq!(diagnostics.iter().filter(|d| d.id() == "M1").count(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_exception_handler_receives_faults() {
    init_logger();
    let compilation = class_with_methods(1, 2);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let driver = AnalyzerDriver::builder(
        vec![AnalyzerRef::new(FaultingAnalyzer { panics: false })],
        raw_kind_classifier(),
        Arc::new(AnalyzerManager::new()),
    )
    .on_analyzer_exception(Arc::new(move |cause: &FaultCause, analyzer: &AnalyzerRef, diagnostic: Diagnostic| {
        assert_eq!(cause.kind(), "error");
        assert_eq!(analyzer.name(), "FaultingAnalyzer");
        assert_eq!(diagnostic.id(), ANALYZER_EXCEPTION_DIAGNOSTIC_ID);
        counter.fetch_add(1, Ordering::SeqCst);
    }))
    .build();

    for event in compilation_events(&compilation) {
        driver.event_queue().enqueue(event).unwrap();
    }
    driver.run().await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    // Routed to the handler instead of the output
    assert!(driver.get_diagnostics().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_initialize_runs_once_across_compilations() {
    init_logger();
    let analyzer = Arc::new(CountingAnalyzer::default());
    let initialize_calls = analyzer.initialize_calls.clone();
    let compilation_starts = analyzer.compilation_starts.clone();
    let analyzer = AnalyzerRef::from_arc(analyzer);
    let manager = Arc::new(AnalyzerManager::new());

    let first = class_with_methods(1, 2);
    let second = class_with_methods(2, 3);
    let token = CancellationToken::new();
    let (a, b) = tokio::join!(
        get_diagnostics_async(
            &first,
            vec![analyzer.clone()],
            DriverOptions::default(),
            manager.clone(),
            raw_kind_classifier(),
            &token,
        ),
        get_diagnostics_async(
            &second,
            vec![analyzer.clone()],
            DriverOptions::default(),
            manager.clone(),
            raw_kind_classifier(),
            &token,
        ),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(initialize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(compilation_starts.load(Ordering::SeqCst), 2);
    assert!(manager.is_initialized(&analyzer));
}

#[test]
fn test_supported_diagnostics_computed_once_per_manager() {
    init_logger();
    let counting = Arc::new(CountingAnalyzer::default());
    let analyzer = AnalyzerRef::from_arc(counting.clone());
    let manager = Arc::new(AnalyzerManager::new());

    for id in 1..=3 {
        get_diagnostics(
            &class_with_methods(id, 2),
            vec![analyzer.clone()],
            DriverOptions::default(),
            manager.clone(),
            raw_kind_classifier(),
            &CancellationToken::new(),
        )
        .unwrap();
    }

    assert_eq!(counting.supported_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_suppressed_analyzer_is_never_initialized() {
    init_logger();
    let options = CompilationOptions::new().with_specific_option("C1", ReportDiagnostic::Suppress);
    let compilation = build_class(1, 2, options, |_, builder| builder);

    let regular = Arc::new(CountingAnalyzer::default());
    let compiler = Arc::new(CountingAnalyzer::default());
    let regular_ref = AnalyzerRef::from_arc(regular.clone());
    let compiler_ref = AnalyzerRef::from_arc(compiler.clone());
    let manager = Arc::new(AnalyzerManager::new());

    let driver = AnalyzerDriver::builder(
        vec![regular_ref.clone(), compiler_ref.clone()],
        raw_kind_classifier(),
        manager.clone(),
    )
    .compiler_analyzer(compiler_ref.clone())
    .build();
    for event in compilation_events(&compilation) {
        driver.event_queue().enqueue(event).unwrap();
    }
    driver.run().await.unwrap();

    assert_eq!(regular.initialize_calls.load(Ordering::SeqCst), 0);
    assert!(!manager.is_initialized(&regular_ref));
    assert!(driver.analyzer_action_counts(&regular_ref).is_none());

    assert_eq!(compiler.initialize_calls.load(Ordering::SeqCst), 1);
    let counts = driver.analyzer_action_counts(&compiler_ref).unwrap();
    assert_eq!(counts.compilation_start_actions, 1);
    assert_eq!(counts.symbol_actions, 1);
}

#[test]
fn test_suppression_attribute_hides_symbol_diagnostics() {
    init_logger();
    let compilation = build_class(1, 3, CompilationOptions::new(), |i, builder| {
        if i == 1 {
            builder.attribute(
                AttributeData::new("SuppressMessage")
                    .with_argument("Usage")
                    .with_argument("M1:ReportsMethods"),
            )
        } else {
            builder
        }
    });

    let diagnostics = get_diagnostics(
        &compilation,
        vec![AnalyzerRef::new(MethodReporter)],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    let mut messages: Vec<_> = diagnostics.iter().map(|d| d.message.clone()).collect();
    messages.sort();
    assert_eq!(messages, vec!["Found M0", "Found M2"]);
}

/// Reports `T1` at every statement, from a syntax-tree action
struct StatementReporter;

impl DiagnosticAnalyzer for StatementReporter {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("T1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let descriptor = Arc::new(descriptor("T1"));
        context.register_syntax_tree_action(move |tree_context| {
            let tree = tree_context.tree();
            for node in analyzer_driver::model::descendant_nodes_and_self(&tree.root()) {
                if node.raw_kind() == STATEMENT {
                    let location = Location::source(tree.path(), node.span());
                    tree_context.report_diagnostic(Diagnostic::create(&descriptor, location, &["statement"]))?;
                }
            }
            Ok(())
        });
        Ok(())
    }
}

fn suppressed_second_method(options: CompilationOptions) -> CompilationRef {
    build_class(1, 3, options, |i, builder| {
        if i == 1 {
            builder.attribute(
                AttributeData::new("SuppressMessage")
                    .with_argument("Usage")
                    .with_argument("T1"),
            )
        } else {
            builder
        }
    })
}

#[test]
fn test_source_suppression_filters_retrieved_diagnostics() {
    init_logger();
    let compilation = suppressed_second_method(CompilationOptions::new());

    let diagnostics = get_diagnostics(
        &compilation,
        vec![AnalyzerRef::new(StatementReporter)],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(diagnostics.len(), 2);
    // The second method spans [30, 45)
    assert!(diagnostics
        .iter()
        .all(|d| !d.location.span().is_some_and(|span| span.start >= 30 && span.end <= 45)));
}

#[test]
fn test_report_suppressed_diagnostics_keeps_them_flagged() {
    init_logger();
    let options = CompilationOptions::new().with_report_suppressed_diagnostics(true);
    let compilation = suppressed_second_method(options);

    let diagnostics = get_diagnostics(
        &compilation,
        vec![AnalyzerRef::new(StatementReporter)],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(diagnostics.len(), 3);
    assert_eq!(diagnostics.iter().filter(|d| d.is_suppressed).count(), 1);
}

#[test]
fn test_is_diagnostic_suppressed_entry_point() {
    let compilation = suppressed_second_method(CompilationOptions::new());
    let descriptor = Arc::new(descriptor("T1"));
    let inside = Diagnostic::new(&descriptor, Location::source("Program.cs", TextSpan::new(35, 40)));
    let outside = Diagnostic::new(&descriptor, Location::source("Program.cs", TextSpan::new(15, 20)));

    assert!(is_diagnostic_suppressed(&compilation, &inside, None));
    assert!(!is_diagnostic_suppressed(&compilation, &outside, None));

    let model = compilation.semantic_model(&compilation.syntax_trees()[0]);
    let second = model
        .declared_symbols()
        .into_iter()
        .find(|s| s.name() == "M1")
        .unwrap();
    assert!(is_diagnostic_suppressed(&compilation, &outside, Some(&second)));

    // The reported location still counts when an unrelated symbol is given
    let first = model
        .declared_symbols()
        .into_iter()
        .find(|s| s.name() == "M0")
        .unwrap();
    assert!(is_diagnostic_suppressed(&compilation, &inside, Some(&first)));
    assert!(!is_diagnostic_suppressed(&compilation, &outside, Some(&first)));
}

/// Tracks how many of its callbacks overlap
#[derive(Default)]
struct SlowAnalyzer {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl DiagnosticAnalyzer for SlowAnalyzer {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("S1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let active = self.active.clone();
        let max_active = self.max_active.clone();
        context.register_symbol_action(
            move |_| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            [SymbolKind::METHOD],
        );
        Ok(())
    }
}

#[test]
fn test_non_thread_safe_analyzer_is_serialized() {
    init_logger();
    let slow = Arc::new(SlowAnalyzer::default());
    let max_active = slow.max_active.clone();
    let options = DriverOptions {
        worker_count: 4,
        non_thread_safe_analyzers: vec!["SlowAnalyzer".to_string()],
        ..Default::default()
    };

    get_diagnostics(
        &class_with_methods(1, 8),
        vec![AnalyzerRef::from_arc(slow)],
        options,
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
}

/// Cancels the caller's token from inside a callback
struct CancellingAnalyzer {
    token: CancellationToken,
}

impl DiagnosticAnalyzer for CancellingAnalyzer {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("X1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let token = self.token.clone();
        context.register_symbol_action(
            move |symbol_context| {
                token.cancel();
                symbol_context.cancellation_token().check()?;
                Ok(())
            },
            [SymbolKind::METHOD],
        );
        Ok(())
    }
}

#[test]
fn test_ambient_cancellation_stops_the_driver() {
    init_logger();
    let token = CancellationToken::new();

    let result = get_diagnostics(
        &class_with_methods(1, 3),
        vec![AnalyzerRef::new(CancellingAnalyzer { token: token.clone() })],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &token,
    );

    assert!(matches!(result, Err(DriverError::Cancelled(_))));
}

/// Raises cancellation of a token the driver does not own
struct ForeignCancellationAnalyzer;

impl DiagnosticAnalyzer for ForeignCancellationAnalyzer {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("X2")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        context.register_symbol_action(
            |_| {
                let private = CancellationToken::new();
                private.cancel();
                private.check()?;
                Ok(())
            },
            [SymbolKind::METHOD],
        );
        Ok(())
    }
}

#[test]
fn test_foreign_cancellation_is_a_fault() {
    init_logger();
    let diagnostics = get_diagnostics(
        &class_with_methods(1, 2),
        vec![AnalyzerRef::new(ForeignCancellationAnalyzer)],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(ids(&diagnostics), vec!["AD0001", "AD0001"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dispose_cancels_a_waiting_driver() {
    init_logger();
    let compilation = class_with_methods(1, 1);
    let driver = AnalyzerDriver::builder(
        vec![AnalyzerRef::new(MethodReporter)],
        raw_kind_classifier(),
        Arc::new(AnalyzerManager::new()),
    )
    .build();

    // Only the first event arrives; the driver waits for more
    driver
        .event_queue()
        .enqueue(CompilationEvent::compilation_started(&compilation))
        .unwrap();
    let handle = driver.start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    driver.dispose();

    let result = handle.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert!(driver.diagnostic_queue().is_completed());
}

#[test]
fn test_execution_timing_is_recorded() {
    init_logger();
    let compilation = class_with_methods(1, 2);
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let analyzer = AnalyzerRef::new(MethodReporter);

    let driver = AnalyzerDriver::builder(
        vec![analyzer],
        raw_kind_classifier(),
        Arc::new(AnalyzerManager::new()),
    )
    .options(DriverOptions {
        log_analyzer_execution_time: true,
        ..Default::default()
    })
    .build();
    for event in compilation_events(&compilation) {
        driver.event_queue().enqueue(event).unwrap();
    }
    runtime.block_on(driver.run()).unwrap();

    let timings = driver.analyzer_timings();
    assert_eq!(timings.len(), 1);
    assert_eq!(timings[0].analyzer, "MethodReporter");
    // supported_diagnostics, initialize, and one symbol action per method
    assert_eq!(timings[0].invocation_count, 4);
}

/// Counts invocations of a symbol action registered for the highest indexed kinds
struct HighKindAnalyzer {
    invocations: Arc<AtomicUsize>,
}

impl DiagnosticAnalyzer for HighKindAnalyzer {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("H1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let invocations = self.invocations.clone();
        context.register_symbol_action(
            move |_| {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            [SymbolKind(100), SymbolKind(101)],
        );
        Ok(())
    }
}

#[test]
fn test_symbol_kind_at_ceiling_is_analyzed() {
    init_logger();
    let first = MemoryNode::new(METHOD, TextSpan::new(0, 10)).into_ref();
    let second = MemoryNode::new(METHOD, TextSpan::new(10, 20)).into_ref();
    let root = MemoryNode::new(CLASS, TextSpan::new(0, 20))
        .with_child(first.clone())
        .with_child(second.clone())
        .into_ref();
    let tree = MemoryTree::new("Kinds.cs", root);
    let compilation = MemoryCompilation::builder(1)
        .tree(tree.clone())
        .symbol(
            MemorySymbol::builder(1, "AtCeiling", SymbolKind(100))
                .declared_at(&tree, &first)
                .build(),
        )
        .symbol(
            MemorySymbol::builder(2, "AboveCeiling", SymbolKind(101))
                .declared_at(&tree, &second)
                .build(),
        )
        .build();

    let invocations = Arc::new(AtomicUsize::new(0));
    get_diagnostics(
        &compilation,
        vec![AnalyzerRef::new(HighKindAnalyzer {
            invocations: invocations.clone(),
        })],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

/// Reports `U1` once per completed source unit
struct UnitReporter;

impl DiagnosticAnalyzer for UnitReporter {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("U1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let descriptor = Arc::new(descriptor("U1"));
        context.register_semantic_model_action(move |model_context| {
            let tree = model_context.semantic_model().syntax_tree();
            let location = Location::source(tree.path(), tree.root().span());
            model_context.report_diagnostic(Diagnostic::create(&descriptor, location, &[tree.path()]))?;
            Ok(())
        });
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_semantic_model_actions_run_per_unit() {
    init_logger();
    let mut builder = MemoryCompilation::builder(1);
    for (id, path) in [(1, "A.cs"), (2, "B.cs")] {
        let root = MemoryNode::new(CLASS, TextSpan::new(0, 10)).into_ref();
        let tree = MemoryTree::new(path, root.clone());
        builder = builder.tree(tree.clone()).symbol(
            MemorySymbol::builder(id, path.trim_end_matches(".cs"), SymbolKind::NAMED_TYPE)
                .declared_at(&tree, &root)
                .build(),
        );
    }
    let compilation = builder.build();

    let driver = AnalyzerDriver::builder(
        vec![AnalyzerRef::new(UnitReporter)],
        raw_kind_classifier(),
        Arc::new(AnalyzerManager::new()),
    )
    .build();
    let mut units: Vec<Arc<CompilationUnitCompletedEvent>> = Vec::new();
    for event in compilation_events(&compilation) {
        if let CompilationEvent::CompilationUnitCompleted(unit) = &event {
            units.push(unit.clone());
        }
        driver.event_queue().enqueue(event).unwrap();
    }
    driver.run().await.unwrap();

    let mut messages: Vec<_> = driver.get_diagnostics().into_iter().map(|d| d.message).collect();
    messages.sort();
    assert_eq!(messages, vec!["Found A.cs", "Found B.cs"]);
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|unit| !unit.is_cached()));
}

/// Counts methods, then reports the total when the compilation ends
struct TotalReporter;

impl DiagnosticAnalyzer for TotalReporter {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("E1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let descriptor = Arc::new(descriptor("E1"));
        context.register_compilation_start_action(move |start| {
            let methods = Arc::new(AtomicUsize::new(0));
            let counter = methods.clone();
            start.register_symbol_action(
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                [SymbolKind::METHOD],
            );
            let descriptor = descriptor.clone();
            start.register_compilation_end_action(move |end| {
                let total = methods.load(Ordering::SeqCst);
                end.report_diagnostic(Diagnostic::create(&descriptor, Location::None, &[total]))?;
                Ok(())
            });
            Ok(())
        });
        Ok(())
    }
}

#[test]
fn test_compilation_end_diagnostics_are_retrieved() {
    init_logger();
    let diagnostics = get_diagnostics(
        &class_with_methods(1, 4),
        vec![AnalyzerRef::new(TotalReporter)],
        DriverOptions::default(),
        Arc::new(AnalyzerManager::new()),
        raw_kind_classifier(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].id(), "E1");
    assert_eq!(diagnostics[0].message, "Found 4");
    assert_eq!(diagnostics[0].location, Location::None);
}

/// Records which declarations get a code block, and the statements inside them
struct CodeBlockRecorder {
    owners: Arc<Mutex<Vec<String>>>,
    statements: Arc<AtomicUsize>,
}

impl DiagnosticAnalyzer for CodeBlockRecorder {
    fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
        vec![descriptor("B1")]
    }

    fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
        let owners = self.owners.clone();
        let statements = self.statements.clone();
        context.register_code_block_start_action::<u16, _>(move |start| {
            let statements = statements.clone();
            start.register_syntax_node_action(
                move |_| {
                    statements.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                [STATEMENT],
            );
            let owners = owners.clone();
            start.register_code_block_end_action(move |block| {
                owners.lock().push(block.owning_symbol().name().to_string());
                Ok(())
            });
            Ok(())
        });

        let descriptor = Arc::new(descriptor("B1"));
        context.register_code_block_action(move |block| {
            let location = Location::source("Members.cs", block.code_block().span());
            block.report_diagnostic(Diagnostic::create(
                &descriptor,
                location,
                &[block.owning_symbol().name()],
            ))?;
            Ok(())
        });
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_code_blocks_run_for_methods_fields_and_field_like_events() {
    init_logger();
    const FIELD: u16 = 4;
    const EVENT: u16 = 5;
    const PROPERTY: u16 = 6;

    let mut root = MemoryNode::new(CLASS, TextSpan::new(0, 100));
    let mut members = Vec::new();
    let shapes = [
        ("M", METHOD, SymbolKind::METHOD, false),
        ("F", FIELD, SymbolKind::FIELD, false),
        ("E", EVENT, SymbolKind::EVENT, true),
        ("Custom", EVENT, SymbolKind::EVENT, false),
        ("P", PROPERTY, SymbolKind::PROPERTY, false),
    ];
    for (i, shape) in shapes.iter().enumerate() {
        let start = 10 + i * 10;
        let statement = MemoryNode::new(STATEMENT, TextSpan::new(start + 2, start + 8)).into_ref();
        let node = MemoryNode::new(shape.1, TextSpan::new(start, start + 10))
            .with_child(statement)
            .into_ref();
        root = root.with_child(node.clone());
        members.push(node);
    }
    let root = root.into_ref();
    let tree = MemoryTree::new("Members.cs", root.clone());

    let class = MemorySymbol::builder(1, "Members", SymbolKind::NAMED_TYPE)
        .declared_at(&tree, &root)
        .build();
    let mut builder = MemoryCompilation::builder(1).tree(tree.clone()).symbol(class.clone());
    for (i, ((name, _, kind, field_like), node)) in shapes.iter().zip(&members).enumerate() {
        let mut symbol = MemorySymbol::builder(2 + i as u64, *name, *kind)
            .containing(&class)
            .declared_at(&tree, node);
        if *field_like {
            symbol = symbol.field_like_event();
        }
        builder = builder.symbol(symbol.build());
    }
    let compilation = builder.build();

    let owners = Arc::new(Mutex::new(Vec::new()));
    let statements = Arc::new(AtomicUsize::new(0));
    let driver = AnalyzerDriver::builder(
        vec![AnalyzerRef::new(CodeBlockRecorder {
            owners: owners.clone(),
            statements: statements.clone(),
        })],
        raw_kind_classifier(),
        Arc::new(AnalyzerManager::new()),
    )
    .build();
    let mut declarations: Vec<Arc<SymbolDeclaredEvent>> = Vec::new();
    for event in compilation_events(&compilation) {
        if let CompilationEvent::SymbolDeclared(declared) = &event {
            declarations.push(declared.clone());
        }
        driver.event_queue().enqueue(event).unwrap();
    }
    driver.run().await.unwrap();

    let mut owners = owners.lock().clone();
    owners.sort();
    assert_eq!(owners, vec!["E", "F", "M"]);
    assert_eq!(statements.load(Ordering::SeqCst), 3);

    let mut messages: Vec<_> = driver.get_diagnostics().into_iter().map(|d| d.message).collect();
    messages.sort();
    assert_eq!(messages, vec!["Found E", "Found F", "Found M"]);

    assert_eq!(declarations.len(), 6);
    assert!(declarations
        .iter()
        .all(|declared| declared.cached_semantic_model_count() == 0));
}
