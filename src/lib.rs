//! Analyzer Driver - execution engine for pluggable diagnostic analyzers
//!
//! This library runs third-party analyzers against a compilation produced by
//! a front end:
//! - Registration: analyzers subscribe callbacks to compilations, symbols,
//!   semantic models, syntax trees, syntax nodes, and code blocks
//! - Dispatch: compilation events are fanned out to those callbacks on a pool
//!   of workers
//! - Isolation: analyzer errors and panics become `AD0001` diagnostics
//! - Suppression: diagnostics are filtered through compilation options,
//!   suppression attributes, and their source ranges
//!
//! # Example
//!
//! ```no_run
//! use analyzer_driver::engine::{AnalysisContext, AnalyzerManager, AnalyzerRef, DiagnosticAnalyzer};
//! use analyzer_driver::engine::raw_kind_classifier;
//! use analyzer_driver::model::SymbolKind;
//! use analyzer_driver::{get_diagnostics, CancellationToken, Diagnostic, DiagnosticDescriptor, DiagnosticSeverity, Location};
//! use std::sync::Arc;
//!
//! struct MethodCounter;
//!
//! impl DiagnosticAnalyzer for MethodCounter {
//!     fn supported_diagnostics(&self) -> Vec<DiagnosticDescriptor> {
//!         vec![DiagnosticDescriptor::new("M1", "Method", "Found method {0}", "Usage", DiagnosticSeverity::Warning, true)]
//!     }
//!
//!     fn initialize(&self, context: &mut AnalysisContext<'_>) -> anyhow::Result<()> {
//!         let descriptor = Arc::new(self.supported_diagnostics().remove(0));
//!         context.register_symbol_action(
//!             move |symbol_context| {
//!                 let name = symbol_context.symbol().name().to_string();
//!                 symbol_context.report_diagnostic(Diagnostic::create(&descriptor, Location::None, &[name]))?;
//!                 Ok(())
//!             },
//!             [SymbolKind::METHOD],
//!         );
//!         Ok(())
//!     }
//! }
//!
//! # fn compilation() -> analyzer_driver::model::CompilationRef { unimplemented!() }
//! let diagnostics = get_diagnostics(
//!     &compilation(),
//!     vec![AnalyzerRef::new(MethodCounter)],
//!     Default::default(),
//!     Arc::new(AnalyzerManager::new()),
//!     raw_kind_classifier(),
//!     &CancellationToken::new(),
//! )
//! .unwrap();
//!
//! for diagnostic in diagnostics {
//!     println!("{}: {}", diagnostic.id(), diagnostic.message);
//! }
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod model;

// Re-export main types
pub use crate::config::{Config, ConfigError, CONFIG_FILE_NAME};
pub use crate::core::{
    AnalyzerOptions, AsyncQueue, CancellationToken, CompilationOptions, Diagnostic,
    DiagnosticDescriptor, DiagnosticSeverity, Location, OperationCanceled, ReportDiagnostic,
    SuppressMessageAttributeState, TextSpan,
};
pub use crate::engine::{
    AnalyzerDriver, AnalyzerManager, AnalyzerRef, DiagnosticAnalyzer, DriverError, DriverOptions,
    SyntaxKind, SyntaxKindClassifier,
};

use crate::engine::events::compilation_events;
use crate::model::{CompilationRef, SymbolRef};
use std::sync::Arc;

/// Run `analyzers` over `compilation` and return the filtered diagnostics
///
/// Blocks on a private multi-threaded runtime. From async code use
/// [`get_diagnostics_async`].
pub fn get_diagnostics<K: SyntaxKind>(
    compilation: &CompilationRef,
    analyzers: Vec<AnalyzerRef>,
    options: DriverOptions,
    manager: Arc<AnalyzerManager>,
    get_kind: SyntaxKindClassifier<K>,
    cancellation_token: &CancellationToken,
) -> Result<Vec<Diagnostic>, DriverError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(get_diagnostics_async(
        compilation,
        analyzers,
        options,
        manager,
        get_kind,
        cancellation_token,
    ))
}

/// Feed the full event stream of `compilation` to a fresh driver and collect its diagnostics
pub async fn get_diagnostics_async<K: SyntaxKind>(
    compilation: &CompilationRef,
    analyzers: Vec<AnalyzerRef>,
    options: DriverOptions,
    manager: Arc<AnalyzerManager>,
    get_kind: SyntaxKindClassifier<K>,
    cancellation_token: &CancellationToken,
) -> Result<Vec<Diagnostic>, DriverError> {
    let driver = AnalyzerDriver::builder(analyzers, get_kind, manager)
        .options(options)
        .cancellation_token(cancellation_token)
        .build();

    for event in compilation_events(compilation) {
        driver.event_queue().enqueue(event)?;
    }
    driver.event_queue().complete();

    driver.run().await?;
    Ok(driver.get_diagnostics())
}

/// Whether `diagnostic` is suppressed in `compilation`
///
/// Checks suppression attributes on `symbol` (and its containers) when one is
/// given, then the source range the diagnostic was reported at.
pub fn is_diagnostic_suppressed(
    compilation: &CompilationRef,
    diagnostic: &Diagnostic,
    symbol: Option<&SymbolRef>,
) -> bool {
    let state = SuppressMessageAttributeState::new(compilation.clone());
    state.is_diagnostic_suppressed(diagnostic, symbol)
        || state.is_diagnostic_syntactically_suppressed(diagnostic.id(), &diagnostic.location)
}
