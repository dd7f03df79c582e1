//! Analyzer execution engine
//!
//! Analyzers register callbacks ("actions") once per session and, optionally,
//! once per compilation. The driver dispatches compilation events to those
//! actions on a pool of workers while the executor contains every callback,
//! so a faulting analyzer turns into an `AD0001` diagnostic instead of taking
//! the compilation down.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                AnalyzerDriver                 │
//! │  event queue ──► workers ──► diagnostic queue │
//! │        │             │                        │
//! │        ▼             ▼                        │
//! │  AnalyzerManager   AnalyzerExecutor           │
//! │  (cached scopes)   (containment, timing)      │
//! │        │             │                        │
//! │        └──────┬──────┘                        │
//! │               ▼                               │
//! │       DiagnosticAnalyzer                      │
//! └───────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod analyzer;
pub mod compilation_data;
pub mod context;
pub mod driver;
pub mod events;
pub mod executor;
pub mod manager;
pub mod scope;

pub use actions::{
    get_node_actions_by_kind, ActionResult, AnalyzerActionCounts, AnalyzerActions, CodeBlockAction,
    CodeBlockStartAction, CompilationEndAction, CompilationStartAction, SemanticModelAction,
    SymbolAction, SyntaxKind, SyntaxNodeAction, SyntaxTreeAction,
};
pub use analyzer::{AnalyzerAndOptions, AnalyzerRef, DiagnosticAnalyzer};
pub use compilation_data::CompilationData;
pub use context::{
    AnalysisContext, CodeBlockAnalysisContext, CodeBlockStartAnalysisContext,
    CompilationAnalysisContext, CompilationStartAnalysisContext, DiagnosticReporter,
    DiagnosticSink, SemanticModelAnalysisContext, SymbolAnalysisContext,
    SyntaxNodeAnalysisContext, SyntaxTreeAnalysisContext, UnsupportedDiagnostic,
};
pub use driver::{
    filter_diagnostics, raw_kind_classifier, AnalyzerDriver, AnalyzerDriverBuilder, DriverError,
    DriverOptions, SyntaxKindClassifier, MAX_SYMBOL_KIND,
};
pub use events::{compilation_events, CompilationEvent};
pub use executor::{
    AnalyzerExceptionHandler, AnalyzerExecutor, AnalyzerTiming, ExecutionOutcome, FailureKind,
    FaultCause, ANALYZER_DRIVER_EXCEPTION_DIAGNOSTIC_ID, ANALYZER_EXCEPTION_DIAGNOSTIC_ID,
};
pub use manager::AnalyzerManager;
pub use scope::{
    AnalysisScope, HostCodeBlockStartAnalysisScope, HostCompilationStartAnalysisScope,
    HostSessionStartAnalysisScope,
};
