//! Contexts handed to analyzer callbacks
//!
//! Registration contexts ([`AnalysisContext`], [`CompilationStartAnalysisContext`],
//! [`CodeBlockStartAnalysisContext`]) borrow their scope mutably for the
//! duration of one callback, so registering after the callback has returned
//! is impossible. Action contexts carry the subject being analyzed, the
//! analyzer options, the cancellation token, and a diagnostic reporter.

use super::actions::*;
use super::analyzer::AnalyzerRef;
use super::scope::{
    AnalysisScope, HostCodeBlockStartAnalysisScope, HostCompilationStartAnalysisScope,
    HostSessionStartAnalysisScope,
};
use crate::core::cancellation::CancellationToken;
use crate::core::options::AnalyzerOptions;
use crate::core::types::Diagnostic;
use crate::model::{
    CompilationRef, SemanticModelRef, SymbolKind, SymbolRef, SyntaxNodeRef, SyntaxTreeRef,
};
use std::sync::Arc;
use thiserror::Error;

/// Receives every diagnostic an analyzer reports
pub type DiagnosticSink = Arc<dyn Fn(Diagnostic) + Send + Sync>;

/// Decides whether the reporting analyzer declared a diagnostic's id
pub type SupportedDiagnosticPredicate = Arc<dyn Fn(&Diagnostic) -> bool + Send + Sync>;

/// An analyzer reported a diagnostic it does not declare
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Reported diagnostic with ID '{id}' is not supported by the analyzer.")]
pub struct UnsupportedDiagnostic {
    pub id: String,
}

/// Validates and forwards reported diagnostics
#[derive(Clone)]
pub struct DiagnosticReporter {
    sink: DiagnosticSink,
    is_supported: SupportedDiagnosticPredicate,
}

impl DiagnosticReporter {
    pub fn new(sink: DiagnosticSink, is_supported: SupportedDiagnosticPredicate) -> Self {
        Self { sink, is_supported }
    }

    pub fn report(&self, diagnostic: Diagnostic) -> Result<(), UnsupportedDiagnostic> {
        if !(self.is_supported)(&diagnostic) {
            return Err(UnsupportedDiagnostic {
                id: diagnostic.id().to_string(),
            });
        }
        (self.sink)(diagnostic);
        Ok(())
    }
}

/// Registration methods shared by the session and compilation-start contexts
macro_rules! impl_action_registration {
    ($context:ident) => {
        impl<'a> $context<'a> {
            pub fn register_compilation_end_action<F>(&mut self, action: F)
            where
                F: Fn(&CompilationAnalysisContext) -> ActionResult + Send + Sync + 'static,
            {
                self.scope
                    .register_compilation_end_action(self.analyzer.clone(), Arc::new(action));
            }

            pub fn register_semantic_model_action<F>(&mut self, action: F)
            where
                F: Fn(&SemanticModelAnalysisContext) -> ActionResult + Send + Sync + 'static,
            {
                self.scope
                    .register_semantic_model_action(self.analyzer.clone(), Arc::new(action));
            }

            pub fn register_syntax_tree_action<F>(&mut self, action: F)
            where
                F: Fn(&SyntaxTreeAnalysisContext) -> ActionResult + Send + Sync + 'static,
            {
                self.scope
                    .register_syntax_tree_action(self.analyzer.clone(), Arc::new(action));
            }

            pub fn register_symbol_action<F>(
                &mut self,
                action: F,
                kinds: impl IntoIterator<Item = SymbolKind>,
            ) where
                F: Fn(&SymbolAnalysisContext) -> ActionResult + Send + Sync + 'static,
            {
                self.scope.register_symbol_action(
                    self.analyzer.clone(),
                    Arc::new(action),
                    kinds.into_iter().collect(),
                );
            }

            pub fn register_code_block_start_action<K, F>(&mut self, action: F)
            where
                K: SyntaxKind,
                F: Fn(&mut CodeBlockStartAnalysisContext<'_, K>) -> ActionResult
                    + Send
                    + Sync
                    + 'static,
            {
                let callback: CodeBlockStartCallback<K> = Arc::new(action);
                self.scope
                    .register_code_block_start_action(self.analyzer.clone(), callback);
            }

            pub fn register_code_block_action<F>(&mut self, action: F)
            where
                F: Fn(&CodeBlockAnalysisContext) -> ActionResult + Send + Sync + 'static,
            {
                self.scope
                    .register_code_block_action(self.analyzer.clone(), Arc::new(action));
            }

            pub fn register_syntax_node_action<K, F>(
                &mut self,
                action: F,
                kinds: impl IntoIterator<Item = K>,
            ) where
                K: SyntaxKind,
                F: Fn(&SyntaxNodeAnalysisContext) -> ActionResult + Send + Sync + 'static,
            {
                self.scope.register_syntax_node_action(
                    self.analyzer.clone(),
                    Arc::new(action),
                    kinds.into_iter().collect::<Vec<K>>(),
                );
            }
        }
    };
}

/// Passed to [`DiagnosticAnalyzer::initialize`](super::analyzer::DiagnosticAnalyzer::initialize)
pub struct AnalysisContext<'a> {
    analyzer: AnalyzerRef,
    scope: &'a mut HostSessionStartAnalysisScope,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(analyzer: AnalyzerRef, scope: &'a mut HostSessionStartAnalysisScope) -> Self {
        Self { analyzer, scope }
    }

    /// Register an action run once per compilation before any other action
    pub fn register_compilation_start_action<F>(&mut self, action: F)
    where
        F: Fn(&mut CompilationStartAnalysisContext<'_>) -> ActionResult + Send + Sync + 'static,
    {
        self.scope
            .register_compilation_start_action(self.analyzer.clone(), Arc::new(action));
    }
}

impl_action_registration!(AnalysisContext);

/// Passed to compilation-start actions
pub struct CompilationStartAnalysisContext<'a> {
    analyzer: AnalyzerRef,
    scope: &'a mut HostCompilationStartAnalysisScope,
    compilation: CompilationRef,
    options: Arc<AnalyzerOptions>,
    cancellation_token: CancellationToken,
}

impl<'a> CompilationStartAnalysisContext<'a> {
    pub fn new(
        analyzer: AnalyzerRef,
        scope: &'a mut HostCompilationStartAnalysisScope,
        compilation: CompilationRef,
        options: Arc<AnalyzerOptions>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            analyzer,
            scope,
            compilation,
            options,
            cancellation_token,
        }
    }

    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }
}

impl_action_registration!(CompilationStartAnalysisContext);

/// Passed to code-block-start actions
pub struct CodeBlockStartAnalysisContext<'a, K> {
    analyzer: AnalyzerRef,
    scope: &'a mut HostCodeBlockStartAnalysisScope<K>,
    code_block: SyntaxNodeRef,
    owning_symbol: SymbolRef,
    semantic_model: SemanticModelRef,
    options: Arc<AnalyzerOptions>,
    cancellation_token: CancellationToken,
}

impl<'a, K: SyntaxKind> CodeBlockStartAnalysisContext<'a, K> {
    pub fn new(
        analyzer: AnalyzerRef,
        scope: &'a mut HostCodeBlockStartAnalysisScope<K>,
        code_block: SyntaxNodeRef,
        owning_symbol: SymbolRef,
        semantic_model: SemanticModelRef,
        options: Arc<AnalyzerOptions>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            analyzer,
            scope,
            code_block,
            owning_symbol,
            semantic_model,
            options,
            cancellation_token,
        }
    }

    pub fn code_block(&self) -> &SyntaxNodeRef {
        &self.code_block
    }

    pub fn owning_symbol(&self) -> &SymbolRef {
        &self.owning_symbol
    }

    pub fn semantic_model(&self) -> &SemanticModelRef {
        &self.semantic_model
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Register an action run after the code block has been analyzed
    pub fn register_code_block_end_action<F>(&mut self, action: F)
    where
        F: Fn(&CodeBlockAnalysisContext) -> ActionResult + Send + Sync + 'static,
    {
        self.scope
            .register_code_block_end_action(self.analyzer.clone(), Arc::new(action));
    }

    /// Register an action run for nodes of `kinds` within this code block only
    pub fn register_syntax_node_action<F>(&mut self, action: F, kinds: impl IntoIterator<Item = K>)
    where
        F: Fn(&SyntaxNodeAnalysisContext) -> ActionResult + Send + Sync + 'static,
    {
        self.scope.register_syntax_node_action(
            self.analyzer.clone(),
            Arc::new(action),
            kinds.into_iter().collect(),
        );
    }
}

/// Accessors every action context has
macro_rules! impl_action_context {
    ($context:ident) => {
        impl $context {
            pub fn options(&self) -> &AnalyzerOptions {
                &self.options
            }

            pub fn cancellation_token(&self) -> &CancellationToken {
                &self.cancellation_token
            }

            /// Report a diagnostic
            ///
            /// Fails if the analyzer does not declare the diagnostic's id; the
            /// failure is then treated as a fault of the analyzer if propagated.
            pub fn report_diagnostic(&self, diagnostic: Diagnostic) -> Result<(), UnsupportedDiagnostic> {
                self.reporter.report(diagnostic)
            }
        }
    };
}

pub struct CompilationAnalysisContext {
    pub(crate) compilation: CompilationRef,
    pub(crate) options: Arc<AnalyzerOptions>,
    pub(crate) reporter: DiagnosticReporter,
    pub(crate) cancellation_token: CancellationToken,
}

impl CompilationAnalysisContext {
    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }
}

impl_action_context!(CompilationAnalysisContext);

pub struct SemanticModelAnalysisContext {
    pub(crate) semantic_model: SemanticModelRef,
    pub(crate) compilation: CompilationRef,
    pub(crate) options: Arc<AnalyzerOptions>,
    pub(crate) reporter: DiagnosticReporter,
    pub(crate) cancellation_token: CancellationToken,
}

impl SemanticModelAnalysisContext {
    pub fn semantic_model(&self) -> &SemanticModelRef {
        &self.semantic_model
    }

    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }
}

impl_action_context!(SemanticModelAnalysisContext);

pub struct SyntaxTreeAnalysisContext {
    pub(crate) tree: SyntaxTreeRef,
    pub(crate) options: Arc<AnalyzerOptions>,
    pub(crate) reporter: DiagnosticReporter,
    pub(crate) cancellation_token: CancellationToken,
}

impl SyntaxTreeAnalysisContext {
    pub fn tree(&self) -> &SyntaxTreeRef {
        &self.tree
    }
}

impl_action_context!(SyntaxTreeAnalysisContext);

pub struct SymbolAnalysisContext {
    pub(crate) symbol: SymbolRef,
    pub(crate) compilation: CompilationRef,
    pub(crate) options: Arc<AnalyzerOptions>,
    pub(crate) reporter: DiagnosticReporter,
    pub(crate) cancellation_token: CancellationToken,
}

impl SymbolAnalysisContext {
    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }

    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }
}

impl_action_context!(SymbolAnalysisContext);

pub struct SyntaxNodeAnalysisContext {
    pub(crate) node: SyntaxNodeRef,
    pub(crate) semantic_model: SemanticModelRef,
    pub(crate) containing_symbol: Option<SymbolRef>,
    pub(crate) options: Arc<AnalyzerOptions>,
    pub(crate) reporter: DiagnosticReporter,
    pub(crate) cancellation_token: CancellationToken,
}

impl SyntaxNodeAnalysisContext {
    pub fn node(&self) -> &SyntaxNodeRef {
        &self.node
    }

    pub fn semantic_model(&self) -> &SemanticModelRef {
        &self.semantic_model
    }

    /// The declared symbol whose declaration contains the node
    pub fn containing_symbol(&self) -> Option<&SymbolRef> {
        self.containing_symbol.as_ref()
    }
}

impl_action_context!(SyntaxNodeAnalysisContext);

pub struct CodeBlockAnalysisContext {
    pub(crate) code_block: SyntaxNodeRef,
    pub(crate) owning_symbol: SymbolRef,
    pub(crate) semantic_model: SemanticModelRef,
    pub(crate) options: Arc<AnalyzerOptions>,
    pub(crate) reporter: DiagnosticReporter,
    pub(crate) cancellation_token: CancellationToken,
}

impl CodeBlockAnalysisContext {
    pub fn code_block(&self) -> &SyntaxNodeRef {
        &self.code_block
    }

    pub fn owning_symbol(&self) -> &SymbolRef {
        &self.owning_symbol
    }

    pub fn semantic_model(&self) -> &SemanticModelRef {
        &self.semantic_model
    }
}

impl_action_context!(CodeBlockAnalysisContext);
