//! Registration scopes
//!
//! A scope accumulates the actions registered while an analyzer (or one of
//! its start actions) runs. Scopes are filled through `&mut` registration
//! contexts and then frozen behind an `Arc`, so nothing can be registered
//! into a scope once other threads can see it.

use super::actions::*;
use super::analyzer::AnalyzerRef;
use crate::model::SymbolKind;
use std::sync::Arc;

/// Registration operations shared by the session and compilation scopes
pub trait AnalysisScope {
    fn actions_mut(&mut self) -> &mut AnalyzerActions;

    fn register_compilation_end_action(&mut self, analyzer: AnalyzerRef, callback: CompilationCallback) {
        self.actions_mut()
            .compilation_end_actions
            .push(CompilationEndAction { analyzer, callback });
    }

    fn register_semantic_model_action(&mut self, analyzer: AnalyzerRef, callback: SemanticModelCallback) {
        self.actions_mut()
            .semantic_model_actions
            .push(SemanticModelAction { analyzer, callback });
    }

    fn register_syntax_tree_action(&mut self, analyzer: AnalyzerRef, callback: SyntaxTreeCallback) {
        self.actions_mut()
            .syntax_tree_actions
            .push(SyntaxTreeAction { analyzer, callback });
    }

    fn register_symbol_action(
        &mut self,
        analyzer: AnalyzerRef,
        callback: SymbolCallback,
        kinds: Vec<SymbolKind>,
    ) {
        self.actions_mut().symbol_actions.push(SymbolAction {
            analyzer,
            callback,
            kinds,
        });
    }

    fn register_code_block_start_action<K: SyntaxKind>(
        &mut self,
        analyzer: AnalyzerRef,
        callback: CodeBlockStartCallback<K>,
    ) where
        Self: Sized,
    {
        self.actions_mut()
            .add_code_block_start_action(CodeBlockStartAction { analyzer, callback });
    }

    fn register_code_block_action(&mut self, analyzer: AnalyzerRef, callback: CodeBlockCallback) {
        self.actions_mut()
            .code_block_actions
            .push(CodeBlockAction { analyzer, callback });
    }

    fn register_syntax_node_action<K: SyntaxKind>(
        &mut self,
        analyzer: AnalyzerRef,
        callback: SyntaxNodeCallback,
        kinds: Vec<K>,
    ) where
        Self: Sized,
    {
        self.actions_mut().add_syntax_node_action(SyntaxNodeAction {
            analyzer,
            callback,
            kinds,
        });
    }
}

/// Actions registered by analyzers' `initialize`
#[derive(Debug, Default)]
pub struct HostSessionStartAnalysisScope {
    actions: AnalyzerActions,
}

impl HostSessionStartAnalysisScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only analyzers' `initialize` may register compilation-start actions
    pub fn register_compilation_start_action(
        &mut self,
        analyzer: AnalyzerRef,
        callback: CompilationStartCallback,
    ) {
        self.actions
            .compilation_start_actions
            .push(CompilationStartAction { analyzer, callback });
    }

    pub fn actions(&self) -> &AnalyzerActions {
        &self.actions
    }

    pub fn compilation_start_actions(&self) -> &[CompilationStartAction] {
        self.actions.compilation_start_actions()
    }

    pub fn compilation_end_actions(&self) -> &[CompilationEndAction] {
        self.actions.compilation_end_actions()
    }

    pub fn semantic_model_actions(&self) -> &[SemanticModelAction] {
        self.actions.semantic_model_actions()
    }

    pub fn syntax_tree_actions(&self) -> &[SyntaxTreeAction] {
        self.actions.syntax_tree_actions()
    }

    pub fn symbol_actions(&self) -> &[SymbolAction] {
        self.actions.symbol_actions()
    }

    pub fn code_block_actions(&self) -> &[CodeBlockAction] {
        self.actions.code_block_actions()
    }

    pub fn code_block_start_actions<K: SyntaxKind>(&self) -> Vec<CodeBlockStartAction<K>> {
        self.actions.code_block_start_actions()
    }

    pub fn syntax_node_actions<K: SyntaxKind>(&self) -> Vec<SyntaxNodeAction<K>> {
        self.actions.syntax_node_actions()
    }

    pub fn has_compilation_start_actions(&self, analyzer: &AnalyzerRef) -> bool {
        self.actions
            .compilation_start_actions
            .iter()
            .any(|a| &a.analyzer == analyzer)
    }

    pub fn get_analyzer_actions(&self, analyzer: &AnalyzerRef) -> AnalyzerActions {
        self.actions.for_analyzer(analyzer)
    }
}

impl AnalysisScope for HostSessionStartAnalysisScope {
    fn actions_mut(&mut self) -> &mut AnalyzerActions {
        &mut self.actions
    }
}

/// Actions registered by compilation-start actions, layered over the session scope
///
/// Accessors return the session's actions first, then this scope's own.
#[derive(Debug)]
pub struct HostCompilationStartAnalysisScope {
    actions: AnalyzerActions,
    session: Arc<HostSessionStartAnalysisScope>,
}

impl HostCompilationStartAnalysisScope {
    pub fn new(session: Arc<HostSessionStartAnalysisScope>) -> Self {
        Self {
            actions: AnalyzerActions::new(),
            session,
        }
    }

    pub fn session_scope(&self) -> &Arc<HostSessionStartAnalysisScope> {
        &self.session
    }

    /// Actions registered directly on this scope
    pub fn own_actions(&self) -> &AnalyzerActions {
        &self.actions
    }

    pub(crate) fn restore(&mut self, snapshot: AnalyzerActions) {
        self.actions = snapshot;
    }

    pub fn compilation_end_actions(&self) -> Vec<CompilationEndAction> {
        concat(
            self.session.compilation_end_actions(),
            self.actions.compilation_end_actions(),
        )
    }

    pub fn semantic_model_actions(&self) -> Vec<SemanticModelAction> {
        concat(
            self.session.semantic_model_actions(),
            self.actions.semantic_model_actions(),
        )
    }

    pub fn syntax_tree_actions(&self) -> Vec<SyntaxTreeAction> {
        concat(
            self.session.syntax_tree_actions(),
            self.actions.syntax_tree_actions(),
        )
    }

    pub fn symbol_actions(&self) -> Vec<SymbolAction> {
        concat(self.session.symbol_actions(), self.actions.symbol_actions())
    }

    pub fn code_block_actions(&self) -> Vec<CodeBlockAction> {
        concat(
            self.session.code_block_actions(),
            self.actions.code_block_actions(),
        )
    }

    pub fn code_block_start_actions<K: SyntaxKind>(&self) -> Vec<CodeBlockStartAction<K>> {
        let mut actions = self.session.code_block_start_actions();
        actions.extend(self.actions.code_block_start_actions());
        actions
    }

    pub fn syntax_node_actions<K: SyntaxKind>(&self) -> Vec<SyntaxNodeAction<K>> {
        let mut actions = self.session.syntax_node_actions();
        actions.extend(self.actions.syntax_node_actions());
        actions
    }

    /// Session actions of `analyzer` followed by its compilation actions
    pub fn get_analyzer_actions(&self, analyzer: &AnalyzerRef) -> AnalyzerActions {
        self.session
            .get_analyzer_actions(analyzer)
            .append(&self.actions.for_analyzer(analyzer))
    }
}

impl AnalysisScope for HostCompilationStartAnalysisScope {
    fn actions_mut(&mut self) -> &mut AnalyzerActions {
        &mut self.actions
    }
}

fn concat<T: Clone>(first: &[T], second: &[T]) -> Vec<T> {
    first.iter().chain(second).cloned().collect()
}

/// Actions registered by one code-block-start action for one code block
pub struct HostCodeBlockStartAnalysisScope<K> {
    code_block_end_actions: Vec<CodeBlockAction>,
    syntax_node_actions: Vec<SyntaxNodeAction<K>>,
}

impl<K: SyntaxKind> HostCodeBlockStartAnalysisScope<K> {
    pub fn new() -> Self {
        Self {
            code_block_end_actions: Vec::new(),
            syntax_node_actions: Vec::new(),
        }
    }

    pub fn register_code_block_end_action(&mut self, analyzer: AnalyzerRef, callback: CodeBlockCallback) {
        self.code_block_end_actions
            .push(CodeBlockAction { analyzer, callback });
    }

    pub fn register_syntax_node_action(
        &mut self,
        analyzer: AnalyzerRef,
        callback: SyntaxNodeCallback,
        kinds: Vec<K>,
    ) {
        self.syntax_node_actions.push(SyntaxNodeAction {
            analyzer,
            callback,
            kinds,
        });
    }

    pub fn code_block_end_actions(&self) -> &[CodeBlockAction] {
        &self.code_block_end_actions
    }

    pub fn syntax_node_actions(&self) -> &[SyntaxNodeAction<K>] {
        &self.syntax_node_actions
    }

    pub fn into_parts(self) -> (Vec<CodeBlockAction>, Vec<SyntaxNodeAction<K>>) {
        (self.code_block_end_actions, self.syntax_node_actions)
    }
}

impl<K: SyntaxKind> Default for HostCodeBlockStartAnalysisScope<K> {
    fn default() -> Self {
        Self::new()
    }
}
