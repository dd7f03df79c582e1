//! Registered analyzer actions
//!
//! An action is a callback plus the analyzer that registered it and, for
//! symbol and syntax-node actions, the kinds it is interested in. Callbacks
//! are stored as shared closures so action sets can be cloned and merged
//! cheaply.
//!
//! Syntax-node and code-block-start actions are generic over the host
//! language's syntax kind. [`AnalyzerActions`] stores them type-erased and
//! hands them back through [`AnalyzerActions::syntax_node_actions`] and
//! [`AnalyzerActions::code_block_start_actions`] for the kind type the
//! driver was built with.

use super::analyzer::AnalyzerRef;
use super::context::{
    CodeBlockAnalysisContext, CodeBlockStartAnalysisContext, CompilationAnalysisContext,
    CompilationStartAnalysisContext, SemanticModelAnalysisContext, SymbolAnalysisContext,
    SyntaxNodeAnalysisContext, SyntaxTreeAnalysisContext,
};
use crate::model::SymbolKind;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Result returned by every analyzer callback
pub type ActionResult = anyhow::Result<()>;

/// A host language's syntax kind
pub trait SyntaxKind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> SyntaxKind for T where T: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

pub type CompilationStartCallback =
    Arc<dyn Fn(&mut CompilationStartAnalysisContext<'_>) -> ActionResult + Send + Sync>;
pub type CompilationCallback = Arc<dyn Fn(&CompilationAnalysisContext) -> ActionResult + Send + Sync>;
pub type SemanticModelCallback =
    Arc<dyn Fn(&SemanticModelAnalysisContext) -> ActionResult + Send + Sync>;
pub type SyntaxTreeCallback = Arc<dyn Fn(&SyntaxTreeAnalysisContext) -> ActionResult + Send + Sync>;
pub type SymbolCallback = Arc<dyn Fn(&SymbolAnalysisContext) -> ActionResult + Send + Sync>;
pub type CodeBlockStartCallback<K> =
    Arc<dyn Fn(&mut CodeBlockStartAnalysisContext<'_, K>) -> ActionResult + Send + Sync>;
pub type CodeBlockCallback = Arc<dyn Fn(&CodeBlockAnalysisContext) -> ActionResult + Send + Sync>;
pub type SyntaxNodeCallback = Arc<dyn Fn(&SyntaxNodeAnalysisContext) -> ActionResult + Send + Sync>;

#[derive(Clone)]
pub struct CompilationStartAction {
    pub analyzer: AnalyzerRef,
    pub callback: CompilationStartCallback,
}

/// Runs once after every other event of a compilation has been processed
#[derive(Clone)]
pub struct CompilationEndAction {
    pub analyzer: AnalyzerRef,
    pub callback: CompilationCallback,
}

#[derive(Clone)]
pub struct SemanticModelAction {
    pub analyzer: AnalyzerRef,
    pub callback: SemanticModelCallback,
}

#[derive(Clone)]
pub struct SyntaxTreeAction {
    pub analyzer: AnalyzerRef,
    pub callback: SyntaxTreeCallback,
}

/// Runs for every declared symbol whose kind is in `kinds`
#[derive(Clone)]
pub struct SymbolAction {
    pub analyzer: AnalyzerRef,
    pub callback: SymbolCallback,
    pub kinds: Vec<SymbolKind>,
}

/// Runs at the start of each code block and may register per-block actions
#[derive(Clone)]
pub struct CodeBlockStartAction<K> {
    pub analyzer: AnalyzerRef,
    pub callback: CodeBlockStartCallback<K>,
}

/// Runs once a code block has been fully analyzed
///
/// Used both for code-block actions registered on a session or compilation
/// scope and for code-block-end actions registered by a code-block-start action.
#[derive(Clone)]
pub struct CodeBlockAction {
    pub analyzer: AnalyzerRef,
    pub callback: CodeBlockCallback,
}

/// Runs for every node whose kind is in `kinds`
#[derive(Clone)]
pub struct SyntaxNodeAction<K> {
    pub analyzer: AnalyzerRef,
    pub callback: SyntaxNodeCallback,
    pub kinds: Vec<K>,
}

/// Group syntax-node actions by the kinds they subscribe to
///
/// An action listing a kind more than once is still invoked once per node.
pub fn get_node_actions_by_kind<K: SyntaxKind>(
    actions: &[SyntaxNodeAction<K>],
) -> HashMap<K, Vec<SyntaxNodeAction<K>>> {
    let mut by_kind: HashMap<K, Vec<SyntaxNodeAction<K>>> = HashMap::new();
    for action in actions {
        let mut seen = Vec::with_capacity(action.kinds.len());
        for kind in &action.kinds {
            if seen.contains(kind) {
                continue;
            }
            seen.push(*kind);
            by_kind.entry(*kind).or_default().push(action.clone());
        }
    }
    by_kind
}

#[derive(Clone)]
struct ErasedAction {
    analyzer: AnalyzerRef,
    action: Arc<dyn Any + Send + Sync>,
}

impl ErasedAction {
    fn new<A: Any + Send + Sync>(analyzer: AnalyzerRef, action: A) -> Self {
        Self {
            analyzer,
            action: Arc::new(action),
        }
    }

    fn downcast<A: Any + Clone>(&self) -> Option<A> {
        self.action.downcast_ref::<A>().cloned()
    }
}

/// Action counts for one analyzer, reported with execution statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerActionCounts {
    pub compilation_start_actions: usize,
    pub compilation_end_actions: usize,
    pub semantic_model_actions: usize,
    pub syntax_tree_actions: usize,
    pub symbol_actions: usize,
    pub code_block_start_actions: usize,
    pub code_block_actions: usize,
    pub syntax_node_actions: usize,
}

impl AnalyzerActionCounts {
    pub fn total(&self) -> usize {
        self.compilation_start_actions
            + self.compilation_end_actions
            + self.semantic_model_actions
            + self.syntax_tree_actions
            + self.symbol_actions
            + self.code_block_start_actions
            + self.code_block_actions
            + self.syntax_node_actions
    }
}

/// A set of registered actions, in registration order per kind
#[derive(Clone, Default)]
pub struct AnalyzerActions {
    pub(crate) compilation_start_actions: Vec<CompilationStartAction>,
    pub(crate) compilation_end_actions: Vec<CompilationEndAction>,
    pub(crate) semantic_model_actions: Vec<SemanticModelAction>,
    pub(crate) syntax_tree_actions: Vec<SyntaxTreeAction>,
    pub(crate) symbol_actions: Vec<SymbolAction>,
    code_block_start_actions: Vec<ErasedAction>,
    pub(crate) code_block_actions: Vec<CodeBlockAction>,
    syntax_node_actions: Vec<ErasedAction>,
}

impl AnalyzerActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compilation_start_actions(&self) -> &[CompilationStartAction] {
        &self.compilation_start_actions
    }

    pub fn compilation_end_actions(&self) -> &[CompilationEndAction] {
        &self.compilation_end_actions
    }

    pub fn semantic_model_actions(&self) -> &[SemanticModelAction] {
        &self.semantic_model_actions
    }

    pub fn syntax_tree_actions(&self) -> &[SyntaxTreeAction] {
        &self.syntax_tree_actions
    }

    pub fn symbol_actions(&self) -> &[SymbolAction] {
        &self.symbol_actions
    }

    pub fn code_block_actions(&self) -> &[CodeBlockAction] {
        &self.code_block_actions
    }

    /// Code-block-start actions registered for kind type `K`
    ///
    /// Actions registered with a different kind type are not returned.
    pub fn code_block_start_actions<K: SyntaxKind>(&self) -> Vec<CodeBlockStartAction<K>> {
        self.code_block_start_actions
            .iter()
            .filter_map(|a| a.downcast::<CodeBlockStartAction<K>>())
            .collect()
    }

    /// Syntax-node actions registered for kind type `K`
    pub fn syntax_node_actions<K: SyntaxKind>(&self) -> Vec<SyntaxNodeAction<K>> {
        self.syntax_node_actions
            .iter()
            .filter_map(|a| a.downcast::<SyntaxNodeAction<K>>())
            .collect()
    }

    pub(crate) fn add_code_block_start_action<K: SyntaxKind>(&mut self, action: CodeBlockStartAction<K>) {
        let analyzer = action.analyzer.clone();
        self.code_block_start_actions
            .push(ErasedAction::new(analyzer, action));
    }

    pub(crate) fn add_syntax_node_action<K: SyntaxKind>(&mut self, action: SyntaxNodeAction<K>) {
        let analyzer = action.analyzer.clone();
        self.syntax_node_actions.push(ErasedAction::new(analyzer, action));
    }

    /// Concatenate `other` after this set
    pub fn append(&self, other: &AnalyzerActions) -> AnalyzerActions {
        fn concat<T: Clone>(first: &[T], second: &[T]) -> Vec<T> {
            first.iter().chain(second).cloned().collect()
        }

        AnalyzerActions {
            compilation_start_actions: concat(
                &self.compilation_start_actions,
                &other.compilation_start_actions,
            ),
            compilation_end_actions: concat(
                &self.compilation_end_actions,
                &other.compilation_end_actions,
            ),
            semantic_model_actions: concat(&self.semantic_model_actions, &other.semantic_model_actions),
            syntax_tree_actions: concat(&self.syntax_tree_actions, &other.syntax_tree_actions),
            symbol_actions: concat(&self.symbol_actions, &other.symbol_actions),
            code_block_start_actions: concat(
                &self.code_block_start_actions,
                &other.code_block_start_actions,
            ),
            code_block_actions: concat(&self.code_block_actions, &other.code_block_actions),
            syntax_node_actions: concat(&self.syntax_node_actions, &other.syntax_node_actions),
        }
    }

    /// The subset registered by `analyzer`
    pub fn for_analyzer(&self, analyzer: &AnalyzerRef) -> AnalyzerActions {
        fn keep<T: Clone>(actions: &[T], analyzer: &AnalyzerRef, owner: impl Fn(&T) -> &AnalyzerRef) -> Vec<T> {
            actions
                .iter()
                .filter(|a| owner(a) == analyzer)
                .cloned()
                .collect()
        }

        AnalyzerActions {
            compilation_start_actions: keep(&self.compilation_start_actions, analyzer, |a| &a.analyzer),
            compilation_end_actions: keep(&self.compilation_end_actions, analyzer, |a| &a.analyzer),
            semantic_model_actions: keep(&self.semantic_model_actions, analyzer, |a| &a.analyzer),
            syntax_tree_actions: keep(&self.syntax_tree_actions, analyzer, |a| &a.analyzer),
            symbol_actions: keep(&self.symbol_actions, analyzer, |a| &a.analyzer),
            code_block_start_actions: keep(&self.code_block_start_actions, analyzer, |a| &a.analyzer),
            code_block_actions: keep(&self.code_block_actions, analyzer, |a| &a.analyzer),
            syntax_node_actions: keep(&self.syntax_node_actions, analyzer, |a| &a.analyzer),
        }
    }

    pub fn counts(&self) -> AnalyzerActionCounts {
        AnalyzerActionCounts {
            compilation_start_actions: self.compilation_start_actions.len(),
            compilation_end_actions: self.compilation_end_actions.len(),
            semantic_model_actions: self.semantic_model_actions.len(),
            syntax_tree_actions: self.syntax_tree_actions.len(),
            symbol_actions: self.symbol_actions.len(),
            code_block_start_actions: self.code_block_start_actions.len(),
            code_block_actions: self.code_block_actions.len(),
            syntax_node_actions: self.syntax_node_actions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }
}

impl fmt::Debug for AnalyzerActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerActions")
            .field("counts", &self.counts())
            .finish()
    }
}
