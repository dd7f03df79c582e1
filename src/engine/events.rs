//! Compilation events
//!
//! The front end announces progress through a stream of events: the
//! compilation started, a symbol was declared, a source unit was fully
//! bound, the compilation completed. Declaration and unit events cache the
//! semantic information they compute; the driver flushes those caches once
//! an event has been processed so memory does not grow with the compilation.

use crate::model::{CompilationRef, SemanticModelRef, SymbolRef, SyntaxReference, SyntaxTreeRef};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub enum CompilationEvent {
    CompilationStarted(Arc<CompilationStartedEvent>),
    SymbolDeclared(Arc<SymbolDeclaredEvent>),
    CompilationUnitCompleted(Arc<CompilationUnitCompletedEvent>),
    CompilationCompleted(Arc<CompilationCompletedEvent>),
}

impl CompilationEvent {
    pub fn compilation_started(compilation: &CompilationRef) -> Self {
        CompilationEvent::CompilationStarted(Arc::new(CompilationStartedEvent {
            compilation: compilation.clone(),
        }))
    }

    pub fn symbol_declared(compilation: &CompilationRef, symbol: SymbolRef) -> Self {
        CompilationEvent::SymbolDeclared(Arc::new(SymbolDeclaredEvent::new(
            compilation.clone(),
            symbol,
            None,
        )))
    }

    /// A symbol declared by one specific piece of syntax
    pub fn symbol_declared_at(
        compilation: &CompilationRef,
        symbol: SymbolRef,
        declaration: SyntaxReference,
    ) -> Self {
        CompilationEvent::SymbolDeclared(Arc::new(SymbolDeclaredEvent::new(
            compilation.clone(),
            symbol,
            Some(declaration),
        )))
    }

    pub fn compilation_unit_completed(compilation: &CompilationRef, tree: SyntaxTreeRef) -> Self {
        CompilationEvent::CompilationUnitCompleted(Arc::new(CompilationUnitCompletedEvent {
            compilation: compilation.clone(),
            tree,
            semantic_model: Mutex::new(None),
        }))
    }

    pub fn compilation_completed(compilation: &CompilationRef) -> Self {
        CompilationEvent::CompilationCompleted(Arc::new(CompilationCompletedEvent {
            compilation: compilation.clone(),
        }))
    }

    pub fn compilation(&self) -> &CompilationRef {
        match self {
            CompilationEvent::CompilationStarted(e) => &e.compilation,
            CompilationEvent::SymbolDeclared(e) => &e.compilation,
            CompilationEvent::CompilationUnitCompleted(e) => &e.compilation,
            CompilationEvent::CompilationCompleted(e) => &e.compilation,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CompilationEvent::CompilationStarted(_) => "CompilationStarted",
            CompilationEvent::SymbolDeclared(_) => "SymbolDeclared",
            CompilationEvent::CompilationUnitCompleted(_) => "CompilationUnitCompleted",
            CompilationEvent::CompilationCompleted(_) => "CompilationCompleted",
        }
    }
}

impl fmt::Debug for CompilationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilationEvent::SymbolDeclared(e) => write!(f, "SymbolDeclared({})", e.symbol.name()),
            CompilationEvent::CompilationUnitCompleted(e) => {
                write!(f, "CompilationUnitCompleted({})", e.tree.path())
            }
            other => f.write_str(other.kind_name()),
        }
    }
}

pub struct CompilationStartedEvent {
    compilation: CompilationRef,
}

impl CompilationStartedEvent {
    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }
}

pub struct CompilationCompletedEvent {
    compilation: CompilationRef,
}

impl CompilationCompletedEvent {
    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }
}

/// A symbol has been declared
pub struct SymbolDeclaredEvent {
    compilation: CompilationRef,
    symbol: SymbolRef,
    declaration: Option<SyntaxReference>,
    semantic_models: Mutex<HashMap<String, SemanticModelRef>>,
}

impl SymbolDeclaredEvent {
    fn new(compilation: CompilationRef, symbol: SymbolRef, declaration: Option<SyntaxReference>) -> Self {
        Self {
            compilation,
            symbol,
            declaration,
            semantic_models: Mutex::new(HashMap::new()),
        }
    }

    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }

    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }

    /// The specific declaration this event is about, if any
    pub fn declaration(&self) -> Option<&SyntaxReference> {
        self.declaration.as_ref()
    }

    /// Declarations to analyze: the specific one, or all of the symbol's
    pub fn declaring_references(&self) -> Vec<SyntaxReference> {
        match &self.declaration {
            Some(declaration) => vec![declaration.clone()],
            None => self.symbol.declaring_syntax_references(),
        }
    }

    /// Semantic model for `tree`, cached until [`flush_cache`](Self::flush_cache)
    pub fn semantic_model(&self, tree: &SyntaxTreeRef) -> SemanticModelRef {
        let mut models = self.semantic_models.lock();
        models
            .entry(tree.path().to_string())
            .or_insert_with(|| self.compilation.semantic_model(tree))
            .clone()
    }

    pub fn cached_semantic_model_count(&self) -> usize {
        self.semantic_models.lock().len()
    }

    pub fn flush_cache(&self) {
        self.semantic_models.lock().clear();
    }
}

/// A source unit has been fully bound
pub struct CompilationUnitCompletedEvent {
    compilation: CompilationRef,
    tree: SyntaxTreeRef,
    semantic_model: Mutex<Option<SemanticModelRef>>,
}

impl CompilationUnitCompletedEvent {
    pub fn compilation(&self) -> &CompilationRef {
        &self.compilation
    }

    pub fn tree(&self) -> &SyntaxTreeRef {
        &self.tree
    }

    /// Semantic model of the unit, cached until [`flush_cache`](Self::flush_cache)
    pub fn semantic_model(&self) -> SemanticModelRef {
        self.semantic_model
            .lock()
            .get_or_insert_with(|| self.compilation.semantic_model(&self.tree))
            .clone()
    }

    pub fn is_cached(&self) -> bool {
        self.semantic_model.lock().is_some()
    }

    pub fn flush_cache(&self) {
        self.semantic_model.lock().take();
    }
}

/// Every event a complete compilation produces, in order
///
/// `CompilationStarted`, then one `SymbolDeclared` per distinct declared
/// symbol (in tree order), then one `CompilationUnitCompleted` per tree, then
/// `CompilationCompleted`.
pub fn compilation_events(compilation: &CompilationRef) -> Vec<CompilationEvent> {
    let trees = compilation.syntax_trees();
    let mut events = vec![CompilationEvent::compilation_started(compilation)];

    let mut seen = HashSet::new();
    for tree in &trees {
        let model = compilation.semantic_model(tree);
        for symbol in model.declared_symbols() {
            if seen.insert(symbol.id()) {
                events.push(CompilationEvent::symbol_declared(compilation, symbol));
            }
        }
    }

    events.extend(
        trees
            .iter()
            .map(|tree| CompilationEvent::compilation_unit_completed(compilation, tree.clone())),
    );
    events.push(CompilationEvent::compilation_completed(compilation));
    events
}
