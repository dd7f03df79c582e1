//! In-memory front end
//!
//! A small, fully materialized implementation of the model traits. Useful to
//! drive analyzers from tests without a real parser or binder:
//!
//! ```
//! use analyzer_driver::model::memory::{MemoryCompilation, MemoryNode, MemorySymbol, MemoryTree};
//! use analyzer_driver::model::{Compilation, SymbolKind, SyntaxNodeRef};
//! use analyzer_driver::TextSpan;
//!
//! let method: SyntaxNodeRef = MemoryNode::new(2, TextSpan::new(10, 50)).into();
//! let tree = MemoryTree::new("a.cs", MemoryNode::new(1, TextSpan::new(0, 100)).with_child(method.clone()));
//! let symbol = MemorySymbol::builder(1, "Run", SymbolKind::METHOD)
//!     .declared_at(&tree, &method)
//!     .build();
//! let compilation = MemoryCompilation::builder(1).tree(tree).symbol(symbol).build();
//! assert_eq!(compilation.syntax_trees().len(), 1);
//! ```

use super::{
    AttributeData, Compilation, CompilationId, CompilationRef, SemanticModel, SemanticModelRef,
    Symbol, SymbolId, SymbolKind, SymbolRef, SyntaxNode, SyntaxNodeRef, SyntaxReference,
    SyntaxTree, SyntaxTreeRef,
};
use crate::core::options::CompilationOptions;
use crate::core::types::TextSpan;
use std::any::Any;
use std::sync::Arc;

/// A syntax node with a numeric kind and owned children
#[derive(Debug)]
pub struct MemoryNode {
    kind: u16,
    span: TextSpan,
    children: Vec<SyntaxNodeRef>,
}

impl MemoryNode {
    pub fn new(kind: u16, span: TextSpan) -> Self {
        Self {
            kind,
            span,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: impl Into<SyntaxNodeRef>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn into_ref(self) -> SyntaxNodeRef {
        Arc::new(self)
    }
}

impl From<MemoryNode> for SyntaxNodeRef {
    fn from(node: MemoryNode) -> Self {
        Arc::new(node)
    }
}

impl SyntaxNode for MemoryNode {
    fn span(&self) -> TextSpan {
        self.span
    }

    fn raw_kind(&self) -> u16 {
        self.kind
    }

    fn children(&self) -> Vec<SyntaxNodeRef> {
        self.children.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MemoryTree {
    path: String,
    root: SyntaxNodeRef,
}

impl MemoryTree {
    pub fn new(path: impl Into<String>, root: impl Into<SyntaxNodeRef>) -> SyntaxTreeRef {
        Arc::new(Self {
            path: path.into(),
            root: root.into(),
        })
    }
}

impl SyntaxTree for MemoryTree {
    fn path(&self) -> &str {
        &self.path
    }

    fn root(&self) -> SyntaxNodeRef {
        self.root.clone()
    }
}

#[derive(Debug)]
pub struct MemorySymbol {
    id: SymbolId,
    name: String,
    kind: SymbolKind,
    containing: Option<SymbolRef>,
    associated: Option<SymbolRef>,
    references: Vec<SyntaxReference>,
    attributes: Vec<AttributeData>,
    documentation_id: Option<String>,
    field_like_event: bool,
}

impl MemorySymbol {
    pub fn builder(id: u64, name: impl Into<String>, kind: SymbolKind) -> MemorySymbolBuilder {
        MemorySymbolBuilder {
            symbol: MemorySymbol {
                id: SymbolId(id),
                name: name.into(),
                kind,
                containing: None,
                associated: None,
                references: Vec::new(),
                attributes: Vec::new(),
                documentation_id: None,
                field_like_event: false,
            },
        }
    }
}

/// Builder for [`MemorySymbol`]
pub struct MemorySymbolBuilder {
    symbol: MemorySymbol,
}

impl MemorySymbolBuilder {
    pub fn containing(mut self, container: &SymbolRef) -> Self {
        self.symbol.containing = Some(container.clone());
        self
    }

    /// Mark an accessor as belonging to a property or event
    pub fn associated_with(mut self, symbol: &SymbolRef) -> Self {
        self.symbol.associated = Some(symbol.clone());
        self
    }

    pub fn declared_at(mut self, tree: &SyntaxTreeRef, node: &SyntaxNodeRef) -> Self {
        self.symbol
            .references
            .push(SyntaxReference::new(tree.clone(), node.clone()));
        self
    }

    pub fn attribute(mut self, attribute: AttributeData) -> Self {
        self.symbol.attributes.push(attribute);
        self
    }

    pub fn documentation_id(mut self, id: impl Into<String>) -> Self {
        self.symbol.documentation_id = Some(id.into());
        self
    }

    pub fn field_like_event(mut self) -> Self {
        self.symbol.field_like_event = true;
        self
    }

    /// Finish the symbol, deriving a documentation id from the container chain
    /// unless one was given
    pub fn build(mut self) -> SymbolRef {
        if self.symbol.documentation_id.is_none() {
            self.symbol.documentation_id = self.derive_documentation_id();
        }
        Arc::new(self.symbol)
    }

    fn derive_documentation_id(&self) -> Option<String> {
        let prefix = self.symbol.kind.documentation_prefix()?;
        let qualifier = self
            .symbol
            .containing
            .as_ref()
            .and_then(|c| c.documentation_id())
            .and_then(|id| id.split_once(':').map(|(_, name)| name.to_string()))
            .filter(|name| !name.is_empty());

        Some(match qualifier {
            Some(qualifier) => format!("{}{}.{}", prefix, qualifier, self.symbol.name),
            None => format!("{}{}", prefix, self.symbol.name),
        })
    }
}

impl Symbol for MemorySymbol {
    fn id(&self) -> SymbolId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SymbolKind {
        self.kind
    }

    fn containing_symbol(&self) -> Option<SymbolRef> {
        self.containing.clone()
    }

    fn declaring_syntax_references(&self) -> Vec<SyntaxReference> {
        self.references.clone()
    }

    fn attributes(&self) -> Vec<AttributeData> {
        self.attributes.clone()
    }

    fn associated_symbol(&self) -> Option<SymbolRef> {
        self.associated.clone()
    }

    fn documentation_id(&self) -> Option<String> {
        self.documentation_id.clone()
    }

    fn is_field_like_event(&self) -> bool {
        self.field_like_event
    }
}

/// Semantic model over the symbols declared in one tree
pub struct MemorySemanticModel {
    tree: SyntaxTreeRef,
    symbols: Vec<SymbolRef>,
}

impl SemanticModel for MemorySemanticModel {
    fn syntax_tree(&self) -> SyntaxTreeRef {
        self.tree.clone()
    }

    fn declared_symbol(&self, node: &SyntaxNodeRef) -> Option<SymbolRef> {
        self.symbols
            .iter()
            .find(|symbol| {
                symbol.declaring_syntax_references().iter().any(|r| {
                    r.tree().path() == self.tree.path()
                        && r.span() == node.span()
                        && r.syntax().raw_kind() == node.raw_kind()
                })
            })
            .cloned()
    }

    fn declared_symbols(&self) -> Vec<SymbolRef> {
        self.symbols.clone()
    }
}

pub struct MemoryCompilation {
    id: CompilationId,
    trees: Vec<SyntaxTreeRef>,
    symbols: Vec<SymbolRef>,
    options: CompilationOptions,
    assembly_attributes: Vec<AttributeData>,
}

impl MemoryCompilation {
    pub fn builder(id: u64) -> MemoryCompilationBuilder {
        MemoryCompilationBuilder {
            compilation: MemoryCompilation {
                id: CompilationId(id),
                trees: Vec::new(),
                symbols: Vec::new(),
                options: CompilationOptions::default(),
                assembly_attributes: Vec::new(),
            },
        }
    }
}

pub struct MemoryCompilationBuilder {
    compilation: MemoryCompilation,
}

impl MemoryCompilationBuilder {
    pub fn tree(mut self, tree: SyntaxTreeRef) -> Self {
        self.compilation.trees.push(tree);
        self
    }

    pub fn symbol(mut self, symbol: SymbolRef) -> Self {
        self.compilation.symbols.push(symbol);
        self
    }

    pub fn options(mut self, options: CompilationOptions) -> Self {
        self.compilation.options = options;
        self
    }

    pub fn assembly_attribute(mut self, attribute: AttributeData) -> Self {
        self.compilation.assembly_attributes.push(attribute);
        self
    }

    pub fn build(self) -> CompilationRef {
        Arc::new(self.compilation)
    }
}

impl Compilation for MemoryCompilation {
    fn id(&self) -> CompilationId {
        self.id
    }

    fn syntax_trees(&self) -> Vec<SyntaxTreeRef> {
        self.trees.clone()
    }

    fn options(&self) -> &CompilationOptions {
        &self.options
    }

    fn semantic_model(&self, tree: &SyntaxTreeRef) -> SemanticModelRef {
        let symbols = self
            .symbols
            .iter()
            .filter(|symbol| {
                symbol
                    .declaring_syntax_references()
                    .iter()
                    .any(|r| r.tree().path() == tree.path())
            })
            .cloned()
            .collect();

        Arc::new(MemorySemanticModel {
            tree: tree.clone(),
            symbols,
        })
    }

    fn assembly_attributes(&self) -> Vec<AttributeData> {
        self.assembly_attributes.clone()
    }
}
