//! Front-end boundary
//!
//! These traits abstract over the compiler front end that produces syntax
//! trees, symbols, and semantic models. The engine never parses or binds
//! anything itself; it only walks what the front end hands it.

pub mod memory;

use crate::core::options::CompilationOptions;
use crate::core::types::{Diagnostic, TextSpan};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub type CompilationRef = Arc<dyn Compilation>;
pub type SyntaxTreeRef = Arc<dyn SyntaxTree>;
pub type SyntaxNodeRef = Arc<dyn SyntaxNode>;
pub type SemanticModelRef = Arc<dyn SemanticModel>;
pub type SymbolRef = Arc<dyn Symbol>;

/// Identity of a compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompilationId(pub u64);

/// Identity of a symbol, unique within its compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u64);

/// Kind of a symbol
///
/// An open set: the named constants cover the kinds the engine knows about,
/// but any value can be constructed, so registrations carrying nonsense kinds
/// are representable and can be rejected by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolKind(pub u16);

impl SymbolKind {
    pub const ALIAS: SymbolKind = SymbolKind(0);
    pub const ARRAY_TYPE: SymbolKind = SymbolKind(1);
    pub const ASSEMBLY: SymbolKind = SymbolKind(2);
    pub const DYNAMIC_TYPE: SymbolKind = SymbolKind(3);
    pub const ERROR_TYPE: SymbolKind = SymbolKind(4);
    pub const EVENT: SymbolKind = SymbolKind(5);
    pub const FIELD: SymbolKind = SymbolKind(6);
    pub const LABEL: SymbolKind = SymbolKind(7);
    pub const LOCAL: SymbolKind = SymbolKind(8);
    pub const METHOD: SymbolKind = SymbolKind(9);
    pub const NET_MODULE: SymbolKind = SymbolKind(10);
    pub const NAMED_TYPE: SymbolKind = SymbolKind(11);
    pub const NAMESPACE: SymbolKind = SymbolKind(12);
    pub const PARAMETER: SymbolKind = SymbolKind(13);
    pub const POINTER_TYPE: SymbolKind = SymbolKind(14);
    pub const PROPERTY: SymbolKind = SymbolKind(15);
    pub const RANGE_VARIABLE: SymbolKind = SymbolKind(16);
    pub const TYPE_PARAMETER: SymbolKind = SymbolKind(17);

    pub fn as_index(self) -> usize {
        self.0 as usize
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            SymbolKind::ALIAS => "Alias",
            SymbolKind::ARRAY_TYPE => "ArrayType",
            SymbolKind::ASSEMBLY => "Assembly",
            SymbolKind::DYNAMIC_TYPE => "DynamicType",
            SymbolKind::ERROR_TYPE => "ErrorType",
            SymbolKind::EVENT => "Event",
            SymbolKind::FIELD => "Field",
            SymbolKind::LABEL => "Label",
            SymbolKind::LOCAL => "Local",
            SymbolKind::METHOD => "Method",
            SymbolKind::NET_MODULE => "NetModule",
            SymbolKind::NAMED_TYPE => "NamedType",
            SymbolKind::NAMESPACE => "Namespace",
            SymbolKind::PARAMETER => "Parameter",
            SymbolKind::POINTER_TYPE => "PointerType",
            SymbolKind::PROPERTY => "Property",
            SymbolKind::RANGE_VARIABLE => "RangeVariable",
            SymbolKind::TYPE_PARAMETER => "TypeParameter",
            _ => return None,
        };
        Some(name)
    }

    /// Prefix used by documentation ids (`"M:"` for methods and so on)
    pub fn documentation_prefix(self) -> Option<&'static str> {
        match self {
            SymbolKind::NAMESPACE => Some("N:"),
            SymbolKind::NAMED_TYPE | SymbolKind::ERROR_TYPE => Some("T:"),
            SymbolKind::METHOD => Some("M:"),
            SymbolKind::FIELD => Some("F:"),
            SymbolKind::PROPERTY => Some("P:"),
            SymbolKind::EVENT => Some("E:"),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "SymbolKind({})", self.0),
        }
    }
}

/// A node in a syntax tree
pub trait SyntaxNode: Send + Sync + fmt::Debug {
    /// Source span covered by the node
    fn span(&self) -> TextSpan;

    /// Language-specific kind value, interpreted by the caller's kind classifier
    fn raw_kind(&self) -> u16;

    /// Direct children in source order
    fn children(&self) -> Vec<SyntaxNodeRef>;

    /// Access the concrete node type for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// All nodes under `node`, including `node`, in pre-order
pub fn descendant_nodes_and_self(node: &SyntaxNodeRef) -> Vec<SyntaxNodeRef> {
    descendant_nodes_and_self_where(node, |_| true)
}

/// Pre-order walk that only descends into children accepted by `descend_into`
///
/// Rejected children are skipped together with their subtrees.
pub fn descendant_nodes_and_self_where<F>(node: &SyntaxNodeRef, descend_into: F) -> Vec<SyntaxNodeRef>
where
    F: Fn(&SyntaxNodeRef) -> bool,
{
    let mut result = Vec::new();
    let mut stack = vec![node.clone()];
    while let Some(current) = stack.pop() {
        let children = current.children();
        result.push(current);
        for child in children.into_iter().rev() {
            if descend_into(&child) {
                stack.push(child);
            }
        }
    }
    result
}

/// A parsed source unit
pub trait SyntaxTree: Send + Sync + fmt::Debug {
    /// Path identifying the source unit
    fn path(&self) -> &str;

    fn root(&self) -> SyntaxNodeRef;
}

/// Points at the syntax that declares a symbol
#[derive(Debug, Clone)]
pub struct SyntaxReference {
    tree: SyntaxTreeRef,
    node: SyntaxNodeRef,
}

impl SyntaxReference {
    pub fn new(tree: SyntaxTreeRef, node: SyntaxNodeRef) -> Self {
        Self { tree, node }
    }

    pub fn tree(&self) -> &SyntaxTreeRef {
        &self.tree
    }

    /// The declaring node
    pub fn syntax(&self) -> &SyntaxNodeRef {
        &self.node
    }

    pub fn span(&self) -> TextSpan {
        self.node.span()
    }
}

/// A constant attribute argument
#[derive(Debug, Clone, PartialEq)]
pub enum TypedConstant {
    Null,
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl TypedConstant {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedConstant::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for TypedConstant {
    fn from(value: &str) -> Self {
        TypedConstant::String(value.to_string())
    }
}

/// An attribute applied to a symbol, module, or assembly
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    /// Name of the attribute class, possibly namespace-qualified
    pub class_name: String,
    pub constructor_arguments: Vec<TypedConstant>,
    pub named_arguments: Vec<(String, TypedConstant)>,
}

impl AttributeData {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            constructor_arguments: Vec::new(),
            named_arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, value: impl Into<TypedConstant>) -> Self {
        self.constructor_arguments.push(value.into());
        self
    }

    pub fn with_named_argument(
        mut self,
        name: impl Into<String>,
        value: impl Into<TypedConstant>,
    ) -> Self {
        self.named_arguments.push((name.into(), value.into()));
        self
    }

    pub fn named_argument(&self, name: &str) -> Option<&TypedConstant> {
        self.named_arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }
}

/// A declared entity: namespace, type, member, and so on
pub trait Symbol: Send + Sync + fmt::Debug {
    fn id(&self) -> SymbolId;

    fn name(&self) -> &str;

    fn kind(&self) -> SymbolKind;

    /// Enclosing symbol, `None` for the global namespace
    fn containing_symbol(&self) -> Option<SymbolRef>;

    /// Every piece of syntax that declares this symbol
    fn declaring_syntax_references(&self) -> Vec<SyntaxReference>;

    /// Attributes applied directly to the symbol
    fn attributes(&self) -> Vec<AttributeData>;

    /// For accessor methods, the property or event they belong to
    fn associated_symbol(&self) -> Option<SymbolRef> {
        None
    }

    /// Documentation comment id, e.g. `M:Ns.Type.Method`
    fn documentation_id(&self) -> Option<String> {
        None
    }

    /// Whether an event symbol is declared like a field
    fn is_field_like_event(&self) -> bool {
        false
    }
}

/// Semantic information for one syntax tree
pub trait SemanticModel: Send + Sync {
    fn syntax_tree(&self) -> SyntaxTreeRef;

    /// The symbol declared by `node`, if it is a declaration
    fn declared_symbol(&self, node: &SyntaxNodeRef) -> Option<SymbolRef>;

    /// Every symbol declared in the tree
    fn declared_symbols(&self) -> Vec<SymbolRef>;
}

/// A compiled unit: its trees, options, and semantic models
pub trait Compilation: Send + Sync {
    fn id(&self) -> CompilationId;

    fn syntax_trees(&self) -> Vec<SyntaxTreeRef>;

    fn options(&self) -> &CompilationOptions;

    fn semantic_model(&self, tree: &SyntaxTreeRef) -> SemanticModelRef;

    /// Assembly- and module-level attributes
    fn assembly_attributes(&self) -> Vec<AttributeData>;

    /// Apply the compilation's diagnostic options; `None` drops the diagnostic
    fn filter_diagnostic(&self, diagnostic: Diagnostic) -> Option<Diagnostic> {
        self.options().filter(diagnostic)
    }
}
