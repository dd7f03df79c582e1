//! Attribute-based diagnostic suppression
//!
//! Suppressions are declared with a `SuppressMessage` attribute:
//!
//! - on a symbol: `[SuppressMessage("Usage", "X123:Name")]` suppresses `X123`
//!   for the symbol, its members, and the source span of its declaration
//! - on the assembly or module without a target: suppresses the id for the
//!   whole compilation
//! - on the assembly or module with `Scope`/`Target`: suppresses the id for the
//!   symbol whose documentation id matches the target
//!
//! Decoding is lazy. Global attributes are decoded once per compilation on the
//! first query; a symbol's attributes are decoded once on the first query that
//! reaches that symbol. Malformed attributes are skipped.

use super::types::{Diagnostic, Location};
use super::warning_state::{LazyWarningStateMap, WarningStateMap};
use crate::model::{AttributeData, CompilationRef, SymbolId, SymbolKind, SymbolRef, SyntaxTreeRef};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

/// Attribute class names recognized as suppressions
const SUPPRESS_MESSAGE_NAMES: &[&str] = &["SuppressMessageAttribute", "SuppressMessage"];

/// Decoded `SuppressMessage` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressMessageInfo {
    /// Diagnostic id, the part of the check id before `:`
    pub id: String,
    pub category: String,
    pub scope: Option<String>,
    pub target: Option<String>,
    pub message_id: Option<String>,
}

impl SuppressMessageInfo {
    /// Decode a suppression attribute
    ///
    /// Returns `None` for other attributes and for suppressions whose
    /// arguments are not two strings with a non-empty id.
    pub fn decode(attribute: &AttributeData) -> Option<Self> {
        if !is_suppress_message_attribute(&attribute.class_name) {
            return None;
        }

        let [category, check_id] = attribute.constructor_arguments.as_slice() else {
            return None;
        };
        let category = category.as_str()?;
        let check_id = check_id.as_str()?;

        let id = match check_id.split_once(':') {
            Some((id, _)) => id,
            None => check_id,
        }
        .trim();
        if id.is_empty() {
            return None;
        }

        let named = |name: &str| {
            attribute
                .named_argument(name)
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };

        Some(Self {
            id: id.to_string(),
            category: category.to_string(),
            scope: named("Scope"),
            target: named("Target"),
            message_id: named("MessageId"),
        })
    }
}

fn is_suppress_message_attribute(class_name: &str) -> bool {
    let simple = class_name.rsplit('.').next().unwrap_or(class_name);
    SUPPRESS_MESSAGE_NAMES.contains(&simple)
}

/// Strip decoration from a target so it compares against documentation ids
fn normalize_target(target: &str) -> String {
    target.trim().trim_start_matches('~').to_string()
}

/// Suppressions declared on the assembly or module
#[derive(Debug, Default)]
pub struct GlobalSuppressions {
    compilation_wide: HashSet<String>,
    by_target: HashMap<String, HashSet<String>>,
}

impl GlobalSuppressions {
    fn decode(attributes: &[AttributeData]) -> Self {
        let mut result = GlobalSuppressions::default();

        for info in attributes.iter().filter_map(SuppressMessageInfo::decode) {
            let scope = info.scope.as_deref().map(str::to_lowercase);
            match (scope.as_deref(), info.target.as_deref()) {
                (None | Some("module"), None) => {
                    result.compilation_wide.insert(info.id);
                }
                (None | Some("module" | "namespace" | "type" | "member"), Some(target)) => {
                    result
                        .by_target
                        .entry(normalize_target(target))
                        .or_default()
                        .insert(info.id);
                }
                (Some(other), _) => {
                    log::debug!("skipping suppression of {} with unknown scope '{}'", info.id, other);
                }
            }
        }

        result
    }

    pub fn is_compilation_wide(&self, id: &str) -> bool {
        self.compilation_wide.contains(id)
    }

    /// Whether `id` is suppressed for `symbol` through a targeted suppression
    pub fn is_suppressed_for(&self, id: &str, symbol: &SymbolRef) -> bool {
        let Some(documentation_id) = symbol.documentation_id() else {
            return false;
        };

        let matches = |key: &str| self.by_target.get(key).is_some_and(|ids| ids.contains(id));
        if matches(&documentation_id) {
            return true;
        }
        // Targets may omit the "M:"-style prefix
        documentation_id
            .split_once(':')
            .is_some_and(|(_, bare)| matches(bare))
    }
}

/// Per-compilation suppression state
pub struct SuppressMessageAttributeState {
    compilation: CompilationRef,
    global: OnceLock<GlobalSuppressions>,
    local: DashMap<SymbolId, Arc<HashSet<String>>>,
    warning_states: DashMap<String, Arc<LazyWarningStateMap>>,
    trees_by_path: OnceLock<HashMap<String, SyntaxTreeRef>>,
}

impl SuppressMessageAttributeState {
    pub fn new(compilation: CompilationRef) -> Self {
        Self {
            compilation,
            global: OnceLock::new(),
            local: DashMap::new(),
            warning_states: DashMap::new(),
            trees_by_path: OnceLock::new(),
        }
    }

    /// Whether `diagnostic` is suppressed, optionally in the context of `symbol`
    pub fn is_diagnostic_suppressed(&self, diagnostic: &Diagnostic, symbol: Option<&SymbolRef>) -> bool {
        self.is_id_suppressed(diagnostic.id(), symbol)
    }

    /// Symbol-scoped suppression check
    ///
    /// Without a symbol only compilation-wide suppressions apply. With one,
    /// the symbol, the property or event of an accessor, and each containing
    /// symbol up to (not including) a namespace are consulted. A namespace
    /// symbol is only checked against its own suppressions.
    pub fn is_id_suppressed(&self, id: &str, symbol: Option<&SymbolRef>) -> bool {
        if self.global_suppressions().is_compilation_wide(id) {
            return true;
        }
        let Some(symbol) = symbol else {
            return false;
        };

        if symbol.kind() == SymbolKind::NAMESPACE {
            return self.is_suppressed_on(id, symbol);
        }

        let mut current = Some(symbol.clone());
        while let Some(candidate) = current {
            if candidate.kind() == SymbolKind::NAMESPACE {
                break;
            }
            if self.is_suppressed_on(id, &candidate) {
                return true;
            }
            if candidate.kind() == SymbolKind::METHOD {
                if let Some(associated) = candidate.associated_symbol() {
                    if self.is_suppressed_on(id, &associated) {
                        return true;
                    }
                }
            }
            current = candidate.containing_symbol();
        }

        false
    }

    /// Position-based suppression check against the warning state of the
    /// location's source unit
    pub fn is_diagnostic_syntactically_suppressed(&self, id: &str, location: &Location) -> bool {
        if self.global_suppressions().is_compilation_wide(id) {
            return true;
        }
        let Location::Source { path, span } = location else {
            return false;
        };
        let Some(tree) = self.tree_by_path(path) else {
            return false;
        };

        self.warning_state_map(&tree).is_suppressed(id, span.start)
    }

    pub fn global_suppressions(&self) -> &GlobalSuppressions {
        self.global
            .get_or_init(|| GlobalSuppressions::decode(&self.compilation.assembly_attributes()))
    }

    /// Ids suppressed directly on `symbol`
    ///
    /// The first call decodes the symbol's attributes and records the
    /// suppressed ranges of its declarations.
    pub fn local_suppressions(&self, symbol: &SymbolRef) -> Arc<HashSet<String>> {
        self.local
            .entry(symbol.id())
            .or_insert_with(|| Arc::new(self.decode_local(symbol)))
            .clone()
    }

    /// The coalesced warning state of `tree`
    ///
    /// Built on first use after decoding every symbol declared in the tree.
    pub fn warning_state_map(&self, tree: &SyntaxTreeRef) -> Arc<WarningStateMap> {
        let state = self.warning_state(tree.path());
        state.get_or_build(|| {
            let model = self.compilation.semantic_model(tree);
            for symbol in model.declared_symbols() {
                self.local_suppressions(&symbol);
            }
        })
    }

    fn is_suppressed_on(&self, id: &str, symbol: &SymbolRef) -> bool {
        self.local_suppressions(symbol).contains(id)
            || self.global_suppressions().is_suppressed_for(id, symbol)
    }

    fn decode_local(&self, symbol: &SymbolRef) -> HashSet<String> {
        let ids: HashSet<String> = symbol
            .attributes()
            .iter()
            .filter_map(SuppressMessageInfo::decode)
            .map(|info| info.id)
            .collect();

        if ids.is_empty() {
            return ids;
        }

        for reference in symbol.declaring_syntax_references() {
            let state = self.warning_state(reference.tree().path());
            for id in &ids {
                if !state.add_range(id, reference.span()) {
                    log::debug!(
                        "suppression of {} on '{}' arrived after the warning state of {} was built",
                        id,
                        symbol.name(),
                        reference.tree().path()
                    );
                }
            }
        }

        ids
    }

    fn warning_state(&self, path: &str) -> Arc<LazyWarningStateMap> {
        self.warning_states
            .entry(path.to_string())
            .or_default()
            .clone()
    }

    fn tree_by_path(&self, path: &str) -> Option<SyntaxTreeRef> {
        self.trees_by_path
            .get_or_init(|| {
                self.compilation
                    .syntax_trees()
                    .into_iter()
                    .map(|tree| (tree.path().to_string(), tree))
                    .collect()
            })
            .get(path)
            .cloned()
    }
}

impl std::fmt::Debug for SuppressMessageAttributeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppressMessageAttributeState")
            .field("compilation", &self.compilation.id())
            .field("decoded_symbols", &self.local.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DiagnosticDescriptor, DiagnosticSeverity, TextSpan};
    use crate::model::memory::{MemoryCompilation, MemoryNode, MemorySymbol, MemoryTree};
    use crate::model::{SyntaxNodeRef, TypedConstant};

    fn suppress(id: &str) -> AttributeData {
        AttributeData::new("System.Diagnostics.CodeAnalysis.SuppressMessageAttribute")
            .with_argument("Usage")
            .with_argument(format!("{}:SomeRule", id).as_str())
    }

    fn global(id: &str, scope: &str, target: &str) -> AttributeData {
        suppress(id)
            .with_named_argument("Scope", scope)
            .with_named_argument("Target", target)
    }

    struct Fixture {
        compilation: CompilationRef,
        namespace: SymbolRef,
        class: SymbolRef,
        method: SymbolRef,
        getter: SymbolRef,
    }

    /// Namespace N > class C [0,200) > method Run [10,50) and property P with getter [60,90)
    fn fixture(method_attrs: Vec<AttributeData>, property_attrs: Vec<AttributeData>, assembly: Vec<AttributeData>) -> Fixture {
        let method_node: SyntaxNodeRef = MemoryNode::new(3, TextSpan::new(10, 50)).into();
        let getter_node: SyntaxNodeRef = MemoryNode::new(5, TextSpan::new(70, 80)).into();
        let property_node: SyntaxNodeRef = MemoryNode::new(4, TextSpan::new(60, 90))
            .with_child(getter_node.clone())
            .into();
        let class_node: SyntaxNodeRef = MemoryNode::new(2, TextSpan::new(0, 200))
            .with_child(method_node.clone())
            .with_child(property_node.clone())
            .into();
        let tree = MemoryTree::new("a.cs", MemoryNode::new(1, TextSpan::new(0, 300)).with_child(class_node.clone()));

        let namespace = MemorySymbol::builder(1, "N", SymbolKind::NAMESPACE).build();
        let class = MemorySymbol::builder(2, "C", SymbolKind::NAMED_TYPE)
            .containing(&namespace)
            .declared_at(&tree, &class_node)
            .build();
        let mut method = MemorySymbol::builder(3, "Run", SymbolKind::METHOD)
            .containing(&class)
            .declared_at(&tree, &method_node);
        for attr in method_attrs {
            method = method.attribute(attr);
        }
        let method = method.build();

        let mut property = MemorySymbol::builder(4, "P", SymbolKind::PROPERTY)
            .containing(&class)
            .declared_at(&tree, &property_node);
        for attr in property_attrs {
            property = property.attribute(attr);
        }
        let property = property.build();
        let getter = MemorySymbol::builder(5, "get_P", SymbolKind::METHOD)
            .containing(&class)
            .associated_with(&property)
            .declared_at(&tree, &getter_node)
            .build();

        let mut compilation = MemoryCompilation::builder(1)
            .tree(tree)
            .symbol(namespace.clone())
            .symbol(class.clone())
            .symbol(method.clone())
            .symbol(property)
            .symbol(getter.clone());
        for attr in assembly {
            compilation = compilation.assembly_attribute(attr);
        }

        Fixture {
            compilation: compilation.build(),
            namespace,
            class,
            method,
            getter,
        }
    }

    fn at(position: usize) -> Location {
        Location::source("a.cs", TextSpan::new(position, position + 1))
    }

    #[test]
    fn test_decode_check_id() {
        let info = SuppressMessageInfo::decode(&suppress("X123")).unwrap();
        assert_eq!(info.id, "X123");
        assert_eq!(info.category, "Usage");
        assert_eq!(info.scope, None);

        let bare = AttributeData::new("SuppressMessage")
            .with_argument("Usage")
            .with_argument("CA1000");
        assert_eq!(SuppressMessageInfo::decode(&bare).unwrap().id, "CA1000");
    }

    #[test]
    fn test_decode_skips_malformed() {
        let one_arg = AttributeData::new("SuppressMessage").with_argument("Usage");
        assert!(SuppressMessageInfo::decode(&one_arg).is_none());

        let not_string = AttributeData::new("SuppressMessage")
            .with_argument("Usage")
            .with_argument(TypedConstant::Integer(5));
        assert!(SuppressMessageInfo::decode(&not_string).is_none());

        let empty_id = AttributeData::new("SuppressMessage")
            .with_argument("Usage")
            .with_argument(":Name");
        assert!(SuppressMessageInfo::decode(&empty_id).is_none());

        let other = AttributeData::new("Obsolete").with_argument("a").with_argument("b");
        assert!(SuppressMessageInfo::decode(&other).is_none());
    }

    #[test]
    fn test_syntactic_round_trip() {
        let f = fixture(vec![suppress("X123")], vec![], vec![]);
        let state = SuppressMessageAttributeState::new(f.compilation.clone());

        assert!(state.is_diagnostic_syntactically_suppressed("X123", &at(30)));
        assert!(!state.is_diagnostic_syntactically_suppressed("X123", &at(60)));
        assert!(!state.is_diagnostic_syntactically_suppressed("OTHER", &at(30)));
    }

    #[test]
    fn test_syntactic_unknown_tree_or_no_location() {
        let f = fixture(vec![suppress("X123")], vec![], vec![]);
        let state = SuppressMessageAttributeState::new(f.compilation);

        assert!(!state.is_diagnostic_syntactically_suppressed("X123", &Location::None));
        let elsewhere = Location::source("b.cs", TextSpan::new(30, 31));
        assert!(!state.is_diagnostic_syntactically_suppressed("X123", &elsewhere));
    }

    #[test]
    fn test_local_suppression_applies_to_symbol() {
        let f = fixture(vec![suppress("X1")], vec![], vec![]);
        let state = SuppressMessageAttributeState::new(f.compilation);

        assert!(state.is_id_suppressed("X1", Some(&f.method)));
        assert!(!state.is_id_suppressed("X1", Some(&f.class)));
        assert!(!state.is_id_suppressed("X1", None));
    }

    #[test]
    fn test_container_suppression_cascades_to_members() {
        let f = fixture(vec![], vec![], vec![global("X2", "type", "T:N.C")]);
        let state = SuppressMessageAttributeState::new(f.compilation);

        assert!(state.is_id_suppressed("X2", Some(&f.class)));
        assert!(state.is_id_suppressed("X2", Some(&f.method)));
    }

    #[test]
    fn test_namespace_suppression_does_not_cascade() {
        let f = fixture(vec![], vec![], vec![global("X3", "namespace", "N")]);
        let state = SuppressMessageAttributeState::new(f.compilation);

        assert!(state.is_id_suppressed("X3", Some(&f.namespace)));
        assert!(!state.is_id_suppressed("X3", Some(&f.class)));
        assert!(!state.is_id_suppressed("X3", Some(&f.method)));
    }

    #[test]
    fn test_accessor_uses_associated_property() {
        let f = fixture(vec![], vec![suppress("X4")], vec![]);
        let state = SuppressMessageAttributeState::new(f.compilation);

        assert!(state.is_id_suppressed("X4", Some(&f.getter)));
        assert!(!state.is_id_suppressed("X4", Some(&f.method)));
    }

    #[test]
    fn test_compilation_wide_suppression() {
        let f = fixture(vec![], vec![], vec![suppress("X5")]);
        let state = SuppressMessageAttributeState::new(f.compilation);

        assert!(state.is_id_suppressed("X5", None));
        assert!(state.is_id_suppressed("X5", Some(&f.method)));
        assert!(state.is_diagnostic_syntactically_suppressed("X5", &Location::None));
    }

    #[test]
    fn test_member_target_with_tilde_prefix() {
        let f = fixture(vec![], vec![], vec![global("X6", "member", "~M:N.C.Run")]);
        let state = SuppressMessageAttributeState::new(f.compilation);
        assert!(state.is_id_suppressed("X6", Some(&f.method)));
        assert!(!state.is_id_suppressed("X6", Some(&f.getter)));
    }

    #[test]
    fn test_unknown_scope_is_skipped() {
        let f = fixture(vec![], vec![], vec![global("X7", "galaxy", "T:N.C")]);
        let state = SuppressMessageAttributeState::new(f.compilation);
        assert!(!state.is_id_suppressed("X7", Some(&f.class)));
        assert!(!state.is_id_suppressed("X7", None));
    }

    #[test]
    fn test_is_diagnostic_suppressed_uses_id() {
        let f = fixture(vec![suppress("X8")], vec![], vec![]);
        let state = SuppressMessageAttributeState::new(f.compilation);
        let descriptor = Arc::new(DiagnosticDescriptor::new(
            "X8",
            "t",
            "m",
            "c",
            DiagnosticSeverity::Warning,
            true,
        ));
        let diagnostic = Diagnostic::new(&descriptor, at(20));
        assert!(state.is_diagnostic_suppressed(&diagnostic, Some(&f.method)));
        assert!(!state.is_diagnostic_suppressed(&diagnostic, Some(&f.class)));
    }

    #[test]
    fn test_local_decode_is_cached() {
        let f = fixture(vec![suppress("X9")], vec![], vec![]);
        let state = SuppressMessageAttributeState::new(f.compilation);
        let first = state.local_suppressions(&f.method);
        let second = state.local_suppressions(&f.method);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
