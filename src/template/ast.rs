//! Arena-backed markup tree and per-element directive bookkeeping

use std::collections::BTreeMap;

/// Index of a node inside a [`TemplateDocument`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub line: usize,
}

impl Element {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.attributes.iter().any(|attr| attr.key == key)
    }

    /// Replaces an existing attribute in place or appends a new one.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|attr| attr.key == key) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute::new(key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.attributes.iter().position(|attr| attr.key == key)?;
        Some(self.attributes.remove(index).value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct TemplateNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    If,
    Elif,
    Else,
    For,
}

impl DirectiveKind {
    pub fn from_attribute(key: &str) -> Option<Self> {
        match key {
            "x:if" => Some(DirectiveKind::If),
            "x:elif" => Some(DirectiveKind::Elif),
            "x:else" => Some(DirectiveKind::Else),
            "x:for" => Some(DirectiveKind::For),
            _ => None,
        }
    }

    pub fn is_conditional(self) -> bool {
        !matches!(self, DirectiveKind::For)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopVariables {
    pub item: Option<String>,
    pub index: Option<String>,
    pub key: Option<String>,
}

impl LoopVariables {
    /// Whether `name` is bound by this loop scope.
    pub fn binds(&self, name: &str) -> bool {
        let root = name.split('.').next().unwrap_or(name);
        [&self.item, &self.index, &self.key]
            .iter()
            .any(|var| var.as_deref() == Some(root))
    }
}

/// A conditional recorded on a parent for its children, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct SiblingCondition {
    pub directive: DirectiveKind,
    pub value: String,
    pub node: NodeId,
}

/// Directive state gathered for one element during resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeCollector {
    pub directives: Vec<Directive>,
    pub variables: LoopVariables,
    pub sibling_conditions: Vec<SiblingCondition>,
}

impl NodeCollector {
    pub fn directive(&self, kind: DirectiveKind) -> Option<&Directive> {
        self.directives.iter().find(|d| d.kind == kind)
    }

    pub fn has_directive(&self, kind: DirectiveKind) -> bool {
        self.directive(kind).is_some()
    }

    pub fn set_directive(&mut self, kind: DirectiveKind, value: String) {
        match self.directives.iter_mut().find(|d| d.kind == kind) {
            Some(existing) => existing.value = value,
            None => self.directives.push(Directive { kind, value }),
        }
    }
}

/// Result of resolving one element: its target tag and formatted attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedElement {
    pub tag: String,
    pub attributes: Vec<String>,
    /// Named slot this element fills in its parent component.
    pub slot: Option<String>,
}

/// A parsed markup file plus the side tables filled by resolution.
#[derive(Debug, Clone)]
pub struct TemplateDocument {
    pub file: String,
    pub nodes: Vec<TemplateNode>,
    pub collectors: BTreeMap<NodeId, NodeCollector>,
    pub resolved: BTreeMap<NodeId, ResolvedElement>,
    pub texts: BTreeMap<NodeId, String>,
}

impl TemplateDocument {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            nodes: vec![TemplateNode {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
            collectors: BTreeMap::new(),
            resolved: BTreeMap::new(),
            texts: BTreeMap::new(),
        }
    }

    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TemplateNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &TemplateNode {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// The node itself followed by each ancestor up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |current| self.parent(*current))
    }

    pub fn collector(&self, id: NodeId) -> Option<&NodeCollector> {
        self.collectors.get(&id)
    }

    /// Copies the children of `id` under the root of a fresh document.
    pub fn extract_children(&self, id: NodeId) -> TemplateDocument {
        let mut fragment = TemplateDocument::new(self.file.clone());
        for child in self.children(id) {
            self.copy_subtree(*child, &mut fragment, NodeId::ROOT);
        }
        fragment
    }

    fn copy_subtree(&self, source: NodeId, target: &mut TemplateDocument, parent: NodeId) {
        let copied = target.append(parent, self.node(source).kind.clone());
        for child in self.children(source) {
            self.copy_subtree(*child, target, copied);
        }
    }

    /// Concatenated text of the direct text children of `id`.
    pub fn inner_text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|child| match &self.node(*child).kind {
                NodeKind::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
