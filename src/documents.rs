//! XML document trees
//!
//! Schema documents and instance documents are held in an owned, arena-backed
//! tree with namespace-resolved names. Every node remembers its line and
//! column so diagnostics can point back into the source, and element nodes
//! carry their in-scope namespace bindings for resolving QName-valued
//! attributes such as `type="xs:string"` or `xsi:type`.
//!
//! The tree is mutable: validation in default-injection mode attaches
//! defaulted attributes and default text content to it.

use crate::error::{Error, ParseError, Result};
use crate::namespaces::{NamespaceContext, QName};

/// Handle of a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// An attribute of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Namespace-resolved attribute name
    pub name: QName,
    /// Attribute value (after XML attribute-value normalization)
    pub value: String,
    /// Whether the attribute was added from a schema default
    pub defaulted: bool,
}

impl Attribute {
    /// Create a new attribute
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
            defaulted: false,
        }
    }
}

/// Element payload of a node
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Namespace-resolved element name
    pub name: QName,
    /// Attributes in document order, namespace declarations excluded
    pub attributes: Vec<Attribute>,
    /// In-scope namespace bindings
    pub namespaces: NamespaceContext,
}

impl ElementData {
    /// Get an attribute value by namespace and local name
    pub fn attribute(&self, namespace: Option<&str>, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(namespace, local_name))
            .map(|a| a.value.as_str())
    }
}

/// Kind of a node
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Element node
    Element(ElementData),
    /// Character data (text and CDATA sections are merged)
    Text(String),
    /// Comment
    Comment(String),
    /// Processing instruction
    ProcessingInstruction {
        /// PI target
        target: String,
        /// PI content
        value: Option<String>,
    },
}

/// A node of the tree
#[derive(Debug, Clone)]
pub struct Node {
    /// Node payload
    pub kind: NodeKind,
    /// Parent element
    pub parent: Option<NodeId>,
    /// Children in document order
    pub children: Vec<NodeId>,
    /// 1-based line, 0 when unknown
    pub line: u32,
    /// 1-based column, 0 when unknown
    pub column: u32,
}

/// XML Document representation
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    base_uri: Option<String>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse(xml, None)
    }

    /// Parse an XML document, remembering the location it was loaded from
    pub fn parse(xml: &str, base_uri: Option<&str>) -> Result<Self> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let parsed = roxmltree::Document::parse_with_options(xml, options).map_err(|e| {
            let pos = e.pos();
            let mut err = ParseError::new(e.to_string()).with_position(pos.row, pos.col);
            if let Some(base) = base_uri {
                err = err.with_location(base);
            }
            Error::Parse(err)
        })?;

        let mut doc = Document {
            nodes: Vec::new(),
            root: None,
            base_uri: base_uri.map(String::from),
        };
        let root = doc.import_node(&parsed, parsed.root_element(), None);
        doc.root = Some(root);
        Ok(doc)
    }

    fn import_node(
        &mut self,
        parsed: &roxmltree::Document<'_>,
        node: roxmltree::Node<'_, '_>,
        parent: Option<NodeId>,
    ) -> NodeId {
        let pos = parsed.text_pos_at(node.range().start);
        let kind = if node.is_element() {
            let tag = node.tag_name();
            let mut namespaces = NamespaceContext::new();
            for ns in node.namespaces() {
                match ns.name() {
                    Some(prefix) => namespaces.add_prefix(prefix, ns.uri()),
                    None => namespaces.set_default_namespace(ns.uri()),
                }
            }
            let attributes = node
                .attributes()
                .map(|a| Attribute::new(QName::new(a.namespace(), a.name()), a.value()))
                .collect();
            NodeKind::Element(ElementData {
                name: QName::new(tag.namespace(), tag.name()),
                attributes,
                namespaces,
            })
        } else if node.is_text() {
            NodeKind::Text(node.text().unwrap_or_default().to_string())
        } else if node.is_comment() {
            NodeKind::Comment(node.text().unwrap_or_default().to_string())
        } else {
            let (target, value) = match node.pi() {
                Some(pi) => (pi.target.to_string(), pi.value.map(String::from)),
                None => (String::new(), None),
            };
            NodeKind::ProcessingInstruction { target, value }
        };

        let id = self.push_node(kind, parent, pos.row, pos.col);
        for child in node.children() {
            let child_id = self.import_node(parsed, child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    fn push_node(&mut self, kind: NodeKind, parent: Option<NodeId>, line: u32, column: u32) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            line,
            column,
        });
        id
    }

    /// Base URI (location) of the document, if known
    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Set the base URI
    pub fn set_base_uri(&mut self, base_uri: impl Into<String>) {
        self.base_uri = Some(base_uri.into());
    }

    /// Document element
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Access a node
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Element payload of a node, `None` for non-element nodes
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Name of an element node
    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.element(id).map(|e| &e.name)
    }

    /// Parent node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Child nodes in document order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Element children in document order
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |c| matches!(self.nodes[c.0].kind, NodeKind::Element(_)))
    }

    /// Attribute value of an element
    pub fn attribute(&self, id: NodeId, namespace: Option<&str>, local_name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(namespace, local_name))
    }

    /// Concatenated text of the direct text children
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in &self.nodes[id.0].children {
            if let NodeKind::Text(t) = &self.nodes[child.0].kind {
                out.push_str(t);
            }
        }
        out
    }

    /// Line of a node (0 if unknown)
    pub fn line(&self, id: NodeId) -> u32 {
        self.nodes[id.0].line
    }

    /// Column of a node (0 if unknown)
    pub fn column(&self, id: NodeId) -> u32 {
        self.nodes[id.0].column
    }

    /// Simple location path like `/root/child[2]` for diagnostics
    pub fn path(&self, id: NodeId) -> String {
        let mut steps = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(e) = self.element(node) {
                let name = &e.name.local_name;
                let position = match self.parent(node) {
                    Some(parent) => {
                        let same: Vec<NodeId> = self
                            .child_elements(parent)
                            .filter(|c| self.name(*c).map(|n| n == &e.name).unwrap_or(false))
                            .collect();
                        if same.len() > 1 {
                            same.iter().position(|c| *c == node).map(|p| p + 1)
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                match position {
                    Some(p) => steps.push(format!("{}[{}]", name, p)),
                    None => steps.push(name.clone()),
                }
            }
            current = self.parent(node);
        }
        steps.reverse();
        format!("/{}", steps.join("/"))
    }

    /// Create a document holding a single root element
    pub fn with_root(name: QName, namespaces: NamespaceContext) -> (Self, NodeId) {
        let mut doc = Document::new();
        let root = doc.push_node(
            NodeKind::Element(ElementData {
                name,
                attributes: Vec::new(),
                namespaces,
            }),
            None,
            0,
            0,
        );
        doc.root = Some(root);
        (doc, root)
    }

    /// Append a child element, inheriting the parent's namespace bindings
    pub fn append_element(&mut self, parent: NodeId, name: QName) -> NodeId {
        let namespaces = self
            .element(parent)
            .map(|e| e.namespaces.clone())
            .unwrap_or_default();
        let id = self.push_node(
            NodeKind::Element(ElementData {
                name,
                attributes: Vec::new(),
                namespaces,
            }),
            Some(parent),
            0,
            0,
        );
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append a text node to an element
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let id = self.push_node(NodeKind::Text(text.into()), Some(parent), 0, 0);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Add or replace an attribute on an element
    pub fn set_attribute(&mut self, id: NodeId, attribute: Attribute) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            match e.attributes.iter_mut().find(|a| a.name == attribute.name) {
                Some(existing) => *existing = attribute,
                None => e.attributes.push(attribute),
            }
        }
    }
}
