//! In-memory document tree.
//!
//! A slim arena tree with two uses: the document-tree sink builds one
//! directly from engine output (bypassing textual encoding entirely), and
//! the verifier's parser returns one so tests can extract decoded content.

use crate::writer::{
    escape_attr, escape_text, is_xml_char, validate_name, Conformance, WriteError, WriterOptions,
    XmlWrite,
};

/// Index of a node within a [`TreeDocument`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// An attribute on an element node. Values are stored decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute name.
    pub name: String,
    /// The decoded attribute value.
    pub value: String,
}

/// The kind of a node and its payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The document node; exactly one per tree, always the arena root.
    Document,
    /// An element with its attributes.
    Element {
        /// The element name.
        name: String,
        /// Attributes in emission order.
        attributes: Vec<Attribute>,
    },
    /// Character data, stored decoded (references resolved).
    Text {
        /// The decoded text content.
        content: String,
    },
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    children: Vec<NodeId>,
}

/// An XML document held as an arena of nodes.
#[derive(Debug)]
pub struct TreeDocument {
    nodes: Vec<NodeData>,
}

impl Default for TreeDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeDocument {
    /// Creates an empty document containing only the document node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                children: Vec::new(),
            }],
        }
    }

    /// The document node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Creates a detached node of the given kind.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            children: Vec::new(),
        });
        id
    }

    /// Appends `child` to `parent`'s child list.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
    }

    /// The kind payload of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// The children of a node, in document order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().copied()
    }

    /// The document's root element, if one exists.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .find(|&c| matches!(self.kind(c), NodeKind::Element { .. }))
    }

    /// Depth-first search for the first element with the given name.
    #[must_use]
    pub fn find_element(&self, name: &str) -> Option<NodeId> {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if let NodeKind::Element { name: n, .. } = self.kind(id) {
                if n == name {
                    return Some(id);
                }
            }
            // Push in reverse so document order wins.
            for child in self.nodes[id.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        None
    }

    /// Concatenated decoded text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let NodeKind::Text { content } = self.kind(id) {
            out.push_str(content);
        }
        for child in self.children(id) {
            self.collect_text(child, out);
        }
    }

    /// Renders the tree as markup text, without an XML declaration.
    ///
    /// This is the document-tree sink's capture path: the builder's own
    /// text rendering, escaped the same way the streaming writer escapes.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.render_node(child, &mut out);
        }
        out
    }

    fn render_node(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Document => {}
            NodeKind::Element { name, attributes } => {
                out.push('<');
                out.push_str(name);
                for attr in attributes {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    // Infallible with checking off; validity was enforced
                    // when the node was built.
                    if let Ok(escaped) = escape_attr(&attr.value, false) {
                        out.push_str(&escaped);
                    }
                    out.push('"');
                }
                if self.nodes[id.0].children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for child in self.children(id) {
                        self.render_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
            NodeKind::Text { content } => {
                if let Ok(escaped) = escape_text(content, false) {
                    out.push_str(&escaped);
                }
            }
        }
    }
}

/// Builds a [`TreeDocument`] through the [`XmlWrite`] interface.
///
/// The engine serializes into this directly; no textual encoding happens
/// until [`TreeDocument::render`] is called on the result.
#[derive(Debug)]
pub struct TreeBuilder {
    doc: TreeDocument,
    cursor: Vec<NodeId>,
    /// The element still accepting attributes (no content written yet).
    open_tag: Option<NodeId>,
    options: WriterOptions,
    roots_written: u32,
}

impl TreeBuilder {
    /// Creates a builder enforcing the same contract as the streaming
    /// writer: names are validated, `check_characters` rejects text and
    /// attribute values outside the XML `Char` production at write time,
    /// and `conformance` governs document shape. The textual options
    /// (declaration, BOM, indentation) do not apply to a tree.
    #[must_use]
    pub fn new(options: WriterOptions) -> Self {
        let doc = TreeDocument::new();
        let root = doc.root();
        Self {
            doc,
            cursor: vec![root],
            open_tag: None,
            options,
            roots_written: 0,
        }
    }

    /// Consumes the builder, returning the document.
    #[must_use]
    pub fn into_document(self) -> TreeDocument {
        self.doc
    }

    fn check_value(&self, value: &str) -> Result<(), WriteError> {
        if !self.options.check_characters {
            return Ok(());
        }
        match value.chars().find(|&c| !is_xml_char(c)) {
            Some(c) => Err(WriteError::InvalidChar {
                codepoint: c as u32,
            }),
            None => Ok(()),
        }
    }

    fn current(&self) -> NodeId {
        *self.cursor.last().unwrap_or(&NodeId(0))
    }
}

impl XmlWrite for TreeBuilder {
    fn start_element(&mut self, name: &str) -> Result<(), WriteError> {
        validate_name(name)?;
        if self.cursor.len() == 1 {
            if self.options.conformance == Conformance::Document && self.roots_written > 0 {
                return Err(WriteError::Conformance(
                    "document conformance permits a single root element".to_string(),
                ));
            }
            self.roots_written += 1;
        }
        let parent = self.current();
        let node = self.doc.create_node(NodeKind::Element {
            name: name.to_string(),
            attributes: Vec::new(),
        });
        self.doc.append_child(parent, node);
        self.cursor.push(node);
        self.open_tag = Some(node);
        Ok(())
    }

    fn attribute(&mut self, name: &str, value: &str) -> Result<(), WriteError> {
        validate_name(name)?;
        self.check_value(value)?;
        let Some(id) = self.open_tag else {
            return Err(WriteError::AttributeOutsideTag);
        };
        if let NodeKind::Element { attributes, .. } = &mut self.doc.nodes[id.0].kind {
            attributes.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    fn text(&mut self, content: &str) -> Result<(), WriteError> {
        self.check_value(content)?;
        self.open_tag = None;
        if self.cursor.len() == 1 && self.options.conformance == Conformance::Document {
            return Err(WriteError::Conformance(
                "text is not permitted outside the root element".to_string(),
            ));
        }
        let parent = self.current();
        let node = self.doc.create_node(NodeKind::Text {
            content: content.to_string(),
        });
        self.doc.append_child(parent, node);
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), WriteError> {
        if self.cursor.len() <= 1 {
            return Err(WriteError::NoOpenElement);
        }
        self.cursor.pop();
        self.open_tag = None;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriteError> {
        if self.cursor.len() != 1 {
            return Err(WriteError::Conformance(format!(
                "{} element(s) left open",
                self.cursor.len() - 1
            )));
        }
        if self.options.conformance == Conformance::Document && self.roots_written == 0 {
            return Err(WriteError::Conformance(
                "document conformance requires a root element".to_string(),
            ));
        }
        Ok(())
    }
}
