//! Arena-backed mutable XML document.
//!
//! Nodes live in a flat arena and are addressed by [`NodeId`]. Detaching a
//! node unlinks it from its parent but never frees the slot, so a `NodeId`
//! held elsewhere (the node registry keeps such weak back-references) stays
//! valid and can still be interrogated. [`Document::is_attached`] answers
//! whether the node is currently reachable from the document root.
//!
//! Load/save goes through quick-xml. Text and attribute values are unescaped
//! on load and re-escaped on save, so untouched content round-trips exactly.
//! Comments, processing instructions and the XML declaration are dropped on
//! load.

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, SyncError};

/// Index of a node in the document arena. Never reused within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Discriminates the three node kinds without exposing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Attribute,
    Text,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        name: String,
        attributes: Vec<NodeId>,
        children: Vec<NodeId>,
    },
    Attribute {
        name: String,
        value: String,
    },
    Text {
        content: String,
    },
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    data: NodeData,
}

/// A mutable XML document. Owns every node it ever created.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from its textual serialization.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut doc = Document::new();
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| SyncError::Xml(e.to_string()))?;
            match event {
                Event::Start(e) => {
                    let id = doc.start_element(&e, stack.last().copied())?;
                    stack.push(id);
                }
                Event::Empty(e) => {
                    doc.start_element(&e, stack.last().copied())?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape().map_err(|e| SyncError::Xml(e.to_string()))?;
                    if let Some(&parent) = stack.last() {
                        let id = doc.create_text(&text);
                        doc.append_child(parent, id)?;
                    }
                }
                Event::CData(e) => {
                    let bytes = e.into_inner();
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    if let Some(&parent) = stack.last() {
                        let id = doc.create_text(&text);
                        doc.append_child(parent, id)?;
                    }
                }
                Event::Eof => break,
                // Declaration, comments, PIs and doctypes are not modeled.
                _ => {}
            }
        }

        if doc.root.is_none() {
            return Err(SyncError::Xml("document has no root element".into()));
        }
        Ok(doc)
    }

    fn start_element(&mut self, e: &BytesStart<'_>, parent: Option<NodeId>) -> Result<NodeId> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let id = self.create_element(&name);
        match parent {
            Some(p) => self.append_child(p, id)?,
            None => {
                if self.root.is_some() {
                    return Err(SyncError::Xml("multiple root elements".into()));
                }
                self.root = Some(id);
            }
        }
        for attr in e.attributes() {
            let attr = attr.map_err(|e| SyncError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| SyncError::Xml(e.to_string()))?;
            self.set_attribute(id, &key, &value)?;
        }
        Ok(id)
    }

    /// Serialize the document. Fails on an empty document.
    pub fn to_xml_string(&self) -> Result<String> {
        let root = self.root.ok_or(SyncError::EmptyDocument)?;
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write_node(&mut writer, root)?;
        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| SyncError::Xml(e.to_string()))
    }

    fn write_node(&self, writer: &mut Writer<Cursor<Vec<u8>>>, id: NodeId) -> Result<()> {
        match &self.node(id).data {
            NodeData::Element {
                name,
                attributes,
                children,
            } => {
                let mut start = BytesStart::new(name.as_str());
                for &attr_id in attributes {
                    if let NodeData::Attribute { name, value } = &self.node(attr_id).data {
                        start.push_attribute((name.as_str(), value.as_str()));
                    }
                }
                if children.is_empty() {
                    writer
                        .write_event(Event::Empty(start))
                        .map_err(|e| SyncError::Xml(e.to_string()))?;
                } else {
                    writer
                        .write_event(Event::Start(start))
                        .map_err(|e| SyncError::Xml(e.to_string()))?;
                    for &child in children {
                        self.write_node(writer, child)?;
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new(name.as_str())))
                        .map_err(|e| SyncError::Xml(e.to_string()))?;
                }
            }
            NodeData::Text { content } => {
                writer
                    .write_event(Event::Text(BytesText::new(content)))
                    .map_err(|e| SyncError::Xml(e.to_string()))?;
            }
            NodeData::Attribute { .. } => {
                return Err(SyncError::WrongNodeKind {
                    node: id,
                    expected: "an element or text node",
                });
            }
        }
        Ok(())
    }

    // ── Construction ──

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Element {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        })
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push(NodeData::Text {
            content: content.to_string(),
        })
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { parent: None, data });
        id
    }

    /// Make `id` the document root. Fails if a root already exists.
    pub fn set_root(&mut self, id: NodeId) -> Result<()> {
        if self.root.is_some() {
            return Err(SyncError::Xml("document already has a root".into()));
        }
        self.expect_kind(id, NodeKind::Element)?;
        self.root = Some(id);
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    // ── Structure ──

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.expect_kind(parent, NodeKind::Element)?;
        if self.kind(child) == NodeKind::Attribute {
            return Err(SyncError::WrongNodeKind {
                node: child,
                expected: "an element or text node",
            });
        }
        self.nodes[child.0 as usize].parent = Some(parent);
        if let NodeData::Element { children, .. } = &mut self.nodes[parent.0 as usize].data {
            children.push(child);
        }
        Ok(())
    }

    /// Insert `child` under `parent` directly after `anchor`.
    pub fn insert_after(&mut self, parent: NodeId, anchor: NodeId, child: NodeId) -> Result<()> {
        self.expect_kind(parent, NodeKind::Element)?;
        self.nodes[child.0 as usize].parent = Some(parent);
        if let NodeData::Element { children, .. } = &mut self.nodes[parent.0 as usize].data {
            match children.iter().position(|&c| c == anchor) {
                Some(pos) => children.insert(pos + 1, child),
                None => children.push(child),
            }
        }
        Ok(())
    }

    /// Unlink a node from its parent. The arena slot stays alive; the node
    /// simply stops being reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        if Some(id) == self.root {
            self.root = None;
        }
        let parent = self.nodes[id.0 as usize].parent.take();
        if let Some(p) = parent {
            if let NodeData::Element {
                attributes,
                children,
                ..
            } = &mut self.nodes[p.0 as usize].data
            {
                children.retain(|&c| c != id);
                attributes.retain(|&a| a != id);
            }
        }
    }

    /// True when the node is reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if Some(current) == self.root {
                return true;
            }
            match self.node(current).parent {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    // ── Inspection ──

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        match self.node(id).data {
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Attribute { .. } => NodeKind::Attribute,
            NodeData::Text { .. } => NodeKind::Text,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element { name, .. } | NodeData::Attribute { name, .. } => Some(name),
            NodeData::Text { .. } => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).data {
            NodeData::Element { children, .. } => children,
            _ => &[],
        }
    }

    /// Child elements of `id` with the given tag name, in document order.
    pub fn child_elements_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.kind(c) == NodeKind::Element && self.name(c) == Some(name))
            .collect()
    }

    /// Concatenated text content of an element, or the value of an
    /// attribute/text node.
    pub fn text(&self, id: NodeId) -> String {
        match &self.node(id).data {
            NodeData::Element { children, .. } => children
                .iter()
                .filter_map(|&c| match &self.node(c).data {
                    NodeData::Text { content } => Some(content.as_str()),
                    _ => None,
                })
                .collect(),
            NodeData::Attribute { value, .. } => value.clone(),
            NodeData::Text { content } => content.clone(),
        }
    }

    /// Replace the text content of an element, or the value of an
    /// attribute/text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        match self.kind(id) {
            NodeKind::Element => {
                let old: Vec<NodeId> = self
                    .children(id)
                    .iter()
                    .copied()
                    .filter(|&c| self.kind(c) == NodeKind::Text)
                    .collect();
                for t in old {
                    self.detach(t);
                }
                if !text.is_empty() {
                    let t = self.create_text(text);
                    self.append_child(id, t)?;
                }
            }
            NodeKind::Attribute => {
                if let NodeData::Attribute { value, .. } = &mut self.nodes[id.0 as usize].data {
                    *value = text.to_string();
                }
            }
            NodeKind::Text => {
                if let NodeData::Text { content } = &mut self.nodes[id.0 as usize].data {
                    *content = text.to_string();
                }
            }
        }
        Ok(())
    }

    // ── Attributes ──

    /// The attribute node named `name` on element `id`.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<NodeId> {
        match &self.node(id).data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .copied()
                .find(|&a| self.name(a) == Some(name)),
            _ => None,
        }
    }

    pub fn attribute_value(&self, id: NodeId, name: &str) -> Option<String> {
        self.attribute(id, name).map(|a| self.text(a))
    }

    /// Set an attribute on an element, creating the attribute node when it
    /// does not exist yet. Returns the attribute node.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<NodeId> {
        self.expect_kind(id, NodeKind::Element)?;
        if let Some(existing) = self.attribute(id, name) {
            self.set_text(existing, value)?;
            return Ok(existing);
        }
        let attr = self.push(NodeData::Attribute {
            name: name.to_string(),
            value: value.to_string(),
        });
        self.nodes[attr.0 as usize].parent = Some(id);
        if let NodeData::Element { attributes, .. } = &mut self.nodes[id.0 as usize].data {
            attributes.push(attr);
        }
        Ok(attr)
    }

    fn expect_kind(&self, id: NodeId, kind: NodeKind) -> Result<()> {
        if self.kind(id) != kind {
            return Err(SyncError::WrongNodeKind {
                node: id,
                expected: match kind {
                    NodeKind::Element => "an element",
                    NodeKind::Attribute => "an attribute",
                    NodeKind::Text => "a text node",
                },
            });
        }
        Ok(())
    }
}
