//! Actions attached to form elements, and the built-in node-backed handlers.
//!
//! An element carries up to four action slots (read, create, update,
//! delete), each pairing an addressing [`Context`] with a handler trait
//! object. The engine matches the slots exhaustively; there is no name-based
//! dispatch.
//!
//! Handlers never resolve their own reference node: the generator and the
//! processor resolve the declared context centrally (`context::resolve`) and
//! hand the result in. A read/create handler receives a *scope*
//! (`None` = the whole document); an update/delete handler receives the
//! concrete node it operates on.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, NodeId};
use crate::error::{Result, SyncError};

/// Addressing mode an action uses to find its reference node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Context {
    /// No reference node; the action scopes to the whole document.
    Document,
    /// The node bound to the nearest ancestor that declares a read or
    /// create action.
    Parent,
    /// The node bound to the element itself.
    Self_,
}

// ── Handler traits ──

/// Matches zero or more document nodes for an element.
pub trait ReadHandler: Send + Sync {
    /// Guard. Not consulted during discovery; kept for parity with the
    /// write-side actions so callers can pre-flight a read.
    fn should_execute(&self, _document: &Document, _registered: bool, _value: Option<&Value>) -> bool {
        true
    }

    fn execute(&self, document: &Document, scope: Option<NodeId>) -> Result<Vec<NodeId>>;
}

/// Produces a new document node for an element.
pub trait CreateHandler: Send + Sync {
    fn should_execute(&self, document: &Document, registered: bool, value: Option<&Value>) -> bool;

    fn execute(
        &self,
        document: &mut Document,
        scope: Option<NodeId>,
        value: Option<&Value>,
    ) -> Result<NodeId>;
}

/// Pushes an element's submitted value into its bound node.
pub trait UpdateHandler: Send + Sync {
    fn should_execute(&self, document: &Document, registered: bool, value: Option<&Value>) -> bool;

    /// Returns true when the node was modified.
    fn execute(&self, document: &mut Document, node: NodeId, value: Option<&Value>)
        -> Result<bool>;
}

/// Removes an element's bound node from the document.
pub trait DeleteHandler: Send + Sync {
    fn should_execute(&self, document: &Document, registered: bool, value: Option<&Value>) -> bool;

    /// Returns true when the node was detached.
    fn execute(&self, document: &mut Document, node: NodeId) -> Result<bool>;
}

// ── Action declarations ──

/// One declared action: a context plus a shared handler.
///
/// Handlers are shared by `Arc` so duplicating an element preserves its
/// action declarations without cloning handler state.
pub struct ActionDecl<H: ?Sized> {
    pub context: Context,
    pub handler: Arc<H>,
}

impl<H: ?Sized> Clone for ActionDecl<H> {
    fn clone(&self) -> Self {
        Self {
            context: self.context,
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: ?Sized> fmt::Debug for ActionDecl<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDecl")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// The optional bundle of up to four actions on a form element.
#[derive(Debug, Clone, Default)]
pub struct ActionSet {
    pub read: Option<ActionDecl<dyn ReadHandler>>,
    pub create: Option<ActionDecl<dyn CreateHandler>>,
    pub update: Option<ActionDecl<dyn UpdateHandler>>,
    pub delete: Option<ActionDecl<dyn DeleteHandler>>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read<H: ReadHandler + 'static>(mut self, context: Context, handler: H) -> Self {
        self.read = Some(ActionDecl {
            context,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn with_create<H: CreateHandler + 'static>(mut self, context: Context, handler: H) -> Self {
        self.create = Some(ActionDecl {
            context,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn with_update<H: UpdateHandler + 'static>(mut self, context: Context, handler: H) -> Self {
        self.update = Some(ActionDecl {
            context,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn with_delete<H: DeleteHandler + 'static>(mut self, context: Context, handler: H) -> Self {
        self.delete = Some(ActionDecl {
            context,
            handler: Arc::new(handler),
        });
        self
    }

    /// True when the element can define a parent context for its
    /// descendants (it declares a read or create action).
    pub fn defines_context(&self) -> bool {
        self.read.is_some() || self.create.is_some()
    }
}

// ── Built-in handlers ──

/// Reads child elements of the scope with a fixed tag name.
#[derive(Debug, Clone)]
pub struct ChildElementRead {
    name: String,
}

impl ChildElementRead {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ReadHandler for ChildElementRead {
    fn execute(&self, document: &Document, scope: Option<NodeId>) -> Result<Vec<NodeId>> {
        let base = match scope.or_else(|| document.root()) {
            Some(b) => b,
            None => return Ok(Vec::new()),
        };
        Ok(document.child_elements_named(base, &self.name))
    }
}

/// Reads the document root element, provided its tag matches. Binds the
/// form's root element to an already-loaded document.
#[derive(Debug, Clone)]
pub struct RootElementRead {
    name: String,
}

impl RootElementRead {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ReadHandler for RootElementRead {
    fn execute(&self, document: &Document, _scope: Option<NodeId>) -> Result<Vec<NodeId>> {
        Ok(document
            .root()
            .into_iter()
            .filter(|&r| document.name(r) == Some(self.name.as_str()))
            .collect())
    }
}

/// Appends a new child element under the scope; the submitted value, when
/// textual, becomes the new node's text content.
#[derive(Debug, Clone)]
pub struct ChildElementCreate {
    name: String,
}

impl ChildElementCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CreateHandler for ChildElementCreate {
    fn should_execute(&self, _document: &Document, registered: bool, _value: Option<&Value>) -> bool {
        !registered
    }

    fn execute(
        &self,
        document: &mut Document,
        scope: Option<NodeId>,
        value: Option<&Value>,
    ) -> Result<NodeId> {
        let node = document.create_element(&self.name);
        match scope.or_else(|| document.root()) {
            Some(base) => document.append_child(base, node)?,
            // First node of an empty document becomes the root.
            None => document.set_root(node)?,
        }
        if let Some(text) = value.and_then(value_as_text) {
            document.set_text(node, &text)?;
        }
        Ok(node)
    }
}

/// Sets an attribute on the scope element from the submitted value.
#[derive(Debug, Clone)]
pub struct AttributeCreate {
    name: String,
}

impl AttributeCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CreateHandler for AttributeCreate {
    fn should_execute(&self, _document: &Document, registered: bool, value: Option<&Value>) -> bool {
        !registered && value.map(|v| !v.is_null()).unwrap_or(false)
    }

    fn execute(
        &self,
        document: &mut Document,
        scope: Option<NodeId>,
        value: Option<&Value>,
    ) -> Result<NodeId> {
        let owner = scope
            .or_else(|| document.root())
            .ok_or(SyncError::EmptyDocument)?;
        let text = value.and_then(value_as_text).unwrap_or_default();
        document.set_attribute(owner, &self.name, &text)
    }
}

/// Replaces the bound node's text (element) or value (attribute) with the
/// submitted value.
#[derive(Debug, Clone, Default)]
pub struct TextUpdate;

impl UpdateHandler for TextUpdate {
    fn should_execute(&self, _document: &Document, registered: bool, value: Option<&Value>) -> bool {
        registered && value.map(|v| !v.is_null()).unwrap_or(false)
    }

    fn execute(
        &self,
        document: &mut Document,
        node: NodeId,
        value: Option<&Value>,
    ) -> Result<bool> {
        let text = value.and_then(value_as_text).unwrap_or_default();
        if document.text(node) == text {
            return Ok(false);
        }
        document.set_text(node, &text)?;
        Ok(true)
    }
}

/// Detaches the bound node. Fires when the user cleared the field.
#[derive(Debug, Clone, Default)]
pub struct NodeDelete;

impl DeleteHandler for NodeDelete {
    fn should_execute(&self, _document: &Document, registered: bool, value: Option<&Value>) -> bool {
        registered && value.map(Value::is_null).unwrap_or(true)
    }

    fn execute(&self, document: &mut Document, node: NodeId) -> Result<bool> {
        if !document.is_attached(node) && document.parent(node).is_none() {
            return Ok(false);
        }
        document.detach(node);
        Ok(true)
    }
}

/// Plain-text rendering of a submitted value.
fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NodeKind;
    use serde_json::json;

    /// T-ACT-1: ChildElementRead scopes to the document root when no
    /// reference node is given.
    #[test]
    fn t_act_1_read_document_scope() {
        let doc = Document::parse("<r><p/><p/><q/></r>").unwrap();
        let read = ChildElementRead::new("p");
        assert_eq!(read.execute(&doc, None).unwrap().len(), 2);
        let scoped = read.execute(&doc, doc.root()).unwrap();
        assert_eq!(scoped.len(), 2);
    }

    /// T-ACT-2: ChildElementCreate appends under the scope and sets text.
    #[test]
    fn t_act_2_create_child() {
        let mut doc = Document::parse("<r/>").unwrap();
        let create = ChildElementCreate::new("p");
        assert!(create.should_execute(&doc, false, None));
        assert!(!create.should_execute(&doc, true, None));
        let root = doc.root();
        let node = create
            .execute(&mut doc, root, Some(&json!("hi")))
            .unwrap();
        assert_eq!(doc.text(node), "hi");
        assert_eq!(doc.to_xml_string().unwrap(), "<r><p>hi</p></r>");
    }

    /// T-ACT-3: ChildElementCreate on an empty document produces the root.
    #[test]
    fn t_act_3_create_root() {
        let mut doc = Document::new();
        let create = ChildElementCreate::new("r");
        let node = create.execute(&mut doc, None, None).unwrap();
        assert_eq!(doc.root(), Some(node));
    }

    /// T-ACT-4: TextUpdate reports whether it changed anything.
    #[test]
    fn t_act_4_update_reports_change() {
        let mut doc = Document::parse("<r><p>old</p></r>").unwrap();
        let p = doc.child_elements_named(doc.root().unwrap(), "p")[0];
        let update = TextUpdate;
        assert!(update.execute(&mut doc, p, Some(&json!("new"))).unwrap());
        assert!(!update.execute(&mut doc, p, Some(&json!("new"))).unwrap());
        assert_eq!(doc.text(p), "new");
    }

    /// T-ACT-5: NodeDelete guard fires only for cleared values on
    /// registered elements; execution detaches at most once.
    #[test]
    fn t_act_5_delete_guard_and_idempotence() {
        let mut doc = Document::parse("<r><p/></r>").unwrap();
        let p = doc.child_elements_named(doc.root().unwrap(), "p")[0];
        let delete = NodeDelete;
        assert!(delete.should_execute(&doc, true, None));
        assert!(delete.should_execute(&doc, true, Some(&Value::Null)));
        assert!(!delete.should_execute(&doc, true, Some(&json!("kept"))));
        assert!(!delete.should_execute(&doc, false, None));
        assert!(delete.execute(&mut doc, p).unwrap());
        assert!(!delete.execute(&mut doc, p).unwrap());
    }

    /// T-ACT-6: AttributeCreate sets the attribute from the value.
    #[test]
    fn t_act_6_attribute_create() {
        let mut doc = Document::parse("<r/>").unwrap();
        let create = AttributeCreate::new("id");
        assert!(!create.should_execute(&doc, false, None));
        assert!(create.should_execute(&doc, false, Some(&json!("7"))));
        let root = doc.root();
        let attr = create
            .execute(&mut doc, root, Some(&json!("7")))
            .unwrap();
        assert_eq!(doc.kind(attr), NodeKind::Attribute);
        assert_eq!(doc.to_xml_string().unwrap(), r#"<r id="7"/>"#);
    }

    /// T-ACT-7: RootElementRead matches the document root by tag name only.
    #[test]
    fn t_act_7_root_read() {
        let doc = Document::parse("<record><person/></record>").unwrap();
        let read = RootElementRead::new("record");
        assert_eq!(read.execute(&doc, None).unwrap(), vec![doc.root().unwrap()]);
        let miss = RootElementRead::new("person");
        assert!(miss.execute(&doc, None).unwrap().is_empty());
    }
}
