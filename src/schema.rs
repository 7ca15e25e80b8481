//! Definition serializer: a *static* element-tree schema rendered as an XML
//! document. This serializes form structure, never form data.
//!
//! Output shape:
//!
//! ```text
//! <definition version="2.0">
//!   <properties>
//!     <root_name>…</root_name>
//!     <schema>…</schema>
//!     <default_uri>…</default_uri>
//!     <namespaces>
//!       <namespace prefix="…">uri</namespace>
//!     </namespaces>
//!   </properties>
//!   <element>                       <!-- tree root -->
//!     <properties>
//!       <access>…</access>          <!-- control "#access" -->
//!       <index key="3">…</index>    <!-- key not a valid XML name -->
//!     </properties>
//!     <children>
//!       <element name="slot">…</element>
//!     </children>
//!   </element>
//! </definition>
//! ```

use indexmap::IndexMap;
use serde_json::Value;

use crate::document::{Document, NodeId};
use crate::element::{ElementId, FormTree};
use crate::error::Result;

/// Version marker stamped on the definition root.
pub const DEFINITION_VERSION: &str = "2.0";

/// Document-level properties of a form definition.
#[derive(Debug, Clone, Default)]
pub struct FormProperties {
    /// Name of the document root element instances of this form produce.
    pub root_name: String,
    /// Target schema reference (e.g. an XSD location), if any.
    pub schema_uri: Option<String>,
    /// Default namespace URI, if any.
    pub default_uri: Option<String>,
    /// Ordered prefix → URI namespace bindings.
    pub namespaces: IndexMap<String, String>,
}

impl FormProperties {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
            ..Self::default()
        }
    }

    pub fn schema_uri(mut self, uri: impl Into<String>) -> Self {
        self.schema_uri = Some(uri.into());
        self
    }

    pub fn default_uri(mut self, uri: impl Into<String>) -> Self {
        self.default_uri = Some(uri.into());
        self
    }

    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }
}

/// Serializes a static element tree into an XML schema document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefinitionSerializer;

impl DefinitionSerializer {
    /// Build the definition document for `properties` + `tree`.
    pub fn create(properties: &FormProperties, tree: &FormTree) -> Result<Document> {
        let mut doc = Document::new();
        let root = doc.create_element("definition");
        doc.set_root(root)?;
        doc.set_attribute(root, "version", DEFINITION_VERSION)?;

        Self::write_properties(&mut doc, root, properties)?;
        Self::write_element(&mut doc, root, tree, tree.root(), None)?;
        Ok(doc)
    }

    fn write_properties(
        doc: &mut Document,
        parent: NodeId,
        properties: &FormProperties,
    ) -> Result<()> {
        let props = doc.create_element("properties");
        doc.append_child(parent, props)?;

        let root_name = doc.create_element("root_name");
        doc.set_text(root_name, &properties.root_name)?;
        doc.append_child(props, root_name)?;

        if let Some(uri) = &properties.schema_uri {
            let schema = doc.create_element("schema");
            doc.set_text(schema, uri)?;
            doc.append_child(props, schema)?;
        }
        if let Some(uri) = &properties.default_uri {
            let default_uri = doc.create_element("default_uri");
            doc.set_text(default_uri, uri)?;
            doc.append_child(props, default_uri)?;
        }

        let namespaces = doc.create_element("namespaces");
        doc.append_child(props, namespaces)?;
        for (prefix, uri) in &properties.namespaces {
            let ns = doc.create_element("namespace");
            doc.set_attribute(ns, "prefix", prefix)?;
            doc.set_text(ns, uri)?;
            doc.append_child(namespaces, ns)?;
        }
        Ok(())
    }

    fn write_element(
        doc: &mut Document,
        parent: NodeId,
        tree: &FormTree,
        element: ElementId,
        slot: Option<&str>,
    ) -> Result<()> {
        let decl = doc.create_element("element");
        doc.append_child(parent, decl)?;
        if let Some(slot) = slot {
            doc.set_attribute(decl, "name", slot)?;
        }

        let props = doc.create_element("properties");
        doc.append_child(decl, props)?;
        for (key, value) in tree.controls(element) {
            Self::write_control(doc, props, key, value)?;
        }

        let children = doc.create_element("children");
        doc.append_child(decl, children)?;
        let slots: Vec<(String, ElementId)> = tree.children(element).to_vec();
        for (slot, child) in slots {
            Self::write_element(doc, children, tree, child, Some(&slot))?;
        }
        Ok(())
    }

    fn write_control(doc: &mut Document, parent: NodeId, key: &str, value: &Value) -> Result<()> {
        let stripped = key.strip_prefix('#').unwrap_or(key);
        let entry = if is_valid_xml_name(stripped) {
            let entry = doc.create_element(stripped);
            doc.append_child(parent, entry)?;
            entry
        } else {
            // XML tag names cannot start with a digit or contain arbitrary
            // characters; fall back to a generic entry carrying the key.
            let entry = doc.create_element("index");
            doc.set_attribute(entry, "key", stripped)?;
            doc.append_child(parent, entry)?;
            entry
        };

        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    Self::write_control(doc, entry, k, v)?;
                }
            }
            Value::Null => {}
            Value::String(s) => doc.set_text(entry, s)?,
            other => doc.set_text(entry, &other.to_string())?,
        }
        Ok(())
    }
}

/// Syntactically valid XML identifier: starts with a letter or underscore;
/// remainder letters, digits or underscores.
fn is_valid_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementDef;
    use serde_json::json;

    /// T-SCH-1: `#access` serializes to a tag named `access`; key `3`
    /// becomes an `index` entry with `key="3"`.
    #[test]
    fn t_sch_1_control_keys() {
        let mut tree = FormTree::new(
            ElementDef::new()
                .control("#access", json!(true))
                .control("3", json!("third")),
        );
        tree.add_child(tree.root(), "name", ElementDef::new());
        let props = FormProperties::new("record");

        let doc = DefinitionSerializer::create(&props, &tree).unwrap();
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains("<access>true</access>"));
        assert!(xml.contains(r#"<index key="3">third</index>"#));
    }

    /// T-SCH-2: version marker, properties block and ordered namespaces.
    #[test]
    fn t_sch_2_properties_block() {
        let tree = FormTree::new(ElementDef::new());
        let props = FormProperties::new("mods")
            .schema_uri("http://www.loc.gov/standards/mods/v3/mods-3-4.xsd")
            .default_uri("http://www.loc.gov/mods/v3")
            .namespace("xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .namespace("xlink", "http://www.w3.org/1999/xlink");

        let doc = DefinitionSerializer::create(&props, &tree).unwrap();
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.starts_with(r#"<definition version="2.0">"#));
        assert!(xml.contains("<root_name>mods</root_name>"));
        assert!(xml.contains(
            "<schema>http://www.loc.gov/standards/mods/v3/mods-3-4.xsd</schema>"
        ));
        assert!(xml.contains("<default_uri>http://www.loc.gov/mods/v3</default_uri>"));
        let xsi = xml.find(r#"<namespace prefix="xsi">"#).unwrap();
        let xlink = xml.find(r#"<namespace prefix="xlink">"#).unwrap();
        assert!(xsi < xlink, "namespace order must follow declaration order");
    }

    /// T-SCH-3: element declarations mirror the tree with slot-name
    /// attributes; the tree root carries none.
    #[test]
    fn t_sch_3_element_mirror() {
        let mut tree = FormTree::new(ElementDef::new());
        let person = tree.add_child(tree.root(), "person", ElementDef::new());
        tree.add_child(person, "name", ElementDef::new());
        let props = FormProperties::new("record");

        let doc = DefinitionSerializer::create(&props, &tree).unwrap();
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains(r#"<element name="person">"#));
        assert!(xml.contains(r#"<element name="name">"#));
        // exactly one unnamed element declaration: the tree root
        assert_eq!(xml.matches("<element>").count(), 1);
    }

    /// T-SCH-4: JSON-object control values recurse as nested properties.
    #[test]
    fn t_sch_4_nested_controls() {
        let tree = FormTree::new(ElementDef::new().control(
            "#options",
            json!({"yes": "Yes", "no": "No"}),
        ));
        let props = FormProperties::new("record");

        let doc = DefinitionSerializer::create(&props, &tree).unwrap();
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains("<options><yes>Yes</yes><no>No</no></options>"));
    }

    /// T-SCH-5: scalar non-string values serialize as stringified text.
    #[test]
    fn t_sch_5_scalar_values() {
        let tree = FormTree::new(
            ElementDef::new()
                .control("#required", json!(true))
                .control("#weight", json!(7)),
        );
        let props = FormProperties::new("record");

        let doc = DefinitionSerializer::create(&props, &tree).unwrap();
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains("<required>true</required>"));
        assert!(xml.contains("<weight>7</weight>"));
    }
}
