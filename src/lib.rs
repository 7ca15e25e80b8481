//! xmlform - form element tree <-> XML document synchronization
//!
//! A form definition is a static tree of named elements; each element may
//! declare read/create/update/delete actions against a context node in a
//! backing XML document. The engine keeps the two sides in step:
//!
//! Definition -> Generator (bind existing nodes, expand repeats)
//!            -> Processor (apply submitted values: create, update, delete)
//!            -> Registry (hash -> node bindings across passes)
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use xmlform::{
//!     ActionSet, ChildElementCreate, Context, Document, ElementDef, FormTree,
//!     NodeRegistry, Processor, SubmittedValues, TextUpdate,
//! };
//!
//! let mut tree = FormTree::new(ElementDef::new().actions(
//!     ActionSet::new().with_create(Context::Document, ChildElementCreate::new("record")),
//! ));
//! let name = tree.add_child(
//!     tree.root(),
//!     "name",
//!     ElementDef::new().actions(
//!         ActionSet::new()
//!             .with_create(Context::Parent, ChildElementCreate::new("name"))
//!             .with_update(Context::Self_, TextUpdate),
//!     ),
//! );
//!
//! let mut document = Document::new();
//! let mut registry = NodeRegistry::new();
//! let values = SubmittedValues::new().with(tree.hash(name), json!("Ada"));
//!
//! let root = tree.root();
//! let report = Processor::new(&mut document, &mut tree, &mut registry, &values)
//!     .process(root)
//!     .unwrap();
//! assert_eq!(report.created, 2);
//! assert_eq!(document.to_xml_string().unwrap(), "<record><name>Ada</name></record>");
//! ```

// Error taxonomy
pub mod error;

// Backing XML document (arena nodes, quick-xml load/save)
pub mod document;

// Form element tree: hashes, controls, action declarations
pub mod element;

// Contexts, handler traits and the node-backed built-ins
pub mod action;

// Context resolution against the registry
pub mod context;

// Hash -> node bindings, with origin metadata for cleanup
pub mod registry;

// Node discovery and tree expansion
pub mod generator;

// Submitted-value synchronization pipeline
pub mod processor;

// Static definition serializer
pub mod schema;

// Injected collaborators: form definitions and submitted values
pub mod source;
pub mod values;

// Public re-exports
pub use action::{
    ActionDecl, ActionSet, AttributeCreate, ChildElementCreate, ChildElementRead, Context,
    CreateHandler, DeleteHandler, NodeDelete, ReadHandler, RootElementRead, TextUpdate,
    UpdateHandler,
};
pub use document::{Document, NodeId, NodeKind};
pub use element::{ElementDef, ElementId, FormTree, ACCESS_CONTROL};
pub use error::{Result, SyncError};
pub use generator::{GenerateReport, Generator};
pub use processor::{ProcessReport, Processor};
pub use registry::{EntryOrigin, NodeRegistry, RegistryEntry};
pub use schema::{DefinitionSerializer, FormProperties, DEFINITION_VERSION};
pub use source::{FormDefinition, FormSource, InMemoryFormSource};
pub use values::{SubmittedValues, ValueSource};
