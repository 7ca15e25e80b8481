//! Typed error model for the synchronization engine.
//!
//! Two of the variants carry recovery semantics the rest of the crate relies
//! on:
//!
//! - [`SyncError::ContextNotFound`] is transient: the addressed reference
//!   node does not exist *yet*. `context::exists` swallows it and the
//!   processor's create fixed point parks the action and retries.
//! - [`SyncError::ContextDefinition`] is a definition bug (a parent-relative
//!   action whose ancestor chain can never produce a node). It always
//!   propagates.
//!
//! There is no transactional rollback. When an error propagates out of
//! `process`, nodes already created or modified in that pass remain in the
//! document; callers must discard the document rather than trust it.

use uuid::Uuid;

use crate::document::NodeId;

/// All failure modes of the synchronization engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// The addressed reference node does not currently exist. Recoverable.
    #[error("context node not found for element {hash}")]
    ContextNotFound { hash: Uuid },

    /// A parent-context action whose ancestor chain declares no read or
    /// create action anywhere up to the root. Always fatal.
    #[error("no ancestor of element {hash} can define a parent context")]
    ContextDefinition { hash: Uuid },

    /// A hash was registered twice. Re-binding an element identity is a
    /// logic error, never a silent overwrite.
    #[error("element {hash} is already registered")]
    DuplicateRegistration { hash: Uuid },

    /// `registry.get` on an unregistered hash.
    #[error("element {hash} is not registered")]
    NotRegistered { hash: Uuid },

    /// XML parse or serialize failure.
    #[error("xml: {0}")]
    Xml(String),

    /// Lookup of a form definition that the source does not provide.
    #[error("unknown form: {name}")]
    UnknownForm { name: String },

    /// An operation that needs a document root ran against an empty document.
    #[error("document has no root element")]
    EmptyDocument,

    /// An operation was applied to a node of the wrong kind.
    #[error("node {node:?} is not {expected}")]
    WrongNodeKind {
        node: NodeId,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
