//! Context resolution: deciding which document node an action operates
//! relative to.

use crate::action::Context;
use crate::document::{Document, NodeId};
use crate::element::{ElementId, FormTree};
use crate::error::{Result, SyncError};
use crate::registry::NodeRegistry;

/// Resolve the reference node for `element` under the given addressing
/// mode.
///
/// - `Document` resolves to `None`: the caller scopes to the whole document.
/// - `Self_` resolves to the element's registered node, or
///   [`SyncError::ContextNotFound`] if the element is not registered yet.
/// - `Parent` walks ancestors upward; the first ancestor declaring a read
///   or create action is the defining ancestor. A registered defining
///   ancestor yields its node; an unregistered one yields
///   [`SyncError::ContextNotFound`] (transient: the node may not exist
///   yet). If the chain reaches the root without a defining ancestor the
///   declaration itself is broken: [`SyncError::ContextDefinition`].
pub fn resolve(
    _document: &Document,
    tree: &FormTree,
    registry: &NodeRegistry,
    element: ElementId,
    context: Context,
) -> Result<Option<NodeId>> {
    match context {
        Context::Document => Ok(None),
        Context::Self_ => {
            let hash = tree.hash(element);
            if registry.is_registered(hash) {
                Ok(Some(registry.get(hash)?))
            } else {
                Err(SyncError::ContextNotFound { hash })
            }
        }
        Context::Parent => {
            for ancestor in tree.ancestors(element) {
                if !tree.actions(ancestor).defines_context() {
                    continue;
                }
                let hash = tree.hash(ancestor);
                return if registry.is_registered(hash) {
                    Ok(Some(registry.get(hash)?))
                } else {
                    Err(SyncError::ContextNotFound { hash })
                };
            }
            Err(SyncError::ContextDefinition {
                hash: tree.hash(element),
            })
        }
    }
}

/// Non-throwing wrapper over [`resolve`] for the *not found* case only.
/// A definition error still propagates; it signals a bug in the form
/// definition and must never be masked as "absent".
pub fn exists(
    document: &Document,
    tree: &FormTree,
    registry: &NodeRegistry,
    element: ElementId,
    context: Context,
) -> Result<bool> {
    match resolve(document, tree, registry, element, context) {
        Ok(_) => Ok(true),
        Err(SyncError::ContextNotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
