//! Identity map between form element hashes and document nodes.
//!
//! The registry is the single source of truth for "which node does this
//! element stand for" within one synchronization session. It holds weak
//! back-references only (the document owns the nodes) plus, per entry,
//! the parent hash link and the delete declaration captured at registration
//! time. Those two fields are what keep synthetic deletes and cascading
//! cleanup possible after the originating elements have left the tree.

use std::collections::HashMap;

use uuid::Uuid;

use crate::action::{ActionDecl, DeleteHandler};
use crate::document::NodeId;
use crate::error::{Result, SyncError};

/// Provenance captured when a hash is bound to a node.
#[derive(Debug, Clone, Default)]
pub struct EntryOrigin {
    /// Hash of the element's parent at registration time.
    pub parent: Option<Uuid>,
    /// The element definition's delete action, if it declared one.
    pub delete: Option<ActionDecl<dyn DeleteHandler>>,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub node: NodeId,
    pub origin: EntryOrigin,
}

/// hash → document node identity map.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    entries: HashMap<Uuid, RegistryEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a hash to a node. Re-binding an already registered hash is a
    /// logic error, never a silent overwrite.
    pub fn register(&mut self, hash: Uuid, node: NodeId, origin: EntryOrigin) -> Result<()> {
        if self.entries.contains_key(&hash) {
            return Err(SyncError::DuplicateRegistration { hash });
        }
        self.entries.insert(hash, RegistryEntry { node, origin });
        Ok(())
    }

    pub fn unregister(&mut self, hash: Uuid) -> Option<RegistryEntry> {
        self.entries.remove(&hash)
    }

    pub fn is_registered(&self, hash: Uuid) -> bool {
        self.entries.contains_key(&hash)
    }

    pub fn get(&self, hash: Uuid) -> Result<NodeId> {
        self.entries
            .get(&hash)
            .map(|e| e.node)
            .ok_or(SyncError::NotRegistered { hash })
    }

    pub fn entry(&self, hash: Uuid) -> Option<&RegistryEntry> {
        self.entries.get(&hash)
    }

    /// Snapshot of the current bindings. Iteration order is unspecified but
    /// stable within one snapshot.
    pub fn registered(&self) -> Vec<(Uuid, NodeId)> {
        self.entries.iter().map(|(h, e)| (*h, e.node)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered hashes whose parent-link chain passes through
    /// `ancestor`. Used by cascading cleanup.
    pub fn descendants_of(&self, ancestor: Uuid) -> Vec<Uuid> {
        self.entries
            .keys()
            .copied()
            .filter(|&h| h != ancestor && self.has_ancestor(h, ancestor))
            .collect()
    }

    fn has_ancestor(&self, hash: Uuid, ancestor: Uuid) -> bool {
        let mut current = self.entries.get(&hash).and_then(|e| e.origin.parent);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.entries.get(&p).and_then(|e| e.origin.parent);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// T-REG-1: register/get/unregister round-trip.
    #[test]
    fn t_reg_1_round_trip() {
        let mut reg = NodeRegistry::new();
        let hash = Uuid::new_v4();
        reg.register(hash, NodeId(3), EntryOrigin::default()).unwrap();
        assert!(reg.is_registered(hash));
        assert_eq!(reg.get(hash).unwrap(), NodeId(3));
        reg.unregister(hash);
        assert!(!reg.is_registered(hash));
        assert!(matches!(
            reg.get(hash),
            Err(SyncError::NotRegistered { .. })
        ));
    }

    /// T-REG-2: duplicate registration is rejected, binding untouched.
    #[test]
    fn t_reg_2_no_silent_overwrite() {
        let mut reg = NodeRegistry::new();
        let hash = Uuid::new_v4();
        reg.register(hash, NodeId(1), EntryOrigin::default()).unwrap();
        let err = reg.register(hash, NodeId(2), EntryOrigin::default());
        assert!(matches!(
            err,
            Err(SyncError::DuplicateRegistration { .. })
        ));
        assert_eq!(reg.get(hash).unwrap(), NodeId(1));
    }

    /// T-REG-3: descendants_of follows parent links transitively.
    #[test]
    fn t_reg_3_descendants() {
        let mut reg = NodeRegistry::new();
        let (a, b, c, other) = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        reg.register(a, NodeId(0), EntryOrigin::default()).unwrap();
        reg.register(
            b,
            NodeId(1),
            EntryOrigin {
                parent: Some(a),
                delete: None,
            },
        )
        .unwrap();
        reg.register(
            c,
            NodeId(2),
            EntryOrigin {
                parent: Some(b),
                delete: None,
            },
        )
        .unwrap();
        reg.register(other, NodeId(3), EntryOrigin::default()).unwrap();

        let mut descendants = reg.descendants_of(a);
        descendants.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(descendants, expected);
        assert!(reg.descendants_of(other).is_empty());
    }

    /// T-REG-4: snapshot lists every current binding exactly once.
    #[test]
    fn t_reg_4_snapshot() {
        let mut reg = NodeRegistry::new();
        let h1 = Uuid::new_v4();
        let h2 = Uuid::new_v4();
        reg.register(h1, NodeId(1), EntryOrigin::default()).unwrap();
        reg.register(h2, NodeId(2), EntryOrigin::default()).unwrap();
        let snapshot = reg.registered();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&(h1, NodeId(1))));
        assert!(snapshot.contains(&(h2, NodeId(2))));
    }
}
