//! The form element tree.
//!
//! Elements live in an arena owned by [`FormTree`]; each carries a stable
//! identity hash, an ordered set of named child slots, a controls dictionary
//! and an optional [`ActionSet`]. Duplication deep-clones a subtree with
//! fresh hashes and splices the clone into the parent's slot list as a
//! single step, so no other holder ever sees a stale pre-duplication child
//! list.

use indexmap::IndexMap;
use serde_json::Value;
use uuid::Uuid;

use crate::action::ActionSet;

/// Index of an element in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u32);

/// Control key marking element accessibility.
pub const ACCESS_CONTROL: &str = "#access";

/// Definition of one element: controls plus action declarations. The tree
/// assigns identity (hash, parent, slot) when the definition is inserted.
#[derive(Debug, Clone, Default)]
pub struct ElementDef {
    pub controls: IndexMap<String, Value>,
    pub actions: ActionSet,
}

impl ElementDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(mut self, key: impl Into<String>, value: Value) -> Self {
        self.controls.insert(key.into(), value);
        self
    }

    pub fn actions(mut self, actions: ActionSet) -> Self {
        self.actions = actions;
        self
    }
}

#[derive(Debug, Clone)]
struct ElementData {
    hash: Uuid,
    parent: Option<ElementId>,
    /// Ordered (slot name, child) pairs. Several children may share a slot
    /// name once duplicates exist.
    children: Vec<(String, ElementId)>,
    controls: IndexMap<String, Value>,
    actions: ActionSet,
}

/// A form element tree built per session from a static definition.
#[derive(Debug, Clone)]
pub struct FormTree {
    elements: Vec<ElementData>,
    root: ElementId,
}

impl FormTree {
    /// Build a tree whose root is the given definition.
    pub fn new(root: ElementDef) -> Self {
        let data = ElementData {
            hash: Uuid::new_v4(),
            parent: None,
            children: Vec::new(),
            controls: root.controls,
            actions: root.actions,
        };
        Self {
            elements: vec![data],
            root: ElementId(0),
        }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Insert a definition as the last child of `parent` in slot `slot`.
    pub fn add_child(
        &mut self,
        parent: ElementId,
        slot: impl Into<String>,
        def: ElementDef,
    ) -> ElementId {
        let id = ElementId(self.elements.len() as u32);
        self.elements.push(ElementData {
            hash: Uuid::new_v4(),
            parent: Some(parent),
            children: Vec::new(),
            controls: def.controls,
            actions: def.actions,
        });
        self.elements[parent.0 as usize]
            .children
            .push((slot.into(), id));
        id
    }

    // ── Inspection ──

    pub fn hash(&self, id: ElementId) -> Uuid {
        self.elements[id.0 as usize].hash
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements[id.0 as usize].parent
    }

    pub fn children(&self, id: ElementId) -> &[(String, ElementId)] {
        &self.elements[id.0 as usize].children
    }

    pub fn controls(&self, id: ElementId) -> &IndexMap<String, Value> {
        &self.elements[id.0 as usize].controls
    }

    pub fn actions(&self, id: ElementId) -> &ActionSet {
        &self.elements[id.0 as usize].actions
    }

    /// The slot name under which this element hangs in its parent.
    pub fn slot(&self, id: ElementId) -> Option<&str> {
        let parent = self.parent(id)?;
        self.children(parent)
            .iter()
            .find(|(_, c)| *c == id)
            .map(|(s, _)| s.as_str())
    }

    /// Accessibility flag: `#access == false` hides the element (and, for
    /// the processor, its whole subtree).
    pub fn accessible(&self, id: ElementId) -> bool {
        !matches!(
            self.controls(id).get(ACCESS_CONTROL),
            Some(Value::Bool(false))
        )
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: ElementId) -> AncestorIter<'_> {
        AncestorIter {
            tree: self,
            current: self.parent(id),
        }
    }

    /// Pre-order depth-first hash → element view of the subtree at `root`.
    pub fn flatten(&self, root: ElementId) -> Vec<(Uuid, ElementId)> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push((self.hash(id), id));
            for (_, child) in self.children(id).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Locate an element by hash, if it is still part of the tree.
    pub fn by_hash(&self, hash: Uuid) -> Option<ElementId> {
        self.flatten(self.root)
            .into_iter()
            .find(|(h, _)| *h == hash)
            .map(|(_, id)| id)
    }

    // ── Duplication ──

    /// Deep-clone the subtree at `template` with fresh hashes everywhere,
    /// splicing the clone into the template's parent after the last child
    /// sharing the template's slot name. Returns the clone's root.
    ///
    /// Repeated calls therefore keep duplicates in creation order, and the
    /// clone's action declarations share the template's handlers.
    pub fn duplicate(&mut self, template: ElementId) -> Option<ElementId> {
        let parent = self.parent(template)?;
        let slot = self.slot(template)?.to_string();

        let clone = self.clone_subtree(template, Some(parent));

        let children = &mut self.elements[parent.0 as usize].children;
        let insert_at = children
            .iter()
            .rposition(|(s, _)| *s == slot)
            .map(|p| p + 1)
            .unwrap_or(children.len());
        children.insert(insert_at, (slot, clone));
        Some(clone)
    }

    fn clone_subtree(&mut self, source: ElementId, parent: Option<ElementId>) -> ElementId {
        let id = ElementId(self.elements.len() as u32);
        let controls = self.elements[source.0 as usize].controls.clone();
        let actions = self.elements[source.0 as usize].actions.clone();
        self.elements.push(ElementData {
            hash: Uuid::new_v4(),
            parent,
            children: Vec::new(),
            controls,
            actions,
        });
        let source_children: Vec<(String, ElementId)> =
            self.elements[source.0 as usize].children.clone();
        for (slot, child) in source_children {
            let child_clone = self.clone_subtree(child, Some(id));
            self.elements[id.0 as usize].children.push((slot, child_clone));
        }
        id
    }

    /// Remove an element (and its subtree) from its parent's slot list.
    /// Arena slots stay alive; the subtree just stops being reachable.
    pub fn remove(&mut self, id: ElementId) {
        if let Some(parent) = self.parent(id) {
            self.elements[parent.0 as usize]
                .children
                .retain(|(_, c)| *c != id);
            self.elements[id.0 as usize].parent = None;
        }
    }
}

pub struct AncestorIter<'a> {
    tree: &'a FormTree,
    current: Option<ElementId>,
}

impl Iterator for AncestorIter<'_> {
    type Item = ElementId;

    fn next(&mut self) -> Option<ElementId> {
        let id = self.current?;
        self.current = self.tree.parent(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_tree() -> (FormTree, ElementId, ElementId) {
        let mut tree = FormTree::new(ElementDef::new());
        let person = tree.add_child(tree.root(), "person", ElementDef::new());
        let name = tree.add_child(person, "name", ElementDef::new());
        (tree, person, name)
    }

    /// T-ELM-1: hashes are unique across a tree snapshot.
    #[test]
    fn t_elm_1_unique_hashes() {
        let (tree, person, name) = person_tree();
        let hashes = [tree.hash(tree.root()), tree.hash(person), tree.hash(name)];
        assert_eq!(
            hashes.len(),
            hashes
                .iter()
                .collect::<std::collections::HashSet<_>>()
                .len()
        );
    }

    /// T-ELM-2: flatten is pre-order and covers the whole subtree.
    #[test]
    fn t_elm_2_flatten_preorder() {
        let (tree, person, name) = person_tree();
        let flat: Vec<ElementId> = tree
            .flatten(tree.root())
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        assert_eq!(flat, vec![tree.root(), person, name]);
    }

    /// T-ELM-3: duplicate mints fresh hashes for the whole subtree and
    /// lands in the same slot, after the template.
    #[test]
    fn t_elm_3_duplicate_fresh_hashes() {
        let (mut tree, person, name) = person_tree();
        let dup = tree.duplicate(person).unwrap();
        assert_ne!(tree.hash(dup), tree.hash(person));
        let dup_name = tree.children(dup)[0].1;
        assert_ne!(tree.hash(dup_name), tree.hash(name));
        assert_eq!(tree.slot(dup), Some("person"));
        let order: Vec<ElementId> =
            tree.children(tree.root()).iter().map(|(_, c)| *c).collect();
        assert_eq!(order, vec![person, dup]);
    }

    /// T-ELM-4: repeated duplication keeps creation order within the slot.
    #[test]
    fn t_elm_4_duplicate_order() {
        let (mut tree, person, _) = person_tree();
        let d1 = tree.duplicate(person).unwrap();
        let d2 = tree.duplicate(person).unwrap();
        let order: Vec<ElementId> =
            tree.children(tree.root()).iter().map(|(_, c)| *c).collect();
        assert_eq!(order, vec![person, d1, d2]);
    }

    /// T-ELM-5: `#access: false` marks an element inaccessible.
    #[test]
    fn t_elm_5_access_control() {
        let mut tree = FormTree::new(ElementDef::new());
        let hidden = tree.add_child(
            tree.root(),
            "secret",
            ElementDef::new().control(ACCESS_CONTROL, json!(false)),
        );
        assert!(tree.accessible(tree.root()));
        assert!(!tree.accessible(hidden));
    }

    /// T-ELM-6: remove detaches the subtree from flatten.
    #[test]
    fn t_elm_6_remove() {
        let (mut tree, person, name) = person_tree();
        tree.remove(person);
        let flat: Vec<ElementId> = tree
            .flatten(tree.root())
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        assert!(!flat.contains(&person));
        assert!(!flat.contains(&name));
    }

    /// T-ELM-7: ancestors iterates nearest-first up to the root.
    #[test]
    fn t_elm_7_ancestors() {
        let (tree, person, name) = person_tree();
        let ups: Vec<ElementId> = tree.ancestors(name).collect();
        assert_eq!(ups, vec![person, tree.root()]);
    }
}
