//! Submit-time synchronization: apply create/update/delete actions so the
//! document matches the submitted element tree, then reconcile the registry.
//!
//! The phase ordering is a hard contract, not an implementation detail:
//! creates run before updates (updates need nodes to exist), deletes run
//! after updates (an element's final state is flushed to the document
//! before its removal is considered), and registry cleanup runs last so it
//! observes the fully settled tree/document state.
//!
//! Create actions are driven to a fixed point: a create may depend on a
//! sibling created later in iteration order, so the pending batch is
//! re-scanned until a scan makes no progress. Whatever is still pending
//! then (an unsatisfiable or cyclic dependency) is dropped without error.
//! That soft failure is intentional and logged, not raised.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::action::{ActionDecl, Context, CreateHandler, DeleteHandler, UpdateHandler};
use crate::context;
use crate::document::{Document, NodeId, NodeKind};
use crate::element::{ElementId, FormTree};
use crate::error::{Result, SyncError};
use crate::registry::{EntryOrigin, NodeRegistry};
use crate::values::ValueSource;

/// What one `process` run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub synthetic_deleted: usize,
    pub dropped_creates: usize,
    pub unregistered: usize,
}

pub struct Processor<'a> {
    document: &'a mut Document,
    tree: &'a mut FormTree,
    registry: &'a mut NodeRegistry,
    values: &'a dyn ValueSource,
}

impl<'a> Processor<'a> {
    pub fn new(
        document: &'a mut Document,
        tree: &'a mut FormTree,
        registry: &'a mut NodeRegistry,
        values: &'a dyn ValueSource,
    ) -> Self {
        Self {
            document,
            tree,
            registry,
            values,
        }
    }

    /// Synchronize the document with the subtree rooted at `root`.
    ///
    /// On error the document may hold a partial pass; there is no rollback
    /// and the caller must discard the document rather than trust it.
    pub fn process(&mut self, root: ElementId) -> Result<ProcessReport> {
        let mut report = ProcessReport::default();

        // Phase 1+2: flatten, then drop inaccessible subtrees. Action
        // batches are built from the filtered view only. Removal detection
        // (synthetic deletes, cleanup) checks presence against the whole
        // tree: an inaccessible element is excluded from cleanup detection,
        // it is not "removed". Deleting data behind a hidden field would
        // wipe it on every submit.
        let filtered = self.filtered_flatten(root);
        let present: HashSet<Uuid> =
            self.tree.flatten(root).into_iter().map(|(h, _)| h).collect();
        trace!(elements = filtered.len(), "filtered tree flattened");

        // Phase 3: partition by action kind, create > update > delete.
        // An element is consumed by the first kind whose guard passes.
        let mut creates: Vec<ElementId> = Vec::new();
        let mut updates: Vec<ElementId> = Vec::new();
        let mut deletes: Vec<ElementId> = Vec::new();
        for &(hash, element) in &filtered {
            let registered = self.registry.is_registered(hash);
            let value = self.values.value(hash);
            let actions = self.tree.actions(element);
            if let Some(create) = &actions.create {
                if create.handler.should_execute(self.document, registered, value) {
                    creates.push(element);
                    continue;
                }
            }
            if let Some(update) = &actions.update {
                if update.handler.should_execute(self.document, registered, value) {
                    updates.push(element);
                    continue;
                }
            }
            if let Some(delete) = &actions.delete {
                if delete.handler.should_execute(self.document, registered, value) {
                    deletes.push(element);
                }
            }
        }
        debug!(
            creates = creates.len(),
            updates = updates.len(),
            deletes = deletes.len(),
            "actions partitioned"
        );

        // Phase 4: creates to a fixed point.
        self.run_creates(creates, &mut report)?;

        // Phase 5: updates, unconditionally, in flattened order.
        for element in updates {
            self.run_update(element, &mut report)?;
        }

        // Phase 6a: explicitly selected deletes.
        for element in deletes {
            self.run_delete(element, &mut report)?;
        }

        // Phase 6b: synthetic deletes for registered hashes the user removed
        // from the tree since the previous synchronization.
        self.run_synthetic_deletes(&present, &mut report)?;

        // Phase 7: registry cleanup, always last.
        self.cleanup_registry(&present, &mut report);

        debug!(?report, "synchronization pass complete");
        Ok(report)
    }

    /// Pre-order flatten with inaccessible subtrees removed.
    fn filtered_flatten(&self, root: ElementId) -> Vec<(Uuid, ElementId)> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !self.tree.accessible(id) {
                continue;
            }
            out.push((self.tree.hash(id), id));
            for (_, child) in self.tree.children(id).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    // ── Creates ──

    fn run_creates(&mut self, batch: Vec<ElementId>, report: &mut ProcessReport) -> Result<()> {
        let mut pending = batch;
        loop {
            if pending.is_empty() {
                break;
            }
            let mut progressed = false;
            let mut still_pending = Vec::new();
            for element in pending {
                match self.try_create(element)? {
                    Some(node) => {
                        let hash = self.tree.hash(element);
                        self.registry.register(hash, node, self.origin_for(element))?;
                        report.created += 1;
                        progressed = true;
                    }
                    None => still_pending.push(element),
                }
            }
            pending = still_pending;
            if !progressed {
                // Unsatisfiable or cyclic dependencies: dropped, not raised.
                report.dropped_creates = pending.len();
                if !pending.is_empty() {
                    warn!(
                        dropped = pending.len(),
                        "create actions left unresolved after fixed point"
                    );
                }
                break;
            }
        }
        Ok(())
    }

    /// One create attempt. `Ok(None)` means "not yet": the reference node
    /// is still missing and the action stays pending. Anything else that
    /// fails is fatal.
    fn try_create(&mut self, element: ElementId) -> Result<Option<NodeId>> {
        let hash = self.tree.hash(element);
        let Some(ActionDecl { context: cx, handler }) =
            self.tree.actions(element).create.clone()
        else {
            return Ok(None);
        };
        let scope = match context::resolve(self.document, self.tree, self.registry, element, cx) {
            Ok(scope) => scope,
            Err(SyncError::ContextNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let value = self.values.value(hash);
        match Self::execute_create(&handler, self.document, scope, value) {
            Ok(node) => Ok(Some(node)),
            Err(SyncError::ContextNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn execute_create(
        handler: &std::sync::Arc<dyn CreateHandler>,
        document: &mut Document,
        scope: Option<NodeId>,
        value: Option<&Value>,
    ) -> Result<NodeId> {
        handler.execute(document, scope, value)
    }

    // ── Updates / deletes ──

    fn run_update(&mut self, element: ElementId, report: &mut ProcessReport) -> Result<()> {
        let hash = self.tree.hash(element);
        let Some(ActionDecl { context: cx, handler }) =
            self.tree.actions(element).update.clone()
        else {
            return Ok(());
        };
        let node = self.resolve_target(element, cx)?;
        let value = self.values.value(hash);
        let changed = Self::execute_update(&handler, self.document, node, value)?;
        if changed {
            report.updated += 1;
        }
        Ok(())
    }

    fn execute_update(
        handler: &std::sync::Arc<dyn UpdateHandler>,
        document: &mut Document,
        node: NodeId,
        value: Option<&Value>,
    ) -> Result<bool> {
        handler.execute(document, node, value)
    }

    fn run_delete(&mut self, element: ElementId, report: &mut ProcessReport) -> Result<()> {
        let hash = self.tree.hash(element);
        let Some(ActionDecl { context: cx, handler }) =
            self.tree.actions(element).delete.clone()
        else {
            return Ok(());
        };
        let node = self.resolve_target(element, cx)?;
        if Self::execute_delete(&handler, self.document, node)? {
            report.deleted += 1;
            // The element retired its own node; the binding is stale now.
            self.registry.unregister(hash);
            report.unregistered += 1;
        }
        Ok(())
    }

    fn execute_delete(
        handler: &std::sync::Arc<dyn DeleteHandler>,
        document: &mut Document,
        node: NodeId,
    ) -> Result<bool> {
        handler.execute(document, node)
    }

    /// Resolve the concrete node an update/delete operates on. A document
    /// context means the document root here: these actions need a node,
    /// not a scope.
    fn resolve_target(&self, element: ElementId, cx: Context) -> Result<NodeId> {
        match context::resolve(self.document, self.tree, self.registry, element, cx)? {
            Some(node) => Ok(node),
            None => self.document.root().ok_or(SyncError::EmptyDocument),
        }
    }

    // ── Synthetic deletes and cleanup ──

    fn run_synthetic_deletes(
        &mut self,
        present: &HashSet<Uuid>,
        report: &mut ProcessReport,
    ) -> Result<()> {
        let mut removed: Vec<(Uuid, NodeId)> = self
            .registry
            .registered()
            .into_iter()
            .filter(|(hash, _)| !present.contains(hash))
            .collect();
        removed.sort_by_key(|(hash, _)| *hash); // deterministic order

        for (hash, node) in removed {
            let Some(entry) = self.registry.entry(hash) else {
                continue;
            };
            let Some(delete) = entry.origin.delete.clone() else {
                continue;
            };
            if Self::execute_delete(&delete.handler, self.document, node)? {
                report.synthetic_deleted += 1;
                trace!(%hash, "synthetic delete for removed element");
            }
        }
        Ok(())
    }

    fn cleanup_registry(&mut self, present: &HashSet<Uuid>, report: &mut ProcessReport) {
        let mut orphans: Vec<Uuid> = self
            .registry
            .registered()
            .into_iter()
            .map(|(hash, _)| hash)
            .filter(|hash| !present.contains(hash))
            .collect();
        orphans.sort();

        for hash in orphans {
            // A cascade from an earlier orphan may have removed this one.
            let Some(entry) = self.registry.entry(hash) else {
                continue;
            };
            let node = entry.node;
            match self.document.kind(node) {
                NodeKind::Attribute => {
                    // Keep the entry while the owning element legitimately
                    // remains in the document; a stale attribute entry on a
                    // live element would otherwise resurrect on reload.
                    let owner_attached = self
                        .document
                        .parent(node)
                        .map(|owner| self.document.is_attached(owner))
                        .unwrap_or(false);
                    if !owner_attached {
                        self.registry.unregister(hash);
                        report.unregistered += 1;
                    }
                }
                _ => {
                    if entry.origin.delete.is_some() {
                        // Cascade: leftover descendant entries would produce
                        // invalid references on a later document reload.
                        let descendants = self.registry.descendants_of(hash);
                        self.registry.unregister(hash);
                        report.unregistered += 1;
                        for d in descendants {
                            if self.registry.unregister(d).is_some() {
                                report.unregistered += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    fn origin_for(&self, element: ElementId) -> EntryOrigin {
        EntryOrigin {
            parent: self.tree.parent(element).map(|p| self.tree.hash(p)),
            delete: self.tree.actions(element).delete.clone(),
        }
    }
}
