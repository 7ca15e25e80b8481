//! Discovery: bind an existing document's nodes to a template element tree.
//!
//! The generator walks the tree pre-order with an explicit work stack (the
//! tree grows under the walk when templates get duplicated, and deeply
//! repeated structures must not recurse unbounded). For each unregistered
//! element with a read action it resolves the action's context, reads the
//! candidate nodes, binds the first node to the element and clones the
//! template once per remaining node (one duplicate per node, in list
//! order). A duplicate's subtree is pushed so it is resolved against its own
//! bound node before the outer walk resumes. An empty read result prunes
//! descent: without a bound node there is no node-relative context for the
//! descendants.

use tracing::{debug, trace};

use crate::context;
use crate::document::Document;
use crate::element::{ElementId, FormTree};
use crate::error::{Result, SyncError};
use crate::registry::{EntryOrigin, NodeRegistry};

/// What one `generate` run did. A second run over the same tree reports
/// zero work: discovery is idempotent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateReport {
    pub registered: usize,
    pub duplicated: usize,
}

pub struct Generator<'a> {
    document: &'a mut Document,
    tree: &'a mut FormTree,
    registry: &'a mut NodeRegistry,
}

struct ElementStep {
    descend: bool,
    duplicates: Vec<ElementId>,
}

impl<'a> Generator<'a> {
    pub fn new(
        document: &'a mut Document,
        tree: &'a mut FormTree,
        registry: &'a mut NodeRegistry,
    ) -> Self {
        Self {
            document,
            tree,
            registry,
        }
    }

    /// Discover nodes for the subtree rooted at `root`, expanding the tree
    /// to match existing document cardinality.
    pub fn generate(&mut self, root: ElementId) -> Result<GenerateReport> {
        let mut report = GenerateReport::default();
        let mut stack = vec![root];

        while let Some(element) = stack.pop() {
            let step = self.process_element(element, &mut report)?;
            // Duplicates go under the element's own subtree on the stack so
            // each duplicate's descendants are resolved against its bound
            // node before the outer walk resumes.
            for dup in step.duplicates.into_iter().rev() {
                stack.push(dup);
            }
            if step.descend {
                for (_, child) in self.tree.children(element).iter().rev() {
                    stack.push(*child);
                }
            }
        }

        debug!(
            registered = report.registered,
            duplicated = report.duplicated,
            "discovery pass complete"
        );
        Ok(report)
    }

    fn process_element(
        &mut self,
        element: ElementId,
        report: &mut GenerateReport,
    ) -> Result<ElementStep> {
        let hash = self.tree.hash(element);

        // Idempotence: duplicated subtrees re-enter this walk and must not
        // be reprocessed.
        if self.registry.is_registered(hash) {
            return Ok(ElementStep {
                descend: true,
                duplicates: Vec::new(),
            });
        }

        let Some(read) = self.tree.actions(element).read.clone() else {
            return Ok(ElementStep {
                descend: true,
                duplicates: Vec::new(),
            });
        };

        let scope = match context::resolve(self.document, self.tree, self.registry, element, read.context)
        {
            Ok(scope) => scope,
            // The reference node does not exist in this document; nothing
            // to bind here or below.
            Err(SyncError::ContextNotFound { .. }) => {
                trace!(%hash, "context node absent, skipping subtree");
                return Ok(ElementStep {
                    descend: false,
                    duplicates: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };

        let nodes = read.handler.execute(self.document, scope)?;
        if nodes.is_empty() {
            trace!(%hash, "read matched no nodes");
            return Ok(ElementStep {
                descend: false,
                duplicates: Vec::new(),
            });
        }

        // First node binds to the template element itself.
        self.registry
            .register(hash, nodes[0], self.origin_for(element))?;
        report.registered += 1;

        // One fresh duplicate of the template per remaining node.
        let mut duplicates = Vec::new();
        for &node in &nodes[1..] {
            let dup = self
                .tree
                .duplicate(element)
                .ok_or(SyncError::ContextDefinition { hash })?;
            self.registry
                .register(self.tree.hash(dup), node, self.origin_for(dup))?;
            report.registered += 1;
            report.duplicated += 1;
            duplicates.push(dup);
        }
        if !duplicates.is_empty() {
            debug!(%hash, count = duplicates.len(), "expanded template for repeated nodes");
        }

        Ok(ElementStep {
            descend: true,
            duplicates,
        })
    }

    fn origin_for(&self, element: ElementId) -> EntryOrigin {
        EntryOrigin {
            parent: self.tree.parent(element).map(|p| self.tree.hash(p)),
            delete: self.tree.actions(element).delete.clone(),
        }
    }
}
