//! Work deferred until the node mapping table is complete.

use super::node_map::NodeMappingTable;
use crate::document::{NodeAttribute, SceneDocument};
use crate::source::SourceNodeId;

/// A post-traversal operation. Captures source ids at enqueue time and
/// resolves them through the mapping table when applied.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredAction {
    /// Point each `(instance, source)` instance node at the mesh and material
    /// of the node it instances.
    CreateInstances {
        pairs: Vec<(SourceNodeId, SourceNodeId)>,
    },
    /// Aim `node` at `target`.
    LookAt {
        node: SourceNodeId,
        target: SourceNodeId,
    },
}

impl DeferredAction {
    /// Apply against the final mapping table. References to unmapped nodes
    /// are skipped. Returns the number of references resolved.
    pub fn apply(&self, doc: &mut SceneDocument, table: &NodeMappingTable) -> usize {
        match self {
            DeferredAction::CreateInstances { pairs } => pairs
                .iter()
                .filter(|(instance, source)| link_instance(doc, table, *instance, *source))
                .count(),
            DeferredAction::LookAt { node, target } => {
                match (table.lookup(*node), table.lookup(*target)) {
                    (Some(node), Some(target)) => {
                        doc.node_mut(node).look_at = Some(target);
                        1
                    }
                    _ => {
                        tracing::debug!("Skipping look-at {:?} -> {:?}: not exported", node, target);
                        0
                    }
                }
            }
        }
    }
}

fn link_instance(
    doc: &mut SceneDocument,
    table: &NodeMappingTable,
    instance: SourceNodeId,
    source: SourceNodeId,
) -> bool {
    let (instance_node, source_node) = match (table.lookup(instance), table.lookup(source)) {
        (Some(i), Some(s)) => (i, s),
        _ => {
            tracing::debug!("Skipping instance {:?} of {:?}: not exported", instance, source);
            return false;
        }
    };
    let source_target = doc.node(source_node);
    let mesh = match source_target.attribute {
        NodeAttribute::Mesh { mesh } => mesh,
        _ => return false,
    };
    let material = source_target.material;
    let target = doc.node_mut(instance_node);
    target.attribute = NodeAttribute::Mesh { mesh };
    target.material = material;
    true
}

/// FIFO of deferred actions, drained exactly once.
#[derive(Debug, Default)]
pub struct DeferredActionQueue {
    actions: Vec<DeferredAction>,
}

impl DeferredActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, action: DeferredAction) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Apply every queued action in enqueue order, leaving the queue empty.
    pub fn drain_all(&mut self, doc: &mut SceneDocument, table: &NodeMappingTable) -> usize {
        std::mem::take(&mut self.actions)
            .iter()
            .map(|action| action.apply(doc, table))
            .sum()
    }
}
