//! Source-to-target node association for one export run.

use crate::document::TargetNodeId;
use crate::source::{NodeKind, SourceNodeId};
use crate::types::BoundingBox;
use std::collections::{HashMap, HashSet};

/// Traversal bookkeeping stored alongside a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitInfo {
    pub kind: NodeKind,
    /// Source node whose world transform the target node's local transform is
    /// relative to. `None` means the document root.
    pub anchor: Option<SourceNodeId>,
    /// Resolved instance source, for nodes that instance another's geometry.
    pub instance_source: Option<SourceNodeId>,
    /// Local-space bounds of the exported geometry.
    pub bounds: Option<BoundingBox>,
}

impl VisitInfo {
    pub fn new(kind: NodeKind, anchor: Option<SourceNodeId>) -> Self {
        Self {
            kind,
            anchor,
            instance_source: None,
            bounds: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeMappingEntry {
    pub source: SourceNodeId,
    pub target: TargetNodeId,
    pub info: VisitInfo,
}

/// Maps each visited source node to the single target node created for it.
#[derive(Debug, Default)]
pub struct NodeMappingTable {
    entries: Vec<NodeMappingEntry>,
    index: HashMap<SourceNodeId, usize>,
    names: HashSet<String>,
    bundled: Vec<SourceNodeId>,
    bundled_index: HashSet<SourceNodeId>,
}

impl NodeMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `source` to `target`. Returns `false`, leaving the table
    /// unchanged, if `source` is already mapped.
    pub fn add_pair(&mut self, source: SourceNodeId, target: TargetNodeId, info: VisitInfo) -> bool {
        if self.index.contains_key(&source) {
            return false;
        }
        self.index.insert(source, self.entries.len());
        self.entries.push(NodeMappingEntry {
            source,
            target,
            info,
        });
        true
    }

    pub fn lookup(&self, source: SourceNodeId) -> Option<TargetNodeId> {
        self.entry(source).map(|e| e.target)
    }

    pub fn entry(&self, source: SourceNodeId) -> Option<&NodeMappingEntry> {
        self.index.get(&source).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, source: SourceNodeId) -> bool {
        self.index.contains_key(&source)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[NodeMappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A name not yet registered: `candidate` itself when free, otherwise
    /// `candidate_N` with the smallest free `N >= 1`. Does not register it.
    pub fn make_name_unique(&self, candidate: &str) -> String {
        if !self.names.contains(candidate) {
            return candidate.to_string();
        }
        let mut n = 1usize;
        loop {
            let name = format!("{}_{}", candidate, n);
            if !self.names.contains(&name) {
                return name;
            }
            n += 1;
        }
    }

    /// Reserve `name` so later candidates are disambiguated against it.
    pub fn register_name(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// [`make_name_unique`](Self::make_name_unique) followed by
    /// [`register_name`](Self::register_name).
    pub fn claim_name(&mut self, candidate: &str) -> String {
        let name = self.make_name_unique(candidate);
        self.register_name(name.clone());
        name
    }

    /// Record that `source` was selected through bundle membership.
    pub fn add_bundled_node(&mut self, source: SourceNodeId) {
        if self.bundled_index.insert(source) {
            self.bundled.push(source);
        }
    }

    pub fn is_bundled(&self, source: SourceNodeId) -> bool {
        self.bundled_index.contains(&source)
    }

    /// Bundle members in the order they were added.
    pub fn bundled_nodes(&self) -> &[SourceNodeId] {
        &self.bundled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> VisitInfo {
        VisitInfo::new(NodeKind::Object, None)
    }

    #[test]
    fn test_add_pair_rejects_duplicates() {
        let mut table = NodeMappingTable::new();
        assert!(table.add_pair(SourceNodeId(3), TargetNodeId(1), info()));
        assert!(!table.add_pair(SourceNodeId(3), TargetNodeId(2), info()));
        assert_eq!(table.lookup(SourceNodeId(3)), Some(TargetNodeId(1)));
        assert_eq!(table.lookup(SourceNodeId(4)), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut table = NodeMappingTable::new();
        for (s, t) in [(9, 1), (2, 2), (5, 3)] {
            table.add_pair(SourceNodeId(s), TargetNodeId(t), info());
        }
        let order: Vec<u32> = table.entries().iter().map(|e| e.source.0).collect();
        assert_eq!(order, vec![9, 2, 5]);
    }

    #[test]
    fn test_make_name_unique_is_pure_and_deterministic() {
        let mut table = NodeMappingTable::new();
        assert_eq!(table.make_name_unique("geo"), "geo");
        assert_eq!(table.make_name_unique("geo"), "geo");

        table.register_name("geo");
        let first = table.make_name_unique("geo");
        let second = table.make_name_unique("geo");
        assert_eq!(first, "geo_1");
        assert_eq!(first, second);

        assert_eq!(table.claim_name("geo"), "geo_1");
        assert_eq!(table.claim_name("geo"), "geo_2");
        assert_eq!(table.make_name_unique("light"), "light");
    }

    #[test]
    fn test_bundled_nodes_dedup() {
        let mut table = NodeMappingTable::new();
        table.add_bundled_node(SourceNodeId(4));
        table.add_bundled_node(SourceNodeId(2));
        table.add_bundled_node(SourceNodeId(4));
        assert_eq!(table.bundled_nodes(), &[SourceNodeId(4), SourceNodeId(2)]);
        assert!(table.is_bundled(SourceNodeId(2)));
        assert!(!table.is_bundled(SourceNodeId(1)));
    }
}
