//! Bundle (named node group) selection.

use super::diagnostics::ErrorAccumulator;
use super::node_map::NodeMappingTable;
use crate::source::{SourceGraph, SourceNodeId};

/// Split a bundle pattern string into glob patterns, dropping `@` prefixes.
pub fn parse_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|p| p.replace('@', ""))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Match `name` against a glob pattern supporting `*` and `?`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// Register every member of the bundles matching `patterns` in `table` and
/// return the lowest network containing all of them.
///
/// The candidate starts as the first member's parent (`object_root` when that
/// parent is not strictly inside it) and walks up until it contains each later
/// member, never climbing above `object_root`.
/// Returns `None` only when no candidate was found and `object_root` does not
/// exist.
pub fn resolve_bundle_root<G: SourceGraph + ?Sized>(
    graph: &G,
    patterns: &str,
    object_root: &str,
    table: &mut NodeMappingTable,
    errors: &mut ErrorAccumulator,
) -> Option<SourceNodeId> {
    let patterns = parse_patterns(patterns);
    let obj_net = graph.find_node(object_root);
    let mut top: Option<SourceNodeId> = None;

    let bundles = graph.bundles();
    for pattern in &patterns {
        if !bundles.iter().any(|b| glob_match(pattern, b)) {
            errors.add_error(["Bundle pattern '", pattern.as_str(), "' matched no bundles"], false);
        }
    }

    for bundle in bundles
        .iter()
        .filter(|b| patterns.iter().any(|p| glob_match(p, b)))
    {
        let members = graph.bundle_members(bundle);
        if members.is_empty() {
            errors.add_warning(format!("Bundle '{}' has no members", bundle));
        }
        for member in members {
            table.add_bundled_node(member);
            top = match top {
                // A parent at or outside the object root cannot narrow it.
                None => graph
                    .parent(member)
                    .filter(|&p| obj_net.is_some_and(|obj| graph.is_contained_by(p, obj)))
                    .or(obj_net),
                Some(mut candidate) => {
                    while Some(candidate) != obj_net && !graph.is_contained_by(member, candidate) {
                        match graph.parent(candidate) {
                            Some(parent) => candidate = parent,
                            None => break,
                        }
                    }
                    Some(candidate)
                }
            };
        }
    }

    let root = top.or(obj_net);
    if let Some(root) = root {
        tracing::debug!(
            "Bundled export of {} node(s) rooted at {}",
            table.bundled_nodes().len(),
            graph.full_path(root)
        );
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryScene, NodeKind};

    fn scene() -> MemoryScene {
        let mut scene = MemoryScene::new(24.0);
        for (path, kind) in [
            ("/obj", NodeKind::Network),
            ("/obj/chars", NodeKind::Network),
            ("/obj/chars/hero", NodeKind::Object),
            ("/obj/chars/hero/body", NodeKind::Geometry),
            ("/obj/chars/villain", NodeKind::Geometry),
            ("/obj/props", NodeKind::Network),
            ("/obj/props/crate", NodeKind::Geometry),
        ] {
            scene.add_node(path, kind).unwrap();
        }
        scene
    }

    #[test]
    fn test_parse_patterns() {
        assert_eq!(parse_patterns("@hero, @villain  props*"), vec!["hero", "villain", "props*"]);
        assert!(parse_patterns("  ").is_empty());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("hero", "hero"));
        assert!(glob_match("h*", "hero"));
        assert!(glob_match("*o", "hero"));
        assert!(glob_match("h?r*", "hero"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("h?", "hero"));
        assert!(!glob_match("villain", "hero"));
    }

    #[test]
    fn test_common_container_of_siblings() {
        let mut scene = scene();
        scene.set_bundle("cast", &["/obj/chars/hero/body", "/obj/chars/villain"]);
        let mut table = NodeMappingTable::new();
        let mut errors = ErrorAccumulator::new();
        let root = resolve_bundle_root(&scene, "@cast", "/obj", &mut table, &mut errors).unwrap();
        assert_eq!(scene.full_path(root), "/obj/chars");
        assert_eq!(table.bundled_nodes().len(), 2);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_disjoint_members_fall_back_to_object_root() {
        let mut scene = scene();
        scene.set_bundle("mixed", &["/obj/chars/villain", "/obj/props/crate"]);
        let mut table = NodeMappingTable::new();
        let mut errors = ErrorAccumulator::new();
        let root = resolve_bundle_root(&scene, "mixed", "/obj", &mut table, &mut errors).unwrap();
        assert_eq!(scene.full_path(root), "/obj");
    }

    #[test]
    fn test_unmatched_pattern_warns() {
        let scene = scene();
        let mut table = NodeMappingTable::new();
        let mut errors = ErrorAccumulator::new();
        let root = resolve_bundle_root(&scene, "nothing*", "/obj", &mut table, &mut errors).unwrap();
        assert_eq!(scene.full_path(root), "/obj");
        assert_eq!(errors.len(), 1);
        assert!(!errors.has_fatal_error());
        assert!(table.bundled_nodes().is_empty());
    }

    #[test]
    fn test_member_directly_under_object_root_keeps_object_root() {
        let mut scene = scene();
        scene.add_node("/obj/geo1", NodeKind::Geometry).unwrap();
        scene.set_bundle("mixed", &["/obj/geo1", "/obj/chars/villain"]);
        let mut table = NodeMappingTable::new();
        let mut errors = ErrorAccumulator::new();
        let root = resolve_bundle_root(&scene, "@mixed", "/obj", &mut table, &mut errors).unwrap();
        assert_eq!(scene.full_path(root), "/obj");
        for member in table.bundled_nodes() {
            assert!(scene.is_contained_by(*member, root));
        }
    }

    #[test]
    fn test_empty_bundle_warns() {
        let mut scene = scene();
        scene.set_bundle("empty", &[]);
        let mut table = NodeMappingTable::new();
        let mut errors = ErrorAccumulator::new();
        resolve_bundle_root(&scene, "empty", "/obj", &mut table, &mut errors).unwrap();
        assert_eq!(errors.warnings().count(), 1);
        assert!(errors.records()[0].message.contains("no members"));
    }

    #[test]
    fn test_later_shallow_member_widens_root() {
        let mut scene = scene();
        scene.add_node("/obj/geo1", NodeKind::Geometry).unwrap();
        scene.set_bundle("mixed", &["/obj/chars/hero/body", "/obj/geo1"]);
        let mut table = NodeMappingTable::new();
        let mut errors = ErrorAccumulator::new();
        let root = resolve_bundle_root(&scene, "mixed", "/obj", &mut table, &mut errors).unwrap();
        assert_eq!(scene.full_path(root), "/obj");
    }
}
