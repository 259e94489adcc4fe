//! Hierarchy pass: builds the target node tree from the source graph.

use super::actions::{DeferredAction, DeferredActionQueue};
use super::cancel::CancelSignal;
use super::diagnostics::ErrorAccumulator;
use super::node_map::{NodeMappingTable, VisitInfo};
use super::options::ExportOptions;
use crate::document::{NodeAttribute, SceneDocument, TargetNodeId, VertexCache};
use crate::source::{LightKind, NodeKind, SourceGraph, SourceNodeId};
use crate::types::{BoundingBox, Color, NodeTransform};
use glam::Mat4;

/// Where the children of the export root attach in the target tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Attachment {
    pub parent: TargetNodeId,
    /// Source node whose world transform children are expressed relative to.
    pub anchor: Option<SourceNodeId>,
}

/// How traversal starts at the export root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RootPlan {
    /// Export the root node itself.
    Node,
    /// Skip the root (a network or `/`) and export its children.
    Dive { needs_world_root: bool },
}

/// Decide how to start traversal at `root`. `/` and networks are dived
/// into; a network below the top level needs a world root node carrying its
/// transform.
pub(crate) fn plan_root<G: SourceGraph + ?Sized>(graph: &G, root: SourceNodeId) -> RootPlan {
    if graph.parent(root).is_none() {
        return RootPlan::Dive {
            needs_world_root: false,
        };
    }
    if graph.kind(root) != NodeKind::Network {
        return RootPlan::Node;
    }
    let top_level = graph
        .parent(root)
        .map(|p| graph.parent(p).is_none())
        .unwrap_or(true);
    RootPlan::Dive {
        needs_world_root: !top_level,
    }
}

/// Outcome of the hierarchy pass.
#[derive(Debug, Default)]
pub struct GeometryPass {
    pub cancelled: bool,
    /// Sum of ambient light contributions.
    pub ambient_color: Color,
    pub world_root: Option<TargetNodeId>,
    /// Instance links, applied as soon as the pass completes.
    pub create_instances: Option<DeferredAction>,
    pub visited: usize,
}

/// Walks the source graph once, creating one target node per visited node.
pub struct GeometryVisitor<'a, G: SourceGraph + ?Sized> {
    graph: &'a G,
    document: &'a mut SceneDocument,
    node_map: &'a mut NodeMappingTable,
    actions: &'a mut DeferredActionQueue,
    errors: &'a mut ErrorAccumulator,
    options: &'a ExportOptions,
    time: f64,
    bundled_only: bool,
    result: GeometryPass,
    instances: Vec<(SourceNodeId, SourceNodeId)>,
}

impl<'a, G: SourceGraph + ?Sized> GeometryVisitor<'a, G> {
    pub fn new(
        graph: &'a G,
        document: &'a mut SceneDocument,
        node_map: &'a mut NodeMappingTable,
        actions: &'a mut DeferredActionQueue,
        errors: &'a mut ErrorAccumulator,
        options: &'a ExportOptions,
        time: f64,
    ) -> Self {
        let bundled_only = options.is_exporting_bundles();
        Self {
            graph,
            document,
            node_map,
            actions,
            errors,
            options,
            time,
            bundled_only,
            result: GeometryPass {
                ambient_color: Color::BLACK,
                ..Default::default()
            },
            instances: Vec::new(),
        }
    }

    /// Build the hierarchy below (or including) `root`.
    pub fn visit_scene(mut self, root: SourceNodeId, cancel: &dyn CancelSignal) -> GeometryPass {
        let attach = match plan_root(self.graph, root) {
            RootPlan::Node => {
                self.visit(root, self.document.root(), None, cancel);
                None
            }
            RootPlan::Dive { needs_world_root } => {
                let parent = if needs_world_root {
                    let world_root = self.create_world_root(root);
                    Attachment {
                        parent: world_root,
                        anchor: Some(root),
                    }
                } else {
                    Attachment {
                        parent: self.document.root(),
                        anchor: None,
                    }
                };
                Some(parent)
            }
        };
        if let Some(attach) = attach {
            for child in self.graph.children(root) {
                if self.result.cancelled {
                    break;
                }
                self.visit(child, attach.parent, attach.anchor, cancel);
            }
        }

        if !self.instances.is_empty() {
            self.result.create_instances = Some(DeferredAction::CreateInstances {
                pairs: std::mem::take(&mut self.instances),
            });
        }
        tracing::debug!(
            "Hierarchy pass visited {} node(s){}",
            self.result.visited,
            if self.result.cancelled { ", cancelled" } else { "" }
        );
        self.result
    }

    fn create_world_root(&mut self, root: SourceNodeId) -> TargetNodeId {
        if let Some(existing) = self.result.world_root {
            return existing;
        }
        let name = self.node_map.claim_name("world_root");
        let id = self.document.create_node(name, self.document.root());
        self.document.node_mut(id).transform =
            NodeTransform::from_matrix(self.graph.world_transform(root, self.time));
        self.result.world_root = Some(id);
        id
    }

    fn visit(
        &mut self,
        node: SourceNodeId,
        parent: TargetNodeId,
        anchor: Option<SourceNodeId>,
        cancel: &dyn CancelSignal,
    ) {
        if self.result.cancelled {
            return;
        }
        if cancel.is_cancelled() {
            tracing::info!("Export cancelled at {}", self.graph.full_path(node));
            self.result.cancelled = true;
            return;
        }

        // Outside the selected bundles: not exported, but its subtree may be.
        if self.bundled_only && !self.node_map.is_bundled(node) {
            for child in self.graph.children(node) {
                self.visit(child, parent, anchor, cancel);
            }
            return;
        }

        let kind = self.graph.kind(node);
        let name = self.node_map.claim_name(&self.graph.name(node));
        let target = self.document.create_node(name, parent);
        {
            let world = self.graph.world_transform(node, self.time);
            let anchor_world = anchor
                .map(|a| self.graph.world_transform(a, self.time))
                .unwrap_or(Mat4::IDENTITY);
            let t = self.document.node_mut(target);
            t.transform = NodeTransform::from_matrix(anchor_world.inverse() * world);
            t.visible = self.graph.visible(node, self.time);
        }

        let mut info = VisitInfo::new(kind, anchor);
        let handler = Self::handler(kind);
        handler(self, node, target, &mut info);

        if let Some(look_at) = self.graph.look_at_target(node) {
            self.actions.enqueue(DeferredAction::LookAt {
                node,
                target: look_at,
            });
        }

        self.node_map.add_pair(node, target, info);
        self.result.visited += 1;

        for child in self.graph.children(node) {
            self.visit(child, target, Some(node), cancel);
        }
    }

    /// Payload handler for a node classification.
    fn handler(kind: NodeKind) -> fn(&mut Self, SourceNodeId, TargetNodeId, &mut VisitInfo) {
        match kind {
            NodeKind::Geometry => Self::attach_geometry,
            NodeKind::Light => Self::attach_light,
            NodeKind::Camera => Self::attach_camera,
            NodeKind::Object | NodeKind::Network => Self::attach_null,
        }
    }

    fn attach_null(&mut self, _node: SourceNodeId, _target: TargetNodeId, _info: &mut VisitInfo) {}

    fn attach_geometry(&mut self, node: SourceNodeId, target: TargetNodeId, info: &mut VisitInfo) {
        if let Some(source) = self.graph.instance_source(node) {
            info.instance_source = Some(source);
            self.instances.push((node, source));
            return;
        }

        let mesh = match self.graph.mesh(node, self.time) {
            Some(mesh) if !mesh.is_empty() => mesh,
            _ => {
                self.errors.add_error(
                    ["Geometry ", self.graph.full_path(node).as_str(), " has no points; exported as a null"],
                    false,
                );
                return;
            }
        };
        info.bounds = BoundingBox::from_points(mesh.positions.iter().copied());

        let name = self.document.node(target).name.clone();
        let mesh_id = self.document.add_mesh(name, mesh);
        let material = self
            .graph
            .material(node)
            .map(|m| self.document.add_material(m));
        let t = self.document.node_mut(target);
        t.attribute = NodeAttribute::Mesh { mesh: mesh_id };
        t.material = material;

        if self.options.export_deforms_as_vertex_cache && self.graph.is_deforming(node) {
            self.document.add_vertex_cache(VertexCache::new(mesh_id, target));
        }
    }

    fn attach_light(&mut self, node: SourceNodeId, target: TargetNodeId, _info: &mut VisitInfo) {
        let Some(light) = self.graph.light(node, self.time) else {
            return;
        };
        if light.kind == LightKind::Ambient {
            self.result.ambient_color = self.result.ambient_color + light.color.scaled(light.intensity);
            return;
        }
        self.document.node_mut(target).attribute = NodeAttribute::Light(light);
    }

    fn attach_camera(&mut self, node: SourceNodeId, target: TargetNodeId, _info: &mut VisitInfo) {
        if let Some(camera) = self.graph.camera(node, self.time) {
            self.document.node_mut(target).attribute = NodeAttribute::Camera(camera);
        }
    }
}
