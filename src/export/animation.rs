//! Animation pass: samples mapped nodes into keyframe curves.

use super::cancel::CancelSignal;
use super::geometry::{plan_root, RootPlan};
use super::node_map::{NodeMappingEntry, NodeMappingTable};
use crate::document::{
    transform_component, CurveChannel, LayerId, NodeAttribute, SceneDocument, TargetNodeId,
};
use crate::source::{NodeKind, SourceGraph, SourceNodeId};
use crate::types::{NodeTransform, TimeSpan};
use glam::{Mat4, Vec3};

/// Outcome of the animation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnimationPass {
    pub cancelled: bool,
    pub visited: usize,
}

/// Revisits the exported hierarchy and writes one key per frame of `frames`
/// for every animatable channel of every mapped node.
pub struct AnimationVisitor<'a, G: SourceGraph + ?Sized> {
    graph: &'a G,
    document: &'a mut SceneDocument,
    node_map: &'a NodeMappingTable,
    layer: LayerId,
    frames: TimeSpan,
    result: AnimationPass,
}

impl<'a, G: SourceGraph + ?Sized> AnimationVisitor<'a, G> {
    pub fn new(
        graph: &'a G,
        document: &'a mut SceneDocument,
        node_map: &'a NodeMappingTable,
        layer: LayerId,
        frames: TimeSpan,
    ) -> Self {
        Self {
            graph,
            document,
            node_map,
            layer,
            frames,
            result: AnimationPass::default(),
        }
    }

    /// Key the transform of `target` from the world transform of `source`
    /// relative to `anchor` (world space when `None`).
    pub fn export_trs_animation(
        &mut self,
        source: SourceNodeId,
        target: TargetNodeId,
        anchor: Option<SourceNodeId>,
    ) {
        let mut previous: Option<Vec3> = None;
        for frame in self.frames.start..=self.frames.end {
            let time = self.graph.time_from_frame(frame);
            let anchor_world = anchor
                .map(|a| self.graph.world_transform(a, time))
                .unwrap_or(Mat4::IDENTITY);
            let local = anchor_world.inverse() * self.graph.world_transform(source, time);
            let mut t = NodeTransform::from_matrix(local);
            if let Some(prev) = previous {
                t.unwrap_rotation(prev);
            }
            previous = Some(t.rotation);

            for channel in CurveChannel::TRANSFORM {
                let value = transform_component(&t, channel);
                self.document
                    .curve_mut(target, self.layer, channel)
                    .set_key(frame, value);
            }
        }
    }

    pub fn visit_scene(mut self, root: SourceNodeId, cancel: &dyn CancelSignal) -> AnimationPass {
        match plan_root(self.graph, root) {
            RootPlan::Node => self.visit(root, cancel),
            RootPlan::Dive { .. } => {
                for child in self.graph.children(root) {
                    if self.result.cancelled {
                        break;
                    }
                    self.visit(child, cancel);
                }
            }
        }
        tracing::debug!(
            "Animation pass keyed {} node(s) over frames {}..={}",
            self.result.visited,
            self.frames.start,
            self.frames.end
        );
        self.result
    }

    fn visit(&mut self, node: SourceNodeId, cancel: &dyn CancelSignal) {
        if self.result.cancelled {
            return;
        }
        if cancel.is_cancelled() {
            tracing::info!("Animation export cancelled at {}", self.graph.full_path(node));
            self.result.cancelled = true;
            return;
        }

        // Nodes without a mapping were never exported.
        let node_map = self.node_map;
        if let Some(entry) = node_map.entry(node) {
            self.export_node(entry);
            self.result.visited += 1;
        }

        for child in self.graph.children(node) {
            self.visit(child, cancel);
        }
    }

    fn export_node(&mut self, entry: &NodeMappingEntry) {
        let (source, target) = (entry.source, entry.target);
        self.export_trs_animation(source, target, entry.info.anchor);

        let attribute = self.document.node(target).attribute.clone();
        let cache_frames = matches!(attribute, NodeAttribute::Mesh { .. })
            && entry.info.kind == NodeKind::Geometry;

        for frame in self.frames.start..=self.frames.end {
            let time = self.graph.time_from_frame(frame);
            let visible = if self.graph.visible(source, time) { 1.0 } else { 0.0 };
            self.key(target, CurveChannel::Visibility, frame, visible);

            match attribute {
                NodeAttribute::Light(_) => {
                    if let Some(light) = self.graph.light(source, time) {
                        self.key(target, CurveChannel::LightIntensity, frame, light.intensity);
                    }
                }
                NodeAttribute::Camera(_) => {
                    if let Some(camera) = self.graph.camera(source, time) {
                        self.key(target, CurveChannel::CameraFov, frame, camera.fov);
                    }
                }
                NodeAttribute::Mesh { mesh } if cache_frames => {
                    let Some(cache) = self.document.vertex_cache_mut(mesh) else {
                        continue;
                    };
                    if cache.node != target {
                        continue;
                    }
                    if let Some(data) = self.graph.mesh(source, time) {
                        cache.push_frame(frame, data.positions);
                    }
                }
                _ => {}
            }
        }
    }

    fn key(&mut self, target: TargetNodeId, channel: CurveChannel, frame: i64, value: f32) {
        self.document
            .curve_mut(target, self.layer, channel)
            .set_key(frame, value);
    }
}
