//! Whole-document axis-system and unit conversion.

use super::{CurveChannel, LayerId, NodeAttribute, SceneDocument, TargetNodeId};
use crate::types::{AxisSystem, NodeTransform};
use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A length unit, stored as its size in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemUnit {
    pub centimeters: f64,
}

impl SystemUnit {
    pub const MILLIMETER: SystemUnit = SystemUnit { centimeters: 0.1 };
    pub const CENTIMETER: SystemUnit = SystemUnit { centimeters: 1.0 };
    pub const DECIMETER: SystemUnit = SystemUnit { centimeters: 10.0 };
    pub const METER: SystemUnit = SystemUnit { centimeters: 100.0 };
    pub const KILOMETER: SystemUnit = SystemUnit { centimeters: 100_000.0 };
    pub const INCH: SystemUnit = SystemUnit { centimeters: 2.54 };
    pub const YARD: SystemUnit = SystemUnit { centimeters: 91.44 };
    pub const MILE: SystemUnit = SystemUnit { centimeters: 160_934.4 };

    /// Unit from a length in meters (the host's unit-length convention).
    pub fn from_meters(meters: f64) -> Self {
        Self {
            centimeters: meters * 100.0,
        }
    }

    /// Factor that converts a length in `self` to a length in `target`.
    pub fn conversion_factor(&self, target: &SystemUnit) -> f64 {
        self.centimeters / target.centimeters
    }

    pub fn approx_eq(&self, other: &SystemUnit) -> bool {
        (self.centimeters - other.centimeters).abs() <= 1e-9 * self.centimeters.abs().max(1.0)
    }
}

impl SceneDocument {
    /// Convert every transform, animation key and point from the current axis
    /// system to `target`, then record `target` as the document's axis
    /// system. A no-op when the systems already match.
    pub fn convert_axis_system(&mut self, target: AxisSystem) {
        let current = self.settings.axis_system;
        if current == target {
            return;
        }
        let m = current.conversion_to(&target);
        tracing::debug!("Converting axis system {} -> {}", current.label(), target.label());

        // Curves first: channels without a curve fall back to the unconverted rest pose.
        self.convert_transform_curves(|t| t.change_basis(m));
        for node in self.nodes_mut() {
            node.transform = node.transform.change_basis(m);
        }

        let mirror = m.determinant() < 0.0;
        for mesh in self.meshes_mut() {
            transform_points(&mut mesh.data.positions, m);
            transform_points(&mut mesh.data.normals, m);
            if mirror {
                for tri in mesh.data.indices.chunks_exact_mut(3) {
                    tri.swap(1, 2);
                }
            }
        }
        for cache in self.vertex_caches_mut() {
            for frame in &mut cache.frames {
                transform_points(&mut frame.positions, m);
            }
        }

        self.settings.original_axis_system = Some(current);
        self.settings.axis_system = target;
    }

    /// Rescale all lengths from the current system unit to `target`, then
    /// record `target` as the document's unit. A no-op when they match.
    pub fn convert_units(&mut self, target: SystemUnit) {
        let current = self.settings.system_unit;
        if current.approx_eq(&target) {
            self.settings.system_unit = target;
            return;
        }
        let factor = current.conversion_factor(&target) as f32;
        tracing::debug!(
            "Converting units {}cm -> {}cm (x{})",
            current.centimeters,
            target.centimeters,
            factor
        );

        for node in self.nodes_mut() {
            node.transform.translation *= factor;
            if let NodeAttribute::Camera(camera) = &mut node.attribute {
                camera.near *= factor;
                camera.far *= factor;
            }
        }
        for curve in self.curves_mut() {
            if matches!(curve.channel, CurveChannel::Translation(_)) {
                curve.scale_values(factor);
            }
        }
        for mesh in self.meshes_mut() {
            for p in &mut mesh.data.positions {
                for c in p.iter_mut() {
                    *c *= factor;
                }
            }
        }
        for cache in self.vertex_caches_mut() {
            for frame in &mut cache.frames {
                for p in &mut frame.positions {
                    for c in p.iter_mut() {
                        *c *= factor;
                    }
                }
            }
        }

        self.settings.system_unit = target;
    }

    /// Rewrite the transform curves of every animated node by evaluating the
    /// full transform at each keyed frame and applying `convert`.
    fn convert_transform_curves(&mut self, convert: impl Fn(&NodeTransform) -> NodeTransform) {
        let animated: BTreeSet<(TargetNodeId, LayerId)> = self
            .curves()
            .iter()
            .filter(|c| c.channel.is_transform())
            .map(|c| (c.node, c.layer))
            .collect();

        for (node, layer) in animated {
            let frames: BTreeSet<i64> = self
                .curves_for_node(node)
                .filter(|c| c.layer == layer && c.channel.is_transform())
                .flat_map(|c| c.keys.iter().map(|k| k.frame))
                .collect();
            let rest = self.node(node).transform;

            let mut previous: Option<Vec3> = None;
            let mut converted = Vec::with_capacity(frames.len());
            for &frame in &frames {
                let sampled = self.sample_transform(node, layer, frame, &rest);
                let mut out = convert(&sampled);
                if let Some(prev) = previous {
                    out.unwrap_rotation(prev);
                }
                previous = Some(out.rotation);
                converted.push((frame, out));
            }

            for (frame, t) in converted {
                for channel in CurveChannel::TRANSFORM {
                    let value = transform_component(&t, channel);
                    self.curve_mut(node, layer, channel).set_key(frame, value);
                }
            }
        }
    }

    /// Transform of `node` at `frame`, falling back to `rest` for channels
    /// without a curve.
    pub fn sample_transform(
        &self,
        node: TargetNodeId,
        layer: LayerId,
        frame: i64,
        rest: &NodeTransform,
    ) -> NodeTransform {
        let mut t = *rest;
        for channel in CurveChannel::TRANSFORM {
            if let Some(value) = self.curve(node, layer, channel).and_then(|c| c.value_at(frame)) {
                set_transform_component(&mut t, channel, value);
            }
        }
        t
    }
}

fn transform_points(points: &mut [[f32; 3]], m: Mat3) {
    for p in points.iter_mut() {
        *p = (m * Vec3::from(*p)).to_array();
    }
}

/// Read the component of `t` addressed by a transform channel.
pub fn transform_component(t: &NodeTransform, channel: CurveChannel) -> f32 {
    match channel {
        CurveChannel::Translation(axis) => t.translation[axis.index()],
        CurveChannel::Rotation(axis) => t.rotation[axis.index()],
        CurveChannel::Scale(axis) => t.scale[axis.index()],
        _ => 0.0,
    }
}

fn set_transform_component(t: &mut NodeTransform, channel: CurveChannel, value: f32) {
    match channel {
        CurveChannel::Translation(axis) => t.translation[axis.index()] = value,
        CurveChannel::Rotation(axis) => t.rotation[axis.index()] = value,
        CurveChannel::Scale(axis) => t.scale[axis.index()] = value,
        _ => {}
    }
}
