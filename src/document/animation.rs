//! Animation layers, stacks, curves and vertex caches.

use super::{LayerId, MeshId, TargetNodeId};
use crate::types::{Axis, TimeSpan};
use serde::Serialize;

/// A blendable layer of curves. Every stack of an export shares one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimLayer {
    pub name: String,
}

/// A named time window over the shared layer (one per exported clip).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimStack {
    pub name: String,
    pub layers: Vec<LayerId>,
    pub local_span: TimeSpan,
    pub reference_span: TimeSpan,
}

impl AnimStack {
    pub fn add_layer(&mut self, layer: LayerId) {
        if !self.layers.contains(&layer) {
            self.layers.push(layer);
        }
    }
}

/// Animatable property of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveChannel {
    Translation(Axis),
    /// Euler degrees.
    Rotation(Axis),
    Scale(Axis),
    Visibility,
    LightIntensity,
    CameraFov,
}

impl CurveChannel {
    /// The nine transform channels in T, R, S order.
    pub const TRANSFORM: [CurveChannel; 9] = [
        CurveChannel::Translation(Axis::X),
        CurveChannel::Translation(Axis::Y),
        CurveChannel::Translation(Axis::Z),
        CurveChannel::Rotation(Axis::X),
        CurveChannel::Rotation(Axis::Y),
        CurveChannel::Rotation(Axis::Z),
        CurveChannel::Scale(Axis::X),
        CurveChannel::Scale(Axis::Y),
        CurveChannel::Scale(Axis::Z),
    ];

    pub fn is_transform(&self) -> bool {
        matches!(
            self,
            CurveChannel::Translation(_) | CurveChannel::Rotation(_) | CurveChannel::Scale(_)
        )
    }
}

/// A value at a frame of the document's time mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Keyframe {
    pub frame: i64,
    pub value: f32,
}

/// Linearly interpolated keys of one channel of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimCurve {
    pub node: TargetNodeId,
    pub layer: LayerId,
    pub channel: CurveChannel,
    pub keys: Vec<Keyframe>,
}

impl AnimCurve {
    pub fn new(node: TargetNodeId, layer: LayerId, channel: CurveChannel) -> Self {
        Self {
            node,
            layer,
            channel,
            keys: Vec::new(),
        }
    }

    /// Insert a key, replacing any key already at `frame`.
    pub fn set_key(&mut self, frame: i64, value: f32) {
        match self.keys.binary_search_by_key(&frame, |k| k.frame) {
            Ok(idx) => self.keys[idx].value = value,
            Err(idx) => self.keys.insert(idx, Keyframe { frame, value }),
        }
    }

    /// Value at `frame`, held constant past the first and last keys.
    pub fn value_at(&self, frame: i64) -> Option<f32> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        if frame <= first.frame {
            return Some(first.value);
        }
        if frame >= last.frame {
            return Some(last.value);
        }
        match self.keys.binary_search_by_key(&frame, |k| k.frame) {
            Ok(idx) => Some(self.keys[idx].value),
            Err(idx) => {
                let (a, b) = (self.keys[idx - 1], self.keys[idx]);
                let t = (frame - a.frame) as f32 / (b.frame - a.frame) as f32;
                Some(a.value + (b.value - a.value) * t)
            }
        }
    }

    /// Keys falling inside `span`.
    pub fn keys_in(&self, span: TimeSpan) -> impl Iterator<Item = &Keyframe> {
        self.keys.iter().filter(move |k| span.contains(k.frame))
    }

    pub fn scale_values(&mut self, factor: f32) {
        for key in &mut self.keys {
            key.value *= factor;
        }
    }
}

/// Per-frame point positions of a deforming mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexCache {
    pub mesh: MeshId,
    pub node: TargetNodeId,
    pub frames: Vec<CacheFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheFrame {
    pub frame: i64,
    pub positions: Vec<[f32; 3]>,
}

impl VertexCache {
    pub fn new(mesh: MeshId, node: TargetNodeId) -> Self {
        Self {
            mesh,
            node,
            frames: Vec::new(),
        }
    }

    pub fn push_frame(&mut self, frame: i64, positions: Vec<[f32; 3]>) {
        self.frames.push(CacheFrame { frame, positions });
    }
}
