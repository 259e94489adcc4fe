//! Read-only access to the host scene graph being exported.
//!
//! The exporter never mutates the source graph. Everything it needs is
//! expressed through the [`SourceGraph`] trait, which a host integration
//! implements. [`MemoryScene`] is a self-contained implementation backed by a
//! JSON scene description.

pub mod memory;

pub use memory::{Channel, MemoryNode, MemoryScene};

use crate::types::{Color, UpAxis};
use glam::Mat4;
use serde::{Deserialize, Serialize};

/// Opaque handle to a node in the source graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceNodeId(pub u32);

/// Classification of a source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A plain transform (null, subnet object, bone).
    Object,
    /// A transform carrying renderable geometry.
    Geometry,
    Light,
    Camera,
    /// A container that is dived into rather than exported as a transform
    /// when it is the export root.
    Network,
}

/// Triangle geometry sampled from a source node, in node-local space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub normals: Vec<[f32; 3]>,
    #[serde(default)]
    pub uvs: Vec<[f32; 2]>,
    /// Triangle indices (3 per triangle).
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Surface material assigned to a geometry node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialData {
    pub name: String,
    #[serde(default = "default_diffuse")]
    pub diffuse: Color,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Path of a diffuse texture file, if any.
    #[serde(default)]
    pub texture: Option<String>,
}

fn default_diffuse() -> Color {
    Color::new(0.8, 0.8, 0.8)
}

fn default_opacity() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Point,
    Directional,
    Spot,
    /// Contributes to the global ambient color instead of lighting directly.
    Ambient,
}

/// Light parameters sampled at one time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightData {
    pub kind: LightKind,
    pub color: Color,
    pub intensity: f32,
    /// Full cone angle in degrees (spot lights only).
    pub cone_angle: f32,
}

/// Camera parameters sampled at one time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraData {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

/// Identification of the host application, stamped into document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub vendor: String,
    pub name: String,
    pub version: String,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            vendor: "Unknown".to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Query interface of the host scene graph.
///
/// Times are host seconds. Transforms are column-major affine matrices in the
/// host's native axis system and units.
pub trait SourceGraph {
    /// Resolve an absolute path such as `/obj/geo1`.
    fn find_node(&self, path: &str) -> Option<SourceNodeId>;

    fn parent(&self, node: SourceNodeId) -> Option<SourceNodeId>;

    /// Children in a stable order.
    fn children(&self, node: SourceNodeId) -> Vec<SourceNodeId>;

    fn full_path(&self, node: SourceNodeId) -> String;

    fn kind(&self, node: SourceNodeId) -> NodeKind;

    /// Node name; the last path component by default.
    fn name(&self, node: SourceNodeId) -> String {
        let path = self.full_path(node);
        match path.rsplit('/').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => "root".to_string(),
        }
    }

    /// Whether `ancestor` strictly contains `node`.
    fn is_contained_by(&self, node: SourceNodeId, ancestor: SourceNodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Names of all node groups ("bundles").
    fn bundles(&self) -> Vec<String>;

    fn bundle_members(&self, bundle: &str) -> Vec<SourceNodeId>;

    fn samples_per_second(&self) -> f64;

    /// Frame number at a time. Frame 1 is at time zero.
    fn frame_from_time(&self, time: f64) -> i64 {
        (time * self.samples_per_second()).round() as i64 + 1
    }

    fn time_from_frame(&self, frame: i64) -> f64 {
        (frame - 1) as f64 / self.samples_per_second()
    }

    /// Length of one host unit in meters.
    fn unit_length(&self) -> f64 {
        1.0
    }

    fn up_axis(&self) -> UpAxis {
        UpAxis::Y
    }

    /// Name of the active time context (take).
    fn time_context_name(&self) -> String {
        "Main".to_string()
    }

    fn host_info(&self) -> HostInfo {
        HostInfo::default()
    }

    /// Path of the host scene file, if saved.
    fn scene_file(&self) -> Option<String> {
        None
    }

    /// Active project directory, if any.
    fn project_dir(&self) -> Option<String> {
        None
    }

    /// Transform relative to the source parent.
    fn local_transform(&self, node: SourceNodeId, time: f64) -> Mat4;

    fn world_transform(&self, node: SourceNodeId, time: f64) -> Mat4 {
        let local = self.local_transform(node, time);
        match self.parent(node) {
            Some(parent) => self.world_transform(parent, time) * local,
            None => local,
        }
    }

    fn visible(&self, _node: SourceNodeId, _time: f64) -> bool {
        true
    }

    fn mesh(&self, node: SourceNodeId, time: f64) -> Option<MeshData>;

    /// Whether the node's point positions change over time.
    fn is_deforming(&self, _node: SourceNodeId) -> bool {
        false
    }

    fn material(&self, node: SourceNodeId) -> Option<MaterialData>;

    fn light(&self, node: SourceNodeId, time: f64) -> Option<LightData>;

    fn camera(&self, node: SourceNodeId, time: f64) -> Option<CameraData>;

    /// Node whose geometry this node instances, if any.
    fn instance_source(&self, _node: SourceNodeId) -> Option<SourceNodeId> {
        None
    }

    /// Node this light or camera is constrained to look at, if any.
    fn look_at_target(&self, _node: SourceNodeId) -> Option<SourceNodeId> {
        None
    }
}
