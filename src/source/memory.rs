//! In-memory source graph loaded from a JSON scene description.
//!
//! ```json
//! {
//!   "fps": 24,
//!   "nodes": [
//!     { "path": "/obj", "kind": "network" },
//!     { "path": "/obj/root", "kind": "object",
//!       "transform": { "translate": [[[1, 0], [48, 10]], 0, 0] } },
//!     { "path": "/obj/root/geo1", "kind": "geometry",
//!       "mesh": { "positions": [[0,0,0],[1,0,0],[0,1,0]], "indices": [0,1,2] } }
//!   ],
//!   "bundles": { "hero": ["/obj/root/geo1"] }
//! }
//! ```
//!
//! Animated values are either a constant or a list of `[frame, value]` keys,
//! linearly interpolated and held constant past either end.

use super::{
    CameraData, HostInfo, LightData, LightKind, MaterialData, MeshData, NodeKind, SourceGraph,
    SourceNodeId,
};
use crate::error::{ExportError, Result};
use crate::types::{Color, NodeTransform, UpAxis};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// An animatable scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Channel {
    Constant(f32),
    /// `[frame, value]` pairs sorted by frame.
    Keys(Vec<[f32; 2]>),
}

impl Default for Channel {
    fn default() -> Self {
        Channel::Constant(0.0)
    }
}

impl Channel {
    /// Build a keyed channel from `(frame, value)` pairs.
    pub fn keys(keys: &[(f32, f32)]) -> Self {
        let mut keys: Vec<[f32; 2]> = keys.iter().map(|&(f, v)| [f, v]).collect();
        keys.sort_by(|a, b| a[0].total_cmp(&b[0]));
        Channel::Keys(keys)
    }

    pub fn is_animated(&self) -> bool {
        match self {
            Channel::Constant(_) => false,
            Channel::Keys(keys) => keys.windows(2).any(|w| w[0][1] != w[1][1]),
        }
    }

    /// Value at a (possibly fractional) frame.
    pub fn evaluate(&self, frame: f32) -> f32 {
        match self {
            Channel::Constant(value) => *value,
            Channel::Keys(keys) => {
                let (first, last) = match (keys.first(), keys.last()) {
                    (Some(first), Some(last)) => (first, last),
                    _ => return 0.0,
                };
                if frame <= first[0] {
                    return first[1];
                }
                if frame >= last[0] {
                    return last[1];
                }
                for pair in keys.windows(2) {
                    let (a, b) = (pair[0], pair[1]);
                    if frame >= a[0] && frame <= b[0] {
                        let span = b[0] - a[0];
                        if span <= f32::EPSILON {
                            return b[1];
                        }
                        let t = (frame - a[0]) / span;
                        return a[1] + (b[1] - a[1]) * t;
                    }
                }
                last[1]
            }
        }
    }
}

/// Three animatable components.
pub type Channel3 = [Channel; 3];

fn zero3() -> Channel3 {
    [Channel::Constant(0.0), Channel::Constant(0.0), Channel::Constant(0.0)]
}

fn one3() -> Channel3 {
    [Channel::Constant(1.0), Channel::Constant(1.0), Channel::Constant(1.0)]
}

fn one() -> Channel {
    Channel::Constant(1.0)
}

fn eval3(channels: &Channel3, frame: f32) -> Vec3 {
    Vec3::new(
        channels[0].evaluate(frame),
        channels[1].evaluate(frame),
        channels[2].evaluate(frame),
    )
}

/// Animated translate/rotate/scale (rotation in degrees, XYZ order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimatedTransform {
    #[serde(default = "zero3")]
    pub translate: Channel3,
    #[serde(default = "zero3")]
    pub rotate: Channel3,
    #[serde(default = "one3")]
    pub scale: Channel3,
}

impl Default for AnimatedTransform {
    fn default() -> Self {
        Self {
            translate: zero3(),
            rotate: zero3(),
            scale: one3(),
        }
    }
}

impl AnimatedTransform {
    pub fn sample(&self, frame: f32) -> NodeTransform {
        NodeTransform::new(
            eval3(&self.translate, frame),
            eval3(&self.rotate, frame),
            eval3(&self.scale, frame),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLight {
    pub kind: LightKind,
    #[serde(default = "white")]
    pub color: Color,
    #[serde(default = "one")]
    pub intensity: Channel,
    #[serde(default = "default_cone")]
    pub cone_angle: f32,
}

fn white() -> Color {
    Color::WHITE
}

fn default_cone() -> f32 {
    45.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCamera {
    #[serde(default = "default_fov")]
    pub fov: Channel,
    #[serde(default = "default_aspect")]
    pub aspect: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

fn default_fov() -> Channel {
    Channel::Constant(45.0)
}

fn default_aspect() -> f32 {
    16.0 / 9.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    1000.0
}

impl Default for MemoryCamera {
    fn default() -> Self {
        Self {
            fov: default_fov(),
            aspect: default_aspect(),
            near: default_near(),
            far: default_far(),
        }
    }
}

/// One node of a [`MemoryScene`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub path: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub transform: AnimatedTransform,
    /// Visible when the evaluated value is above 0.5.
    #[serde(default = "one")]
    pub visibility: Channel,
    #[serde(default)]
    pub mesh: Option<MeshData>,
    /// Animated offset added to every mesh point; makes the geometry deform.
    #[serde(default)]
    pub deform: Option<Channel3>,
    #[serde(default)]
    pub material: Option<MaterialData>,
    #[serde(default)]
    pub light: Option<MemoryLight>,
    #[serde(default)]
    pub camera: Option<MemoryCamera>,
    /// Path of a geometry node whose mesh this node instances.
    #[serde(default)]
    pub instance_of: Option<String>,
    #[serde(default)]
    pub look_at: Option<String>,
}

impl MemoryNode {
    pub fn new(path: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            transform: AnimatedTransform::default(),
            visibility: one(),
            mesh: None,
            deform: None,
            material: None,
            light: None,
            camera: None,
            instance_of: None,
            look_at: None,
        }
    }
}

fn default_fps() -> f64 {
    24.0
}

fn default_unit_length() -> f64 {
    1.0
}

fn default_up_axis() -> UpAxis {
    UpAxis::Y
}

fn default_time_context() -> String {
    "Main".to_string()
}

/// A source graph held entirely in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryScene {
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Meters per scene unit.
    #[serde(default = "default_unit_length")]
    pub unit_length: f64,
    #[serde(default = "default_up_axis")]
    pub up_axis: UpAxis,
    #[serde(default = "default_time_context")]
    pub time_context: String,
    #[serde(default)]
    pub host: HostInfo,
    #[serde(default)]
    pub scene_file: Option<String>,
    #[serde(default)]
    pub project_dir: Option<String>,
    #[serde(default)]
    nodes: Vec<MemoryNode>,
    /// Bundle name to member paths.
    #[serde(default)]
    bundles: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    parents: Vec<Option<usize>>,
    #[serde(skip)]
    children: Vec<Vec<usize>>,
}

impl MemoryScene {
    /// Create an empty scene containing only the root `/`.
    pub fn new(fps: f64) -> Self {
        let mut scene = Self {
            fps,
            unit_length: default_unit_length(),
            up_axis: default_up_axis(),
            time_context: default_time_context(),
            host: HostInfo::default(),
            scene_file: None,
            project_dir: None,
            nodes: Vec::new(),
            bundles: BTreeMap::new(),
            index: HashMap::new(),
            parents: Vec::new(),
            children: Vec::new(),
        };
        scene.push_node(MemoryNode::new("/", NodeKind::Network), None);
        scene
    }

    /// Parse a JSON scene description.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut scene: MemoryScene = serde_json::from_str(json)?;
        scene.rebuild_index()?;
        Ok(scene)
    }

    /// Load a JSON scene description from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Add a node. Its parent (everything before the last `/`) must exist.
    pub fn add_node(&mut self, path: &str, kind: NodeKind) -> Result<SourceNodeId> {
        self.insert(MemoryNode::new(path, kind))
    }

    /// Add a fully described node.
    pub fn insert(&mut self, node: MemoryNode) -> Result<SourceNodeId> {
        if self.index.contains_key(&node.path) {
            return Err(ExportError::Configuration(format!(
                "Duplicate node path: {}",
                node.path
            )));
        }
        let parent_path = parent_path(&node.path).ok_or_else(|| {
            ExportError::Configuration(format!("Invalid node path: {}", node.path))
        })?;
        let parent = *self.index.get(parent_path).ok_or_else(|| {
            ExportError::Configuration(format!(
                "Parent {} of {} does not exist",
                parent_path, node.path
            ))
        })?;
        Ok(self.push_node(node, Some(parent)))
    }

    /// Mutable access to a node's description.
    pub fn node_mut(&mut self, id: SourceNodeId) -> Option<&mut MemoryNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn node(&self, id: SourceNodeId) -> Option<&MemoryNode> {
        self.nodes.get(id.0 as usize)
    }

    /// Define or replace a bundle.
    pub fn set_bundle(&mut self, name: impl Into<String>, members: &[&str]) {
        self.bundles.insert(
            name.into(),
            members.iter().map(|m| m.to_string()).collect(),
        );
    }

    /// Total number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn push_node(&mut self, node: MemoryNode, parent: Option<usize>) -> SourceNodeId {
        let idx = self.nodes.len();
        self.index.insert(node.path.clone(), idx);
        self.nodes.push(node);
        self.parents.push(parent);
        self.children.push(Vec::new());
        if let Some(parent) = parent {
            self.children[parent].push(idx);
        }
        SourceNodeId(idx as u32)
    }

    /// Rebuild lookup tables after deserialization. Parents are inserted
    /// before children regardless of file order; file order is kept among
    /// siblings.
    fn rebuild_index(&mut self) -> Result<()> {
        let mut described: Vec<MemoryNode> = std::mem::take(&mut self.nodes);
        described.retain(|n| n.path != "/");
        // Stable sort keeps sibling order from the file.
        described.sort_by_key(|n| n.path.matches('/').count());

        self.index.clear();
        self.parents.clear();
        self.children.clear();
        self.push_node(MemoryNode::new("/", NodeKind::Network), None);
        for node in described {
            self.insert(node)?;
        }

        for (bundle, members) in &self.bundles {
            for member in members {
                if !self.index.contains_key(member.trim_start_matches('@')) {
                    tracing::warn!("Bundle {} references unknown node {}", bundle, member);
                }
            }
        }
        Ok(())
    }

    fn frame_at(&self, time: f64) -> f32 {
        (time * self.fps) as f32 + 1.0
    }

    fn resolve(&self, path: &Option<String>) -> Option<SourceNodeId> {
        path.as_deref().and_then(|p| self.find_node(p))
    }
}

fn parent_path(path: &str) -> Option<&str> {
    if !path.starts_with('/') || path == "/" || path.ends_with('/') {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(pos) => Some(&path[..pos]),
        None => None,
    }
}

impl SourceGraph for MemoryScene {
    fn find_node(&self, path: &str) -> Option<SourceNodeId> {
        self.index.get(path).map(|&idx| SourceNodeId(idx as u32))
    }

    fn parent(&self, node: SourceNodeId) -> Option<SourceNodeId> {
        self.parents
            .get(node.0 as usize)
            .copied()
            .flatten()
            .map(|idx| SourceNodeId(idx as u32))
    }

    fn children(&self, node: SourceNodeId) -> Vec<SourceNodeId> {
        self.children
            .get(node.0 as usize)
            .map(|c| c.iter().map(|&idx| SourceNodeId(idx as u32)).collect())
            .unwrap_or_default()
    }

    fn full_path(&self, node: SourceNodeId) -> String {
        self.node(node).map(|n| n.path.clone()).unwrap_or_default()
    }

    fn kind(&self, node: SourceNodeId) -> NodeKind {
        self.node(node).map(|n| n.kind).unwrap_or(NodeKind::Object)
    }

    fn bundles(&self) -> Vec<String> {
        self.bundles.keys().cloned().collect()
    }

    fn bundle_members(&self, bundle: &str) -> Vec<SourceNodeId> {
        self.bundles
            .get(bundle)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| self.find_node(m.trim_start_matches('@')))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn samples_per_second(&self) -> f64 {
        self.fps
    }

    fn unit_length(&self) -> f64 {
        self.unit_length
    }

    fn up_axis(&self) -> UpAxis {
        self.up_axis
    }

    fn time_context_name(&self) -> String {
        self.time_context.clone()
    }

    fn host_info(&self) -> HostInfo {
        self.host.clone()
    }

    fn scene_file(&self) -> Option<String> {
        self.scene_file.clone()
    }

    fn project_dir(&self) -> Option<String> {
        self.project_dir.clone()
    }

    fn local_transform(&self, node: SourceNodeId, time: f64) -> Mat4 {
        self.node(node)
            .map(|n| n.transform.sample(self.frame_at(time)).to_matrix())
            .unwrap_or(Mat4::IDENTITY)
    }

    fn visible(&self, node: SourceNodeId, time: f64) -> bool {
        self.node(node)
            .map(|n| n.visibility.evaluate(self.frame_at(time)) > 0.5)
            .unwrap_or(true)
    }

    fn mesh(&self, node: SourceNodeId, time: f64) -> Option<MeshData> {
        let n = self.node(node)?;
        let mut mesh = n.mesh.clone()?;
        if let Some(deform) = &n.deform {
            let offset = eval3(deform, self.frame_at(time));
            for p in &mut mesh.positions {
                p[0] += offset.x;
                p[1] += offset.y;
                p[2] += offset.z;
            }
        }
        Some(mesh)
    }

    fn is_deforming(&self, node: SourceNodeId) -> bool {
        self.node(node)
            .and_then(|n| n.deform.as_ref())
            .map(|d| d.iter().any(Channel::is_animated))
            .unwrap_or(false)
    }

    fn material(&self, node: SourceNodeId) -> Option<MaterialData> {
        self.node(node)?.material.clone()
    }

    fn light(&self, node: SourceNodeId, time: f64) -> Option<LightData> {
        let light = self.node(node)?.light.as_ref()?;
        Some(LightData {
            kind: light.kind,
            color: light.color,
            intensity: light.intensity.evaluate(self.frame_at(time)),
            cone_angle: light.cone_angle,
        })
    }

    fn camera(&self, node: SourceNodeId, time: f64) -> Option<CameraData> {
        let n = self.node(node)?;
        if n.kind != NodeKind::Camera && n.camera.is_none() {
            return None;
        }
        let camera = n.camera.clone().unwrap_or_default();
        Some(CameraData {
            fov: camera.fov.evaluate(self.frame_at(time)),
            aspect: camera.aspect,
            near: camera.near,
            far: camera.far,
        })
    }

    fn instance_source(&self, node: SourceNodeId) -> Option<SourceNodeId> {
        self.resolve(&self.node(node)?.instance_of)
    }

    fn look_at_target(&self, node: SourceNodeId) -> Option<SourceNodeId> {
        self.resolve(&self.node(node)?.look_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_interpolation() {
        let channel = Channel::keys(&[(1.0, 0.0), (11.0, 10.0)]);
        assert_eq!(channel.evaluate(0.0), 0.0);
        assert!((channel.evaluate(6.0) - 5.0).abs() < 1e-6);
        assert_eq!(channel.evaluate(20.0), 10.0);
        assert!(channel.is_animated());
        assert!(!Channel::Constant(3.0).is_animated());
    }

    #[test]
    fn test_hierarchy_queries() {
        let mut scene = MemoryScene::new(24.0);
        let obj = scene.add_node("/obj", NodeKind::Network).unwrap();
        let root = scene.add_node("/obj/root", NodeKind::Object).unwrap();
        let geo = scene.add_node("/obj/root/geo1", NodeKind::Geometry).unwrap();

        assert_eq!(scene.find_node("/obj/root"), Some(root));
        assert_eq!(scene.parent(geo), Some(root));
        assert_eq!(scene.children(obj), vec![root]);
        assert_eq!(scene.name(geo), "geo1");
        assert!(scene.is_contained_by(geo, obj));
        assert!(!scene.is_contained_by(root, geo));
        assert!(!scene.is_contained_by(root, root));
    }

    #[test]
    fn test_missing_parent_rejected() {
        let mut scene = MemoryScene::new(24.0);
        assert!(scene.add_node("/obj/orphan", NodeKind::Object).is_err());
        assert!(scene.add_node("relative", NodeKind::Object).is_err());
    }

    #[test]
    fn test_world_transform_composes_parents() {
        let mut scene = MemoryScene::new(24.0);
        scene.add_node("/obj", NodeKind::Network).unwrap();
        let a = scene.add_node("/obj/a", NodeKind::Object).unwrap();
        let b = scene.add_node("/obj/a/b", NodeKind::Object).unwrap();
        scene.node_mut(a).unwrap().transform.translate[0] = Channel::Constant(2.0);
        scene.node_mut(b).unwrap().transform.translate[1] = Channel::Constant(3.0);

        let world = scene.world_transform(b, 0.0);
        assert!(world
            .transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(2.0, 3.0, 0.0), 1e-6));
    }

    #[test]
    fn test_from_json_orders_parents_first() {
        let json = r#"{
            "fps": 30,
            "nodes": [
                { "path": "/obj/root/geo1", "kind": "geometry",
                  "mesh": { "positions": [[0,0,0],[1,0,0],[0,1,0]], "indices": [0,1,2] } },
                { "path": "/obj", "kind": "network" },
                { "path": "/obj/root", "kind": "object",
                  "transform": { "translate": [[[1, 0], [30, 29]], 0, 0] } }
            ],
            "bundles": { "hero": ["@/obj/root/geo1"] }
        }"#;
        let scene = MemoryScene::from_json(json).unwrap();
        let geo = scene.find_node("/obj/root/geo1").unwrap();
        assert_eq!(scene.samples_per_second(), 30.0);
        assert_eq!(scene.bundle_members("hero"), vec![geo]);
        assert_eq!(scene.mesh(geo, 0.0).unwrap().triangle_count(), 1);

        let root = scene.find_node("/obj/root").unwrap();
        // Frame 30 is one frame short of a second at 30 fps.
        let t = scene.time_from_frame(30);
        let p = scene.local_transform(root, t).transform_point3(Vec3::ZERO);
        assert!((p.x - 29.0).abs() < 1e-3);
    }

    #[test]
    fn test_deforming_mesh() {
        let mut scene = MemoryScene::new(24.0);
        let geo = scene.add_node("/geo", NodeKind::Geometry).unwrap();
        let node = scene.node_mut(geo).unwrap();
        node.mesh = Some(MeshData {
            positions: vec![[0.0, 0.0, 0.0]],
            indices: vec![],
            ..Default::default()
        });
        node.deform = Some([
            Channel::keys(&[(1.0, 0.0), (2.0, 1.0)]),
            Channel::Constant(0.0),
            Channel::Constant(0.0),
        ]);
        assert!(scene.is_deforming(geo));
        let t = scene.time_from_frame(2);
        assert_eq!(scene.mesh(geo, t).unwrap().positions[0], [1.0, 0.0, 0.0]);
    }
}
