//! In-memory target document.
//!
//! The document is an arena: nodes, meshes, materials, animation layers,
//! stacks and curves live in vectors owned by [`SceneDocument`] and refer to
//! each other through typed indices. Dropping the document releases
//! everything at once.

pub mod animation;
pub mod convert;

pub use animation::{AnimCurve, AnimLayer, AnimStack, CacheFrame, CurveChannel, Keyframe, VertexCache};
pub use convert::{transform_component, SystemUnit};

use crate::source::{CameraData, LightData, MaterialData, MeshData};
use crate::types::{AxisSystem, Color, NodeTransform, TimeMode, TimeSpan};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub usize);

        impl $name {
            pub fn index(&self) -> usize {
                self.0
            }
        }
    };
}

arena_id!(
    /// Index of a node in a [`SceneDocument`].
    TargetNodeId
);
arena_id!(MeshId);
arena_id!(MaterialId);
arena_id!(LayerId);
arena_id!(StackId);

/// Payload attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum NodeAttribute {
    Null,
    Mesh { mesh: MeshId },
    Light(LightData),
    Camera(CameraData),
}

/// A node of the target scene graph.
#[derive(Debug, Clone, Serialize)]
pub struct TargetNode {
    pub name: String,
    pub parent: Option<TargetNodeId>,
    pub children: Vec<TargetNodeId>,
    pub transform: NodeTransform,
    pub visible: bool,
    pub attribute: NodeAttribute,
    pub material: Option<MaterialId>,
    /// Node this node is aimed at.
    pub look_at: Option<TargetNodeId>,
}

/// Named triangle geometry, shared by every node that instances it.
#[derive(Debug, Clone, Serialize)]
pub struct Mesh {
    pub name: String,
    #[serde(flatten)]
    pub data: MeshData,
}

/// Provenance metadata of the document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentInfo {
    pub original_application_vendor: String,
    pub original_application_name: String,
    pub original_application_version: String,
    pub original_file_name: String,
    pub application_active_project: Option<String>,
    pub application_native_file: Option<String>,
    pub original_date_time: Option<DateTime<Utc>>,
    pub last_saved_application_vendor: String,
    pub last_saved_application_name: String,
    pub last_saved_application_version: String,
    pub last_saved_date_time: Option<DateTime<Utc>>,
}

/// Document-wide settings.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalSettings {
    pub time_mode: TimeMode,
    pub custom_frame_rate: f64,
    pub timeline_span: Option<TimeSpan>,
    pub axis_system: AxisSystem,
    /// Axis system the data was authored in, set when it has been converted.
    pub original_axis_system: Option<AxisSystem>,
    pub system_unit: SystemUnit,
    pub original_system_unit: Option<SystemUnit>,
    pub ambient_color: Color,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            time_mode: TimeMode::default(),
            custom_frame_rate: TimeMode::default().frame_rate(),
            timeline_span: None,
            axis_system: AxisSystem::default(),
            original_axis_system: None,
            system_unit: SystemUnit::CENTIMETER,
            original_system_unit: None,
            ambient_color: Color::BLACK,
        }
    }
}

/// The interchange scene being built.
#[derive(Debug, Clone, Serialize)]
pub struct SceneDocument {
    pub info: DocumentInfo,
    pub settings: GlobalSettings,
    nodes: Vec<TargetNode>,
    meshes: Vec<Mesh>,
    materials: Vec<MaterialData>,
    layers: Vec<AnimLayer>,
    stacks: Vec<AnimStack>,
    curves: Vec<AnimCurve>,
    vertex_caches: Vec<VertexCache>,
    #[serde(skip)]
    curve_index: HashMap<(TargetNodeId, LayerId, CurveChannel), usize>,
}

impl Default for SceneDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneDocument {
    /// Create an empty document holding only the implicit root node.
    pub fn new() -> Self {
        Self {
            info: DocumentInfo::default(),
            settings: GlobalSettings::default(),
            nodes: vec![TargetNode {
                name: "RootNode".to_string(),
                parent: None,
                children: Vec::new(),
                transform: NodeTransform::IDENTITY,
                visible: true,
                attribute: NodeAttribute::Null,
                material: None,
                look_at: None,
            }],
            meshes: Vec::new(),
            materials: Vec::new(),
            layers: Vec::new(),
            stacks: Vec::new(),
            curves: Vec::new(),
            vertex_caches: Vec::new(),
            curve_index: HashMap::new(),
        }
    }

    /// The implicit root node.
    pub fn root(&self) -> TargetNodeId {
        TargetNodeId(0)
    }

    /// Create a null node under `parent`.
    pub fn create_node(&mut self, name: impl Into<String>, parent: TargetNodeId) -> TargetNodeId {
        let id = TargetNodeId(self.nodes.len());
        self.nodes.push(TargetNode {
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
            transform: NodeTransform::IDENTITY,
            visible: true,
            attribute: NodeAttribute::Null,
            material: None,
            look_at: None,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: TargetNodeId) -> &TargetNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: TargetNodeId) -> &mut TargetNode {
        &mut self.nodes[id.0]
    }

    /// Number of nodes, not counting the implicit root.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// All nodes in creation order, the root first.
    pub fn nodes(&self) -> impl Iterator<Item = (TargetNodeId, &TargetNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (TargetNodeId(i), n))
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut TargetNode> {
        self.nodes.iter_mut().skip(1)
    }

    /// Find a node by name.
    pub fn find_node(&self, name: &str) -> Option<TargetNodeId> {
        self.nodes().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    /// Node ids below `start` in depth-first order, `start` excluded.
    pub fn descendants(&self, start: TargetNodeId) -> Vec<TargetNodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<TargetNodeId> = self.node(start).children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    pub fn add_mesh(&mut self, name: impl Into<String>, data: MeshData) -> MeshId {
        let id = MeshId(self.meshes.len());
        self.meshes.push(Mesh {
            name: name.into(),
            data,
        });
        id
    }

    pub fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.0]
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub(crate) fn meshes_mut(&mut self) -> &mut [Mesh] {
        &mut self.meshes
    }

    /// Add a material, reusing an existing one with the same name.
    pub fn add_material(&mut self, material: MaterialData) -> MaterialId {
        if let Some(existing) = self.find_material(&material.name) {
            return existing;
        }
        let id = MaterialId(self.materials.len());
        self.materials.push(material);
        id
    }

    pub fn find_material(&self, name: &str) -> Option<MaterialId> {
        self.materials
            .iter()
            .position(|m| m.name == name)
            .map(MaterialId)
    }

    pub fn material(&self, id: MaterialId) -> &MaterialData {
        &self.materials[id.0]
    }

    pub fn materials(&self) -> &[MaterialData] {
        &self.materials
    }

    pub fn create_layer(&mut self, name: impl Into<String>) -> LayerId {
        let id = LayerId(self.layers.len());
        self.layers.push(AnimLayer { name: name.into() });
        id
    }

    pub fn layers(&self) -> &[AnimLayer] {
        &self.layers
    }

    /// Create an animation stack spanning `span`.
    pub fn create_stack(&mut self, name: impl Into<String>, span: TimeSpan) -> StackId {
        let id = StackId(self.stacks.len());
        self.stacks.push(AnimStack {
            name: name.into(),
            layers: Vec::new(),
            local_span: span,
            reference_span: span,
        });
        id
    }

    pub fn stack_mut(&mut self, id: StackId) -> &mut AnimStack {
        &mut self.stacks[id.0]
    }

    pub fn stacks(&self) -> &[AnimStack] {
        &self.stacks
    }

    /// Curve for a node channel on a layer, created empty on first use.
    pub fn curve_mut(
        &mut self,
        node: TargetNodeId,
        layer: LayerId,
        channel: CurveChannel,
    ) -> &mut AnimCurve {
        let next = self.curves.len();
        let idx = *self.curve_index.entry((node, layer, channel)).or_insert(next);
        if idx == next {
            self.curves.push(AnimCurve::new(node, layer, channel));
        }
        &mut self.curves[idx]
    }

    pub fn curve(
        &self,
        node: TargetNodeId,
        layer: LayerId,
        channel: CurveChannel,
    ) -> Option<&AnimCurve> {
        self.curve_index
            .get(&(node, layer, channel))
            .map(|&idx| &self.curves[idx])
    }

    pub fn curves(&self) -> &[AnimCurve] {
        &self.curves
    }

    pub(crate) fn curves_mut(&mut self) -> &mut [AnimCurve] {
        &mut self.curves
    }

    /// Curves animating `node`, on any layer.
    pub fn curves_for_node(&self, node: TargetNodeId) -> impl Iterator<Item = &AnimCurve> {
        self.curves.iter().filter(move |c| c.node == node)
    }

    pub fn add_vertex_cache(&mut self, cache: VertexCache) {
        self.vertex_caches.push(cache);
    }

    pub fn vertex_caches(&self) -> &[VertexCache] {
        &self.vertex_caches
    }

    pub(crate) fn vertex_caches_mut(&mut self) -> &mut [VertexCache] {
        &mut self.vertex_caches
    }

    /// Cache recording deformation of `mesh`, if one exists.
    pub fn vertex_cache_mut(&mut self, mesh: MeshId) -> Option<&mut VertexCache> {
        self.vertex_caches.iter_mut().find(|c| c.mesh == mesh)
    }
}
