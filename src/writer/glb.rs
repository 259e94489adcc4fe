//! Binary encoding: glTF 2.0 (GLB).
//!
//! Nodes, meshes, materials, cameras and one animation per stack are
//! written. Lights, custom channels and vertex caches have no core glTF
//! counterpart and are left out.

use super::{DocumentWriter, WriterFormat};
use crate::document::{MaterialId, MeshId, NodeAttribute, SceneDocument, TargetNodeId};
use crate::error::{ExportError, Result};
use crate::export::FileEncoding;
use crate::source::MaterialData;
use crate::types::{euler_degrees_to_quat, BoundingBox};
use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

pub(super) const FORMAT: WriterFormat = WriterFormat {
    family: "glTF",
    version: "2.0",
    encoding: FileEncoding::Binary,
    extension: "glb",
};

/// Writes GLB files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlbWriter;

impl DocumentWriter for GlbWriter {
    fn format(&self) -> WriterFormat {
        FORMAT
    }

    fn write(&self, document: &SceneDocument, path: &Path, embed_media: bool) -> Result<()> {
        let glb = encode_glb(document, embed_media)?;
        std::fs::write(path, glb)?;
        Ok(())
    }
}

/// Accessors of one written mesh.
#[derive(Debug, Clone, Copy)]
struct MeshAccessors {
    positions: u32,
    normals: Option<u32>,
    uvs: Option<u32>,
    indices: u32,
}

/// Accumulates the binary chunk and the glTF arrays that index into it.
#[derive(Default)]
struct GlbBuilder {
    buffer: Vec<u8>,
    buffer_views: Vec<json::buffer::View>,
    accessors: Vec<json::Accessor>,
    images: Vec<json::Image>,
    textures: Vec<json::Texture>,
    materials: Vec<json::Material>,
    meshes: Vec<json::Mesh>,
    cameras: Vec<json::Camera>,
    animations: Vec<json::Animation>,
    mesh_accessors: HashMap<MeshId, MeshAccessors>,
    gltf_meshes: HashMap<(MeshId, Option<MaterialId>), u32>,
}

impl GlbBuilder {
    /// Append `bytes` (4-byte aligned) and return the new view's index.
    fn push_view(&mut self, bytes: &[u8], target: Option<json::buffer::Target>) -> u32 {
        let padding = (4 - (self.buffer.len() % 4)) % 4;
        self.buffer.extend(std::iter::repeat(0u8).take(padding));
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(bytes);
        self.buffer_views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64(bytes.len() as u64),
            byte_offset: Some(USize64(offset as u64)),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            target: target.map(Valid),
        });
        (self.buffer_views.len() - 1) as u32
    }

    fn push_accessor(
        &mut self,
        view: u32,
        count: usize,
        type_: json::accessor::Type,
        component_type: json::accessor::ComponentType,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
    ) -> u32 {
        let (min, max) = match bounds {
            Some((min, max)) => (Some(json::Value::from(min)), Some(json::Value::from(max))),
            None => (None, None),
        };
        self.accessors.push(json::Accessor {
            buffer_view: Some(json::Index::new(view)),
            byte_offset: Some(USize64(0)),
            count: USize64(count as u64),
            component_type: Valid(json::accessor::GenericComponentType(component_type)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(type_),
            min,
            max,
            normalized: false,
            sparse: None,
        });
        (self.accessors.len() - 1) as u32
    }

    fn push_floats<const N: usize>(
        &mut self,
        values: &[[f32; N]],
        type_: json::accessor::Type,
        target: Option<json::buffer::Target>,
    ) -> u32 {
        let view = self.push_view(&f32_bytes(values.iter().flatten().copied()), target);
        self.push_accessor(view, values.len(), type_, json::accessor::ComponentType::F32, None)
    }

    fn write_mesh(&mut self, document: &SceneDocument, id: MeshId) -> Option<MeshAccessors> {
        if let Some(existing) = self.mesh_accessors.get(&id) {
            return Some(*existing);
        }
        let data = &document.mesh(id).data;
        let bounds = BoundingBox::from_points(data.positions.iter().copied())?;
        let vertex_count = data.positions.len();

        let view = self.push_view(
            &f32_bytes(data.positions.iter().flatten().copied()),
            Some(json::buffer::Target::ArrayBuffer),
        );
        let positions = self.push_accessor(
            view,
            vertex_count,
            json::accessor::Type::Vec3,
            json::accessor::ComponentType::F32,
            Some((bounds.min.to_vec(), bounds.max.to_vec())),
        );
        let normals = (data.normals.len() == vertex_count).then(|| {
            self.push_floats(&data.normals, json::accessor::Type::Vec3, Some(json::buffer::Target::ArrayBuffer))
        });
        let uvs = (data.uvs.len() == vertex_count).then(|| {
            self.push_floats(&data.uvs, json::accessor::Type::Vec2, Some(json::buffer::Target::ArrayBuffer))
        });
        let index_bytes: Vec<u8> = data.indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let view = self.push_view(&index_bytes, Some(json::buffer::Target::ElementArrayBuffer));
        let indices = self.push_accessor(
            view,
            data.indices.len(),
            json::accessor::Type::Scalar,
            json::accessor::ComponentType::U32,
            None,
        );

        let accessors = MeshAccessors {
            positions,
            normals,
            uvs,
            indices,
        };
        self.mesh_accessors.insert(id, accessors);
        Some(accessors)
    }

    /// glTF mesh for a document mesh drawn with `material`, shared between
    /// nodes that use the same pair.
    fn gltf_mesh(
        &mut self,
        document: &SceneDocument,
        mesh: MeshId,
        material: Option<MaterialId>,
    ) -> Option<u32> {
        if let Some(&idx) = self.gltf_meshes.get(&(mesh, material)) {
            return Some(idx);
        }
        let accessors = self.write_mesh(document, mesh)?;

        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert(
            Valid(json::mesh::Semantic::Positions),
            json::Index::new(accessors.positions),
        );
        if let Some(normals) = accessors.normals {
            attributes.insert(Valid(json::mesh::Semantic::Normals), json::Index::new(normals));
        }
        if let Some(uvs) = accessors.uvs {
            attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), json::Index::new(uvs));
        }

        self.meshes.push(json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            primitives: vec![json::mesh::Primitive {
                attributes,
                extensions: Default::default(),
                extras: Default::default(),
                indices: Some(json::Index::new(accessors.indices)),
                material: material.map(|m| json::Index::new(m.index() as u32)),
                mode: Valid(json::mesh::Mode::Triangles),
                targets: None,
            }],
            weights: None,
        });
        let idx = (self.meshes.len() - 1) as u32;
        self.gltf_meshes.insert((mesh, material), idx);
        Some(idx)
    }

    fn write_material(&mut self, material: &MaterialData, embed_media: bool) {
        let texture = material
            .texture
            .as_deref()
            .map(|path| self.write_texture(path, embed_media));
        let [r, g, b] = material.diffuse.to_array();
        let alpha_mode = if material.opacity < 1.0 {
            json::material::AlphaMode::Blend
        } else {
            json::material::AlphaMode::Opaque
        };

        self.materials.push(json::Material {
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_texture: texture.map(|index| json::texture::Info {
                    index: json::Index::new(index),
                    tex_coord: 0,
                    extensions: Default::default(),
                    extras: Default::default(),
                }),
                base_color_factor: json::material::PbrBaseColorFactor([r, g, b, material.opacity]),
                metallic_factor: json::material::StrengthFactor(0.0),
                roughness_factor: json::material::StrengthFactor(1.0),
                metallic_roughness_texture: None,
                extensions: Default::default(),
                extras: Default::default(),
            },
            alpha_mode: Valid(alpha_mode),
            alpha_cutoff: None,
            double_sided: true,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            emissive_factor: json::material::EmissiveFactor([0.0, 0.0, 0.0]),
            extensions: Default::default(),
            extras: Default::default(),
        });
    }

    /// Texture for the image at `path`, embedded in the binary chunk when
    /// requested and readable, otherwise referenced by URI.
    fn write_texture(&mut self, path: &str, embed_media: bool) -> u32 {
        let embedded = if embed_media { self.embed_image(path) } else { None };
        let image = embedded.unwrap_or_else(|| json::Image {
            buffer_view: None,
            mime_type: None,
            uri: Some(path.replace('\\', "/")),
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.images.push(image);
        self.textures.push(json::Texture {
            sampler: Some(json::Index::new(0)),
            source: json::Index::new((self.images.len() - 1) as u32),
            extensions: Default::default(),
            extras: Default::default(),
        });
        (self.textures.len() - 1) as u32
    }

    fn embed_image(&mut self, path: &str) -> Option<json::Image> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Cannot embed {}: {}; referencing it instead", path, e);
                return None;
            }
        };
        let format = match image::guess_format(&bytes) {
            Ok(format) => format,
            Err(e) => {
                tracing::warn!("Cannot embed {}: {}; referencing it instead", path, e);
                return None;
            }
        };
        let view = self.push_view(&bytes, None);
        Some(json::Image {
            buffer_view: Some(json::Index::new(view)),
            mime_type: Some(json::image::MimeType(format.to_mime_type().to_string())),
            uri: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    fn write_animations(&mut self, document: &SceneDocument, node_index: &dyn Fn(TargetNodeId) -> u32) {
        let fps = document.settings.time_mode.frame_rate() as f32;

        for stack in document.stacks() {
            let Some(&layer) = stack.layers.first() else {
                continue;
            };
            let span = stack.local_span;
            let mut channels = Vec::new();
            let mut samplers = Vec::new();

            let animated: BTreeSet<TargetNodeId> = document
                .curves()
                .iter()
                .filter(|c| c.layer == layer && c.channel.is_transform())
                .map(|c| c.node)
                .collect();

            for node in animated {
                let frames: BTreeSet<i64> = document
                    .curves_for_node(node)
                    .filter(|c| c.layer == layer && c.channel.is_transform())
                    .flat_map(|c| c.keys_in(span).map(|k| k.frame))
                    .collect();
                if frames.is_empty() {
                    continue;
                }
                let rest = document.node(node).transform;
                let samples: Vec<_> = frames
                    .iter()
                    .map(|&f| document.sample_transform(node, layer, f, &rest))
                    .collect();

                let times: Vec<f32> = frames.iter().map(|&f| (f - span.start) as f32 / fps).collect();
                let (t0, t1) = (times[0], times[times.len() - 1]);
                let view = self.push_view(&f32_bytes(times.iter().copied()), None);
                let input = self.push_accessor(
                    view,
                    times.len(),
                    json::accessor::Type::Scalar,
                    json::accessor::ComponentType::F32,
                    Some((vec![t0], vec![t1])),
                );

                let translations: Vec<[f32; 3]> = samples.iter().map(|t| t.translation.to_array()).collect();
                let rotations: Vec<[f32; 4]> = samples
                    .iter()
                    .map(|t| euler_degrees_to_quat(t.rotation).to_array())
                    .collect();
                let scales: Vec<[f32; 3]> = samples.iter().map(|t| t.scale.to_array()).collect();

                let outputs = [
                    (
                        json::animation::Property::Translation,
                        self.push_floats(&translations, json::accessor::Type::Vec3, None),
                    ),
                    (
                        json::animation::Property::Rotation,
                        self.push_floats(&rotations, json::accessor::Type::Vec4, None),
                    ),
                    (
                        json::animation::Property::Scale,
                        self.push_floats(&scales, json::accessor::Type::Vec3, None),
                    ),
                ];
                for (property, output) in outputs {
                    samplers.push(json::animation::Sampler {
                        extensions: Default::default(),
                        extras: Default::default(),
                        input: json::Index::new(input),
                        interpolation: Valid(json::animation::Interpolation::Linear),
                        output: json::Index::new(output),
                    });
                    channels.push(json::animation::Channel {
                        sampler: json::Index::new((samplers.len() - 1) as u32),
                        target: json::animation::Target {
                            extensions: Default::default(),
                            extras: Default::default(),
                            node: json::Index::new(node_index(node)),
                            path: Valid(property),
                        },
                        extensions: Default::default(),
                        extras: Default::default(),
                    });
                }
            }

            if channels.is_empty() {
                tracing::debug!("Stack {} has no transform keys; not written", stack.name);
                continue;
            }
            self.animations.push(json::Animation {
                extensions: Default::default(),
                extras: Default::default(),
                channels,
                samplers,
            });
        }
    }
}

/// Encode `document` as a GLB byte stream.
pub fn encode_glb(document: &SceneDocument, embed_media: bool) -> Result<Vec<u8>> {
    let mut builder = GlbBuilder::default();

    for material in document.materials() {
        builder.write_material(material, embed_media);
    }

    // The implicit document root is the glTF scene itself.
    let node_index = |id: TargetNodeId| (id.index() - 1) as u32;
    let mut nodes = Vec::with_capacity(document.node_count());
    for (id, node) in document.nodes().skip(1) {
        let mesh = match node.attribute {
            NodeAttribute::Mesh { mesh } => builder.gltf_mesh(document, mesh, node.material),
            _ => None,
        };
        let camera = match node.attribute {
            NodeAttribute::Camera(camera) => {
                builder.cameras.push(json::Camera {
                    orthographic: None,
                    perspective: Some(json::camera::Perspective {
                        aspect_ratio: Some(camera.aspect),
                        yfov: camera.fov.to_radians(),
                        zfar: Some(camera.far),
                        znear: camera.near,
                        extensions: Default::default(),
                        extras: Default::default(),
                    }),
                    type_: Valid(json::camera::Type::Perspective),
                    extensions: Default::default(),
                    extras: Default::default(),
                });
                Some(json::Index::new((builder.cameras.len() - 1) as u32))
            }
            _ => None,
        };
        let t = node.transform;
        let children: Vec<_> = node
            .children
            .iter()
            .map(|&c| json::Index::new(node_index(c)))
            .collect();
        debug_assert_eq!(nodes.len() as u32, node_index(id));
        nodes.push(json::Node {
            camera,
            children: (!children.is_empty()).then_some(children),
            extensions: Default::default(),
            extras: Default::default(),
            matrix: None,
            mesh: mesh.map(json::Index::new),
            rotation: Some(json::scene::UnitQuaternion(
                euler_degrees_to_quat(t.rotation).to_array(),
            )),
            scale: Some(t.scale.to_array()),
            translation: Some(t.translation.to_array()),
            skin: None,
            weights: None,
        });
    }

    builder.write_animations(document, &node_index);

    let scene_nodes = document
        .node(document.root())
        .children
        .iter()
        .map(|&c| json::Index::new(node_index(c)))
        .collect();

    let samplers = if builder.textures.is_empty() {
        Vec::new()
    } else {
        vec![json::texture::Sampler {
            mag_filter: Some(Valid(json::texture::MagFilter::Linear)),
            min_filter: Some(Valid(json::texture::MinFilter::LinearMipmapLinear)),
            wrap_s: Valid(json::texture::WrappingMode::Repeat),
            wrap_t: Valid(json::texture::WrappingMode::Repeat),
            extensions: Default::default(),
            extras: Default::default(),
        }]
    };
    let buffers = if builder.buffer.is_empty() {
        Vec::new()
    } else {
        vec![json::Buffer {
            byte_length: USize64(builder.buffer.len() as u64),
            extensions: Default::default(),
            extras: Default::default(),
            uri: None,
        }]
    };

    let root = json::Root {
        accessors: builder.accessors,
        animations: builder.animations,
        buffers,
        buffer_views: builder.buffer_views,
        cameras: builder.cameras,
        images: builder.images,
        samplers,
        textures: builder.textures,
        materials: builder.materials,
        meshes: builder.meshes,
        nodes,
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            nodes: scene_nodes,
        }],
        scene: Some(json::Index::new(0)),
        ..Default::default()
    };

    let json_string = json::serialize::to_string(&root)
        .map_err(|e| ExportError::Serialization(format!("Failed to serialize glTF JSON: {}", e)))?;
    Ok(assemble_glb(json_string.as_bytes(), &builder.buffer))
}

/// Frame a JSON chunk and an optional binary chunk as GLB.
fn assemble_glb(json_bytes: &[u8], buffer: &[u8]) -> Vec<u8> {
    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let padded_json_len = json_bytes.len() + json_padding;
    let buffer_padding = (4 - (buffer.len() % 4)) % 4;
    let padded_buffer_len = buffer.len() + buffer_padding;

    let mut total_size = 12 + 8 + padded_json_len;
    if !buffer.is_empty() {
        total_size += 8 + padded_buffer_len;
    }

    let mut glb = Vec::with_capacity(total_size);

    // Header
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total_size as u32).to_le_bytes());

    // JSON chunk, space padded
    glb.extend_from_slice(&(padded_json_len as u32).to_le_bytes());
    glb.extend_from_slice(&0x4E4F534Au32.to_le_bytes());
    glb.extend_from_slice(json_bytes);
    glb.extend(std::iter::repeat(0x20u8).take(json_padding));

    // BIN chunk, zero padded
    if !buffer.is_empty() {
        glb.extend_from_slice(&(padded_buffer_len as u32).to_le_bytes());
        glb.extend_from_slice(&0x004E4942u32.to_le_bytes());
        glb.extend_from_slice(buffer);
        glb.extend(std::iter::repeat(0u8).take(buffer_padding));
    }

    glb
}

fn f32_bytes(values: impl Iterator<Item = f32>) -> Vec<u8> {
    values.flat_map(f32::to_le_bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::CurveChannel;
    use crate::source::{CameraData, MeshData};
    use crate::types::{Color, TimeSpan};

    fn json_chunk(glb: &[u8]) -> serde_json::Value {
        let len = u32::from_le_bytes([glb[12], glb[13], glb[14], glb[15]]) as usize;
        serde_json::from_slice(&glb[20..20 + len]).unwrap()
    }

    fn document() -> SceneDocument {
        let mut doc = SceneDocument::new();
        let root = doc.create_node("root", doc.root());
        let geo = doc.create_node("geo1", root);
        let mesh = doc.add_mesh(
            "geo1",
            MeshData {
                positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                normals: vec![[0.0, 0.0, 1.0]; 3],
                uvs: Vec::new(),
                indices: vec![0, 1, 2],
            },
        );
        let material = doc.add_material(MaterialData {
            name: "red".to_string(),
            diffuse: Color::new(1.0, 0.0, 0.0),
            opacity: 1.0,
            texture: None,
        });
        let node = doc.node_mut(geo);
        node.attribute = NodeAttribute::Mesh { mesh };
        node.material = Some(material);
        doc
    }

    #[test]
    fn test_header_and_hierarchy() {
        let glb = encode_glb(&document(), false).unwrap();
        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes([glb[4], glb[5], glb[6], glb[7]]), 2);
        assert_eq!(
            u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]) as usize,
            glb.len()
        );

        let json = json_chunk(&glb);
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["scenes"][0]["nodes"], serde_json::json!([0]));
        assert_eq!(json["nodes"][0]["children"], serde_json::json!([1]));
        assert_eq!(json["nodes"][1]["mesh"], 0);
        assert_eq!(json["meshes"][0]["primitives"][0]["material"], 0);
        assert!(json["meshes"][0]["primitives"][0]["attributes"]["NORMAL"].is_number());
    }

    #[test]
    fn test_empty_document_has_no_buffer() {
        let glb = encode_glb(&SceneDocument::new(), false).unwrap();
        let json = json_chunk(&glb);
        assert!(json.get("buffers").is_none());
        assert_eq!(u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]) as usize, glb.len());
    }

    #[test]
    fn test_shared_mesh_written_once() {
        let mut doc = document();
        let mesh = match doc.node(TargetNodeId(2)).attribute {
            NodeAttribute::Mesh { mesh } => mesh,
            _ => unreachable!(),
        };
        let copy = doc.create_node("copy", doc.root());
        doc.node_mut(copy).attribute = NodeAttribute::Mesh { mesh };
        doc.node_mut(copy).material = Some(MaterialId(0));

        let json = json_chunk(&encode_glb(&doc, false).unwrap());
        assert_eq!(json["meshes"].as_array().unwrap().len(), 1);
        assert_eq!(json["nodes"][2]["mesh"], 0);
    }

    #[test]
    fn test_camera_and_animation() {
        let mut doc = document();
        let cam = doc.create_node("cam", doc.root());
        doc.node_mut(cam).attribute = NodeAttribute::Camera(CameraData {
            fov: 45.0,
            aspect: 1.5,
            near: 0.1,
            far: 100.0,
        });
        let layer = doc.create_layer("Base Layer");
        let stack = doc.create_stack("walk", TimeSpan::new(1, 25));
        doc.stack_mut(stack).add_layer(layer);
        for frame in [1, 25] {
            let curve = doc.curve_mut(TargetNodeId(1), layer, CurveChannel::Translation(crate::types::Axis::X));
            curve.set_key(frame, frame as f32);
        }

        let json = json_chunk(&encode_glb(&doc, false).unwrap());
        assert_eq!(json["cameras"].as_array().unwrap().len(), 1);
        assert_eq!(json["nodes"][2]["camera"], 0);
        let animations = json["animations"].as_array().unwrap();
        assert_eq!(animations.len(), 1);
        assert_eq!(animations[0]["channels"].as_array().unwrap().len(), 3);
        let input = animations[0]["samplers"][0]["input"].as_u64().unwrap() as usize;
        assert_eq!(json["accessors"][input]["count"], 2);
        assert_eq!(json["accessors"][input]["max"][0], 1.0);
    }

    #[test]
    fn test_embedded_texture() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("albedo.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
            .save(&png)
            .unwrap();

        let mut doc = document();
        doc.add_material(MaterialData {
            name: "textured".to_string(),
            diffuse: Color::WHITE,
            opacity: 0.5,
            texture: Some(png.to_string_lossy().into_owned()),
        });

        let json = json_chunk(&encode_glb(&doc, true).unwrap());
        assert_eq!(json["images"][0]["mimeType"], "image/png");
        assert!(json["images"][0]["bufferView"].is_number());
        assert_eq!(json["materials"][1]["alphaMode"], "BLEND");

        let json = json_chunk(&encode_glb(&doc, false).unwrap());
        assert!(json["images"][0]["uri"].is_string());
    }
}
