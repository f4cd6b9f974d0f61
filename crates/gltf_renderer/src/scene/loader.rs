//! glTF asset to flattened scene data
//!
//! Loading walks the default scene depth-first and produces CPU-side arrays
//! ready for upload: one interleaved vertex list, one `u32` index list, one
//! model matrix per mesh instance, the material records and the decoded
//! textures. Nothing here touches the GPU.

use std::path::Path;

use super::draw::{plan_scene_draw, DrawCall, Primitive};
use super::graph::{NodeGraph, NodeId};
use super::image_data::{sampler_settings, TextureSource};
use super::material::{MaterialRecord, MAX_MATERIAL_COUNT};
use super::vertex::{ModelMatrix, Vertex};
use super::{SceneError, SceneResult};
use crate::foundation::math::{Mat4, Transform};

/// A mesh placed in the scene by one node
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    /// Node that placed the mesh
    pub node: NodeId,
    /// Mesh index in the source asset
    pub source_mesh: usize,
    /// Index into [`SceneData::model_matrices`]
    pub model_matrix: u32,
    /// Primitive ranges in the flattened buffers
    pub primitives: Vec<Primitive>,
}

/// Everything the GPU upload needs
#[derive(Debug, Clone, PartialEq)]
pub struct SceneData {
    /// Interleaved vertices of every primitive
    pub vertices: Vec<Vertex>,
    /// Indices, already offset into `vertices`
    pub indices: Vec<u32>,
    /// One global transform per mesh instance
    pub model_matrices: Vec<ModelMatrix>,
    /// Materials in asset order
    pub materials: Vec<MaterialRecord>,
    /// Textures in asset order
    pub textures: Vec<TextureSource>,
    /// Mesh instances in traversal order
    pub meshes: Vec<MeshInstance>,
    /// Node hierarchy of the loaded scene
    pub graph: NodeGraph,
    /// How the scene is drawn
    pub draw: DrawCall,
}

impl SceneData {
    /// Import a `.gltf`/`.glb` file and its external resources
    pub fn from_path<P: AsRef<Path>>(path: P) -> SceneResult<Self> {
        let (document, buffers, images) = gltf::import(path.as_ref())?;
        Self::from_gltf(&document, &buffers, &images)
    }

    /// Import a self-contained asset held in memory
    pub fn from_slice(bytes: &[u8]) -> SceneResult<Self> {
        let (document, buffers, images) = gltf::import_slice(bytes)?;
        Self::from_gltf(&document, &buffers, &images)
    }

    /// Flatten an imported document
    pub fn from_gltf(
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
        images: &[gltf::image::Data],
    ) -> SceneResult<Self> {
        let material_count = document.materials().len();
        if material_count > MAX_MATERIAL_COUNT as usize {
            return Err(SceneError::TooManyMaterials {
                count: material_count,
                max: MAX_MATERIAL_COUNT as usize,
            });
        }

        let materials: Vec<MaterialRecord> = document
            .materials()
            .enumerate()
            .map(|(index, material)| MaterialRecord::from_gltf(&material, index))
            .collect();

        let textures = load_textures(document, images, &materials)?;

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or(SceneError::NoScene)?;

        let mut builder = GeometryBuilder {
            buffers,
            vertices: Vec::new(),
            indices: Vec::new(),
            model_matrices: Vec::new(),
            meshes: Vec::new(),
            graph: NodeGraph::new(),
        };
        for node in scene.nodes() {
            builder.visit(&node, None)?;
        }

        let GeometryBuilder {
            vertices,
            indices,
            model_matrices,
            mut meshes,
            graph,
            ..
        } = builder;

        let mut primitives: Vec<Primitive> = meshes.iter().flat_map(|m| m.primitives.iter().copied()).collect();
        let (draw, indices) = plan_scene_draw(&mut primitives, &indices, vertices.len() as u32);
        if matches!(draw, DrawCall::Indexed { .. }) {
            let mut planned = primitives.into_iter();
            for primitive in meshes.iter_mut().flat_map(|m| m.primitives.iter_mut()) {
                if let Some(updated) = planned.next() {
                    *primitive = updated;
                }
            }
        }

        log::info!(
            "Scene loaded: {} nodes, {} meshes, {} vertices, {} indices, {} materials, {} textures",
            graph.len(),
            meshes.len(),
            vertices.len(),
            indices.len(),
            materials.len(),
            textures.len()
        );

        Ok(Self {
            vertices,
            indices,
            model_matrices,
            materials,
            textures,
            meshes,
            graph,
            draw,
        })
    }
}

/// Decode every glTF texture; color space follows the roles that use it
fn load_textures(
    document: &gltf::Document,
    images: &[gltf::image::Data],
    materials: &[MaterialRecord],
) -> SceneResult<Vec<TextureSource>> {
    let mut srgb = vec![false; document.textures().len()];
    for material in materials {
        for (slot, texture) in material.bound_textures() {
            if slot.is_color() {
                if let Some(flag) = srgb.get_mut(texture.texture) {
                    *flag = true;
                }
            }
        }
    }

    document
        .textures()
        .map(|texture| {
            let image_index = texture.source().index();
            let image = images
                .get(image_index)
                .ok_or(SceneError::Import(gltf::Error::MissingBlob))?;
            TextureSource::from_image(
                image,
                image_index,
                srgb[texture.index()],
                sampler_settings(&texture.sampler()),
            )
        })
        .collect()
}

/// Node transform as a matrix; TRS nodes compose as `T * R * S`
fn local_transform(transform: &gltf::scene::Transform) -> Mat4 {
    match *transform {
        gltf::scene::Transform::Matrix { matrix } => Mat4::from(matrix),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => Transform::from_trs(translation, rotation, scale).to_matrix(),
    }
}

struct GeometryBuilder<'a> {
    buffers: &'a [gltf::buffer::Data],
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    model_matrices: Vec<ModelMatrix>,
    meshes: Vec<MeshInstance>,
    graph: NodeGraph,
}

impl GeometryBuilder<'_> {
    fn visit(&mut self, node: &gltf::Node<'_>, parent: Option<NodeId>) -> SceneResult<()> {
        let local = local_transform(&node.transform());
        let id = self.graph.insert(parent, local, node.index());

        if let Some(mesh) = node.mesh() {
            let global = self.graph.get(id).map_or(local, |n| n.global_transform);
            if let Some(instance) = self.load_mesh(&mesh, id, global)? {
                self.graph.set_mesh_instance(id, self.meshes.len());
                self.meshes.push(instance);
            }
        }

        for child in node.children() {
            self.visit(&child, Some(id))?;
        }
        Ok(())
    }

    /// Meshes with no triangle-list primitive place nothing and take no
    /// model-matrix slot
    fn load_mesh(&mut self, mesh: &gltf::Mesh<'_>, node: NodeId, global: Mat4) -> SceneResult<Option<MeshInstance>> {
        let drawable: Vec<gltf::Primitive<'_>> = mesh
            .primitives()
            .filter(|primitive| {
                let triangles = primitive.mode() == gltf::mesh::Mode::Triangles;
                if !triangles {
                    log::warn!(
                        "Skipping mesh {} primitive {}: mode {:?} is not a triangle list",
                        mesh.index(),
                        primitive.index(),
                        primitive.mode()
                    );
                }
                triangles
            })
            .collect();
        if drawable.is_empty() {
            return Ok(None);
        }

        let model_matrix = self.model_matrices.len() as u32;
        self.model_matrices.push(ModelMatrix::from(global));

        let primitives = drawable
            .iter()
            .map(|primitive| self.load_primitive(mesh.index(), primitive, model_matrix))
            .collect::<SceneResult<Vec<_>>>()?;

        Ok(Some(MeshInstance {
            node,
            source_mesh: mesh.index(),
            model_matrix,
            primitives,
        }))
    }

    fn load_primitive(
        &mut self,
        mesh_index: usize,
        primitive: &gltf::Primitive<'_>,
        model_matrix: u32,
    ) -> SceneResult<Primitive> {
        let buffers = self.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

        let positions = reader.read_positions().ok_or(SceneError::MissingAttribute {
            mesh: mesh_index,
            primitive: primitive.index(),
            attribute: "POSITION",
        })?;

        let material = primitive.material().index();
        let material_id = material.map_or(-1, |index| index as i32);
        let vertex_start = self.vertices.len();

        self.vertices.extend(positions.map(|position| Vertex {
            position,
            material_id,
            model_mat_id: model_matrix as i32,
            ..Vertex::default()
        }));
        let new_vertices = &mut self.vertices[vertex_start..];

        if let Some(normals) = reader.read_normals() {
            for (vertex, normal) in new_vertices.iter_mut().zip(normals) {
                vertex.normal = normal;
            }
        }
        if let Some(tangents) = reader.read_tangents() {
            for (vertex, [x, y, z, _]) in new_vertices.iter_mut().zip(tangents) {
                vertex.tangent = [x, y, z];
            }
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            for (vertex, uv) in new_vertices.iter_mut().zip(uvs.into_f32()) {
                vertex.uv0 = uv;
            }
        }
        if let Some(uvs) = reader.read_tex_coords(1) {
            for (vertex, uv) in new_vertices.iter_mut().zip(uvs.into_f32()) {
                vertex.uv1 = uv;
            }
        }

        let vertex_count = new_vertices.len() as u32;
        let vertex_start = vertex_start as u32;
        let index_start = self.indices.len() as u32;

        match reader.read_indices() {
            Some(gltf::mesh::util::ReadIndices::U16(indices)) => {
                self.indices.extend(indices.map(|i| vertex_start + u32::from(i)));
            }
            Some(gltf::mesh::util::ReadIndices::U32(indices)) => {
                self.indices.extend(indices.map(|i| vertex_start + i));
            }
            Some(gltf::mesh::util::ReadIndices::U8(_)) => {
                return Err(SceneError::UnsupportedIndexType {
                    mesh: mesh_index,
                    primitive: primitive.index(),
                });
            }
            None => {}
        }

        Ok(Primitive {
            vertex_start,
            vertex_count,
            index_start,
            index_count: self.indices.len() as u32 - index_start,
            material,
        })
    }
}

/// One-shot loader; a second load is rejected
///
/// The loader is consumed as soon as a load starts, so a second attempt
/// after a failed first one is also refused with
/// [`SceneError::AlreadyLoaded`].
#[derive(Debug, Default)]
pub struct SceneLoader {
    loaded: bool,
}

impl SceneLoader {
    /// Loader that has not loaded anything yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a load has been attempted
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Load a file
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> SceneResult<SceneData> {
        self.begin()?;
        log::info!("Loading scene from {}", path.as_ref().display());
        SceneData::from_path(path)
    }

    /// Load an in-memory asset
    pub fn load_slice(&mut self, bytes: &[u8]) -> SceneResult<SceneData> {
        self.begin()?;
        SceneData::from_slice(bytes)
    }

    fn begin(&mut self) -> SceneResult<()> {
        if self.loaded {
            return Err(SceneError::AlreadyLoaded);
        }
        self.loaded = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Point3;
    use crate::scene::material::TextureSlot;
    use ash::vk;
    use approx::assert_relative_eq;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::{json, Value};

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn data_uri(mime: &str, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
    }

    fn png_2x1_rgb() -> Vec<u8> {
        let image = image::RgbImage::from_raw(2, 1, vec![255, 0, 0, 0, 255, 0]).unwrap();
        let mut bytes = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Two meshes of 21 vertices total under a root with a translated child
    fn two_mesh_asset() -> Value {
        // Mesh 0: three triangles (9 vertices), mesh 1: four triangles (12 vertices)
        let mut positions = Vec::new();
        for i in 0..21 {
            let x = i as f32;
            positions.extend_from_slice(&[x, (i % 3) as f32, 0.0]);
        }
        let buffer = f32_bytes(&positions);

        json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [
                { "mesh": 0, "children": [1] },
                { "mesh": 1, "translation": [1.0, 0.0, 0.0] }
            ],
            "meshes": [
                { "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] },
                { "primitives": [{ "attributes": { "POSITION": 1 }, "material": 0 }] }
            ],
            "materials": [{
                "pbrMetallicRoughness": {
                    "baseColorFactor": [1.0, 0.0, 0.0, 1.0],
                    "baseColorTexture": { "index": 0 }
                }
            }],
            "textures": [{ "source": 0, "sampler": 0 }],
            "samplers": [{ "magFilter": 9728, "wrapS": 33071 }],
            "images": [{ "uri": data_uri("image/png", &png_2x1_rgb()) }],
            "buffers": [{ "byteLength": buffer.len(), "uri": data_uri("application/octet-stream", &buffer) }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 9 * 12 },
                { "buffer": 0, "byteOffset": 9 * 12, "byteLength": 12 * 12 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 9, "type": "VEC3",
                  "min": [0.0, 0.0, 0.0], "max": [8.0, 2.0, 0.0] },
                { "bufferView": 1, "componentType": 5126, "count": 12, "type": "VEC3",
                  "min": [9.0, 0.0, 0.0], "max": [20.0, 2.0, 0.0] }
            ]
        })
    }

    /// One indexed triangle plus one unindexed triangle without a material
    fn mixed_index_asset(index_component_type: u32) -> Value {
        let positions = f32_bytes(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let indices: Vec<u8> = match index_component_type {
            5121 => vec![0, 1, 2, 0],
            _ => [0u16, 1, 2, 0].iter().flat_map(|i| i.to_le_bytes()).collect(),
        };
        let mut buffer = positions.clone();
        buffer.extend_from_slice(&indices);

        json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": [
                { "attributes": { "POSITION": 0 }, "indices": 1 },
                { "attributes": { "POSITION": 0 } }
            ]}],
            "buffers": [{ "byteLength": buffer.len(), "uri": data_uri("application/octet-stream", &buffer) }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": indices.len() }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                  "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
                { "bufferView": 1, "componentType": index_component_type, "count": 3, "type": "SCALAR" }
            ]
        })
    }

    fn load(asset: &Value) -> SceneResult<SceneData> {
        SceneData::from_slice(&serde_json::to_vec(asset).unwrap())
    }

    #[test]
    fn test_two_mesh_scene_flattens() {
        let scene = load(&two_mesh_asset()).unwrap();

        assert_eq!(scene.vertices.len(), 21);
        assert_eq!(scene.model_matrices.len(), 2);
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.textures.len(), 1);
        assert_eq!(scene.draw, DrawCall::Vertices { vertex_count: 21 });
        assert!(scene.indices.is_empty());

        assert!(scene.vertices[..9].iter().all(|v| v.model_mat_id == 0));
        assert!(scene.vertices[9..].iter().all(|v| v.model_mat_id == 1));
        assert!(scene.vertices.iter().all(|v| v.material_id == 0));

        let child_origin = scene.model_matrices[1].to_mat4().transform_point(&Point3::origin());
        assert_relative_eq!(child_origin.x, 1.0);
        assert_eq!(scene.graph.len(), 2);
        assert_eq!(scene.meshes[1].primitives[0].vertex_start, 9);
    }

    #[test]
    fn test_textures_follow_material_roles() {
        let scene = load(&two_mesh_asset()).unwrap();
        let texture = &scene.textures[0];

        assert_eq!(texture.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(texture.extent, vk::Extent2D { width: 2, height: 1 });
        assert_eq!(texture.pixels, vec![255, 0, 0, 255, 0, 255, 0, 255]);
        assert_eq!(texture.sampler.mag_filter, vk::Filter::NEAREST);
        assert_eq!(texture.sampler.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);

        let material = &scene.materials[0];
        assert_eq!(material.texture(TextureSlot::BaseColor).map(|t| t.texture), Some(0));
        assert_eq!(material.texture(TextureSlot::Normal), None);
    }

    #[test]
    fn test_mixed_primitives_share_one_indexed_draw() {
        let scene = load(&mixed_index_asset(5123)).unwrap();

        assert_eq!(scene.vertices.len(), 6);
        assert_eq!(scene.draw, DrawCall::Indexed { index_count: 6 });
        assert_eq!(scene.indices, vec![0, 1, 2, 3, 4, 5]);
        assert!(scene.vertices.iter().all(|v| v.material_id == -1));
        assert_eq!(scene.meshes[0].primitives[1].material, None);
        assert_eq!(scene.meshes[0].primitives[1].index_start, 3);
    }

    #[test]
    fn test_byte_indices_are_rejected() {
        assert!(matches!(
            load(&mixed_index_asset(5121)),
            Err(SceneError::UnsupportedIndexType { mesh: 0, primitive: 0 })
        ));
    }

    #[test]
    fn test_missing_position_is_reported() {
        let mut asset = mixed_index_asset(5123);
        asset["meshes"][0]["primitives"][0]["attributes"] = json!({ "NORMAL": 0 });
        assert!(matches!(
            load(&asset),
            Err(SceneError::MissingAttribute { attribute: "POSITION", .. })
        ));
    }

    #[test]
    fn test_too_many_materials() {
        let mut asset = mixed_index_asset(5123);
        asset["materials"] = Value::Array(vec![json!({}); MAX_MATERIAL_COUNT as usize + 1]);
        assert!(matches!(
            load(&asset),
            Err(SceneError::TooManyMaterials { count: 129, max: 128 })
        ));
    }

    #[test]
    fn test_points_only_mesh_takes_no_model_matrix() {
        let mut asset = mixed_index_asset(5123);
        asset["nodes"] = json!([{ "mesh": 1, "children": [1] }, { "mesh": 0 }]);
        asset["meshes"] = json!([
            { "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] },
            { "primitives": [{ "attributes": { "POSITION": 0 }, "mode": 0 }] }
        ]);
        let scene = load(&asset).unwrap();

        assert_eq!(scene.model_matrices.len(), 1);
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].source_mesh, 0);
        assert_eq!(scene.meshes[0].model_matrix, 0);
        assert_eq!(scene.graph.len(), 2);
        assert_eq!(scene.graph.get(NodeId(0)).unwrap().mesh_instance, None);
        assert_eq!(scene.graph.get(NodeId(1)).unwrap().mesh_instance, Some(0));
        assert_eq!(scene.vertices.len(), 3);
        assert!(scene.vertices.iter().all(|v| v.model_mat_id == 0));
    }

    #[test]
    fn test_failed_load_still_consumes_loader() {
        let good = serde_json::to_vec(&mixed_index_asset(5123)).unwrap();
        let bad = serde_json::to_vec(&mixed_index_asset(5121)).unwrap();
        let mut loader = SceneLoader::new();
        assert!(matches!(loader.load_slice(&bad), Err(SceneError::UnsupportedIndexType { .. })));
        assert!(loader.is_loaded());
        assert!(matches!(loader.load_slice(&good), Err(SceneError::AlreadyLoaded)));
    }

    #[test]
    fn test_loader_refuses_second_load() {
        let bytes = serde_json::to_vec(&mixed_index_asset(5123)).unwrap();
        let mut loader = SceneLoader::new();
        assert!(loader.load_slice(&bytes).is_ok());
        assert!(loader.is_loaded());
        assert!(matches!(loader.load_slice(&bytes), Err(SceneError::AlreadyLoaded)));
    }
}
