//! glTF scene loading and GPU upload
//!
//! [`SceneLoader`] turns an asset into flat CPU arrays ([`SceneData`]);
//! [`SceneResources`] uploads them and owns the resulting buffers, textures
//! and descriptor sets.

pub mod draw;
pub mod graph;
pub mod image_data;
pub mod loader;
pub mod material;
pub mod resources;
pub mod vertex;

use thiserror::Error;

use crate::render::vulkan::VulkanError;

pub use draw::{plan_scene_draw, DrawCall, Primitive};
pub use graph::{NodeGraph, NodeId, SceneNode};
pub use image_data::TextureSource;
pub use loader::{MeshInstance, SceneData, SceneLoader};
pub use material::{MaterialProperties, MaterialRecord, TextureSlot, MAX_MATERIAL_COUNT};
pub use resources::SceneResources;
pub use vertex::{ModelMatrix, Vertex};

/// Errors raised while loading or uploading a scene
#[derive(Error, Debug)]
pub enum SceneError {
    /// The asset could not be read or parsed
    #[error("Failed to import glTF asset: {0}")]
    Import(#[from] gltf::Error),

    /// A required vertex attribute is absent
    #[error("Mesh {mesh} primitive {primitive} has no {attribute} attribute")]
    MissingAttribute {
        /// Mesh index in the asset
        mesh: usize,
        /// Primitive index within the mesh
        primitive: usize,
        /// Attribute semantic
        attribute: &'static str,
    },

    /// Indices stored as something other than u16 or u32
    #[error("Mesh {mesh} primitive {primitive} uses 8-bit indices")]
    UnsupportedIndexType {
        /// Mesh index in the asset
        mesh: usize,
        /// Primitive index within the mesh
        primitive: usize,
    },

    /// Image pixels are neither RGB8 nor RGBA8
    #[error("Image {image} has unsupported pixel format {format:?}")]
    UnsupportedImageFormat {
        /// Image index in the asset
        image: usize,
        /// Decoded pixel layout
        format: gltf::image::Format,
    },

    /// More materials than the descriptor arrays hold
    #[error("Scene has {count} materials, at most {max} are supported")]
    TooManyMaterials {
        /// Materials in the asset
        count: usize,
        /// Descriptor array length
        max: usize,
    },

    /// The loader already produced a scene
    #[error("A scene has already been loaded")]
    AlreadyLoaded,

    /// The asset declares no scene to traverse
    #[error("Asset contains no scene")]
    NoScene,

    /// Upload failed
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
