//! Interleaved vertex and per-instance model matrix layouts

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;

/// One vertex of the flattened scene
///
/// `material_id` is -1 when the primitive has no material. `model_mat_id`
/// indexes the model-matrix storage buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Tangent xyz (handedness dropped)
    pub tangent: [f32; 3],
    /// First texture coordinate set
    pub uv0: [f32; 2],
    /// Second texture coordinate set
    pub uv1: [f32; 2],
    /// Index into the material arrays, or -1
    pub material_id: i32,
    /// Index into the model-matrix buffer
    pub model_mat_id: i32,
}

impl Vertex {
    /// Single interleaved binding at slot 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0..=6 in field order
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 7] {
        let attribute = |location: u32, format: vk::Format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, tangent)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv0)),
            attribute(4, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv1)),
            attribute(5, vk::Format::R32_SINT, offset_of!(Self, material_id)),
            attribute(6, vk::Format::R32_SINT, offset_of!(Self, model_mat_id)),
        ]
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0; 3],
            tangent: [0.0; 3],
            uv0: [0.0; 2],
            uv1: [0.0; 2],
            material_id: -1,
            model_mat_id: 0,
        }
    }
}

/// Global transform of one mesh instance, as stored in the storage buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelMatrix {
    /// Column-major 4x4 matrix
    pub model: [[f32; 4]; 4],
}

impl From<Mat4> for ModelMatrix {
    fn from(matrix: Mat4) -> Self {
        Self { model: matrix.into() }
    }
}

impl ModelMatrix {
    /// Back to a matrix
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from(self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 60);
        assert_eq!(Vertex::binding_description().stride, 60);

        let offsets: Vec<u32> = Vertex::attribute_descriptions().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36, 44, 52, 56]);

        let locations: Vec<u32> = Vertex::attribute_descriptions().iter().map(|a| a.location).collect();
        assert_eq!(locations, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_model_matrix_is_column_major() {
        let matrix = Mat4::new_translation(&crate::foundation::math::Vec3::new(1.0, 2.0, 3.0));
        let stored = ModelMatrix::from(matrix);
        assert_eq!(size_of::<ModelMatrix>(), 64);
        assert_eq!(stored.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(stored.to_mat4(), matrix);
    }
}
