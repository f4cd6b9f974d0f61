//! Materials and the shared material descriptor table
//!
//! All materials share one descriptor set. Binding 0 is an array of uniform
//! buffers and bindings 1..=5 are arrays of combined image samplers, one per
//! texture role; material `i` occupies array element `i` of every binding.
//! The bindings are partially bound, so a role without a texture simply
//! leaves its element unwritten.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::render::vulkan::resources::DescriptorSetLayoutBuilder;

/// Array length of every material binding
pub const MAX_MATERIAL_COUNT: u32 = 128;

/// Binding of the material uniform buffer array
pub const MATERIAL_UNIFORM_BINDING: u32 = 0;

/// Texture roles, each with its own sampler binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    /// Base color (sRGB)
    BaseColor,
    /// Metallic in B, roughness in G
    MetallicRoughness,
    /// Tangent-space normal
    Normal,
    /// Ambient occlusion in R
    Occlusion,
    /// Emissive color (sRGB)
    Emissive,
}

impl TextureSlot {
    /// All roles in binding order
    pub const ALL: [Self; 5] = [
        Self::BaseColor,
        Self::MetallicRoughness,
        Self::Normal,
        Self::Occlusion,
        Self::Emissive,
    ];

    /// Descriptor binding of this role
    pub fn binding(self) -> u32 {
        match self {
            Self::BaseColor => 1,
            Self::MetallicRoughness => 2,
            Self::Normal => 3,
            Self::Occlusion => 4,
            Self::Emissive => 5,
        }
    }

    /// Whether textures in this role hold color and are sampled as sRGB
    pub fn is_color(self) -> bool {
        matches!(self, Self::BaseColor | Self::Emissive)
    }

    fn position(self) -> usize {
        self.binding() as usize - 1
    }
}

/// Per-material uniform block
///
/// std140-compatible: `vec4, float x4, vec3, int x5`. Texture-coordinate
/// selectors are -1 when the role has no texture.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialProperties {
    /// Base color factor (linear RGBA)
    pub base_color_factor: [f32; 4],
    /// Metallic factor
    pub metallic_factor: f32,
    /// Roughness factor
    pub roughness_factor: f32,
    /// Normal map scale
    pub normal_scale: f32,
    /// Occlusion strength
    pub occlusion_strength: f32,
    /// Emissive factor
    pub emissive_factor: [f32; 3],
    /// UV set for base color, or -1
    pub tex_coord_base_color: i32,
    /// UV set for metallic-roughness, or -1
    pub tex_coord_metallic_roughness: i32,
    /// UV set for normal, or -1
    pub tex_coord_normal: i32,
    /// UV set for occlusion, or -1
    pub tex_coord_occlusion: i32,
    /// UV set for emissive, or -1
    pub tex_coord_emissive: i32,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            emissive_factor: [0.0; 3],
            tex_coord_base_color: -1,
            tex_coord_metallic_roughness: -1,
            tex_coord_normal: -1,
            tex_coord_occlusion: -1,
            tex_coord_emissive: -1,
        }
    }
}

impl MaterialProperties {
    fn set_tex_coord(&mut self, slot: TextureSlot, tex_coord: i32) {
        let field = match slot {
            TextureSlot::BaseColor => &mut self.tex_coord_base_color,
            TextureSlot::MetallicRoughness => &mut self.tex_coord_metallic_roughness,
            TextureSlot::Normal => &mut self.tex_coord_normal,
            TextureSlot::Occlusion => &mut self.tex_coord_occlusion,
            TextureSlot::Emissive => &mut self.tex_coord_emissive,
        };
        *field = tex_coord;
    }
}

/// A material's reference to a scene texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRef {
    /// Index into the scene's texture list
    pub texture: usize,
    /// UV set the shader samples with
    pub tex_coord: u32,
}

/// One material: uniform contents plus texture references per role
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    /// Array element in every material binding
    pub index: usize,
    /// Uniform buffer contents
    pub properties: MaterialProperties,
    textures: [Option<TextureRef>; 5],
}

impl MaterialRecord {
    /// Material with default factors and no textures
    pub fn new(index: usize) -> Self {
        Self {
            index,
            properties: MaterialProperties::default(),
            textures: [None; 5],
        }
    }

    /// Build from a glTF material
    pub fn from_gltf(material: &gltf::Material<'_>, index: usize) -> Self {
        let pbr = material.pbr_metallic_roughness();
        let mut record = Self::new(index);

        record.properties.base_color_factor = pbr.base_color_factor();
        record.properties.metallic_factor = pbr.metallic_factor();
        record.properties.roughness_factor = pbr.roughness_factor();
        record.properties.emissive_factor = material.emissive_factor();

        if let Some(info) = pbr.base_color_texture() {
            record.set_texture(TextureSlot::BaseColor, info.texture().index(), info.tex_coord());
        }
        if let Some(info) = pbr.metallic_roughness_texture() {
            record.set_texture(TextureSlot::MetallicRoughness, info.texture().index(), info.tex_coord());
        }
        if let Some(normal) = material.normal_texture() {
            record.properties.normal_scale = normal.scale();
            record.set_texture(TextureSlot::Normal, normal.texture().index(), normal.tex_coord());
        }
        if let Some(occlusion) = material.occlusion_texture() {
            record.properties.occlusion_strength = occlusion.strength();
            record.set_texture(TextureSlot::Occlusion, occlusion.texture().index(), occlusion.tex_coord());
        }
        if let Some(info) = material.emissive_texture() {
            record.set_texture(TextureSlot::Emissive, info.texture().index(), info.tex_coord());
        }

        record
    }

    /// Assign a texture to a role and record its UV set in the uniform block
    pub fn set_texture(&mut self, slot: TextureSlot, texture: usize, tex_coord: u32) {
        self.textures[slot.position()] = Some(TextureRef { texture, tex_coord });
        self.properties.set_tex_coord(slot, tex_coord as i32);
    }

    /// Texture for a role, if any
    pub fn texture(&self, slot: TextureSlot) -> Option<TextureRef> {
        self.textures[slot.position()]
    }

    /// Roles that have a texture, in binding order
    pub fn bound_textures(&self) -> impl Iterator<Item = (TextureSlot, TextureRef)> + '_ {
        TextureSlot::ALL
            .into_iter()
            .filter_map(|slot| self.texture(slot).map(|texture| (slot, texture)))
    }
}

/// One descriptor write the material table needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialWrite {
    /// Uniform buffer of material `material` at binding 0
    Uniform {
        /// Material (and array element) index
        material: usize,
    },
    /// Texture `texture` into `binding` at element `material`
    Texture {
        /// Sampler binding
        binding: u32,
        /// Material (and array element) index
        material: usize,
        /// Scene texture index
        texture: usize,
    },
}

/// Every write the material table needs; absent textures produce none
pub fn material_writes(materials: &[MaterialRecord]) -> Vec<MaterialWrite> {
    let mut writes = Vec::new();
    for material in materials {
        writes.push(MaterialWrite::Uniform { material: material.index });
        writes.extend(material.bound_textures().map(|(slot, texture)| MaterialWrite::Texture {
            binding: slot.binding(),
            material: material.index,
            texture: texture.texture,
        }));
    }
    writes
}

/// Layout of the material table: binding 0 uniforms, 1..=5 samplers
pub fn material_layout_builder() -> DescriptorSetLayoutBuilder {
    TextureSlot::ALL.into_iter().fold(
        DescriptorSetLayoutBuilder::new().add_partial_uniform_buffer_array(
            MATERIAL_UNIFORM_BINDING,
            MAX_MATERIAL_COUNT,
            vk::ShaderStageFlags::FRAGMENT,
        ),
        |builder, slot| {
            builder.add_partial_combined_image_sampler_array(
                slot.binding(),
                MAX_MATERIAL_COUNT,
                vk::ShaderStageFlags::FRAGMENT,
            )
        },
    )
}

/// Layout of the model-matrix set: one storage buffer for the vertex stage
pub fn model_matrix_layout_builder() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_storage_buffer(0, vk::ShaderStageFlags::VERTEX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_layout() {
        assert_eq!(std::mem::size_of::<MaterialProperties>(), 64);
        assert_eq!(std::mem::offset_of!(MaterialProperties, emissive_factor), 32);
        assert_eq!(std::mem::offset_of!(MaterialProperties, tex_coord_base_color), 44);
    }

    #[test]
    fn test_material_table_is_partially_bound() {
        let builder = material_layout_builder();
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 6);
        for (i, binding) in bindings.iter().enumerate() {
            assert_eq!(binding.binding, i as u32);
            assert_eq!(binding.descriptor_count, MAX_MATERIAL_COUNT);
            assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
        }
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert!(bindings[1..]
            .iter()
            .all(|b| b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
        assert!(builder
            .binding_flags()
            .iter()
            .all(|flags| flags.contains(vk::DescriptorBindingFlags::PARTIALLY_BOUND)));
    }

    #[test]
    fn test_absent_textures_are_not_written() {
        let mut plain = MaterialRecord::new(0);
        plain.properties.base_color_factor = [1.0, 0.0, 0.0, 1.0];
        let mut textured = MaterialRecord::new(1);
        textured.set_texture(TextureSlot::BaseColor, 0, 0);
        textured.set_texture(TextureSlot::Emissive, 2, 1);

        let writes = material_writes(&[plain, textured.clone()]);
        assert_eq!(
            writes,
            vec![
                MaterialWrite::Uniform { material: 0 },
                MaterialWrite::Uniform { material: 1 },
                MaterialWrite::Texture { binding: 1, material: 1, texture: 0 },
                MaterialWrite::Texture { binding: 5, material: 1, texture: 2 },
            ]
        );

        assert_eq!(textured.properties.tex_coord_base_color, 0);
        assert_eq!(textured.properties.tex_coord_emissive, 1);
        assert_eq!(textured.properties.tex_coord_normal, -1);
    }

    #[test]
    fn test_model_matrix_layout() {
        let builder = model_matrix_layout_builder();
        assert_eq!(builder.bindings().len(), 1);
        assert_eq!(builder.bindings()[0].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(builder.bindings()[0].stage_flags, vk::ShaderStageFlags::VERTEX);
    }
}
