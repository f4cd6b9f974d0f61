//! GPU side of a loaded scene
//!
//! Uploads a [`SceneData`] once, before the render loop: textures, one
//! uniform buffer per material, the model-matrix storage buffer and the
//! vertex and index buffers. Owns the two descriptor set layouts the scene
//! pipeline is built against.

use ash::{vk, Device};

use super::draw::DrawCall;
use super::loader::SceneData;
use super::material::{
    material_layout_builder, material_writes, model_matrix_layout_builder, MaterialWrite, MATERIAL_UNIFORM_BINDING,
};
use super::SceneResult;
use crate::render::vulkan::rendering::ActiveRenderPass;
use crate::render::vulkan::resources::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetWriter, GpuAllocator, GpuBuffer, SharingPolicy,
    StagingUploader, Texture, TransferChannel,
};
use crate::render::vulkan::VulkanError;

/// Uploaded scene buffers, textures and descriptor sets
#[derive(Default)]
pub struct SceneResources {
    material_layout: Option<DescriptorSetLayout>,
    model_layout: Option<DescriptorSetLayout>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    textures: Vec<Texture>,
    material_buffers: Vec<GpuBuffer>,
    model_buffer: Option<GpuBuffer>,
    vertex_buffer: Option<GpuBuffer>,
    index_buffer: Option<GpuBuffer>,
    draw: Option<DrawCall>,
}

impl SceneResources {
    /// Upload `scene` and write its descriptor sets from `pool`
    ///
    /// On failure everything created so far is destroyed before the error is
    /// returned.
    pub fn upload<T: TransferChannel + ?Sized>(
        scene: &SceneData,
        allocator: &GpuAllocator,
        channel: &T,
        pool: &DescriptorPool,
    ) -> SceneResult<Self> {
        let mut resources = Self::default();
        match resources.upload_into(scene, allocator, channel, pool) {
            Ok(()) => Ok(resources),
            Err(e) => {
                resources.destroy(allocator.device(), pool);
                Err(e)
            }
        }
    }

    fn upload_into<T: TransferChannel + ?Sized>(
        &mut self,
        scene: &SceneData,
        allocator: &GpuAllocator,
        channel: &T,
        pool: &DescriptorPool,
    ) -> SceneResult<()> {
        let device = allocator.device();
        let uploader = StagingUploader::new(allocator, channel);

        let material_layout = self.material_layout.insert(material_layout_builder().build(device)?).handle();
        let model_layout = self.model_layout.insert(model_matrix_layout_builder().build(device)?).handle();
        self.descriptor_sets = pool.allocate_descriptor_sets(device, &[material_layout, model_layout])?;
        let (material_set, model_set) = match self.descriptor_sets[..] {
            [material_set, model_set] => (material_set, model_set),
            _ => {
                return Err(VulkanError::InvalidOperation {
                    reason: "descriptor pool returned the wrong number of sets".to_string(),
                }
                .into())
            }
        };

        for source in &scene.textures {
            let texture = Texture::upload(
                &uploader,
                device,
                &source.pixels,
                source.extent,
                source.format,
                source.sampler,
            )?;
            self.textures.push(texture);
        }

        for material in &scene.materials {
            let buffer = uploader.upload_buffer(
                bytemuck::bytes_of(&material.properties),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                &SharingPolicy::Exclusive,
            )?;
            self.material_buffers.extend(buffer);
        }

        self.model_buffer = uploader.upload_buffer(
            bytemuck::cast_slice(&scene.model_matrices),
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &SharingPolicy::graphics_and_compute(allocator.queue_families()),
        )?;
        self.vertex_buffer = uploader.upload_buffer(
            bytemuck::cast_slice(&scene.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &SharingPolicy::Exclusive,
        )?;
        self.index_buffer = uploader.upload_buffer(
            bytemuck::cast_slice(&scene.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
            &SharingPolicy::Exclusive,
        )?;

        let mut writer = DescriptorSetWriter::new();
        for write in material_writes(&scene.materials) {
            writer = match write {
                MaterialWrite::Uniform { material } => match self.material_buffers.get(material) {
                    Some(buffer) => writer.write_buffer(
                        material_set,
                        MATERIAL_UNIFORM_BINDING,
                        material as u32,
                        vk::DescriptorType::UNIFORM_BUFFER,
                        buffer.handle(),
                    ),
                    None => writer,
                },
                MaterialWrite::Texture { binding, material, texture } => match self.textures.get(texture) {
                    Some(texture) => writer.write_image(material_set, binding, material as u32, texture.descriptor_info()),
                    None => {
                        log::warn!("Material {} references missing texture {}", material, texture);
                        writer
                    }
                },
            };
        }
        if let Some(buffer) = &self.model_buffer {
            writer = writer.write_buffer(model_set, 0, 0, vk::DescriptorType::STORAGE_BUFFER, buffer.handle());
        }
        log::debug!("Writing {} scene descriptors", writer.len());
        writer.update(device);

        self.draw = Some(scene.draw);
        log::info!(
            "Scene uploaded: {} textures, {} material buffers, draw {:?}",
            self.textures.len(),
            self.material_buffers.len(),
            scene.draw
        );
        Ok(())
    }

    /// `[material layout, model-matrix layout]`, in pipeline set order
    pub fn set_layouts(&self) -> Vec<vk::DescriptorSetLayout> {
        self.material_layout
            .iter()
            .chain(self.model_layout.iter())
            .map(DescriptorSetLayout::handle)
            .collect()
    }

    /// Descriptor sets matching [`Self::set_layouts`]
    pub fn descriptor_sets(&self) -> &[vk::DescriptorSet] {
        &self.descriptor_sets
    }

    /// Number of uploaded textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// One uniform buffer per material
    pub fn material_buffer_count(&self) -> usize {
        self.material_buffers.len()
    }

    /// Byte size of the model-matrix storage buffer, 0 when nothing was placed
    pub fn model_buffer_size(&self) -> vk::DeviceSize {
        self.model_buffer.as_ref().map_or(0, GpuBuffer::size)
    }

    /// How the scene is drawn
    pub fn draw_call(&self) -> DrawCall {
        self.draw.unwrap_or(DrawCall::Empty)
    }

    /// Bind the scene and issue its single draw
    ///
    /// The pipeline must already be bound on `pass`.
    pub fn record_draw(&self, pass: &mut ActiveRenderPass<'_, '_>, layout: vk::PipelineLayout) {
        let Some(vertex_buffer) = &self.vertex_buffer else {
            return;
        };

        pass.bind_descriptor_sets(layout, &self.descriptor_sets);
        pass.bind_vertex_buffer(vertex_buffer.handle());

        match (self.draw_call(), &self.index_buffer) {
            (DrawCall::Indexed { index_count }, Some(index_buffer)) => {
                pass.bind_index_buffer(index_buffer.handle());
                pass.draw_indexed(index_count);
            }
            (DrawCall::Vertices { vertex_count }, _) => pass.draw(vertex_count),
            _ => {}
        }
    }

    /// Destroy every buffer, texture, set and layout
    pub fn destroy(&mut self, device: &Device, pool: &DescriptorPool) {
        for buffer in [self.index_buffer.take(), self.vertex_buffer.take(), self.model_buffer.take()]
            .into_iter()
            .flatten()
        {
            buffer.destroy(device);
        }
        for buffer in self.material_buffers.drain(..) {
            buffer.destroy(device);
        }
        for texture in self.textures.drain(..) {
            texture.destroy(device);
        }
        if !self.descriptor_sets.is_empty() {
            if let Err(e) = unsafe { device.free_descriptor_sets(pool.handle(), &self.descriptor_sets) } {
                log::warn!("Failed to free scene descriptor sets: {:?}", e);
            }
            self.descriptor_sets.clear();
        }
        for layout in [self.model_layout.take(), self.material_layout.take()].into_iter().flatten() {
            layout.destroy(device);
        }
        self.draw = None;
    }
}
