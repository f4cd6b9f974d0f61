//! Scene graphics pipeline
//!
//! One pipeline draws the whole scene. Its layout is
//! `[material set, model-matrix set]` plus the camera push constant range in
//! the vertex stage. Viewport and scissor are dynamic so swapchain recreation
//! only rebuilds the pipeline when the render pass itself was replaced.

use std::mem::size_of;

use ash::{vk, Device};

use super::shader::ShaderModule;
use crate::config::ShaderConfig;
use crate::render::primitives::CameraPushConstants;
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::scene::Vertex;

/// Push constant range carrying the camera block
pub fn camera_push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: size_of::<CameraPushConstants>() as u32,
    }
}

/// Pipeline and layout for the scene pass
pub struct ScenePipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl ScenePipeline {
    /// Build from SPIR-V files against the scene render pass
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        shaders: &ShaderConfig,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::from_file(device, &shaders.vertex_shader_path, vk::ShaderStageFlags::VERTEX)?;
        let fragment_shader =
            match ShaderModule::from_file(device, &shaders.fragment_shader_path, vk::ShaderStageFlags::FRAGMENT) {
                Ok(module) => module,
                Err(e) => {
                    vertex_shader.destroy(device);
                    return Err(e);
                }
            };

        let result = Self::build(device, render_pass, set_layouts, &vertex_shader, &fragment_shader);

        // Modules are only needed during pipeline creation
        fragment_shader.destroy(device);
        vertex_shader.destroy(device);

        result
    }

    fn build(
        device: &Device,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
    ) -> VulkanResult<Self> {
        let shader_stages = [vertex_shader.stage_info(), fragment_shader.stage_info()];

        let binding_descriptions = [Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the rectangles are set while recording
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();
        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let push_constant_ranges = [camera_push_constant_range()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(e));
            }
        };
        let Some(pipeline) = pipeline else {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(VulkanError::InitializationFailed("driver returned no pipeline".to_string()));
        };

        log::debug!("Scene pipeline created");
        Ok(Self { pipeline, layout })
    }

    /// Pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Destroy pipeline and layout
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_range_covers_push_block() {
        let range = camera_push_constant_range();
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 160);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }
}
