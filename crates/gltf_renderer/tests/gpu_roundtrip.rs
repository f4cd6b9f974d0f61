//! Device-backed tests; run with `cargo test -- --ignored` on a machine with
//! a Vulkan 1.2 driver.

use std::cell::Cell;

use ash::{vk, Device};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gltf_renderer::config::VulkanRendererConfig;
use gltf_renderer::render::vulkan::renderer::scene_pool_sizes;
use gltf_renderer::render::vulkan::resources::{
    select_memory_type, DescriptorPool, GpuAllocator, OneShotTransfer, SharingPolicy, StagingUploader,
    TransferChannel,
};
use gltf_renderer::render::vulkan::{VulkanContext, VulkanResult};
use gltf_renderer::scene::{DrawCall, SceneData, SceneResources};
use serde_json::json;

fn headless() -> VulkanContext {
    let config = VulkanRendererConfig::new("gpu-roundtrip").with_validation(false);
    VulkanContext::headless(&config).expect("headless Vulkan context")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Forwards to a real channel and counts submissions
struct CountingChannel<'a> {
    inner: &'a OneShotTransfer,
    submissions: Cell<usize>,
}

impl TransferChannel for CountingChannel<'_> {
    fn submit_one_shot(&self, record: &mut dyn FnMut(&Device, vk::CommandBuffer)) -> VulkanResult<()> {
        self.submissions.set(self.submissions.get() + 1);
        self.inner.submit_one_shot(record)
    }
}

/// Two root meshes of 9 and 12 vertices sharing one material; with
/// `indexed` the second mesh carries u16 indices
fn two_mesh_scene(indexed: bool) -> SceneData {
    let mut buffer: Vec<u8> = (0..21)
        .flat_map(|i| [i as f32, (i % 3) as f32, 0.0])
        .flat_map(f32::to_le_bytes)
        .collect();
    let index_offset = buffer.len();
    buffer.extend((0u16..12).flat_map(u16::to_le_bytes));

    let mut second = json!({ "attributes": { "POSITION": 1 }, "material": 0 });
    if indexed {
        second["indices"] = json!(2);
    }

    let asset = json!({
        "asset": { "version": "2.0" },
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [{ "mesh": 0 }, { "mesh": 1, "translation": [0.0, 2.0, 0.0] }],
        "meshes": [
            { "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] },
            { "primitives": [second] }
        ],
        "materials": [{ "pbrMetallicRoughness": { "baseColorFactor": [0.2, 0.4, 0.6, 1.0] } }],
        "buffers": [{
            "byteLength": buffer.len(),
            "uri": format!("data:application/octet-stream;base64,{}", STANDARD.encode(&buffer))
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 9 * 12 },
            { "buffer": 0, "byteOffset": 9 * 12, "byteLength": 12 * 12 },
            { "buffer": 0, "byteOffset": index_offset, "byteLength": 12 * 2 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 9, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [8.0, 2.0, 0.0] },
            { "bufferView": 1, "componentType": 5126, "count": 12, "type": "VEC3",
              "min": [9.0, 0.0, 0.0], "max": [20.0, 2.0, 0.0] },
            { "bufferView": 2, "componentType": 5123, "count": 12, "type": "SCALAR" }
        ]
    });
    SceneData::from_slice(&serde_json::to_vec(&asset).expect("serialize asset")).expect("load two-mesh scene")
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn staging_roundtrip_preserves_bytes() {
    let context = headless();
    let allocator = GpuAllocator::new(&context);
    let transfer = OneShotTransfer::new(&context);
    let uploader = StagingUploader::new(&allocator, &transfer);

    for len in [0usize, 64, 4096, 1 << 20] {
        let bytes = pattern(len);
        let buffer = uploader
            .upload_buffer(&bytes, vk::BufferUsageFlags::TRANSFER_SRC, &SharingPolicy::Exclusive)
            .expect("upload");

        match buffer {
            None => assert_eq!(len, 0),
            Some(buffer) => {
                assert_eq!(buffer.size(), len as vk::DeviceSize);
                let read = uploader.read_back(&buffer).expect("read back");
                buffer.destroy(context.device());
                assert_eq!(read, bytes, "round trip of {} bytes", len);
            }
        }
    }
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn selected_memory_types_carry_requested_flags() {
    let context = headless();
    let properties = *context.memory_properties();
    let allocator = GpuAllocator::new(&context);

    let buffer = allocator
        .create_buffer(
            256,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &SharingPolicy::Exclusive,
        )
        .expect("host-visible buffer");
    let requirements = unsafe { context.device().get_buffer_memory_requirements(buffer.handle()) };
    buffer.destroy(context.device());

    for flags in [
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    ] {
        if let Ok(index) = select_memory_type(&properties, requirements.memory_type_bits, flags) {
            assert!(requirements.memory_type_bits & (1 << index) != 0);
            assert!(properties.memory_types[index as usize].property_flags.contains(flags));
        }
    }
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn graphics_and_compute_sharing_matches_families() {
    let context = headless();
    let families = context.queue_families();
    let policy = SharingPolicy::graphics_and_compute(families);

    if families.graphics == families.compute {
        assert_eq!(policy, SharingPolicy::Exclusive);
    } else {
        assert_eq!(policy.family_indices(), &[families.graphics, families.compute]);
    }
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn empty_upload_submits_nothing() {
    let context = headless();
    let allocator = GpuAllocator::new(&context);
    let transfer = OneShotTransfer::new(&context);
    let channel = CountingChannel { inner: &transfer, submissions: Cell::new(0) };
    let uploader = StagingUploader::new(&allocator, &channel);

    let buffer = uploader
        .upload_buffer(&[], vk::BufferUsageFlags::VERTEX_BUFFER, &SharingPolicy::Exclusive)
        .expect("empty upload");
    assert!(buffer.is_none());
    assert_eq!(channel.submissions.get(), 0);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn image_upload_is_a_single_submission() {
    let context = headless();
    let allocator = GpuAllocator::new(&context);
    let transfer = OneShotTransfer::new(&context);
    let channel = CountingChannel { inner: &transfer, submissions: Cell::new(0) };
    let uploader = StagingUploader::new(&allocator, &channel);

    let extent = vk::Extent2D { width: 4, height: 2 };
    let pixels = pattern(4 * 2 * 4);
    let image = uploader
        .upload_image(&pixels, extent, vk::Format::R8G8B8A8_UNORM)
        .expect("image upload");

    assert_eq!(channel.submissions.get(), 1);
    assert_eq!(image.extent(), extent);
    assert_eq!(image.format(), vk::Format::R8G8B8A8_UNORM);
    image.destroy(context.device());

    assert!(uploader
        .upload_image(&[], vk::Extent2D { width: 0, height: 0 }, vk::Format::R8G8B8A8_UNORM)
        .is_err());
    assert_eq!(channel.submissions.get(), 1);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn scene_upload_creates_one_buffer_per_material_and_matrix() {
    let context = headless();
    let allocator = GpuAllocator::new(&context);
    let transfer = OneShotTransfer::new(&context);
    let pool = DescriptorPool::new(context.device(), scene_pool_sizes(0)).expect("descriptor pool");

    for (indexed, expected_draw) in [
        (false, DrawCall::Vertices { vertex_count: 21 }),
        (true, DrawCall::Indexed { index_count: 21 }),
    ] {
        let scene = two_mesh_scene(indexed);
        assert_eq!(scene.draw, expected_draw);

        let mut resources = SceneResources::upload(&scene, &allocator, &transfer, &pool).expect("scene upload");
        assert_eq!(resources.texture_count(), 0);
        assert_eq!(resources.material_buffer_count(), 1);
        assert_eq!(resources.model_buffer_size(), 2 * 64);
        assert_eq!(resources.draw_call(), expected_draw);
        assert_eq!(resources.set_layouts().len(), 2);
        assert_eq!(resources.descriptor_sets().len(), 2);

        resources.destroy(context.device(), &pool);
        assert_eq!(resources.material_buffer_count(), 0);
        assert_eq!(resources.model_buffer_size(), 0);
        assert_eq!(resources.draw_call(), DrawCall::Empty);
        assert!(resources.descriptor_sets().is_empty());
        assert!(resources.set_layouts().is_empty());
    }

    pool.destroy(context.device());
}
