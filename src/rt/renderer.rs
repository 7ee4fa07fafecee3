// Renderer - owns the whole Vulkan side of the ray-tracing demo
//
/// Construction runs the full setup sequence: device, surface and
// swapchain, scene upload and acceleration structure builds, output
// image, camera uniform, descriptors, pipeline, then one statically
// recorded command buffer per swapchain image. After that a frame is
// just acquire, submit, present.

use crate::backend::{BufferResource, FrameSync, ImageResource, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::rt::acceleration::{build_scene, SceneAccel};
use crate::rt::camera::build_camera_uniform;
use crate::rt::descriptors::{DescriptorRegistry, DescriptorResources};
use crate::rt::pipeline::RayTracingPipeline;
use crate::scene::demo_scene;
use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::path::Path;
use std::sync::Arc;
use winit::window::Window;

struct SurfaceHolder {
    surface: vk::SurfaceKHR,
    loader: ash::extensions::khr::Surface,
}

impl Drop for SurfaceHolder {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

pub struct Renderer {
    // field order is teardown order
    pipeline: RayTracingPipeline,
    descriptors: DescriptorResources,
    // referenced by descriptor sets and the TLAS, so kept alive here
    #[allow(dead_code)]
    camera_buffer: BufferResource,
    output_image: ImageResource,
    #[allow(dead_code)]
    scene: SceneAccel,
    sync: FrameSync,
    swapchain: Swapchain,
    surface: SurfaceHolder,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    device: Arc<VulkanDevice>,
    frame_timeout_ns: u64,
}

impl Renderer {
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(&config.window.title, enable_validation, display_handle)?;

        let surface = unsafe {
            ash_window::create_surface(
                &device.entry,
                &device.instance,
                display_handle,
                window_handle,
                None,
            )
            .context("Failed to create window surface")?
        };
        let surface_loader = ash::extensions::khr::Surface::new(&device.entry, &device.instance);
        let surface = SurfaceHolder {
            surface,
            loader: surface_loader,
        };

        let present_supported = unsafe {
            surface.loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                surface.surface,
            )?
        };
        anyhow::ensure!(
            present_supported,
            "Graphics queue family cannot present to the window surface"
        );

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            device.clone(),
            surface.surface,
            &surface.loader,
            size.width,
            size.height,
            config.get_present_mode(),
        )?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family);
        let command_pool = unsafe {
            device
                .device
                .create_command_pool(&pool_info, None)
                .context("Failed to create command pool")?
        };

        let scene = build_scene(&device, &demo_scene(), command_pool)?;

        let output_image =
            ImageResource::storage_target(device.clone(), swapchain.format, swapchain.extent)?;

        let camera = build_camera_uniform(&config.camera, 0.0);
        let camera_buffer = BufferResource::with_data(
            device.clone(),
            "camera uniform",
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::RAY_TRACING_NV,
            &[camera],
        )?;

        // set 0: scene-wide resources; sets 1..=3: per-mesh material,
        // attribute and face buffers as runtime-sized arrays
        let mut registry = DescriptorRegistry::new();
        registry.add_acceleration_structure(0, scene.tlas.accel);
        registry.add_storage_image(1, output_image.view);
        registry.add_uniform_buffer(
            2,
            vk::ShaderStageFlags::RAYGEN_NV,
            camera_buffer.buffer,
            camera_buffer.size,
        );
        registry.add_storage_buffer_array(
            0,
            scene
                .meshes
                .iter()
                .map(|m| (m.material.buffer, m.material.size))
                .collect(),
        );
        registry.add_storage_buffer_array(
            0,
            scene
                .meshes
                .iter()
                .map(|m| (m.attribute.buffer, m.attribute.size))
                .collect(),
        );
        registry.add_storage_buffer_array(
            0,
            scene
                .meshes
                .iter()
                .map(|m| (m.face.buffer, m.face.size))
                .collect(),
        );

        let descriptors = registry.build(device.clone(), device.supports_descriptor_indexing)?;

        let pipeline = RayTracingPipeline::new(
            device.clone(),
            Path::new(&config.shaders.dir),
            &descriptors.set_layouts,
        )?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(swapchain.images.len() as u32);
        let command_buffers = unsafe {
            device
                .device
                .allocate_command_buffers(&alloc_info)
                .context("Failed to allocate frame command buffers")?
        };

        let sync = FrameSync::new(device.clone(), swapchain.images.len())?;

        let renderer = Self {
            pipeline,
            descriptors,
            camera_buffer,
            output_image,
            scene,
            sync,
            swapchain,
            surface,
            command_pool,
            command_buffers,
            device,
            frame_timeout_ns: config.frame_timeout_ns(),
        };

        renderer.record_commands()?;

        log::info!("Renderer ready");
        Ok(renderer)
    }

    /// Record the per-image command buffers once. The frame loop only
    /// resubmits them, nothing in the scene changes at runtime.
    fn record_commands(&self) -> Result<()> {
        let extent = self.swapchain.extent;
        let sbt = &self.pipeline.sbt;
        let sbt_buffer = self.pipeline.sbt_buffer.buffer;

        for (i, &command_buffer) in self.command_buffers.iter().enumerate() {
            let present_image = self.swapchain.images[i];
            let begin_info = vk::CommandBufferBeginInfo::builder();

            unsafe {
                self.device
                    .device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .context("Failed to begin frame command buffer")?;

                // trace into the storage image
                self.record_image_barrier(
                    command_buffer,
                    self.output_image.image,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::SHADER_WRITE,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::GENERAL,
                );

                self.device.device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::RAY_TRACING_NV,
                    self.pipeline.pipeline,
                );
                self.device.device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::RAY_TRACING_NV,
                    self.pipeline.layout,
                    0,
                    &self.descriptors.sets,
                    &[],
                );
                self.device.ray_tracing.cmd_trace_rays(
                    command_buffer,
                    sbt_buffer,
                    sbt.raygen_offset(),
                    sbt_buffer,
                    sbt.miss_offset(),
                    sbt.stride(),
                    sbt_buffer,
                    sbt.hit_offset(),
                    sbt.stride(),
                    vk::Buffer::null(),
                    0,
                    0,
                    extent.width,
                    extent.height,
                    1,
                );

                // copy the traced image into the swapchain image
                self.record_image_barrier(
                    command_buffer,
                    present_image,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                );
                self.record_image_barrier(
                    command_buffer,
                    self.output_image.image,
                    vk::AccessFlags::SHADER_WRITE,
                    vk::AccessFlags::TRANSFER_READ,
                    vk::ImageLayout::GENERAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                );

                let region = vk::ImageCopy::builder()
                    .src_subresource(
                        vk::ImageSubresourceLayers::builder()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .layer_count(1)
                            .build(),
                    )
                    .dst_subresource(
                        vk::ImageSubresourceLayers::builder()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .layer_count(1)
                            .build(),
                    )
                    .extent(vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    })
                    .build();
                self.device.device.cmd_copy_image(
                    command_buffer,
                    self.output_image.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    present_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );

                self.record_image_barrier(
                    command_buffer,
                    present_image,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::empty(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );

                self.device
                    .device
                    .end_command_buffer(command_buffer)
                    .context("Failed to end frame command buffer")?;
            }
        }
        Ok(())
    }

    fn record_image_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build();

        unsafe {
            self.device.device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Acquire, submit the prerecorded commands, present. Every wait
    /// uses the configured timeout; expiry is an error the caller
    /// treats as fatal.
    pub fn draw_frame(&mut self) -> Result<()> {
        let image_index = self
            .swapchain
            .acquire_next_image(self.frame_timeout_ns, self.sync.image_available)?;

        self.sync.wait_and_reset(image_index, self.frame_timeout_ns)?;

        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[image_index as usize]];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    self.sync.fence(image_index),
                )
                .context("Failed to submit frame")?;
        }

        self.swapchain.present(
            self.device.graphics_queue,
            image_index,
            &signal_semaphores,
        )?;

        Ok(())
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        unsafe {
            self.device
                .device
                .destroy_command_pool(self.command_pool, None);
        }
        // remaining resources tear down in field order
    }
}
