// Buffer and image resources
//
// Thin owners around vk::Buffer / vk::Image with their gpu-allocator
// allocation. Everything here is created once at start-up and freed on drop.

use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// GPU buffer plus the allocation backing it
pub struct BufferResource {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl BufferResource {
    pub fn new(
        device: Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .device
                .create_buffer(&buffer_info, None)
                .context("Failed to create buffer")?
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .context("Failed to bind buffer memory")?;
        }

        Ok(Self {
            buffer,
            size,
            allocation: Some(allocation),
            device,
        })
    }

    /// Create a host-visible buffer and fill it with `data`
    pub fn with_data<T: Copy>(
        device: Arc<VulkanDevice>,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        let mut buffer = Self::new(device, name, size, usage, MemoryLocation::CpuToGpu)?;
        buffer.store(data)?;
        Ok(buffer)
    }

    /// Write `data` into the mapped allocation. Only valid for
    /// host-visible locations; device-local buffers have no mapping.
    pub fn store<T: Copy>(&mut self, data: &[T]) -> Result<()> {
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        };

        let allocation = self
            .allocation
            .as_mut()
            .context("Buffer allocation already freed")?;
        let mapped = allocation
            .mapped_slice_mut()
            .context("Buffer memory is not host-visible")?;

        anyhow::ensure!(
            bytes.len() <= mapped.len(),
            "Write of {} bytes exceeds buffer of {} bytes",
            bytes.len(),
            mapped.len()
        );
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for BufferResource {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let _ = self.device.allocator().free(allocation);
        }
    }
}

/// GPU image plus view, used for the ray tracer's output target
pub struct ImageResource {
    pub image: vk::Image,
    pub view: vk::ImageView,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl ImageResource {
    /// Device-local 2D storage image the ray-generation shader writes to
    pub fn storage_target(
        device: Arc<VulkanDevice>,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            device
                .device
                .create_image(&image_info, None)
                .context("Failed to create storage image")?
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name: "rt output image",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .context("Failed to bind storage image memory")?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .device
                .create_image_view(&view_info, None)
                .context("Failed to create storage image view")?
        };

        Ok(Self {
            image,
            view,
            allocation: Some(allocation),
            device,
        })
    }
}

impl Drop for ImageResource {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let _ = self.device.allocator().free(allocation);
        }
    }
}
