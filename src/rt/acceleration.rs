// Acceleration structures
//
// One BLAS per mesh, one TLAS over the instances. Structure memory
// comes from the device allocator and is bound through the NV
// extension entry points. All builds are recorded into a single
// one-time command buffer sharing one scratch buffer sized for the
// largest build.

use crate::backend::{BufferResource, VulkanDevice};
use crate::rt::instance::GeometryInstance;
use crate::scene::MeshData;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Device buffers for one mesh: the geometry inputs for the BLAS build
/// plus the storage payloads the hit shader reads.
pub struct MeshBuffers {
    pub vertex: BufferResource,
    pub index: BufferResource,
    pub vertex_count: u32,
    pub index_count: u32,
    pub material: BufferResource,
    pub attribute: BufferResource,
    pub face: BufferResource,
    pub transform: [f32; 12],
}

pub fn upload_mesh(device: &Arc<VulkanDevice>, mesh: &MeshData) -> Result<MeshBuffers> {
    let rt_usage = vk::BufferUsageFlags::RAY_TRACING_NV;

    let vertex = BufferResource::with_data(
        device.clone(),
        "vertices",
        vk::BufferUsageFlags::VERTEX_BUFFER | rt_usage,
        &mesh.vertices,
    )?;
    let index = BufferResource::with_data(
        device.clone(),
        "indices",
        vk::BufferUsageFlags::INDEX_BUFFER | rt_usage,
        &mesh.indices,
    )?;
    let material = BufferResource::with_data(
        device.clone(),
        "materials",
        vk::BufferUsageFlags::STORAGE_BUFFER | rt_usage,
        &mesh.material_ids,
    )?;
    let attribute = BufferResource::with_data(
        device.clone(),
        "attributes",
        vk::BufferUsageFlags::STORAGE_BUFFER | rt_usage,
        &mesh.attribute_data(),
    )?;
    let face = BufferResource::with_data(
        device.clone(),
        "faces",
        vk::BufferUsageFlags::STORAGE_BUFFER | rt_usage,
        &mesh.face_data(),
    )?;

    Ok(MeshBuffers {
        vertex,
        index,
        vertex_count: (mesh.vertices.len() / 3) as u32,
        index_count: mesh.indices.len() as u32,
        material,
        attribute,
        face,
        transform: mesh.transform,
    })
}

impl MeshBuffers {
    /// Triangle geometry description consumed by the BLAS build.
    pub fn geometry(&self) -> vk::GeometryNV {
        vk::GeometryNV::builder()
            .geometry_type(vk::GeometryTypeNV::TRIANGLES)
            .geometry(
                vk::GeometryDataNV::builder()
                    .triangles(
                        vk::GeometryTrianglesNV::builder()
                            .vertex_data(self.vertex.buffer)
                            .vertex_offset(0)
                            .vertex_count(self.vertex_count)
                            .vertex_stride(3 * std::mem::size_of::<f32>() as u64)
                            .vertex_format(vk::Format::R32G32B32_SFLOAT)
                            .index_data(self.index.buffer)
                            .index_offset(0)
                            .index_count(self.index_count)
                            .index_type(vk::IndexType::UINT16)
                            .build(),
                    )
                    .build(),
            )
            .flags(vk::GeometryFlagsNV::OPAQUE)
            .build()
    }
}

enum AccelKind {
    Bottom { geometries: Vec<vk::GeometryNV> },
    Top { instance_count: u32 },
}

pub struct AccelerationStructure {
    pub accel: vk::AccelerationStructureNV,
    /// Opaque 64-bit handle referenced from instance records.
    pub gpu_handle: u64,
    kind: AccelKind,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl AccelerationStructure {
    pub fn bottom(device: &Arc<VulkanDevice>, geometries: Vec<vk::GeometryNV>) -> Result<Self> {
        let info = vk::AccelerationStructureInfoNV::builder()
            .ty(vk::AccelerationStructureTypeNV::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsNV::PREFER_FAST_TRACE)
            .geometries(&geometries)
            .build();
        Self::create(device, info, AccelKind::Bottom { geometries })
    }

    pub fn top(device: &Arc<VulkanDevice>, instance_count: u32) -> Result<Self> {
        let info = vk::AccelerationStructureInfoNV::builder()
            .ty(vk::AccelerationStructureTypeNV::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsNV::PREFER_FAST_TRACE)
            .instance_count(instance_count)
            .build();
        Self::create(device, info, AccelKind::Top { instance_count })
    }

    fn create(
        device: &Arc<VulkanDevice>,
        info: vk::AccelerationStructureInfoNV,
        kind: AccelKind,
    ) -> Result<Self> {
        let create_info = vk::AccelerationStructureCreateInfoNV::builder()
            .compacted_size(0)
            .info(info)
            .build();

        let accel = unsafe {
            device
                .ray_tracing
                .create_acceleration_structure(&create_info, None)
                .context("Failed to create acceleration structure")?
        };

        let requirements = unsafe {
            device
                .ray_tracing
                .get_acceleration_structure_memory_requirements(
                    &vk::AccelerationStructureMemoryRequirementsInfoNV::builder()
                        .acceleration_structure(accel)
                        .ty(vk::AccelerationStructureMemoryRequirementsTypeNV::OBJECT)
                        .build(),
                )
        };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name: "acceleration structure",
            requirements: requirements.memory_requirements,
            location: MemoryLocation::GpuOnly,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .ray_tracing
                .bind_acceleration_structure_memory(&[
                    vk::BindAccelerationStructureMemoryInfoNV::builder()
                        .acceleration_structure(accel)
                        .memory(allocation.memory())
                        .memory_offset(allocation.offset())
                        .build(),
                ])
                .context("Failed to bind acceleration structure memory")?;
        }

        let gpu_handle = unsafe {
            device
                .ray_tracing
                .get_acceleration_structure_handle(accel)
                .context("Failed to query acceleration structure handle")?
        };

        Ok(Self {
            accel,
            gpu_handle,
            kind,
            allocation: Some(allocation),
            device: device.clone(),
        })
    }

    pub fn scratch_size(&self) -> vk::DeviceSize {
        let requirements = unsafe {
            self.device
                .ray_tracing
                .get_acceleration_structure_memory_requirements(
                    &vk::AccelerationStructureMemoryRequirementsInfoNV::builder()
                        .acceleration_structure(self.accel)
                        .ty(vk::AccelerationStructureMemoryRequirementsTypeNV::BUILD_SCRATCH)
                        .build(),
                )
        };
        requirements.memory_requirements.size
    }

    /// Record the build for this structure. The info must match what
    /// the structure was created with.
    fn record_build(
        &self,
        command_buffer: vk::CommandBuffer,
        instance_buffer: vk::Buffer,
        scratch: vk::Buffer,
    ) {
        let info = match &self.kind {
            AccelKind::Bottom { geometries } => vk::AccelerationStructureInfoNV::builder()
                .ty(vk::AccelerationStructureTypeNV::BOTTOM_LEVEL)
                .flags(vk::BuildAccelerationStructureFlagsNV::PREFER_FAST_TRACE)
                .geometries(geometries)
                .build(),
            AccelKind::Top { instance_count } => vk::AccelerationStructureInfoNV::builder()
                .ty(vk::AccelerationStructureTypeNV::TOP_LEVEL)
                .flags(vk::BuildAccelerationStructureFlagsNV::PREFER_FAST_TRACE)
                .instance_count(*instance_count)
                .build(),
        };

        unsafe {
            self.device.ray_tracing.cmd_build_acceleration_structure(
                command_buffer,
                &info,
                instance_buffer,
                0,
                false,
                self.accel,
                vk::AccelerationStructureNV::null(),
                scratch,
                0,
            );
        }
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        unsafe {
            self.device
                .ray_tracing
                .destroy_acceleration_structure(self.accel, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let _ = self.device.allocator().free(allocation);
        }
    }
}

/// One instance record per mesh. The custom index is the mesh index,
/// which is how the hit shader picks the matching storage buffers.
pub fn scene_instances(meshes: &[([f32; 12], u64)]) -> Vec<GeometryInstance> {
    meshes
        .iter()
        .enumerate()
        .map(|(i, &(transform, handle))| {
            GeometryInstance::new(
                transform,
                i as u32,
                0xff,
                0,
                vk::GeometryInstanceFlagsNV::TRIANGLE_CULL_DISABLE_NV,
                handle,
            )
        })
        .collect()
}

/// Everything the TLAS covers: mesh buffers, BLASes, the instance
/// buffer and the TLAS itself.
pub struct SceneAccel {
    pub meshes: Vec<MeshBuffers>,
    pub blas: Vec<AccelerationStructure>,
    pub tlas: AccelerationStructure,
    pub instance_buffer: BufferResource,
}

/// Upload the scene and build all acceleration structures. Blocks on
/// the graphics queue until the builds are done.
pub fn build_scene(
    device: &Arc<VulkanDevice>,
    scene: &[MeshData],
    command_pool: vk::CommandPool,
) -> Result<SceneAccel> {
    log::info!("Building acceleration structures for {} meshes", scene.len());

    let meshes: Vec<MeshBuffers> = scene
        .iter()
        .map(|mesh| upload_mesh(device, mesh))
        .collect::<Result<_>>()?;

    let blas: Vec<AccelerationStructure> = meshes
        .iter()
        .map(|mesh| AccelerationStructure::bottom(device, vec![mesh.geometry()]))
        .collect::<Result<_>>()?;

    let instances = scene_instances(
        &meshes
            .iter()
            .zip(&blas)
            .map(|(mesh, accel)| (mesh.transform, accel.gpu_handle))
            .collect::<Vec<_>>(),
    );

    let instance_buffer = BufferResource::with_data(
        device.clone(),
        "tlas instances",
        vk::BufferUsageFlags::RAY_TRACING_NV,
        &instances,
    )?;

    let tlas = AccelerationStructure::top(device, instances.len() as u32)?;

    // shared scratch, sized for the largest build
    let scratch_size = blas
        .iter()
        .map(|b| b.scratch_size())
        .chain(std::iter::once(tlas.scratch_size()))
        .max()
        .unwrap_or(0);
    let scratch = BufferResource::new(
        device.clone(),
        "as scratch",
        scratch_size,
        vk::BufferUsageFlags::RAY_TRACING_NV,
        MemoryLocation::GpuOnly,
    )?;

    // record all builds into one one-time command buffer
    let allocate_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let command_buffer = unsafe {
        device
            .device
            .allocate_command_buffers(&allocate_info)
            .context("Failed to allocate build command buffer")?[0]
    };

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    let barrier = vk::MemoryBarrier::builder()
        .src_access_mask(
            vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_NV
                | vk::AccessFlags::ACCELERATION_STRUCTURE_READ_NV,
        )
        .dst_access_mask(
            vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_NV
                | vk::AccessFlags::ACCELERATION_STRUCTURE_READ_NV,
        )
        .build();

    unsafe {
        device
            .device
            .begin_command_buffer(command_buffer, &begin_info)
            .context("Failed to begin build command buffer")?;

        for accel in &blas {
            accel.record_build(command_buffer, vk::Buffer::null(), scratch.buffer);
            device.device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_NV,
                vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_NV,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }

        tlas.record_build(command_buffer, instance_buffer.buffer, scratch.buffer);
        device.device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_NV,
            vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_NV,
            vk::DependencyFlags::empty(),
            &[barrier],
            &[],
            &[],
        );

        device
            .device
            .end_command_buffer(command_buffer)
            .context("Failed to end build command buffer")?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        device
            .device
            .queue_submit(device.graphics_queue, &[submit_info.build()], vk::Fence::null())
            .context("Failed to submit acceleration structure builds")?;
        device
            .device
            .queue_wait_idle(device.graphics_queue)
            .context("Failed waiting for acceleration structure builds")?;

        device
            .device
            .free_command_buffers(command_pool, &command_buffers);
    }

    log::info!("Acceleration structures ready");

    Ok(SceneAccel {
        meshes,
        blas,
        tlas,
        instance_buffer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::demo_scene;

    #[test]
    fn two_meshes_yield_two_instances() {
        let scene = demo_scene();
        let handles: Vec<_> = scene
            .iter()
            .enumerate()
            .map(|(i, mesh)| (mesh.transform, 0x1000 + i as u64))
            .collect();

        let instances = scene_instances(&handles);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].instance_id(), 0);
        assert_eq!(instances[1].instance_id(), 1);
        assert_eq!(instances[1].acceleration_structure_handle, 0x1001);
        assert_eq!(instances[0].mask(), 0xff);
    }
}
