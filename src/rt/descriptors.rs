// Descriptor layout and allocation
//
// Declarations are collected in insertion order and turned into a set
// plan: set 0 holds the single-descriptor bindings (acceleration
// structure, output image, camera uniform), and every storage-buffer
// array gets a set of its own with one variable-count binding sized by
// mesh count. The plan is pure so the assignment is testable; `build`
// then creates the pool, layouts, sets and writes in one pass.

use crate::backend::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

enum DeclarationKind {
    AccelerationStructure(vk::AccelerationStructureNV),
    StorageImage(vk::ImageView),
    UniformBuffer {
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    /// One buffer per mesh, bound as a runtime-sized array.
    StorageBufferArray {
        buffers: Vec<(vk::Buffer, vk::DeviceSize)>,
    },
}

struct Declaration {
    binding: u32,
    stage: vk::ShaderStageFlags,
    kind: DeclarationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPlan {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage: vk::ShaderStageFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPlan {
    pub bindings: Vec<BindingPlan>,
    /// Set when the set's single binding is a runtime-sized array.
    pub variable_count: Option<u32>,
}

#[derive(Default)]
pub struct DescriptorRegistry {
    declarations: Vec<Declaration>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_acceleration_structure(
        &mut self,
        binding: u32,
        acceleration_structure: vk::AccelerationStructureNV,
    ) {
        self.declarations.push(Declaration {
            binding,
            stage: vk::ShaderStageFlags::RAYGEN_NV,
            kind: DeclarationKind::AccelerationStructure(acceleration_structure),
        });
    }

    pub fn add_storage_image(&mut self, binding: u32, view: vk::ImageView) {
        self.declarations.push(Declaration {
            binding,
            stage: vk::ShaderStageFlags::RAYGEN_NV,
            kind: DeclarationKind::StorageImage(view),
        });
    }

    pub fn add_uniform_buffer(
        &mut self,
        binding: u32,
        stage: vk::ShaderStageFlags,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        self.declarations.push(Declaration {
            binding,
            stage,
            kind: DeclarationKind::UniformBuffer { buffer, range },
        });
    }

    /// Declare a per-mesh storage-buffer array. Each call adds a whole
    /// descriptor set after set 0, in call order.
    pub fn add_storage_buffer_array(
        &mut self,
        binding: u32,
        buffers: Vec<(vk::Buffer, vk::DeviceSize)>,
    ) {
        self.declarations.push(Declaration {
            binding,
            stage: vk::ShaderStageFlags::CLOSEST_HIT_NV,
            kind: DeclarationKind::StorageBufferArray { buffers },
        });
    }

    fn descriptor_type(kind: &DeclarationKind) -> vk::DescriptorType {
        match kind {
            DeclarationKind::AccelerationStructure(_) => {
                vk::DescriptorType::ACCELERATION_STRUCTURE_NV
            }
            DeclarationKind::StorageImage(_) => vk::DescriptorType::STORAGE_IMAGE,
            DeclarationKind::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            DeclarationKind::StorageBufferArray { .. } => vk::DescriptorType::STORAGE_BUFFER,
        }
    }

    /// Deterministic set assignment: set 0 takes the single-descriptor
    /// declarations in insertion order, then each array declaration
    /// becomes its own set, also in insertion order.
    pub fn plan(&self) -> Vec<SetPlan> {
        let mut set0 = Vec::new();
        let mut array_sets = Vec::new();

        for declaration in &self.declarations {
            match &declaration.kind {
                DeclarationKind::StorageBufferArray { buffers } => {
                    let count = buffers.len() as u32;
                    array_sets.push(SetPlan {
                        bindings: vec![BindingPlan {
                            binding: declaration.binding,
                            descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                            descriptor_count: count,
                            stage: declaration.stage,
                        }],
                        variable_count: Some(count),
                    });
                }
                kind => {
                    set0.push(BindingPlan {
                        binding: declaration.binding,
                        descriptor_type: Self::descriptor_type(kind),
                        descriptor_count: 1,
                        stage: declaration.stage,
                    });
                }
            }
        }

        let mut sets = vec![SetPlan {
            bindings: set0,
            variable_count: None,
        }];
        sets.extend(array_sets);
        sets
    }

    fn pool_sizes(plan: &[SetPlan]) -> Vec<vk::DescriptorPoolSize> {
        plan.iter()
            .flat_map(|set| &set.bindings)
            .map(|b| vk::DescriptorPoolSize {
                ty: b.descriptor_type,
                descriptor_count: b.descriptor_count,
            })
            .collect()
    }

    /// Create layouts, pool and sets, and write every declared resource.
    ///
    /// `supports_variable_counts` reflects the queried
    /// descriptor-indexing capability. The hit shader indexes the
    /// arrays dynamically, so without the capability the array path is
    /// refused outright instead of binding sets the shader cannot use.
    pub fn build(
        &self,
        device: Arc<VulkanDevice>,
        supports_variable_counts: bool,
    ) -> Result<DescriptorResources> {
        let plan = self.plan();

        let needs_variable_counts = plan.iter().any(|set| set.variable_count.is_some());
        anyhow::ensure!(
            supports_variable_counts || !needs_variable_counts,
            "Device lacks descriptor indexing, required for the per-mesh buffer arrays"
        );

        // layouts, one per planned set
        let mut set_layouts = Vec::with_capacity(plan.len());
        for set in &plan {
            let bindings: Vec<_> = set
                .bindings
                .iter()
                .map(|b| {
                    vk::DescriptorSetLayoutBinding::builder()
                        .binding(b.binding)
                        .descriptor_type(b.descriptor_type)
                        .descriptor_count(b.descriptor_count)
                        .stage_flags(b.stage)
                        .build()
                })
                .collect();

            let layout = if set.variable_count.is_some() {
                let binding_flags = vec![vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT];
                let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder()
                    .binding_flags(&binding_flags);
                let info = vk::DescriptorSetLayoutCreateInfo::builder()
                    .bindings(&bindings)
                    .push_next(&mut flags_info);
                unsafe { device.device.create_descriptor_set_layout(&info, None) }
            } else {
                let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
                unsafe { device.device.create_descriptor_set_layout(&info, None) }
            }
            .context("Failed to create descriptor set layout")?;

            set_layouts.push(layout);
        }

        // pool sized from the declarations
        let pool_sizes = Self::pool_sizes(&plan);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(plan.len() as u32)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            device
                .device
                .create_descriptor_pool(&pool_info, None)
                .context("Failed to create descriptor pool")?
        };

        // allocate all sets in one call
        let variable_counts: Vec<u32> = plan
            .iter()
            .map(|set| set.variable_count.unwrap_or(1))
            .collect();
        let sets = if needs_variable_counts {
            let mut count_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder()
                .descriptor_counts(&variable_counts);
            let alloc_info = vk::DescriptorSetAllocateInfo::builder()
                .descriptor_pool(pool)
                .set_layouts(&set_layouts)
                .push_next(&mut count_info);
            unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
        } else {
            let alloc_info = vk::DescriptorSetAllocateInfo::builder()
                .descriptor_pool(pool)
                .set_layouts(&set_layouts);
            unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
        }
        .context("Failed to allocate descriptor sets")?;

        self.write_sets(&device, &sets)?;

        Ok(DescriptorResources {
            pool,
            set_layouts,
            sets,
            device,
        })
    }

    fn write_sets(&self, device: &VulkanDevice, sets: &[vk::DescriptorSet]) -> Result<()> {
        // backing storage must outlive update_descriptor_sets
        let mut accel_handles = Vec::new();
        let mut image_infos = Vec::new();
        let mut buffer_infos: Vec<Vec<vk::DescriptorBufferInfo>> = Vec::new();

        for declaration in &self.declarations {
            match &declaration.kind {
                DeclarationKind::AccelerationStructure(handle) => accel_handles.push(vec![*handle]),
                DeclarationKind::StorageImage(view) => image_infos.push(vec![
                    vk::DescriptorImageInfo::builder()
                        .image_view(*view)
                        .image_layout(vk::ImageLayout::GENERAL)
                        .build(),
                ]),
                DeclarationKind::UniformBuffer { buffer, range } => buffer_infos.push(vec![
                    vk::DescriptorBufferInfo::builder()
                        .buffer(*buffer)
                        .offset(0)
                        .range(*range)
                        .build(),
                ]),
                DeclarationKind::StorageBufferArray { buffers } => buffer_infos.push(
                    buffers
                        .iter()
                        .map(|&(buffer, range)| {
                            vk::DescriptorBufferInfo::builder()
                                .buffer(buffer)
                                .offset(0)
                                .range(range)
                                .build()
                        })
                        .collect(),
                ),
            }
        }

        let mut accel_writes: Vec<vk::WriteDescriptorSetAccelerationStructureNV> = accel_handles
            .iter()
            .map(|handles| {
                vk::WriteDescriptorSetAccelerationStructureNV::builder()
                    .acceleration_structures(handles)
                    .build()
            })
            .collect();

        let mut writes = Vec::new();
        let mut accel_index = 0;
        let mut image_index = 0;
        let mut buffer_index = 0;
        let mut array_set_index = 1;

        for declaration in &self.declarations {
            match &declaration.kind {
                DeclarationKind::AccelerationStructure(_) => {
                    let mut write = vk::WriteDescriptorSet::builder()
                        .dst_set(sets[0])
                        .dst_binding(declaration.binding)
                        .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_NV)
                        .push_next(&mut accel_writes[accel_index])
                        .build();
                    // the builder only derives the count from image or
                    // buffer info arrays, so set it by hand here
                    write.descriptor_count = 1;
                    writes.push(write);
                    accel_index += 1;
                }
                DeclarationKind::StorageImage(_) => {
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(sets[0])
                            .dst_binding(declaration.binding)
                            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                            .image_info(&image_infos[image_index])
                            .build(),
                    );
                    image_index += 1;
                }
                DeclarationKind::UniformBuffer { .. } => {
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(sets[0])
                            .dst_binding(declaration.binding)
                            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                            .buffer_info(&buffer_infos[buffer_index])
                            .build(),
                    );
                    buffer_index += 1;
                }
                DeclarationKind::StorageBufferArray { .. } => {
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(sets[array_set_index])
                            .dst_binding(declaration.binding)
                            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                            .buffer_info(&buffer_infos[buffer_index])
                            .build(),
                    );
                    buffer_index += 1;
                    array_set_index += 1;
                }
            }
        }

        unsafe {
            device.device.update_descriptor_sets(&writes, &[]);
        }
        Ok(())
    }
}

/// Owns the pool, layouts and sets for the lifetime of the renderer.
pub struct DescriptorResources {
    pub pool: vk::DescriptorPool,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub sets: Vec<vk::DescriptorSet>,
    device: Arc<VulkanDevice>,
}

impl Drop for DescriptorResources {
    fn drop(&mut self) {
        unsafe {
            for &layout in &self.set_layouts {
                self.device
                    .device
                    .destroy_descriptor_set_layout(layout, None);
            }
            self.device.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_registry(mesh_count: usize) -> DescriptorRegistry {
        let fake = |i: u64| (vk::Buffer::from_raw(i), 64);
        let buffers = |base: u64| (0..mesh_count as u64).map(|i| fake(base + i)).collect();

        let mut registry = DescriptorRegistry::new();
        registry.add_acceleration_structure(0, vk::AccelerationStructureNV::from_raw(1));
        registry.add_storage_image(1, vk::ImageView::from_raw(2));
        registry.add_uniform_buffer(
            2,
            vk::ShaderStageFlags::RAYGEN_NV,
            vk::Buffer::from_raw(3),
            112,
        );
        registry.add_storage_buffer_array(0, buffers(10));
        registry.add_storage_buffer_array(0, buffers(20));
        registry.add_storage_buffer_array(0, buffers(30));
        registry
    }

    use ash::vk::Handle;

    #[test]
    fn set_zero_keeps_insertion_order() {
        let plan = demo_registry(2).plan();
        let bindings = &plan[0].bindings;
        assert_eq!(bindings.len(), 3);
        assert_eq!(
            bindings[0].descriptor_type,
            vk::DescriptorType::ACCELERATION_STRUCTURE_NV
        );
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(
            bindings[2].descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[2].binding, 2);
    }

    #[test]
    fn each_buffer_array_gets_its_own_set() {
        let plan = demo_registry(2).plan();
        assert_eq!(plan.len(), 4);
        for set in &plan[1..] {
            assert_eq!(set.bindings.len(), 1);
            assert_eq!(set.bindings[0].binding, 0);
            assert_eq!(set.bindings[0].descriptor_count, 2);
            assert_eq!(set.variable_count, Some(2));
            assert_eq!(set.bindings[0].stage, vk::ShaderStageFlags::CLOSEST_HIT_NV);
        }
    }

    #[test]
    fn plan_is_deterministic() {
        assert_eq!(demo_registry(2).plan(), demo_registry(2).plan());
    }

    #[test]
    fn array_counts_follow_mesh_count() {
        let plan = demo_registry(5).plan();
        assert_eq!(plan[1].bindings[0].descriptor_count, 5);
        assert_eq!(plan[1].variable_count, Some(5));
    }
}
