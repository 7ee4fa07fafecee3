// Shader binding table layout
//
// Groups are packed raygen first, then hit, then miss, one handle per
// group with no padding between them. The offsets here feed
// cmd_trace_rays directly.

use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbtLayout {
    pub handle_size: u32,
    pub raygen_count: u32,
    pub hit_count: u32,
    pub miss_count: u32,
}

impl SbtLayout {
    pub fn new(handle_size: u32, raygen_count: u32, hit_count: u32, miss_count: u32) -> Self {
        Self {
            handle_size,
            raygen_count,
            hit_count,
            miss_count,
        }
    }

    pub fn group_count(&self) -> u32 {
        self.raygen_count + self.hit_count + self.miss_count
    }

    /// Entries are handle-sized, so stride equals the handle size.
    pub fn stride(&self) -> vk::DeviceSize {
        vk::DeviceSize::from(self.handle_size)
    }

    pub fn size(&self) -> vk::DeviceSize {
        vk::DeviceSize::from(self.group_count()) * self.stride()
    }

    pub fn raygen_offset(&self) -> vk::DeviceSize {
        0
    }

    pub fn hit_offset(&self) -> vk::DeviceSize {
        vk::DeviceSize::from(self.raygen_count) * self.stride()
    }

    pub fn miss_offset(&self) -> vk::DeviceSize {
        vk::DeviceSize::from(self.raygen_count + self.hit_count) * self.stride()
    }
}

/// Shader group records for the one-raygen, one-hit, one-miss pipeline.
/// Order matters: it fixes the group indices the offsets above assume,
/// and the stage indices match the order stages are handed to pipeline
/// creation (raygen 0, closest-hit 1, miss 2).
pub fn demo_shader_groups() -> Vec<vk::RayTracingShaderGroupCreateInfoNV> {
    vec![
        // raygen
        vk::RayTracingShaderGroupCreateInfoNV::builder()
            .ty(vk::RayTracingShaderGroupTypeNV::GENERAL)
            .general_shader(0)
            .closest_hit_shader(vk::SHADER_UNUSED_NV)
            .any_hit_shader(vk::SHADER_UNUSED_NV)
            .intersection_shader(vk::SHADER_UNUSED_NV)
            .build(),
        // hit group
        vk::RayTracingShaderGroupCreateInfoNV::builder()
            .ty(vk::RayTracingShaderGroupTypeNV::TRIANGLES_HIT_GROUP)
            .general_shader(vk::SHADER_UNUSED_NV)
            .closest_hit_shader(1)
            .any_hit_shader(vk::SHADER_UNUSED_NV)
            .intersection_shader(vk::SHADER_UNUSED_NV)
            .build(),
        // miss
        vk::RayTracingShaderGroupCreateInfoNV::builder()
            .ty(vk::RayTracingShaderGroupTypeNV::GENERAL)
            .general_shader(2)
            .closest_hit_shader(vk::SHADER_UNUSED_NV)
            .any_hit_shader(vk::SHADER_UNUSED_NV)
            .intersection_shader(vk::SHADER_UNUSED_NV)
            .build(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_group_order() {
        let layout = SbtLayout::new(16, 1, 1, 1);
        assert_eq!(layout.raygen_offset(), 0);
        assert_eq!(layout.hit_offset(), 16);
        assert_eq!(layout.miss_offset(), 32);
        assert_eq!(layout.size(), 48);
        assert_eq!(layout.stride(), 16);
    }

    #[test]
    fn offsets_scale_with_group_counts() {
        let layout = SbtLayout::new(32, 2, 3, 1);
        assert_eq!(layout.hit_offset(), 2 * 32);
        assert_eq!(layout.miss_offset(), (2 + 3) * 32);
        assert_eq!(layout.size(), 6 * 32);
    }

    #[test]
    fn demo_groups_reference_stages_in_order() {
        let groups = demo_shader_groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].general_shader, 0);
        assert_eq!(groups[1].closest_hit_shader, 1);
        assert_eq!(groups[2].general_shader, 2);
        assert_eq!(groups[0].ty, vk::RayTracingShaderGroupTypeNV::GENERAL);
        assert_eq!(
            groups[1].ty,
            vk::RayTracingShaderGroupTypeNV::TRIANGLES_HIT_GROUP
        );
    }
}
