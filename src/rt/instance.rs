// TLAS instance records
//
// The instance buffer the top-level build consumes is an array of
// 64-byte records with two packed bitfields. Layout is fixed by the
// NV extension: 24-bit custom index and offset, 8-bit mask and flags.

use ash::vk;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct GeometryInstance {
    /// row-major 3x4 world transform
    pub transform: [f32; 12],
    instance_id_and_mask: u32,
    instance_offset_and_flags: u32,
    pub acceleration_structure_handle: u64,
}

const _: () = assert!(std::mem::size_of::<GeometryInstance>() == 64);

impl GeometryInstance {
    pub fn new(
        transform: [f32; 12],
        instance_id: u32,
        mask: u8,
        instance_offset: u32,
        flags: vk::GeometryInstanceFlagsNV,
        acceleration_structure_handle: u64,
    ) -> Self {
        Self {
            transform,
            instance_id_and_mask: Self::pack_id_and_mask(instance_id, mask),
            instance_offset_and_flags: Self::pack_offset_and_flags(instance_offset, flags),
            acceleration_structure_handle,
        }
    }

    fn pack_id_and_mask(instance_id: u32, mask: u8) -> u32 {
        (instance_id & 0x00ff_ffff) | (u32::from(mask) << 24)
    }

    fn pack_offset_and_flags(instance_offset: u32, flags: vk::GeometryInstanceFlagsNV) -> u32 {
        (instance_offset & 0x00ff_ffff) | (flags.as_raw() << 24)
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id_and_mask & 0x00ff_ffff
    }

    pub fn mask(&self) -> u8 {
        (self.instance_id_and_mask >> 24) as u8
    }

    pub fn instance_offset(&self) -> u32 {
        self.instance_offset_and_flags & 0x00ff_ffff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_and_offset_are_masked_to_24_bits() {
        let instance = GeometryInstance::new(
            [0.0; 12],
            0xff12_3456,
            0xff,
            0xffab_cdef,
            vk::GeometryInstanceFlagsNV::TRIANGLE_CULL_DISABLE_NV,
            0,
        );
        assert_eq!(instance.instance_id(), 0x0012_3456);
        assert_eq!(instance.instance_offset(), 0x00ab_cdef);
        assert_eq!(instance.mask(), 0xff);
    }

    #[test]
    fn flags_land_in_the_top_byte() {
        let instance = GeometryInstance::new(
            [0.0; 12],
            0,
            0,
            0,
            vk::GeometryInstanceFlagsNV::TRIANGLE_CULL_DISABLE_NV,
            0,
        );
        let flags = instance.instance_offset_and_flags >> 24;
        assert_eq!(
            flags,
            vk::GeometryInstanceFlagsNV::TRIANGLE_CULL_DISABLE_NV.as_raw()
        );
    }
}
