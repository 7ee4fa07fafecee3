// Shader module loading
//
// Shaders are compiled to SPIR-V by build.rs (or the shader-watch tool)
// and loaded from the shader directory at startup. A missing .spv file
// is fatal, with the path in the error.

use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;

/// Read a SPIR-V file and create a shader module from it
pub fn load_shader_module<P: AsRef<Path>>(
    device: &VulkanDevice,
    path: P,
) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open shader file {:?} (run the build first?)", path))?;

    // read_spv handles the byte-to-word conversion and alignment
    let code = ash::util::read_spv(&mut file)
        .with_context(|| format!("Failed to read SPIR-V from {:?}", path))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .with_context(|| format!("Failed to create shader module from {:?}", path))
    }
}
