// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics
// Performance: Zero-cost abstractions, explicit control

pub mod buffer;
pub mod device;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::{BufferResource, ImageResource};
pub use device::VulkanDevice;
pub use swapchain::Swapchain;
pub use sync::FrameSync;
