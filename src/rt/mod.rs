// Ray tracing setup and per-frame driving
//
// Built on the NV ray tracing extension. The flow is: build one BLAS
// per mesh and a TLAS over their instances, lay out descriptors and the
// shader binding table, create the pipeline, then record one static
// command buffer per swapchain image that traces and copies the result
// to the swapchain.

pub mod acceleration;
pub mod camera;
pub mod descriptors;
pub mod instance;
pub mod pipeline;
pub mod renderer;
pub mod sbt;

pub use renderer::Renderer;
