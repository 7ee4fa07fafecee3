// Build script to compile the ray-tracing GLSL shaders to SPIR-V

use std::path::Path;
use std::process::Command;

const SHADERS: &[(&str, &str)] = &[
    ("shaders/ray.rgen", "shaders/ray-rgen.spv"),
    ("shaders/ray.rchit", "shaders/ray-rchit.spv"),
    ("shaders/ray.rmiss", "shaders/ray-rmiss.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    for (input, output) in SHADERS {
        compile_shader(input, output);
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg("--target-env=vulkan1.1")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            eprintln!("Warning: glslc not found ({})", e);
            eprintln!("Shaders will not be compiled. Install the Vulkan SDK or compile manually:");
            eprintln!("  glslc --target-env=vulkan1.1 {} -o {}", input, output);
        }
    }
}
