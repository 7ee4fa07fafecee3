// GLSL to SPIR-V compilation
//
// Wraps the glslc compiler from the Vulkan SDK. Used by the
// shader-watch tool; build.rs does the same thing at build time. The
// stage is inferred from the file extension and the output lands next
// to the source as `<stem>-<stage>.spv`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Shader stage extensions glslc understands.
const SHADER_EXTENSIONS: &[&str] = &[
    "rgen", "rchit", "rmiss", "rahit", "rint", "rcall", "vert", "frag", "comp",
];

#[derive(Debug, PartialEq, Eq)]
pub enum CompileOutcome {
    Compiled { output: PathBuf, byte_len: u64 },
    /// Not a shader source file; nothing to do.
    Skipped,
}

pub fn is_shader_source(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SHADER_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// Output path for a shader source: `ray.rgen` becomes `ray-rgen.spv`
/// in the same directory.
pub fn spv_output_path(source: &Path) -> Option<PathBuf> {
    let stem = source.file_stem()?.to_str()?;
    let ext = source.extension()?.to_str()?;
    if !SHADER_EXTENSIONS.contains(&ext) {
        return None;
    }
    Some(source.with_file_name(format!("{}-{}.spv", stem, ext)))
}

/// Compile one shader source with glslc. Returns `Skipped` for files
/// that are not shader sources, so directory watchers can feed every
/// changed path through here.
pub fn compile_shader(source: &Path) -> Result<CompileOutcome> {
    let output = match spv_output_path(source) {
        Some(path) => path,
        None => return Ok(CompileOutcome::Skipped),
    };

    let result = Command::new("glslc")
        .arg("--target-env=vulkan1.1")
        .arg(source)
        .arg("-o")
        .arg(&output)
        .output()
        .context("Failed to run glslc (is the Vulkan SDK installed?)")?;

    check_compile_status(source, result.status.success(), &result.stderr)?;

    let byte_len = std::fs::metadata(&output)
        .with_context(|| format!("glslc produced no output at {:?}", output))?
        .len();

    Ok(CompileOutcome::Compiled { output, byte_len })
}

/// Turn a glslc exit into a result, carrying the compiler's stderr in
/// the error so the watcher can show the actual diagnostic.
fn check_compile_status(source: &Path, success: bool, stderr: &[u8]) -> Result<()> {
    if !success {
        anyhow::bail!(
            "glslc failed for {:?}:\n{}",
            source,
            String::from_utf8_lossy(stderr)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_joins_stem_and_stage() {
        assert_eq!(
            spv_output_path(Path::new("shaders/ray.rgen")),
            Some(PathBuf::from("shaders/ray-rgen.spv"))
        );
        assert_eq!(
            spv_output_path(Path::new("shaders/ray.rchit")),
            Some(PathBuf::from("shaders/ray-rchit.spv"))
        );
    }

    #[test]
    fn non_shader_files_are_skipped() {
        assert_eq!(spv_output_path(Path::new("shaders/notes.txt")), None);
        assert_eq!(spv_output_path(Path::new("shaders/ray-rgen.spv")), None);
        // skipped before glslc is even invoked
        assert_eq!(
            compile_shader(Path::new("shaders/notes.txt")).unwrap(),
            CompileOutcome::Skipped
        );
    }

    #[test]
    fn compile_failure_carries_the_compiler_diagnostic() {
        let err = check_compile_status(
            Path::new("shaders/ray.rgen"),
            false,
            b"shaders/ray.rgen:7: error: 'foo' : undeclared identifier",
        )
        .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("undeclared identifier"));
        assert!(message.contains("ray.rgen"));
    }

    #[test]
    fn successful_compile_status_passes_through() {
        assert!(check_compile_status(Path::new("shaders/ray.rgen"), true, b"").is_ok());
    }

    #[test]
    fn recognizes_ray_tracing_stages() {
        assert!(is_shader_source(Path::new("a.rgen")));
        assert!(is_shader_source(Path::new("a.rchit")));
        assert!(is_shader_source(Path::new("a.rmiss")));
        assert!(!is_shader_source(Path::new("a.glsl.bak")));
        assert!(!is_shader_source(Path::new("a")));
    }
}
