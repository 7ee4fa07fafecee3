// SHADER-WATCH - Recompile shaders on change
//
// Watches the shader directory recursively and runs every changed
// source through glslc. A failed compile logs the compiler error and
// leaves the previous .spv in place; a successful one logs the output
// size. Run this next to rt-triangle for a quick edit loop.

use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher};
use rtx_demos::compiler::{compile_shader, CompileOutcome};
use rtx_demos::config::Config;
use std::path::Path;
use std::sync::mpsc;

fn main() -> Result<()> {
    let config = Config::load();
    rtx_demos::init_logging(&config);

    let watch_path = Path::new(&config.shaders.dir);
    anyhow::ensure!(
        watch_path.is_dir(),
        "Shader directory {:?} does not exist",
        watch_path
    );

    let (tx, rx) = mpsc::channel();
    let mut watcher =
        notify::recommended_watcher(tx).context("Failed to create filesystem watcher")?;
    watcher
        .watch(watch_path, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {:?}", watch_path))?;

    log::info!("Listening for changes in {:?}", watch_path);

    for event in rx {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                log::error!("Watch error: {}", e);
                continue;
            }
        };

        if !matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        ) {
            continue;
        }

        for path in event.paths {
            recompile(&path);
        }
    }

    Ok(())
}

fn recompile(path: &Path) {
    match compile_shader(path) {
        Ok(CompileOutcome::Compiled { output, byte_len }) => {
            log::info!("Compiled {:?} ({} bytes)", output, byte_len);
        }
        Ok(CompileOutcome::Skipped) => {}
        Err(e) => {
            // keep watching; the previous .spv stays in place
            log::error!("{:#}", e);
        }
    }
}
