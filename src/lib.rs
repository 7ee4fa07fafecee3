// Vulkan ray-tracing demo suite built on ash.
//
// The library half holds everything the binaries share: the Vulkan
// backend wrappers, the demo scene, the ray-tracing setup sequence and
// the config loader. The binaries (`rt-triangle`, `event-window`,
// `shader-watch`) are thin entry points over these modules.

pub mod backend;
pub mod compiler;
pub mod config;
pub mod rt;
pub mod scene;

use std::fs::OpenOptions;
use std::io::Write;

use config::Config;

/// Initialize logging with optional file output for validation errors
pub fn init_logging(config: &Config) {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            let _ = writeln!(file, "=== {} log ===", env!("CARGO_PKG_NAME"));
            let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
            let _ = writeln!(file);
        }
    }
}
