use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use jfs_config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `log.level`. When `log.file` is set and
/// `stderr` is false, events are appended to that file; the writer sits
/// behind a mutex so lines from concurrent workers never interleave.
pub fn init(log: &LogConfig, stderr: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    match &log.file {
        Some(path) if !stderr => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| e as Box<dyn std::error::Error>)?;
        }
        _ => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| e as Box<dyn std::error::Error>)?,
    }

    Ok(())
}
