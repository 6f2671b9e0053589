//! File logging for hosts embedding the renderer

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

/// Send `log` output at `level` and above to the file at `path`, truncating
/// it. Fails if a global logger is already installed.
pub fn init_file_logger(path: &Path, level: LevelFilter) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create log file {path:?}"))?;
    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Debug)
        .build();

    WriteLogger::init(level, config, file).context("Failed to install logger")?;
    info!("Logging to {path:?}");
    Ok(())
}
