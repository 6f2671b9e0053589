use std::fs;

use page_render::logging::init_file_logger;
use simplelog::LevelFilter;
use tempfile::TempDir;

#[test]
fn test_file_logger_writes_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("render.log");

    init_file_logger(&path, LevelFilter::Info).unwrap();
    log::info!("rendering page 3");
    log::debug!("filtered out");

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("rendering page 3"));
    assert!(!content.contains("filtered out"));

    // Only one global logger can be installed.
    assert!(init_file_logger(&dir.path().join("second.log"), LevelFilter::Info).is_err());
}
