use std::fs;

use page_render::render::{Color, RenderCoordinator, RenderError};
use page_render::settings::{self, CURRENT_VERSION, MAX_PAGE_CACHE_SIZE, Settings};
use page_render::test_utils::SyntheticDocument;
use serial_test::serial;
use tempfile::TempDir;

fn reset() {
    settings::set_settings(Settings::default());
}

#[test]
#[serial]
fn test_load_settings_from_yaml() {
    reset();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(
        &path,
        r##"version: 1
page_cache_size: 4
recolor: true
recolor_keephue: true
recolor_lightcolor: "#F4ECD8"
zoom: 1.5
ppi: 96
"##,
    )
    .unwrap();

    settings::load_settings_from_path(&path).unwrap();

    assert_eq!(settings::get_page_cache_size(), 4);
    assert!(settings::is_recolor_enabled());
    assert!(settings::is_recolor_keephue());
    assert!(!settings::is_recolor_reverse_video());
    assert_eq!(
        settings::get_recolor_colors(),
        ("#F4ECD8".to_string(), "#FFFFFF".to_string())
    );
    assert!((settings::get_zoom() - 1.5).abs() < f64::EPSILON);
    assert!((settings::get_ppi() - 96.0).abs() < f64::EPSILON);
}

#[test]
#[serial]
fn test_missing_keys_use_defaults() {
    reset();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "recolor: true\n").unwrap();

    settings::load_settings_from_path(&path).unwrap();

    let loaded = settings::get_settings();
    assert!(loaded.recolor);
    assert_eq!(loaded.page_cache_size, 15);
    assert_eq!(loaded.recolor_lightcolor, "#000000");
    assert_eq!(loaded.recolor_darkcolor, "#FFFFFF");
    assert_eq!(loaded.version, CURRENT_VERSION);
}

#[test]
#[serial]
fn test_non_positive_cache_size_falls_back_to_default() {
    reset();
    settings::set_page_cache_size(0);
    assert_eq!(settings::get_page_cache_size(), 15);

    settings::set_page_cache_size(-3);
    assert_eq!(settings::get_page_cache_size(), 15);
}

#[test]
#[serial]
fn test_old_version_is_migrated_and_rewritten() {
    reset();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "version: 0\nzoom: 2.0\n").unwrap();

    settings::load_settings_from_path(&path).unwrap();
    assert_eq!(settings::get_settings().version, CURRENT_VERSION);

    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains(&format!("version: {CURRENT_VERSION}")));
    assert!(rewritten.contains("zoom: 2.0"));
}

#[test]
#[serial]
fn test_saved_settings_load_back() {
    reset();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.yaml");

    settings::set_recolor_enabled(true);
    settings::set_recolor_reverse_video(true);
    settings::set_recolor_colors("#101010", "#EEEEEE");
    settings::set_zoom(0.75);
    settings::save_settings_to_path(&path).unwrap();
    let saved = settings::get_settings();

    reset();
    settings::load_settings_from_path(&path).unwrap();
    assert_eq!(settings::get_settings(), saved);
}

#[test]
#[serial]
fn test_invalid_yaml_is_an_error() {
    reset();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "zoom: [not, a, number\n").unwrap();

    assert!(settings::load_settings_from_path(&path).is_err());
    assert_eq!(settings::get_settings(), Settings::default());
    assert!(settings::load_settings_from_path(&dir.path().join("missing.yaml")).is_err());
}

#[test]
#[serial]
fn test_coordinator_from_settings() {
    reset();
    settings::set_recolor_enabled(true);
    settings::set_recolor_keephue(true);
    settings::set_recolor_colors("#FF0000", "no such color");
    settings::set_zoom(2.0);
    settings::set_ppi(144.0);
    settings::set_page_cache_size(2);

    let (coordinator, _pump) =
        RenderCoordinator::from_settings(SyntheticDocument::new(4, 10.0, 10.0)).unwrap();

    assert!(coordinator.recolor_enabled());
    assert!(coordinator.recolor_hue_enabled());
    assert!(!coordinator.recolor_reverse_video_enabled());
    assert_eq!(
        coordinator.recolor_colors(),
        (Color::rgb(1.0, 0.0, 0.0), Color::WHITE)
    );
    assert!((coordinator.view_params().scale() - 4.0).abs() < 1e-9);

    coordinator.cache_add(0);
    coordinator.cache_add(1);
    assert!(coordinator.cache_add(2).evicted().is_some());
    reset();
}

#[test]
#[serial]
fn test_huge_cache_size_is_capped() {
    reset();
    settings::set_page_cache_size(i64::MAX);
    assert_eq!(settings::get_page_cache_size(), MAX_PAGE_CACHE_SIZE);

    let (coordinator, _pump) =
        RenderCoordinator::from_settings(SyntheticDocument::new(1, 10.0, 10.0)).unwrap();
    assert!(!coordinator.is_stopping());
    reset();
}

#[test]
fn test_unallocatable_cache_is_an_error() {
    let result = RenderCoordinator::new(SyntheticDocument::new(1, 10.0, 10.0), usize::MAX);
    assert!(matches!(
        result,
        Err(RenderError::CacheAllocation {
            capacity: usize::MAX
        })
    ));
}

#[test]
#[serial]
fn test_non_finite_view_settings_use_defaults() {
    reset();
    settings::set_zoom(f64::NAN);
    settings::set_ppi(f64::INFINITY);

    let (coordinator, _pump) =
        RenderCoordinator::from_settings(SyntheticDocument::new(1, 10.0, 10.0)).unwrap();
    let view = coordinator.view_params();
    assert!((view.zoom - 1.0).abs() < f64::EPSILON);
    assert!(view.ppi.abs() < f64::EPSILON);
    reset();
}
