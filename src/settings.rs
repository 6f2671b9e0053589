use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::render::DEFAULT_CACHE_SIZE;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "page-render";

/// Largest accepted `page_cache_size`
pub const MAX_PAGE_CACHE_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Number of off-screen pages whose bitmaps are kept
    #[serde(default = "default_page_cache_size")]
    pub page_cache_size: i64,

    #[serde(default)]
    pub recolor: bool,

    #[serde(default)]
    pub recolor_keephue: bool,

    #[serde(default)]
    pub recolor_reverse_video: bool,

    #[serde(default = "default_lightcolor")]
    pub recolor_lightcolor: String,

    #[serde(default = "default_darkcolor")]
    pub recolor_darkcolor: String,

    #[serde(default = "default_zoom")]
    pub zoom: f64,

    /// Screen pixels per inch, 0 when unknown
    #[serde(default)]
    pub ppi: f64,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_page_cache_size() -> i64 {
    DEFAULT_CACHE_SIZE as i64
}

fn default_lightcolor() -> String {
    "#000000".to_string()
}

fn default_darkcolor() -> String {
    "#FFFFFF".to_string()
}

fn default_zoom() -> f64 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            page_cache_size: default_page_cache_size(),
            recolor: false,
            recolor_keephue: false,
            recolor_reverse_video: false,
            recolor_lightcolor: default_lightcolor(),
            recolor_darkcolor: default_darkcolor(),
            zoom: default_zoom(),
            ppi: 0.0,
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

/// Where the settings file lives: `<config dir>/page-render/config.yaml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load the settings file, creating it with defaults if missing.
pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };

    if path.exists() {
        if let Err(e) = load_settings_from_path(&path) {
            error!("{e:#}");
        }
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Err(e) = save_settings_to_path(&path) {
            error!("{e:#}");
        }
    }
}

/// Replace the global settings with the content of `path`.
///
/// Older files are migrated and written back.
pub fn load_settings_from_path(path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {path:?}"))?;
    let mut settings: Settings = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file {path:?}"))?;
    debug!("Loaded settings from {path:?}");

    let migrated = settings.version < CURRENT_VERSION;
    if migrated {
        migrate_settings(&mut settings);
    }

    if let Ok(mut global) = SETTINGS.write() {
        *global = settings;
    }

    if migrated {
        save_settings_to_path(path)?;
    }
    Ok(())
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

pub fn save_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };

    if let Err(e) = save_settings_to_path(&path) {
        error!("{e:#}");
    }
}

/// Write the global settings to `path`, creating parent directories.
pub fn save_settings_to_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {parent:?}"))?;
        }
    }

    let settings = get_settings();
    let body = serde_yaml::to_string(&settings).context("Failed to serialize settings")?;
    let content = format!("{SETTINGS_HEADER}{body}");

    fs::write(path, content).with_context(|| format!("Failed to save settings to {path:?}"))?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# page-render settings
# ============================================================================
# page_cache_size: off-screen pages kept rendered (1 to 4096)
# recolor_lightcolor: color white is mapped to when recoloring
# recolor_darkcolor: color black is mapped to when recoloring
#   colors accept #rgb, #rrggbb, #rrggbbaa, rgb(..), rgba(..)
# ppi: screen pixels per inch, 0 when unknown

"#;

// Public API for accessing/modifying settings

/// Snapshot of the current settings
pub fn get_settings() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn set_settings(settings: Settings) {
    if let Ok(mut global) = SETTINGS.write() {
        *global = settings;
    }
}

pub fn get_page_cache_size() -> usize {
    let size = SETTINGS
        .read()
        .map(|s| s.page_cache_size)
        .unwrap_or_else(|_| default_page_cache_size());
    match usize::try_from(size) {
        Ok(size) if size > MAX_PAGE_CACHE_SIZE => {
            warn!("page_cache_size {size} is too large; using {MAX_PAGE_CACHE_SIZE}");
            MAX_PAGE_CACHE_SIZE
        }
        Ok(size) if size > 0 => size,
        _ => {
            warn!("page_cache_size must be positive, got {size}; using {DEFAULT_CACHE_SIZE}");
            DEFAULT_CACHE_SIZE
        }
    }
}

pub fn set_page_cache_size(size: i64) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.page_cache_size = size;
    }
}

pub fn is_recolor_enabled() -> bool {
    SETTINGS.read().map(|s| s.recolor).unwrap_or(false)
}

pub fn set_recolor_enabled(enabled: bool) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.recolor = enabled;
    }
}

pub fn is_recolor_keephue() -> bool {
    SETTINGS.read().map(|s| s.recolor_keephue).unwrap_or(false)
}

pub fn set_recolor_keephue(keep: bool) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.recolor_keephue = keep;
    }
}

pub fn is_recolor_reverse_video() -> bool {
    SETTINGS
        .read()
        .map(|s| s.recolor_reverse_video)
        .unwrap_or(false)
}

pub fn set_recolor_reverse_video(enabled: bool) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.recolor_reverse_video = enabled;
    }
}

/// `(light, dark)` recolor color strings
pub fn get_recolor_colors() -> (String, String) {
    SETTINGS
        .read()
        .map(|s| (s.recolor_lightcolor.clone(), s.recolor_darkcolor.clone()))
        .unwrap_or_else(|_| (default_lightcolor(), default_darkcolor()))
}

pub fn set_recolor_colors(light: &str, dark: &str) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.recolor_lightcolor = light.to_string();
        settings.recolor_darkcolor = dark.to_string();
    }
}

pub fn get_zoom() -> f64 {
    SETTINGS
        .read()
        .map(|s| s.zoom)
        .unwrap_or_else(|_| default_zoom())
}

pub fn set_zoom(zoom: f64) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.zoom = zoom;
    }
}

pub fn get_ppi() -> f64 {
    SETTINGS.read().map(|s| s.ppi).unwrap_or(0.0)
}

pub fn set_ppi(ppi: f64) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.ppi = ppi;
    }
}
