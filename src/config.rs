//! Configuration persistence for viewer, annotation style and tile loading
//!
//! Stored as pretty JSON in `<config_dir>/deepzoom-annotator/config.json`.
//! `DEEPZOOM_ANNOTATOR_CONFIG` points at an alternative file.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::TileSourceOptions;

const APP_DIR: &str = "deepzoom-annotator";
const CONFIG_FILE: &str = "config.json";
const CONFIG_ENV: &str = "DEEPZOOM_ANNOTATOR_CONFIG";

/// Corner the navigator minimap is docked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigatorPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

/// Mouse gesture behavior of the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GestureSettings {
    /// Zoom in on single click (off so clicks start annotations instead)
    #[serde(default)]
    pub click_to_zoom: bool,
    #[serde(default)]
    pub dbl_click_to_zoom: bool,
}

/// Presentational options passed to the viewer engine
///
/// None of these affect session state or the tool mode machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_true")]
    pub show_navigator: bool,
    #[serde(default)]
    pub navigator_position: NavigatorPosition,
    #[serde(default = "default_true")]
    pub show_rotation_control: bool,
    #[serde(default)]
    pub gesture_settings_mouse: GestureSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            show_navigator: true,
            navigator_position: NavigatorPosition::BottomRight,
            show_rotation_control: true,
            gesture_settings_mouse: GestureSettings::default(),
        }
    }
}

/// Fill style of annotation shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    /// CSS-style color string, e.g. `#0000ff`
    #[serde(default = "default_fill")]
    pub fill: String,
    /// Opacity in `[0, 1]`
    #[serde(default = "default_fill_opacity")]
    pub fill_opacity: f32,
}

impl AnnotationStyle {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.fill_opacity),
            "fill opacity {} is outside [0, 1]",
            self.fill_opacity
        );
        ensure!(!self.fill.trim().is_empty(), "fill color is empty");
        Ok(())
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            fill: default_fill(),
            fill_opacity: default_fill_opacity(),
        }
    }
}

/// Where the image comes from and how hard to try loading it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileConfig {
    #[serde(default = "default_image_url")]
    pub image_url: String,
    /// Directory that absolute image URLs are resolved against
    #[serde(default = "default_asset_root")]
    pub asset_root: PathBuf,
    #[serde(default = "default_true")]
    pub log_latency: bool,
    /// Automatic retries after the first failed attempt
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
}

impl TileConfig {
    pub fn options(&self) -> TileSourceOptions {
        TileSourceOptions {
            log_latency: self.log_latency,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            image_url: default_image_url(),
            asset_root: default_asset_root(),
            log_latency: true,
            retry: default_retry(),
            retry_delay_ms: default_retry_delay_ms(),
            tile_size: default_tile_size(),
        }
    }
}

/// Application configuration persisted between sessions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub annotation_style: AnnotationStyle,
    #[serde(default)]
    pub tiles: TileConfig,
}

fn default_true() -> bool {
    true
}

fn default_fill() -> String {
    "#0000ff".to_string()
}

fn default_fill_opacity() -> f32 {
    // Nearly transparent so the underlying tiles stay visible but shapes are hit-testable
    0.0001
}

fn default_image_url() -> String {
    "/TCI.tif".to_string()
}

fn default_asset_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_retry() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_tile_size() -> u32 {
    256
}

impl AppConfig {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::config_dir().context("No platform config directory available")?;
        Ok(dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load configuration from disk, or return defaults if unavailable
    pub fn load() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_or_init(&path),
            Err(err) => {
                log::warn!("Could not locate config file, using defaults: {:#}", err);
                Self::default()
            }
        }
    }

    /// Load `path`, writing the defaults there first when it does not exist
    pub fn load_or_init(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            match config.save_to(path) {
                Ok(()) => log::info!("Wrote default config to {}", path.display()),
                Err(err) => log::warn!("Could not write default config: {:#}", err),
            }
            return config;
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Error loading config, using defaults: {:#}", err);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.annotation_style.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
