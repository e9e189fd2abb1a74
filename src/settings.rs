use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pdf::{
    BackendKind, DEFAULT_CACHE_SIZE, DEFAULT_EVICTION_WINDOW, DEFAULT_PREFETCH_WINDOW,
    DEFAULT_RENDER_SCALE, DEFAULT_WORKERS, DisplayParameters, ReadingDirection, ViewerConfig,
};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "wview";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default = "default_render_scale")]
    pub render_scale: f32,

    #[serde(default = "default_prefetch_window")]
    pub prefetch_window: usize,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_eviction_window")]
    pub eviction_window: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f32,

    #[serde(default)]
    pub cover_offset: bool,

    #[serde(default)]
    pub reading_direction: ReadingDirection,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_render_scale() -> f32 {
    DEFAULT_RENDER_SCALE
}

fn default_prefetch_window() -> usize {
    DEFAULT_PREFETCH_WINDOW
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_eviction_window() -> usize {
    DEFAULT_EVICTION_WINDOW
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_aspect_ratio() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            backend: BackendKind::default(),
            render_scale: default_render_scale(),
            prefetch_window: default_prefetch_window(),
            cache_capacity: default_cache_capacity(),
            eviction_window: default_eviction_window(),
            workers: default_workers(),
            aspect_ratio: default_aspect_ratio(),
            cover_offset: false,
            reading_direction: ReadingDirection::default(),
        }
    }
}

impl Settings {
    /// Replace values the core cannot work with by their defaults
    fn sanitize(&mut self) {
        if !self.render_scale.is_finite() || self.render_scale <= 0.0 {
            warn!(
                "Invalid render_scale {}, using {}",
                self.render_scale,
                default_render_scale()
            );
            self.render_scale = default_render_scale();
        }
        if self.prefetch_window == 0 {
            warn!("prefetch_window must be at least 1");
            self.prefetch_window = 1;
        }
        if self.workers == 0 {
            warn!("workers must be at least 1");
            self.workers = 1;
        }
        self.aspect_ratio = DisplayParameters::sanitized_aspect(self.aspect_ratio);
    }
}

impl From<&Settings> for ViewerConfig {
    fn from(settings: &Settings) -> Self {
        ViewerConfig {
            backend: settings.backend,
            render_scale: settings.render_scale,
            prefetch_window: settings.prefetch_window,
            cache_capacity: settings.cache_capacity,
            eviction_window: settings.eviction_window,
            workers: settings.workers,
            display: DisplayParameters {
                aspect_ratio: settings.aspect_ratio,
                cover_offset: settings.cover_offset,
                reading_direction: settings.reading_direction,
            },
        }
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from the user config directory, writing a default file on
/// first run
pub fn load_settings() -> Settings {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };

    if path.exists() {
        load_settings_from_path(&path)
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        save_settings_to_file(&settings, &path);
        settings
    }
}

/// Load settings from `path`. Unreadable or unparsable files yield defaults.
pub fn load_settings_from_path(path: &Path) -> Settings {
    let mut settings = match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                settings
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                Settings::default()
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            Settings::default()
        }
    };

    settings.sanitize();
    settings
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("# Rendering engine: mupdf or pdfium\n");
    content.push_str(&format!("backend: {}\n", settings.backend.as_str()));
    content.push_str("# Pixels per PDF point\n");
    content.push_str(&format!("render_scale: {}\n", settings.render_scale));
    content.push_str(&format!("prefetch_window: {}\n", settings.prefetch_window));
    content.push_str(&format!("cache_capacity: {}\n", settings.cache_capacity));
    content.push_str(&format!("eviction_window: {}\n", settings.eviction_window));
    content.push_str(&format!("workers: {}\n", settings.workers));
    content.push('\n');
    content.push_str(&format!("aspect_ratio: {}\n", settings.aspect_ratio));
    content.push_str("# Show the first page alone, as a cover\n");
    content.push_str(&format!("cover_offset: {}\n", settings.cover_offset));
    let direction_str = match settings.reading_direction {
        ReadingDirection::LeftToRight => "left_to_right",
        ReadingDirection::RightToLeft => "right_to_left",
    };
    content.push_str("# left_to_right or right_to_left\n");
    content.push_str(&format!("reading_direction: {direction_str}\n"));

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn saved_settings_load_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        let settings = Settings {
            backend: BackendKind::Pdfium,
            render_scale: 1.5,
            prefetch_window: 3,
            cover_offset: true,
            reading_direction: ReadingDirection::RightToLeft,
            aspect_ratio: 1.25,
            ..Settings::default()
        };

        save_settings_to_file(&settings, &path);
        assert_eq!(load_settings_from_path(&path), settings);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 1\ncover_offset: true\n").unwrap();

        let settings = load_settings_from_path(&path);
        assert!(settings.cover_offset);
        assert_eq!(settings.prefetch_window, DEFAULT_PREFETCH_WINDOW);
        assert_eq!(settings.backend, BackendKind::Mupdf);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "workers: [not, a, number\n").unwrap();

        assert_eq!(load_settings_from_path(&path), Settings::default());
    }

    #[test]
    fn invalid_values_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(
            &path,
            "version: 1\nprefetch_window: 0\nworkers: 0\naspect_ratio: -2.0\nrender_scale: 0\n",
        )
        .unwrap();

        let settings = load_settings_from_path(&path);
        assert_eq!(settings.prefetch_window, 1);
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.aspect_ratio, 1.0);
        assert_eq!(settings.render_scale, DEFAULT_RENDER_SCALE);
    }

    #[test]
    fn old_version_is_migrated_and_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 0\nworkers: 4\n").unwrap();

        let settings = load_settings_from_path(&path);
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.workers, 4);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains(&format!("version: {CURRENT_VERSION}")));
    }

    #[test]
    fn viewer_config_carries_display_parameters() {
        let settings = Settings {
            cover_offset: true,
            reading_direction: ReadingDirection::RightToLeft,
            ..Settings::default()
        };

        let config = ViewerConfig::from(&settings);
        assert!(config.display.cover_offset);
        assert_eq!(config.display.reading_direction, ReadingDirection::RightToLeft);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_SIZE);
    }
}
