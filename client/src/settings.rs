use std::fs;
use std::path::{Path, PathBuf};

use cf_core::constants::{
    DEFAULT_SERVER_PORT, FOG_BORDER_MIN, FOG_MAP_SIZE, MAX_FACE_SIZE, MAX_VIEW,
};
use serde::{Deserialize, Serialize};

use crate::filepaths;

pub const DEFAULT_SERVER_HOST: &str = "localhost";

/// Upper bound for the fog map edge; a 1024x1024 map already takes a few hundred MB.
const MAX_FOG_MAP_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_host: String,
    pub server_port: u16,

    /// Holds `gfx/` overrides and the private `image-cache/`.
    pub cache_dir: PathBuf,
    /// Read-only public images and their `bmaps.client`.
    pub data_dir: PathBuf,
    pub image_cache_enabled: bool,

    pub fog_map_size: usize,
    pub fog_border_min: usize,

    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            cache_dir: filepaths::default_cache_directory(),
            data_dir: filepaths::default_data_directory(),
            image_cache_enabled: true,
            fog_map_size: FOG_MAP_SIZE,
            fog_border_min: FOG_BORDER_MIN,
            log_level: "info".to_string(),
            log_file: Some(filepaths::log_file_path()),
        }
    }
}

impl ClientSettings {
    /// Loads settings from `path`, falling back to defaults for a missing or
    /// unreadable file.
    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("No settings at {}, using defaults: {e}", path.display());
                return Self::default();
            }
        };

        match serde_json::from_slice::<ClientSettings>(&bytes) {
            Ok(s) => s.clamped(),
            Err(e) => {
                log::warn!("Failed to parse settings file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings dir {}: {e}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings to JSON: {e}"))?;
        fs::write(path, format!("{json}\n"))
            .map_err(|e| format!("Failed to write settings file {}: {e}", path.display()))
    }

    /// Pulls values into ranges the map and the protocol can work with.
    pub fn clamped(mut self) -> Self {
        let max_border = (MAX_FOG_MAP_SIZE - MAX_FACE_SIZE - MAX_VIEW) / 2;
        if self.fog_border_min > max_border {
            log::warn!("fog_border_min {} too large, using {max_border}", self.fog_border_min);
            self.fog_border_min = max_border;
        }

        let min_size = self.fog_border_min + MAX_FACE_SIZE + MAX_VIEW;
        let size = self.fog_map_size.clamp(min_size, MAX_FOG_MAP_SIZE);
        if size != self.fog_map_size {
            log::warn!("fog_map_size {} out of range, using {size}", self.fog_map_size);
            self.fog_map_size = size;
        }

        if self.server_port == 0 {
            log::warn!("server_port 0 is invalid, using {DEFAULT_SERVER_PORT}");
            self.server_port = DEFAULT_SERVER_PORT;
        }

        if self.log_level.parse::<log::LevelFilter>().is_err() {
            log::warn!("unknown log_level {:?}, using info", self.log_level);
            self.log_level = "info".to_string();
        }
        self
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}_{pid}_{nanos}"))
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = unique_temp_dir("cf_settings_missing");
        let settings = ClientSettings::load(&dir.join("nope.json"));
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = unique_temp_dir("cf_settings_partial");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, r#"{ "server_host": "cf.example.org", "fog_map_size": 300 }"#).unwrap();

        let settings = ClientSettings::load(&path);
        assert_eq!(settings.server_host, "cf.example.org");
        assert_eq!(settings.fog_map_size, 300);
        assert_eq!(settings.server_port, DEFAULT_SERVER_PORT);
        assert!(settings.image_cache_enabled);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_json_gives_defaults() {
        let dir = unique_temp_dir("cf_settings_invalid");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(ClientSettings::load(&path), ClientSettings::default());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = ClientSettings {
            fog_map_size: 10,
            fog_border_min: 5000,
            server_port: 0,
            log_level: "loud".to_string(),
            ..Default::default()
        }
        .clamped();

        assert!(settings.fog_border_min + MAX_FACE_SIZE + MAX_VIEW <= settings.fog_map_size);
        assert!(settings.fog_map_size <= MAX_FOG_MAP_SIZE);
        assert_eq!(settings.server_port, DEFAULT_SERVER_PORT);
        assert_eq!(settings.log_level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn save_then_load() {
        let dir = unique_temp_dir("cf_settings_save");
        let path = dir.join("nested").join("settings.json");
        let settings = ClientSettings {
            server_port: 13400,
            log_file: None,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(ClientSettings::load(&path), settings);

        let _ = fs::remove_dir_all(&dir);
    }
}
