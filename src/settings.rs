use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::CaptureConfig;

/// Returns the path to the settings file: `~/.config/vocals/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("vocals");
    path.push("settings.json");
    path
}

/// Persisted recording settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSettings {
    // Capture format
    pub sample_rate: u32,
    pub channels: u16,
    pub device: Option<String>,

    // Recording loop
    pub countdown_secs: u32,
    pub duration_secs: f64,
    pub drain_batch: usize,
    pub poll_interval_ms: u64,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            device: None,

            countdown_secs: 0,
            duration_secs: 5.0,
            drain_batch: 1024,
            poll_interval_ms: 20,
        }
    }
}

impl RecordSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                } else {
                    log::info!("Saved settings to {}", path.display());
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Recording length; negative or non-finite values count as zero
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or(Duration::ZERO)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: RecordSettings =
            serde_json::from_str(r#"{"sample_rate": 48000}"#).unwrap();

        assert_eq!(settings.sample_rate, 48000);
        assert_eq!(settings.channels, 1);
        assert_eq!(settings.drain_batch, 1024);
        assert_eq!(settings.device, None);
        assert_eq!(settings.countdown_secs, 0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = RecordSettings {
            channels: 2,
            device: Some("USB Mic".to_string()),
            duration_secs: 12.5,
            ..Default::default()
        };

        settings.save_to(&path);

        assert_eq!(RecordSettings::load_from(&path), settings);
    }

    #[test]
    fn test_bad_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        assert_eq!(RecordSettings::load_from(&path), RecordSettings::default());
        assert_eq!(
            RecordSettings::load_from(&dir.path().join("missing.json")),
            RecordSettings::default()
        );
    }

    #[test]
    fn test_duration_rejects_negative() {
        let settings = RecordSettings {
            duration_secs: -3.0,
            ..Default::default()
        };
        assert_eq!(settings.duration(), Duration::ZERO);
        assert_eq!(RecordSettings::default().duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_duration_is_accepted() {
        let settings = RecordSettings {
            duration_secs: 1e19,
            ..Default::default()
        };
        assert_eq!(settings.duration(), Duration::from_secs_f64(1e19));
    }
}
