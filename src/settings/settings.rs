// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::feed::{default_feeds, FeedSource};
use crate::fetch::cors::DEFAULT_CORS_PROXIES;

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Relay prefixes; the encoded target URL is appended
    pub cors_proxies: Vec<String>,
    /// Origins known to refuse direct requests
    pub cors_hosts: Vec<String>,
    pub user_agent: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            cors_proxies: DEFAULT_CORS_PROXIES.iter().map(|p| p.to_string()).collect(),
            cors_hosts: vec![],
            user_agent: format!("podsloth/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub poll_interval_ms: u64,
    /// Waveform image size used by `--waveform`
    pub waveform_width: u32,
    pub waveform_height: u32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            waveform_width: 1200,
            waveform_height: 160,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub volume: f32,
    pub feeds: Vec<FeedSource>,
    pub network: NetworkSettings,
    pub playback: PlaybackSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            volume: 1.0,
            feeds: default_feeds(),
            network: NetworkSettings::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl AppSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self, String> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings file: {}", e))?;

        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse settings: {}", e))?;

        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<(), String> {
        fs::create_dir_all(app_dir)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(&path, content)
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn add_feed(&mut self, name: &str, url: &str) -> Result<(), String> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return Err("Please provide both name and URL for the feed.".to_string());
        }
        info!("Adding feed {} ({})", name, url);
        self.feeds.push(FeedSource::new(name, url));
        Ok(())
    }

    pub fn remove_feed(&mut self, index: usize) -> Result<FeedSource, String> {
        if index >= self.feeds.len() {
            return Err(format!("No feed at index {}", index));
        }
        let removed = self.feeds.remove(index);
        info!("Removed feed {}", removed.name);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load(dir.path()).unwrap();
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.playback.poll_interval_ms, 200);
        assert_eq!(settings.feeds, default_feeds());
        assert!(!settings.network.cors_proxies.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AppSettings::default();
        settings.volume = 0.4;
        settings.network.cors_hosts.push("https://media.rss.com".to_string());
        settings.add_feed("Mine", "https://example.com/rss").unwrap();
        settings.save(dir.path()).unwrap();

        let loaded = AppSettings::load(dir.path()).unwrap();
        assert_eq!(loaded.volume, 0.4);
        assert_eq!(loaded.network.cors_hosts, vec!["https://media.rss.com"]);
        assert_eq!(loaded.feeds.last().unwrap().name, "Mine");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(AppSettings::get_settings_path(dir.path()), r#"{"volume": 0.7}"#).unwrap();
        let loaded = AppSettings::load(dir.path()).unwrap();
        assert_eq!(loaded.volume, 0.7);
        assert_eq!(loaded.playback.poll_interval_ms, 200);
    }

    #[test]
    fn test_add_feed_requires_name_and_url() {
        let mut settings = AppSettings::default();
        assert!(settings.add_feed("  ", "https://x").is_err());
        assert!(settings.add_feed("x", "").is_err());
    }

    #[test]
    fn test_remove_feed() {
        let mut settings = AppSettings::default();
        let removed = settings.remove_feed(0).unwrap();
        assert_eq!(removed.name, "Lateralcast");
        assert_eq!(settings.feeds.len(), 1);
        assert!(settings.remove_feed(5).is_err());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(AppSettings::get_settings_path(dir.path()), "{not json").unwrap();
        assert!(AppSettings::load(dir.path()).is_err());
    }
}
