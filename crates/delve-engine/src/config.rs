//! Driver configuration.
//!
//! Seed, streaming radius, save location and logging for the headless
//! driver. Loaded from `delve.toml`; missing or broken files fall back to
//! defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use delve_world::StreamingConfig;

/// Configuration file name.
pub const CONFIG_FILE: &str = "delve.toml";

/// Default log directive.
pub const DEFAULT_LOG_FILTER: &str = "delve=info";

/// Driver configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    /// World seed (None = random)
    pub seed: Option<u64>,
    /// Depth the expedition starts at (0 = town)
    pub start_depth: i32,
    /// Render distance in chunks
    pub render_distance: u32,
    /// Directory for tile diffs (None = keep them in memory)
    pub save_dir: Option<PathBuf>,
    /// Steps the scripted walk takes
    pub walk_steps: u32,
    /// `tracing` filter directive
    pub log_filter: String,
}

impl Default for DelveConfig {
    fn default() -> Self {
        Self {
            seed: None,
            start_depth: 0,
            render_distance: 2,
            save_dir: None,
            walk_steps: 500,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl DelveConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                },
                Err(e) => {
                    warn!("Failed to parse config file: {e}");
                    Self::default()
                },
            },
            Err(e) => {
                warn!("Failed to read config file: {e}");
                Self::default()
            },
        }
    }

    /// Load configuration from `path`, writing the defaults there first if
    /// the file doesn't exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from(path);
        }

        info!("Config file not found, writing defaults");
        let config = Self::default();
        if let Err(e) = config.save_to(path) {
            warn!("Failed to write default config: {e}");
        }
        config
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.start_depth = self.start_depth.clamp(0, 100);
        self.render_distance = self.render_distance.clamp(1, 8);
        self.walk_steps = self.walk_steps.min(100_000);
        if self.log_filter.trim().is_empty() {
            self.log_filter = DEFAULT_LOG_FILTER.to_string();
        }
    }

    /// Seed to play, drawing a random one if none is configured.
    #[must_use]
    pub fn resolved_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| fastrand::u64(..))
    }

    /// Streaming settings for the chunk manager.
    #[must_use]
    pub const fn streaming(&self) -> StreamingConfig {
        StreamingConfig::with_render_distance(self.render_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = DelveConfig::default();
        assert_eq!(config.render_distance, 2);
        assert_eq!(config.start_depth, 0);
        assert!(config.save_dir.is_none());
        assert_eq!(config.log_filter, "delve=info");
    }

    #[test]
    fn test_config_validation() {
        let mut config = DelveConfig {
            start_depth: -3,
            render_distance: 0,
            walk_steps: u32::MAX,
            log_filter: "  ".to_string(),
            ..DelveConfig::default()
        };

        config.validate();

        assert_eq!(config.start_depth, 0);
        assert_eq!(config.render_distance, 1);
        assert_eq!(config.walk_steps, 100_000);
        assert_eq!(config.log_filter, "delve=info");
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join(CONFIG_FILE);

        let config = DelveConfig {
            seed: Some(12345),
            start_depth: 3,
            save_dir: Some(temp_dir.path().join("saves")),
            ..DelveConfig::default()
        };
        config.save_to(&config_path).expect("Failed to save config");

        let loaded = DelveConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = DelveConfig::load_from("/nonexistent/path/delve.toml");
        assert_eq!(config, DelveConfig::default());
    }

    #[test]
    fn test_config_load_or_create_writes_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join(CONFIG_FILE);

        let config = DelveConfig::load_or_create(&config_path);
        assert_eq!(config, DelveConfig::default());
        assert!(config_path.exists());
        assert_eq!(DelveConfig::load_from(&config_path), DelveConfig::default());

        fs::write(&config_path, "walk_steps = 3\n").expect("write");
        assert_eq!(DelveConfig::load_or_create(&config_path).walk_steps, 3);
    }

    #[test]
    fn test_config_load_partial_and_broken() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let partial = temp_dir.path().join("partial.toml");
        fs::write(&partial, "seed = 7\nwalk_steps = 10\n").expect("write");
        let loaded = DelveConfig::load_from(&partial);
        assert_eq!(loaded.seed, Some(7));
        assert_eq!(loaded.walk_steps, 10);
        assert_eq!(loaded.render_distance, 2);

        let broken = temp_dir.path().join("broken.toml");
        fs::write(&broken, "seed = [").expect("write");
        assert_eq!(DelveConfig::load_from(&broken), DelveConfig::default());
    }

    #[test]
    fn test_streaming_settings() {
        let config = DelveConfig {
            render_distance: 3,
            ..DelveConfig::default()
        };
        assert_eq!(config.streaming().render_distance, 3);
        let seeded = DelveConfig {
            seed: Some(9),
            ..DelveConfig::default()
        };
        assert_eq!(seeded.resolved_seed(), 9);
    }
}
