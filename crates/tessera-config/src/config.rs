//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::options::TilesetOptions;

/// File name of the persisted configuration inside a config directory.
const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Selection, loading, and caching options for every tileset.
    pub tileset: TilesetOptions,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Settings for the procedural demo tileset.
    pub demo: DemoConfig,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write JSON logs to this directory in debug builds.
    pub log_dir: Option<PathBuf>,
}

/// Parameters of the procedural quadtree driven by the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Depth of the quadtree below the root.
    pub tree_depth: u32,
    /// Edge length of the root tile in meters.
    pub root_size_m: f64,
    /// Geometric error of the root tile; halves at every level.
    pub root_geometric_error: f64,
    /// Camera distance above the tile plane at the first frame.
    pub start_distance_m: f64,
    /// Camera distance above the tile plane at the last frame.
    pub end_distance_m: f64,
    /// Number of real-time frames to simulate.
    pub frames: u32,
    /// Artificial worker-side latency per tile load.
    pub simulated_latency_ms: u64,
    /// Worker threads used for tile loads. Zero picks a count from the CPU.
    pub worker_threads: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            tree_depth: 6,
            root_size_m: 10_000.0,
            root_geometric_error: 512.0,
            start_distance_m: 40_000.0,
            end_distance_m: 500.0,
            frames: 240,
            simulated_latency_ms: 2,
            worker_threads: 0,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for Tessera, if the platform has one.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tessera"))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.tileset.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.tileset.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
