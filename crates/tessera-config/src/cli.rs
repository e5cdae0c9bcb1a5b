//! Command-line argument parsing for Tessera hosts.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Tessera command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tessera", about = "Hierarchical tile streaming and LOD selection")]
pub struct CliArgs {
    /// Maximum screen-space error in pixels.
    #[arg(long)]
    pub max_sse: Option<f64>,

    /// Loading descendant limit before an ancestor stands in.
    #[arg(long)]
    pub loading_descendant_limit: Option<u32>,

    /// Maximum simultaneous tile loads.
    #[arg(long)]
    pub max_loads: Option<u32>,

    /// Enable LOD fade transitions.
    #[arg(long)]
    pub fade: Option<bool>,

    /// Depth of the demo quadtree.
    #[arg(long)]
    pub depth: Option<u32>,

    /// Number of real-time frames the demo simulates.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(sse) = args.max_sse {
            self.tileset.maximum_screen_space_error = sse;
        }
        if let Some(limit) = args.loading_descendant_limit {
            self.tileset.loading_descendant_limit = limit;
        }
        if let Some(loads) = args.max_loads {
            self.tileset.maximum_simultaneous_tile_loads = loads;
        }
        if let Some(fade) = args.fade {
            self.tileset.enable_lod_transition_period = fade;
        }
        if let Some(depth) = args.depth {
            self.demo.tree_depth = depth;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            max_sse: Some(2.0),
            depth: Some(3),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.tileset.maximum_screen_space_error, 2.0);
        assert_eq!(config.demo.tree_depth, 3);
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.tileset.loading_descendant_limit, 20);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from(["tessera", "--max-loads", "4", "--fade", "true"]);
        assert_eq!(args.max_loads, Some(4));
        assert_eq!(args.fade, Some(true));
    }
}
