//! Configuration system for Tessera.
//!
//! Holds the read-only [`TilesetOptions`] consumed by the selection engine each
//! frame, plus the host-level settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, and forward/backward
//! compatible serialization.

mod cli;
mod config;
mod error;
mod options;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, DemoConfig};
pub use error::ConfigError;
pub use options::{FogDensityAtHeight, TilesetOptions, default_fog_density_table};
