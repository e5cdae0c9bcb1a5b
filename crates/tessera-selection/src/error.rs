//! Error types for tile loading and tileset construction.

use tessera_config::ConfigError;

use crate::tile::TileId;

/// Why a tile's content could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileLoadError {
    /// The content could not be fetched.
    #[error("failed to fetch {uri}: {message}")]
    Network { uri: String, message: String },

    /// The content was fetched but could not be decoded.
    #[error("failed to decode {uri}: {message}")]
    Decode { uri: String, message: String },

    /// The worker pool shut down before the load ran.
    #[error("load of {0} was cancelled")]
    Cancelled(TileId),
}

/// A failed load, handed to the host's failure callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLoadFailureDetails {
    pub tile: TileId,
    pub error: TileLoadError,
}

/// Errors creating a tileset.
#[derive(Debug, thiserror::Error)]
pub enum TilesetError {
    /// The options failed validation.
    #[error(transparent)]
    InvalidOptions(#[from] ConfigError),
}
