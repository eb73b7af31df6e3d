//! Error types for the terrain model.

use rfsim_raster::SourceError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from building or querying the terrain model.
///
/// As in the raster layer, missing coverage is not an error: a point no
/// source answers resolves to an unknown-height sample. These variants are
/// reserved for broken configuration and failing files.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// A raster source failed fatally.
    #[error(transparent)]
    Raster(#[from] SourceError),

    /// The region index file could not be read.
    #[error("failed to read region index {}: {source}", path.display())]
    IndexIo {
        /// Index file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The region index file is not valid JSON of the expected shape.
    #[error("failed to parse region index {}: {source}", path.display())]
    IndexParse {
        /// Index file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The model configuration is unusable.
    #[error("terrain configuration error: {0}")]
    Configuration(String),
}
