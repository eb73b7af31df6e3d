//! Error types for raster access.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading raster sources.
///
/// Missing data is never an error: a point outside every known file or a
/// pixel holding the no-data sentinel is reported through
/// [`Sample`](crate::Sample), and a name that resolves to no file through
/// `Option`. Every variant of this enum is fatal to the query that hit it.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source was configured with something unusable: a missing
    /// directory or file, a bad name pattern, a raster that is not
    /// north-up, a file with fewer pages than the declared band count, or
    /// a sample type outside the supported set.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O failure against a file that should be readable.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TIFF decoding failure against an existing raster file.
    #[error("TIFF decode error in {}: {source}", path.display())]
    Decode {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: tiff::TiffError,
    },

    /// A state the engine's own bookkeeping should make impossible, such
    /// as a computed pixel index more than one pixel out of range or a
    /// band index beyond the declared count.
    #[error("internal consistency error: {0}")]
    InternalConsistency(String),
}
