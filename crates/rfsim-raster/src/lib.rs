//! Cached point access to georeferenced GeoTIFF rasters.
//!
//! This crate answers one question as cheaply as possible, millions of
//! times per run: what value does a raster source hold at this latitude
//! and longitude? A source is either a single monolithic file or a
//! directory of tiles, and the engine hides the difference behind
//! [`RasterSource::value_at`].
//!
//! Costs are bounded by two LRU caches: decoded tile windows (so a burst
//! of nearby queries decodes each strip once) and open file handles (so a
//! continental tile set never exhausts descriptors). The most recently
//! used tile is additionally checked first, making the common
//! query-walks-a-path access pattern close to free.
//!
//! Tile directories are mapped to file names either by a compiled
//! template ([`PatternResolver`]) or by probing every file's footprint up
//! front ([`ProbeResolver`]). Imperfect georeferencing is handled by
//! [`GridTransform::round_resolution`] and
//! [`GridTransform::snap_margin_to_degree_grid`], which rectify noisy
//! resolutions and overlapping tile borders so that abutting tiles
//! partition the plane exactly.
//!
//! # Example
//!
//! ```no_run
//! use rfsim_raster::{RasterConfig, RasterSource, Sample};
//!
//! // A directory of 1-degree tiles named like n48w123.tif.
//! let config = RasterConfig::tiled(
//!     "dem_data",
//!     "{latHem:ns}{latDegCeil:02}{lonHem:ew}{lonDegFloor:03}.tif",
//! );
//! let mut source: RasterSource<f32> = RasterSource::new(config)?;
//! match source.value_at(47.6062, -122.3321, 1)? {
//!     Sample::Valid(elevation) => println!("elevation {elevation} m"),
//!     Sample::NoData(_) => println!("void pixel"),
//!     Sample::Outside => println!("no tile covers the point"),
//! }
//! # Ok::<(), rfsim_raster::SourceError>(())
//! ```

mod bounds;
mod cache;
mod error;
mod names;
mod pixel;
mod reader;
mod source;
mod transform;

pub use bounds::{BoundRect, PixelRect};
pub use cache::LruCache;
pub use error::SourceError;
pub use names::{NameResolver, PatternResolver, ProbeResolver};
pub use pixel::{Pixel, PixelType, Sample};
pub use reader::FileMetadata;
pub use source::{
    NameStrategy, RasterConfig, RasterSource, ReadMode, SourceStats, TileInfo, TileKey,
    DEFAULT_MAX_OPEN_FILES, DEFAULT_MAX_TILE_SIZE, DEFAULT_TILE_CACHE_CAPACITY,
};
pub use transform::GridTransform;

/// Result type for raster source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
