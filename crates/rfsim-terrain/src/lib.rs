//! Multi-source elevation and building-height resolution.
//!
//! A radio propagation run asks for ground height millions of times, and
//! no single dataset covers everywhere at the best available quality.
//! This crate layers the sources a deployment typically has, best first:
//!
//! 1. building-aware lidar regions (bare terrain plus building tops),
//! 2. an aerial surface model,
//! 3. a national elevation grid,
//! 4. a global 3-arc-second grid,
//! 5. a coarse global fallback whose voids read as sea level.
//!
//! [`TerrainModel::query`] consults them in that order and the first with
//! data answers, tagging the sample with its origin so runs can report
//! coverage quality. Inside a lidar region the answer also classifies the
//! point against building footprints; the residency of those heavyweight
//! regions is bounded by [`RegionSet`]. [`sample_path`] turns point
//! queries into the fixed-step elevation profiles propagation models
//! consume.
//!
//! # Example
//!
//! ```no_run
//! use rfsim_terrain::{sample_path, TerrainModel, TerrainModelConfig};
//!
//! let config: TerrainModelConfig = serde_json::from_str(
//!     r#"{
//!         "srtm_grid": {
//!             "path": "srtm",
//!             "name_pattern": "{latHem:NS}{latDegFloor:02x}{lonHem:EW}{lonDegFloor:03}.tif"
//!         },
//!         "global_grid": { "path": "globe.tif" }
//!     }"#,
//! )?;
//! let mut model = TerrainModel::from_config(&config)?;
//! let sample = model.query(-122.3321, 47.6062)?;
//! println!("{} m via {:?}", sample.terrain_m, sample.source);
//! let profile = sample_path(&mut model, (-122.33, 47.61), (-122.18, 47.62), 30.0)?;
//! println!("{} profile points", profile.points.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod profile;
mod region;
mod resolver;

pub use error::TerrainError;
pub use profile::{haversine_distance, sample_path, PathPoint, PathProfile};
pub use region::{Footprint, RegionEntry, RegionFormat, RegionSample, RegionSet};
pub use resolver::{
    BuildingResult, HeightSource, RegionConfig, SourceConfig, TerrainModel, TerrainModelConfig,
    TerrainSample, TerrainStats,
};

/// Result type for terrain operations.
pub type Result<T> = std::result::Result<T, TerrainError>;
