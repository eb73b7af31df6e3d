//! The layered terrain model: lidar regions first, then coarser grids in
//! fixed priority order.

use crate::error::TerrainError;
use crate::region::{RegionSample, RegionSet};
use crate::Result;
use rfsim_raster::{RasterConfig, RasterSource, Sample};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Which underlying source answered a height query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightSource {
    /// No source covered the point.
    Unknown,
    /// Building-aware lidar region.
    BuildingAware,
    /// Aerial surface model.
    CoarseSurface,
    /// National elevation grid.
    DepGrid,
    /// Global 3-arc-second grid.
    SrtmGrid,
    /// Coarse global fallback.
    GlobalGrid,
}

/// Relation of a query point to building data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingResult {
    /// No region footprint covers the point.
    OutsideRegion,
    /// Inside a region whose raster holds no measurement here.
    NoData,
    /// Inside a region, on bare ground.
    NoBuilding,
    /// Inside a detected building footprint.
    Building,
}

/// One resolved height answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TerrainSample {
    /// Ground elevation in meters.
    pub terrain_m: f32,
    /// Building height above ground in meters; NaN unless `result` is
    /// [`BuildingResult::Building`].
    pub building_m: f32,
    /// Building classification.
    pub result: BuildingResult,
    /// The source that answered.
    pub source: HeightSource,
}

/// Declarative configuration for one fallback raster source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Raster file, or tile directory when a pattern or glob is given.
    pub path: PathBuf,
    /// Tile-name template for directories of conventionally named tiles.
    #[serde(default)]
    pub name_pattern: Option<String>,
    /// Discovery glob for directories probed at start-up instead.
    #[serde(default)]
    pub probe_glob: Option<String>,
    /// Maximum cached-tile side in pixels.
    #[serde(default = "default_tile_size")]
    pub max_tile_size: u32,
    /// Decoded-tile cache capacity.
    #[serde(default = "default_tile_cache")]
    pub tile_cache_capacity: usize,
    /// No-data override for the elevation band.
    #[serde(default)]
    pub nodata_override: Option<f64>,
    /// Snap the resolution to a multiple of this step (in pixels per
    /// degree) and trim overlapping borders to the whole-degree grid.
    #[serde(default)]
    pub rectify_step: Option<f64>,
}

fn default_tile_size() -> u32 {
    rfsim_raster::DEFAULT_MAX_TILE_SIZE
}

fn default_tile_cache() -> usize {
    rfsim_raster::DEFAULT_TILE_CACHE_CAPACITY
}

impl SourceConfig {
    fn build(&self) -> Result<RasterSource<f32>> {
        let mut config = match (&self.name_pattern, &self.probe_glob) {
            (Some(template), None) => RasterConfig::tiled(&self.path, template),
            (None, Some(glob)) => RasterConfig::probed(&self.path, glob),
            (None, None) => RasterConfig::file(&self.path),
            (Some(_), Some(_)) => {
                return Err(TerrainError::Configuration(format!(
                    "{}: name_pattern and probe_glob are mutually exclusive",
                    self.path.display()
                )));
            }
        };
        config.max_tile_size = self.max_tile_size;
        config.tile_cache_capacity = self.tile_cache_capacity;
        if let Some(value) = self.nodata_override {
            config.nodata_overrides.push((1, value));
        }
        let mut source = RasterSource::new(config)?;
        if let Some(step) = self.rectify_step {
            source.set_transform_adjuster(move |t| {
                t.round_resolution(step);
                t.snap_margin_to_degree_grid();
            })?;
        }
        Ok(source)
    }
}

/// Regions block of the model configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    /// Region index JSON file.
    pub index: PathBuf,
    /// Bound on simultaneously loaded region rasters.
    #[serde(default = "default_resident_max")]
    pub resident_max: usize,
}

fn default_resident_max() -> usize {
    16
}

/// Top-level terrain model configuration. Every block is optional; an
/// empty configuration builds a model that answers every query with
/// [`HeightSource::Unknown`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerrainModelConfig {
    /// Building-aware lidar regions.
    #[serde(default)]
    pub regions: Option<RegionConfig>,
    /// Aerial surface model.
    #[serde(default)]
    pub coarse_surface: Option<SourceConfig>,
    /// National elevation grid.
    #[serde(default)]
    pub dep_grid: Option<SourceConfig>,
    /// Global 3-arc-second grid.
    #[serde(default)]
    pub srtm_grid: Option<SourceConfig>,
    /// Coarse global fallback; its void cells read as sea level.
    #[serde(default)]
    pub global_grid: Option<SourceConfig>,
}

/// Per-source usage counters for end-of-run diagnostics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TerrainStats {
    /// Total queries.
    pub queries: u64,
    /// Answers from building-aware regions.
    pub building_aware: u64,
    /// Answers from the aerial surface model.
    pub coarse_surface: u64,
    /// Answers from the national grid.
    pub dep_grid: u64,
    /// Answers from the global 3-arc-second grid.
    pub srtm_grid: u64,
    /// Answers from the coarse global fallback.
    pub global_grid: u64,
    /// Queries no source answered.
    pub unknown: u64,
    /// Region answers inside a building footprint.
    pub building_hits: u64,
}

/// Layered elevation model.
///
/// Sources are consulted strictly in priority order: lidar regions, then
/// the aerial surface model, the national grid, the global grid, and the
/// coarse fallback. The first source with data answers. Like the raster
/// engines it owns, the model is single-threaded; give each worker its
/// own instance.
pub struct TerrainModel {
    regions: Option<RegionSet>,
    coarse_surface: Option<RasterSource<f32>>,
    dep_grid: Option<RasterSource<f32>>,
    srtm_grid: Option<RasterSource<f32>>,
    global_grid: Option<RasterSource<f32>>,
    stats: TerrainStats,
}

impl TerrainModel {
    /// Build every configured source eagerly so configuration errors
    /// surface before the first query.
    pub fn from_config(config: &TerrainModelConfig) -> Result<Self> {
        let regions = match &config.regions {
            Some(rc) => Some(RegionSet::from_index(&rc.index, rc.resident_max)?),
            None => None,
        };
        let build = |sc: &Option<SourceConfig>| sc.as_ref().map(SourceConfig::build).transpose();
        Ok(Self {
            regions,
            coarse_surface: build(&config.coarse_surface)?,
            dep_grid: build(&config.dep_grid)?,
            srtm_grid: build(&config.srtm_grid)?,
            global_grid: build(&config.global_grid)?,
            stats: TerrainStats::default(),
        })
    }

    /// A model with no sources; attach them with the `with_*` builders.
    pub fn empty() -> Self {
        Self {
            regions: None,
            coarse_surface: None,
            dep_grid: None,
            srtm_grid: None,
            global_grid: None,
            stats: TerrainStats::default(),
        }
    }

    /// Attach a region set.
    pub fn with_regions(mut self, regions: RegionSet) -> Self {
        self.regions = Some(regions);
        self
    }

    /// Attach an aerial surface model.
    pub fn with_coarse_surface(mut self, source: RasterSource<f32>) -> Self {
        self.coarse_surface = Some(source);
        self
    }

    /// Attach a national elevation grid.
    pub fn with_dep_grid(mut self, source: RasterSource<f32>) -> Self {
        self.dep_grid = Some(source);
        self
    }

    /// Attach a global 3-arc-second grid.
    pub fn with_srtm_grid(mut self, source: RasterSource<f32>) -> Self {
        self.srtm_grid = Some(source);
        self
    }

    /// Attach a coarse global fallback grid.
    pub fn with_global_grid(mut self, source: RasterSource<f32>) -> Self {
        self.global_grid = Some(source);
        self
    }

    /// Usage counters.
    pub fn stats(&self) -> &TerrainStats {
        &self.stats
    }

    /// The region set, when one is configured.
    pub fn regions(&self) -> Option<&RegionSet> {
        self.regions.as_ref()
    }

    /// Resolve ground elevation and building height at a point.
    ///
    /// A miss everywhere is not an error: the sample comes back with
    /// [`HeightSource::Unknown`] and zero elevation so callers can apply
    /// their own default. When a region covers the point but holds no
    /// ground measurement there, the building classification stays
    /// [`BuildingResult::NoData`] while the height falls through to the
    /// coarser grids.
    pub fn query(&mut self, lon: f64, lat: f64) -> Result<TerrainSample> {
        self.stats.queries += 1;
        let mut result = BuildingResult::OutsideRegion;
        if let Some(regions) = self.regions.as_mut() {
            match regions.query(lon, lat)? {
                RegionSample::Building {
                    terrain_m,
                    building_m,
                } => {
                    self.stats.building_aware += 1;
                    self.stats.building_hits += 1;
                    return Ok(TerrainSample {
                        terrain_m,
                        building_m,
                        result: BuildingResult::Building,
                        source: HeightSource::BuildingAware,
                    });
                }
                RegionSample::Bare { terrain_m } => {
                    self.stats.building_aware += 1;
                    return Ok(TerrainSample {
                        terrain_m,
                        building_m: f32::NAN,
                        result: BuildingResult::NoBuilding,
                        source: HeightSource::BuildingAware,
                    });
                }
                RegionSample::NoData => {
                    result = BuildingResult::NoData;
                }
                RegionSample::Outside => {}
            }
        }
        if let Some(terrain_m) = sample_grid(&mut self.coarse_surface, lat, lon)? {
            self.stats.coarse_surface += 1;
            return Ok(grid_sample(terrain_m, result, HeightSource::CoarseSurface));
        }
        if let Some(terrain_m) = sample_grid(&mut self.dep_grid, lat, lon)? {
            self.stats.dep_grid += 1;
            return Ok(grid_sample(terrain_m, result, HeightSource::DepGrid));
        }
        if let Some(terrain_m) = sample_grid(&mut self.srtm_grid, lat, lon)? {
            self.stats.srtm_grid += 1;
            return Ok(grid_sample(terrain_m, result, HeightSource::SrtmGrid));
        }
        if let Some(source) = self.global_grid.as_mut() {
            match source.value_at(lat, lon, 1)? {
                Sample::Valid(terrain_m) => {
                    self.stats.global_grid += 1;
                    return Ok(grid_sample(terrain_m, result, HeightSource::GlobalGrid));
                }
                // The coarse fallback answers everywhere it has a cell:
                // its voids are ocean, reported as sea level.
                Sample::NoData(_) => {
                    self.stats.global_grid += 1;
                    return Ok(grid_sample(0.0, result, HeightSource::GlobalGrid));
                }
                Sample::Outside => {}
            }
        }
        self.stats.unknown += 1;
        debug!(lon, lat, "no terrain source covers point");
        Ok(TerrainSample {
            terrain_m: 0.0,
            building_m: f32::NAN,
            result,
            source: HeightSource::Unknown,
        })
    }
}

/// Sample one single-band grid, treating no-data and outside alike as a
/// miss that falls through to the next source.
fn sample_grid(
    source: &mut Option<RasterSource<f32>>,
    lat: f64,
    lon: f64,
) -> Result<Option<f32>> {
    match source.as_mut() {
        Some(source) => match source.value_at(lat, lon, 1)? {
            Sample::Valid(value) => Ok(Some(value)),
            Sample::NoData(_) | Sample::Outside => Ok(None),
        },
        None => Ok(None),
    }
}

fn grid_sample(terrain_m: f32, result: BuildingResult, source: HeightSource) -> TerrainSample {
    TerrainSample {
        terrain_m,
        building_m: f32::NAN,
        result,
        source,
    }
}
