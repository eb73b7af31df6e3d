//! Building-aware lidar regions with bounded residency.

use crate::error::TerrainError;
use crate::Result;
use rfsim_raster::{BoundRect, RasterConfig, RasterSource, Sample};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Band layout of a region raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionFormat {
    /// Band 1 bare terrain, band 2 building top.
    TerrainBuilding,
    /// Band 1 building top, band 2 bare terrain.
    BuildingTerrain,
}

impl RegionFormat {
    /// `(terrain band, building band)`.
    fn bands(self) -> (u32, u32) {
        match self {
            RegionFormat::TerrainBuilding => (1, 2),
            RegionFormat::BuildingTerrain => (2, 1),
        }
    }
}

/// Geographic footprint of a region in degrees, following the same
/// half-open edge rule as the rasters underneath: north and west edges
/// inside, south and east edges out.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Footprint {
    pub lat_min: f64,
    pub lon_min: f64,
    pub lat_max: f64,
    pub lon_max: f64,
}

impl From<Footprint> for BoundRect {
    fn from(f: Footprint) -> Self {
        BoundRect {
            lat_min: f.lat_min,
            lon_min: f.lon_min,
            lat_max: f.lat_max,
            lon_max: f.lon_max,
        }
    }
}

/// One entry of the region index file.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionEntry {
    /// Display name, typically the city covered.
    pub name: String,
    /// Directory holding the raster, relative to the index file.
    pub dir: PathBuf,
    /// Raster file name inside `dir`.
    pub file: String,
    /// Band layout.
    pub format: RegionFormat,
    /// Advertised footprint; queries consult the raster only inside it.
    pub bounds: Footprint,
}

/// Outcome of a region query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionSample {
    /// Bare terrain with a building overhead.
    Building {
        /// Ground elevation in meters.
        terrain_m: f32,
        /// Building height above ground in meters.
        building_m: f32,
    },
    /// Bare terrain, no detected building.
    Bare {
        /// Ground elevation in meters.
        terrain_m: f32,
    },
    /// Inside a region whose raster holds no ground measurement here.
    NoData,
    /// No region footprint contains the point.
    Outside,
}

struct Region {
    entry: RegionEntry,
    rect: BoundRect,
    dir: PathBuf,
    engine: Option<RasterSource<f32>>,
}

/// The set of building-aware regions, enumerated once from an index file.
///
/// Region rasters are the heaviest sources in the model, so at most
/// `resident_max` stay loaded. Loading past the bound unloads the region
/// loaded longest ago; residency follows load order, not access order,
/// and a query into an unloaded region simply reloads it.
pub struct RegionSet {
    regions: Vec<Region>,
    resident_max: usize,
    load_order: VecDeque<usize>,
    loads: u64,
    evictions: u64,
}

impl fmt::Debug for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionSet")
            .field("regions", &self.regions.len())
            .field("resident_max", &self.resident_max)
            .field("load_order", &self.load_order)
            .field("loads", &self.loads)
            .field("evictions", &self.evictions)
            .finish()
    }
}

impl RegionSet {
    /// Read the region index and enumerate its regions without loading
    /// any raster. Entries with a degenerate footprint are skipped with a
    /// warning rather than poisoning the whole set.
    pub fn from_index(index_path: &Path, resident_max: usize) -> Result<Self> {
        let text = fs::read_to_string(index_path).map_err(|source| TerrainError::IndexIo {
            path: index_path.to_path_buf(),
            source,
        })?;
        let entries: Vec<RegionEntry> =
            serde_json::from_str(&text).map_err(|source| TerrainError::IndexParse {
                path: index_path.to_path_buf(),
                source,
            })?;
        let base = index_path.parent().unwrap_or_else(|| Path::new("."));
        let mut regions = Vec::with_capacity(entries.len());
        for entry in entries {
            let rect = BoundRect::from(entry.bounds);
            if rect.lat_min >= rect.lat_max || rect.lon_min >= rect.lon_max {
                warn!(region = %entry.name, "skipping region with degenerate footprint");
                continue;
            }
            let dir = base.join(&entry.dir);
            regions.push(Region {
                rect,
                dir,
                engine: None,
                entry,
            });
        }
        info!(
            regions = regions.len(),
            index = %index_path.display(),
            "region index loaded"
        );
        Ok(Self {
            regions,
            resident_max: resident_max.max(1),
            load_order: VecDeque::new(),
            loads: 0,
            evictions: 0,
        })
    }

    /// Number of enumerated regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the index produced no usable regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Number of regions currently holding a loaded raster.
    pub fn resident(&self) -> usize {
        self.load_order.len()
    }

    /// Region loads over the set's lifetime, reloads included.
    pub fn loads(&self) -> u64 {
        self.loads
    }

    /// Regions unloaded to stay under the residency bound.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Whether the named region is currently loaded.
    pub fn is_resident(&self, name: &str) -> bool {
        self.regions
            .iter()
            .any(|r| r.entry.name == name && r.engine.is_some())
    }

    /// Sample the region covering a point, loading its raster on demand.
    ///
    /// `lon` before `lat`, matching the model-level query convention.
    pub fn query(&mut self, lon: f64, lat: f64) -> Result<RegionSample> {
        let Some(index) = self
            .regions
            .iter()
            .position(|r| r.rect.contains(lat, lon))
        else {
            return Ok(RegionSample::Outside);
        };
        self.ensure_loaded(index)?;
        let region = &mut self.regions[index];
        let Some(engine) = region.engine.as_mut() else {
            return Err(TerrainError::Configuration(format!(
                "region {} failed to stay resident",
                region.entry.name
            )));
        };
        let (terrain_band, building_band) = region.entry.format.bands();
        let terrain_m = match engine.value_at(lat, lon, terrain_band)? {
            Sample::Valid(v) => v,
            // The advertised footprint can overstate the raster slightly;
            // either way the region has no ground answer here.
            Sample::Outside => return Ok(RegionSample::Outside),
            Sample::NoData(_) => return Ok(RegionSample::NoData),
        };
        match engine.value_at(lat, lon, building_band)? {
            Sample::Valid(top_m) => Ok(RegionSample::Building {
                terrain_m,
                building_m: top_m - terrain_m,
            }),
            _ => Ok(RegionSample::Bare { terrain_m }),
        }
    }

    fn ensure_loaded(&mut self, index: usize) -> Result<()> {
        if self.regions[index].engine.is_some() {
            return Ok(());
        }
        while self.load_order.len() >= self.resident_max {
            if let Some(oldest) = self.load_order.pop_front() {
                self.regions[oldest].engine = None;
                self.evictions += 1;
                info!(region = %self.regions[oldest].entry.name, "region unloaded");
            }
        }
        let region = &mut self.regions[index];
        let mut config = RasterConfig::file(region.dir.join(&region.entry.file));
        config.bands = 2;
        region.engine = Some(RasterSource::new(config)?);
        self.load_order.push_back(index);
        self.loads += 1;
        info!(
            region = %region.entry.name,
            resident = self.load_order.len(),
            "region loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_format_band_order() {
        assert_eq!(RegionFormat::TerrainBuilding.bands(), (1, 2));
        assert_eq!(RegionFormat::BuildingTerrain.bands(), (2, 1));
    }

    #[test]
    fn test_region_entry_parses() {
        let entry: RegionEntry = serde_json::from_str(
            r#"{
                "name": "seattle",
                "dir": "lidar/seattle",
                "file": "seattle_dsm.tif",
                "format": "building_terrain",
                "bounds": {
                    "lat_min": 47.2,
                    "lon_min": -122.6,
                    "lat_max": 47.8,
                    "lon_max": -122.0
                }
            }"#,
        )
        .unwrap();
        assert_eq!(entry.name, "seattle");
        assert_eq!(entry.format, RegionFormat::BuildingTerrain);
        let rect = BoundRect::from(entry.bounds);
        assert!(rect.contains(47.5, -122.3));
        assert!(!rect.contains(47.5, -121.9));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = serde_json::from_str::<RegionFormat>(r#""sideways""#).unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }
}
