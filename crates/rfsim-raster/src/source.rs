//! The tile-caching raster source engine.

use crate::bounds::{BoundRect, PixelRect};
use crate::cache::LruCache;
use crate::error::SourceError;
use crate::names::{NameResolver, PatternResolver, ProbeResolver};
use crate::pixel::{Pixel, Sample};
use crate::reader::{FileMetadata, OpenRaster};
use crate::transform::GridTransform;
use crate::Result;
use glob::Pattern;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Default maximum side of a cached tile, in pixels.
pub const DEFAULT_MAX_TILE_SIZE: u32 = 1000;
/// Default capacity of the decoded-tile cache, in tiles.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 50;
/// Default bound on simultaneously open raster files.
pub const DEFAULT_MAX_OPEN_FILES: usize = 20;

/// How a source maps coordinates to files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameStrategy {
    /// One monolithic raster file.
    Single,
    /// Tile names derived from a template; see [`PatternResolver`].
    Pattern(String),
    /// Tile footprints probed from every file matching a glob; see
    /// [`ProbeResolver`].
    Probe(String),
}

/// Whether point queries go through the decoded-tile cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Cache decoded tiles; wins when consecutive queries cluster.
    #[default]
    Tiled,
    /// Decode around each query and keep nothing; wins for scattered
    /// one-off access.
    Direct,
}

/// Construction parameters for a [`RasterSource`].
#[derive(Debug, Clone)]
pub struct RasterConfig {
    /// The raster file ([`NameStrategy::Single`]) or the tile directory.
    pub path: PathBuf,
    /// How coordinates map to file names.
    pub strategy: NameStrategy,
    /// Declared band count; every file must carry at least this many pages.
    pub bands: u32,
    /// Maximum cached-tile side in pixels.
    pub max_tile_size: u32,
    /// Decoded-tile cache capacity.
    pub tile_cache_capacity: usize,
    /// Bound on simultaneously open files.
    pub max_open_files: usize,
    /// Read mode.
    pub read_mode: ReadMode,
    /// Per-band no-data overrides as `(band, value)` pairs.
    pub nodata_overrides: Vec<(u32, f64)>,
}

impl RasterConfig {
    /// Configuration for a single monolithic raster file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::defaults()
        }
    }

    /// Configuration for a directory of tiles named after a template.
    pub fn tiled(dir: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            path: dir.into(),
            strategy: NameStrategy::Pattern(template.into()),
            ..Self::defaults()
        }
    }

    /// Configuration for a directory of tiles with no usable name
    /// convention, probed at construction.
    pub fn probed(dir: impl Into<PathBuf>, glob: impl Into<String>) -> Self {
        Self {
            path: dir.into(),
            strategy: NameStrategy::Probe(glob.into()),
            ..Self::defaults()
        }
    }

    fn defaults() -> Self {
        Self {
            path: PathBuf::new(),
            strategy: NameStrategy::Single,
            bands: 1,
            max_tile_size: DEFAULT_MAX_TILE_SIZE,
            tile_cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            read_mode: ReadMode::default(),
            nodata_overrides: Vec::new(),
        }
    }
}

/// Key of one cached tile: band, tile-aligned pixel origin within the
/// owning file, and the file's base name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// 1-based band.
    pub band: u32,
    /// First row of the tile within the file.
    pub row0: u32,
    /// First column of the tile within the file.
    pub col0: u32,
    /// Base name of the owning file.
    pub name: String,
}

/// One cached tile: a decoded pixel window plus the geometry to query it.
#[derive(Debug)]
pub struct TileInfo<P> {
    transform: GridTransform,
    rect: BoundRect,
    file: Rc<FileMetadata>,
    data: Vec<P>,
}

impl<P: Pixel> TileInfo<P> {
    /// Transform of the tile window (margin-free, integral edges).
    pub fn transform(&self) -> &GridTransform {
        &self.transform
    }

    /// Geographic rectangle the tile's pixels span.
    pub fn bound_rect(&self) -> BoundRect {
        self.rect
    }

    /// Metadata of the file the tile was read from.
    pub fn file(&self) -> &FileMetadata {
        &self.file
    }

    /// Decoded pixels, row-major.
    pub fn data(&self) -> &[P] {
        &self.data
    }

    /// Raw pixel at a geographic point inside the tile.
    pub fn sample(&self, lat: f64, lon: f64) -> Result<P> {
        let (row, col) = self.transform.pixel_of(lat, lon)?;
        let index = row as usize * self.transform.cols() as usize + col as usize;
        self.data.get(index).copied().ok_or_else(|| {
            SourceError::InternalConsistency(format!(
                "tile index {index} out of range for {} decoded pixels",
                self.data.len()
            ))
        })
    }
}

/// Running counters for one source instance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceStats {
    /// Point queries served.
    pub queries: u64,
    /// Queries answered by the most recent tile without a cache lookup.
    pub recent_tile_hits: u64,
    /// Tile-cache hits beyond the recent-tile fast path.
    pub tile_hits: u64,
    /// Tiles decoded from disk.
    pub tile_loads: u64,
    /// File handles opened.
    pub file_opens: u64,
    /// Queries outside every known file.
    pub misses: u64,
}

/// Cached point access to one raster source.
///
/// A source is either a single monolithic file or a directory of tiles
/// located through a [`NameResolver`]. Two LRU caches bound the working
/// set: decoded tile windows and open file handles. File metadata is
/// gathered lazily, once per file, and kept for the life of the source.
///
/// The engine is deliberately single-threaded (`Rc`, `&mut self`); give
/// each worker thread its own instance rather than sharing one behind a
/// lock.
pub struct RasterSource<P: Pixel> {
    dir: PathBuf,
    strategy: NameStrategy,
    resolver: Option<Box<dyn NameResolver>>,
    single_name: Option<String>,
    bands: u32,
    max_tile_size: u32,
    read_mode: ReadMode,
    nodata_overrides: HashMap<u32, f64>,
    adjust: Option<Box<dyn Fn(&mut GridTransform)>>,
    /// Known base names; `None` until the file's metadata is built.
    files: HashMap<String, Option<Rc<FileMetadata>>>,
    all_discovered: bool,
    handles: LruCache<String, OpenRaster>,
    tiles: LruCache<TileKey, TileInfo<P>>,
    stats: SourceStats,
}

impl<P: Pixel> fmt::Debug for RasterSource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterSource")
            .field("dir", &self.dir)
            .field("strategy", &self.strategy)
            .field("single_name", &self.single_name)
            .field("bands", &self.bands)
            .field("max_tile_size", &self.max_tile_size)
            .field("read_mode", &self.read_mode)
            .field("nodata_overrides", &self.nodata_overrides)
            .field("all_discovered", &self.all_discovered)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<P: Pixel> RasterSource<P> {
    /// Build a source from its configuration.
    ///
    /// Monolithic sources open and validate their file eagerly so a bad
    /// path fails here; tile directories validate existence only, and
    /// individual tiles load on first touch.
    pub fn new(config: RasterConfig) -> Result<Self> {
        if config.bands == 0 {
            return Err(SourceError::Configuration(
                "a raster source needs at least one band".into(),
            ));
        }
        let (dir, single_name) = match &config.strategy {
            NameStrategy::Single => {
                if !config.path.is_file() {
                    return Err(SourceError::Configuration(format!(
                        "raster file {} does not exist",
                        config.path.display()
                    )));
                }
                let name = config
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        SourceError::Configuration(format!(
                            "unusable raster file name {}",
                            config.path.display()
                        ))
                    })?;
                let dir = config
                    .path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                (dir, Some(name))
            }
            NameStrategy::Pattern(_) | NameStrategy::Probe(_) => {
                if !config.path.is_dir() {
                    return Err(SourceError::Configuration(format!(
                        "tile directory {} does not exist",
                        config.path.display()
                    )));
                }
                (config.path.clone(), None)
            }
        };
        let mut source = Self {
            dir,
            strategy: config.strategy,
            resolver: None,
            single_name,
            bands: config.bands,
            max_tile_size: config.max_tile_size.max(1),
            read_mode: config.read_mode,
            nodata_overrides: config.nodata_overrides.iter().copied().collect(),
            adjust: None,
            files: HashMap::new(),
            all_discovered: false,
            handles: LruCache::new(config.max_open_files),
            tiles: LruCache::new(config.tile_cache_capacity),
            stats: SourceStats::default(),
        };
        source.build_resolver()?;
        if let Some(name) = source.single_name.clone() {
            source.metadata_by_name(&name)?;
            source.all_discovered = true;
        }
        Ok(source)
    }

    fn build_resolver(&mut self) -> Result<()> {
        self.resolver = match &self.strategy {
            NameStrategy::Single => None,
            NameStrategy::Pattern(template) => Some(Box::new(PatternResolver::new(
                &self.dir, template,
            )?) as Box<dyn NameResolver>),
            NameStrategy::Probe(glob) => Some(Box::new(ProbeResolver::scan(
                &self.dir,
                glob,
                self.adjust.as_deref(),
            )?)),
        };
        Ok(())
    }

    /// Declared band count.
    pub fn bands(&self) -> u32 {
        self.bands
    }

    /// Read mode in effect.
    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    /// Running counters.
    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Number of decoded tiles currently cached.
    pub fn cached_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Number of files currently held open.
    pub fn open_files(&self) -> usize {
        self.handles.len()
    }

    /// Drop every decoded tile and open handle, keeping file metadata.
    pub fn clear_caches(&mut self) {
        self.tiles.clear();
        self.handles.clear();
    }

    /// Override the no-data sentinel for one band.
    ///
    /// A pixel equal to either the file's intrinsic sentinel or the
    /// override reports as no data, and the override is the value handed
    /// back in [`Sample::NoData`].
    pub fn set_nodata_override(&mut self, band: u32, value: f64) {
        self.nodata_overrides.insert(band, value);
    }

    /// Install a transform rectifier and drop everything derived from the
    /// old transforms.
    ///
    /// The adjuster runs exactly once per file, when its metadata is
    /// built, so installing one invalidates all metadata, cached tiles and
    /// open handles. Probe resolvers are rebuilt because their footprints
    /// derive from the adjusted transforms; a monolithic source rebuilds
    /// its metadata eagerly so errors surface here.
    pub fn set_transform_adjuster(
        &mut self,
        adjust: impl Fn(&mut GridTransform) + 'static,
    ) -> Result<()> {
        self.adjust = Some(Box::new(adjust));
        for meta in self.files.values_mut() {
            *meta = None;
        }
        self.clear_caches();
        if matches!(self.strategy, NameStrategy::Probe(_)) {
            self.build_resolver()?;
        }
        if let Some(name) = self.single_name.clone() {
            self.metadata_by_name(&name)?;
        }
        Ok(())
    }

    /// Sample one band at a geographic point.
    ///
    /// [`Sample::Outside`] means no known file is authoritative for the
    /// point and [`Sample::NoData`] that the pixel holds the band's
    /// sentinel; both drive fallback rather than failure. A band outside
    /// `1..=bands` is a caller bug and fails fatally.
    pub fn value_at(&mut self, lat: f64, lon: f64, band: u32) -> Result<Sample<P>> {
        self.check_band(band)?;
        self.stats.queries += 1;
        if self.read_mode == ReadMode::Tiled {
            if let Some(sample) = self.recent_tile_value(lat, lon, band)? {
                return Ok(sample);
            }
        }
        let Some(meta) = self.metadata_for_point(lat, lon)? else {
            self.stats.misses += 1;
            return Ok(Sample::Outside);
        };
        if !meta.transform().contains(lat, lon) {
            self.stats.misses += 1;
            return Ok(Sample::Outside);
        }
        let raw = match self.read_mode {
            ReadMode::Direct => {
                let (row, col) = meta.transform().pixel_of(lat, lon)?;
                self.handle_for(&meta)?
                    .read_pixel::<P>(band as usize - 1, row, col)?
            }
            ReadMode::Tiled => {
                let tile = self.tile_containing(&meta, lat, lon, band)?;
                tile.sample(lat, lon)?
            }
        };
        Ok(self.classify(&meta, band, raw))
    }

    /// The cached tile covering a point, decoding it on a miss.
    ///
    /// `None` when no known file is authoritative for the point. Callers
    /// that walk a neighborhood can index many pixels out of one decoded
    /// tile instead of paying a query per pixel.
    pub fn tile_at(&mut self, lat: f64, lon: f64, band: u32) -> Result<Option<&TileInfo<P>>> {
        self.check_band(band)?;
        let Some(meta) = self.metadata_for_point(lat, lon)? else {
            return Ok(None);
        };
        if !meta.transform().contains(lat, lon) {
            return Ok(None);
        }
        self.tile_containing(&meta, lat, lon, band).map(Some)
    }

    fn check_band(&self, band: u32) -> Result<()> {
        if band == 0 || band > self.bands {
            return Err(SourceError::InternalConsistency(format!(
                "band {band} outside 1..={}",
                self.bands
            )));
        }
        Ok(())
    }

    /// Fast path: answer from the most recent tile without touching cache
    /// order or the name resolver. Both the tile's own rectangle and the
    /// owning file's margin-trimmed rectangle must contain the point,
    /// because tile edges are integral while the file margin may not be.
    fn recent_tile_value(&mut self, lat: f64, lon: f64, band: u32) -> Result<Option<Sample<P>>> {
        let hit = match self.tiles.recent() {
            Some((key, tile))
                if key.band == band
                    && tile.rect.contains(lat, lon)
                    && tile.file.transform().contains(lat, lon) =>
            {
                Some((tile.sample(lat, lon)?, tile.file.clone()))
            }
            _ => None,
        };
        let Some((raw, meta)) = hit else {
            return Ok(None);
        };
        self.stats.recent_tile_hits += 1;
        Ok(Some(self.classify(&meta, band, raw)))
    }

    /// Classify a raw pixel against the band's no-data sentinels: the
    /// file's intrinsic one and the configured override both count, and
    /// NaN sentinels match NaN pixels.
    fn classify(&self, meta: &FileMetadata, band: u32, raw: P) -> Sample<P> {
        let matches_sentinel = |sentinel: Option<f64>| match sentinel {
            Some(value) => {
                let sentinel = P::from_f64(value);
                raw == sentinel || (raw.is_nan() && sentinel.is_nan())
            }
            None => false,
        };
        let over = self.nodata_overrides.get(&band).copied();
        if matches_sentinel(meta.nodata(band)) || matches_sentinel(over) {
            Sample::NoData(over.map(P::from_f64).unwrap_or(raw))
        } else {
            Sample::Valid(raw)
        }
    }

    /// Metadata of the file authoritative for a point, or `None` when the
    /// resolver produces no name or the named file does not exist.
    fn metadata_for_point(&mut self, lat: f64, lon: f64) -> Result<Option<Rc<FileMetadata>>> {
        let name = match (&mut self.resolver, &self.single_name) {
            (Some(resolver), _) => match resolver.name_for(lat, lon)? {
                Some(name) => name,
                None => return Ok(None),
            },
            (None, Some(name)) => name.clone(),
            (None, None) => return Ok(None),
        };
        if !self.known_file(&name)? {
            return Ok(None);
        }
        self.metadata_by_name(&name).map(Some)
    }

    /// Whether a file of this name exists in the source directory. The
    /// directory is scanned at most once over the source's lifetime;
    /// afterwards, unknown names answer `false` without touching the
    /// filesystem.
    fn known_file(&mut self, name: &str) -> Result<bool> {
        if self.files.contains_key(name) {
            return Ok(true);
        }
        if self.all_discovered {
            return Ok(false);
        }
        self.scan_directory()?;
        Ok(self.files.contains_key(name))
    }

    fn scan_directory(&mut self) -> Result<()> {
        let Some(resolver) = &self.resolver else {
            self.all_discovered = true;
            return Ok(());
        };
        let fnmatch = resolver.fnmatch_pattern();
        let pattern = Pattern::new(&fnmatch).map_err(|e| {
            SourceError::Configuration(format!("discovery glob {fnmatch:?} is invalid: {e}"))
        })?;
        for entry in fs::read_dir(&self.dir).map_err(|e| SourceError::Io {
            path: self.dir.clone(),
            source: e,
        })? {
            let entry = entry.map_err(|e| SourceError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if pattern.matches(name) {
                self.files.entry(name.to_string()).or_insert(None);
            }
        }
        self.all_discovered = true;
        debug!(
            dir = %self.dir.display(),
            files = self.files.len(),
            "discovered matching rasters"
        );
        Ok(())
    }

    fn metadata_by_name(&mut self, name: &str) -> Result<Rc<FileMetadata>> {
        if let Some(Some(meta)) = self.files.get(name) {
            return Ok(meta.clone());
        }
        let meta = Rc::new(FileMetadata::build(
            &self.dir,
            name,
            self.bands,
            self.adjust.as_deref(),
        )?);
        debug!(file = name, pixel_type = %meta.pixel_type(), "raster metadata built");
        self.files.insert(name.to_string(), Some(meta.clone()));
        Ok(meta)
    }

    fn handle_for(&mut self, meta: &FileMetadata) -> Result<&mut OpenRaster> {
        let key = meta.name().to_string();
        if !self.handles.contains(&key) {
            let raster = OpenRaster::open(meta.path())?;
            self.stats.file_opens += 1;
            debug!(file = %key, open = self.handles.len() + 1, "raster file opened");
            return Ok(self.handles.add(key, raster));
        }
        self.handles.get_mut(&key).ok_or_else(|| {
            SourceError::InternalConsistency(format!("handle for {key} vanished from the cache"))
        })
    }

    fn tile_containing(
        &mut self,
        meta: &Rc<FileMetadata>,
        lat: f64,
        lon: f64,
        band: u32,
    ) -> Result<&TileInfo<P>> {
        let (row, col) = meta.transform().pixel_of(lat, lon)?;
        let key = tile_key(meta, band, row, col, self.max_tile_size);
        if self.tiles.contains(&key) {
            self.stats.tile_hits += 1;
            return self.tiles.get(&key).ok_or_else(|| {
                SourceError::InternalConsistency(format!(
                    "tile {key:?} vanished from the cache"
                ))
            });
        }
        let tile = self.read_tile(meta, band, &key)?;
        self.stats.tile_loads += 1;
        debug!(
            file = %key.name,
            band,
            row0 = key.row0,
            col0 = key.col0,
            rows = tile.transform.rows(),
            cols = tile.transform.cols(),
            cached = self.tiles.len() + 1,
            "tile decoded"
        );
        Ok(self.tiles.add(key, tile))
    }

    fn read_tile(&mut self, meta: &Rc<FileMetadata>, band: u32, key: &TileKey) -> Result<TileInfo<P>> {
        let offset = meta.transform().margin().floor() as i64;
        let row1 = tile_end(key.row0, offset, self.max_tile_size)
            .min(i64::from(meta.transform().rows())) as u32;
        let col1 = tile_end(key.col0, offset, self.max_tile_size)
            .min(i64::from(meta.transform().cols())) as u32;
        let window = PixelRect {
            row0: key.row0,
            col0: key.col0,
            row1,
            col1,
        };
        let data = self
            .handle_for(meta)?
            .read_window::<P>(band as usize - 1, window)?;
        let transform = meta
            .transform()
            .sub_window(key.row0, key.col0, window.rows(), window.cols());
        let rect = transform.bound_rect();
        Ok(TileInfo {
            transform,
            rect,
            file: meta.clone(),
            data,
        })
    }
}

/// Snap a pixel to its tile's origin. Tiles align to multiples of the
/// tile side shifted by the whole-pixel part of the file margin, so a
/// margin-trimmed file keeps full-size tiles in its interior and thin
/// clipped tiles at the edges.
fn tile_key(meta: &FileMetadata, band: u32, row: u32, col: u32, tile_size: u32) -> TileKey {
    let offset = meta.transform().margin().floor() as i64;
    TileKey {
        band,
        row0: snap_to_tile(row, offset, tile_size),
        col0: snap_to_tile(col, offset, tile_size),
        name: meta.name().to_string(),
    }
}

fn snap_to_tile(index: u32, offset: i64, tile_size: u32) -> u32 {
    let size = i64::from(tile_size);
    let aligned = (i64::from(index) - offset).div_euclid(size) * size + offset;
    aligned.max(0) as u32
}

/// First tile boundary strictly past `start` on the same alignment.
fn tile_end(start: u32, offset: i64, tile_size: u32) -> i64 {
    let size = i64::from(tile_size);
    ((i64::from(start) - offset).div_euclid(size) + 1) * size + offset
}
