//! End-to-end tests of the raster source engine against real GeoTIFF
//! files written into temporary directories.

mod common;

use common::Geometry;
use rfsim_raster::{RasterConfig, RasterSource, ReadMode, Sample, SourceError};
use tempfile::TempDir;

/// A 1-degree tile at 10 pixels per degree.
fn degree_tile(north: f64, west: f64) -> Geometry {
    Geometry {
        north,
        west,
        ppd: 10.0,
        rows: 10,
        cols: 10,
    }
}

const TILE_TEMPLATE: &str = "{latHem:ns}{latDegCeil:02}{lonHem:ew}{lonDegFloor:03}.tif";

#[test]
fn test_monolithic_point_queries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    let geom = degree_tile(48.0, -123.0);
    common::write_f32(&path, geom, &[(common::indexed_grid(geom, 0.0), None)]);

    let mut source: RasterSource<f32> = RasterSource::new(RasterConfig::file(&path)).unwrap();
    assert_eq!(source.value_at(47.95, -122.95, 1).unwrap(), Sample::Valid(0.0));
    assert_eq!(
        source.value_at(47.05, -122.05, 1).unwrap(),
        Sample::Valid(9009.0)
    );
    assert_eq!(
        source.value_at(47.35, -122.65, 1).unwrap(),
        Sample::Valid(6003.0)
    );
    // North and west edges are inclusive.
    assert_eq!(source.value_at(48.0, -123.0, 1).unwrap(), Sample::Valid(0.0));
    // South edge and far-away points are outside.
    assert_eq!(source.value_at(47.0, -122.5, 1).unwrap(), Sample::Outside);
    assert_eq!(source.value_at(50.0, -122.5, 1).unwrap(), Sample::Outside);

    let stats = source.stats();
    assert_eq!(stats.queries, 6);
    assert_eq!(stats.misses, 2);
}

#[test]
fn test_missing_monolithic_file_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let err = RasterSource::<f32>::new(RasterConfig::file(dir.path().join("nope.tif"))).unwrap_err();
    assert!(matches!(err, SourceError::Configuration(_)));
}

#[test]
fn test_tiled_pattern_boundary_partition() {
    let dir = TempDir::new().unwrap();
    let north = degree_tile(48.0, -123.0);
    let south = degree_tile(47.0, -123.0);
    common::write_f32(
        &dir.path().join("n48w123.tif"),
        north,
        &[(common::indexed_grid(north, 0.0), None)],
    );
    common::write_f32(
        &dir.path().join("n47w123.tif"),
        south,
        &[(common::indexed_grid(south, 50000.0), None)],
    );

    let mut source: RasterSource<f32> =
        RasterSource::new(RasterConfig::tiled(dir.path(), TILE_TEMPLATE)).unwrap();
    assert_eq!(
        source.value_at(47.5, -122.5, 1).unwrap(),
        Sample::Valid(5005.0)
    );
    assert_eq!(
        source.value_at(46.5, -122.5, 1).unwrap(),
        Sample::Valid(55005.0)
    );
    // The shared 47-degree line belongs to the southern tile, exactly once.
    assert_eq!(
        source.value_at(47.0, -122.5, 1).unwrap(),
        Sample::Valid(50005.0)
    );
    // A tile the resolver names but the directory lacks is a miss.
    assert_eq!(source.value_at(49.5, -122.5, 1).unwrap(), Sample::Outside);
    assert_eq!(source.stats().misses, 1);
}

#[test]
fn test_tile_cache_eviction_and_stats() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    let geom = Geometry {
        north: 48.0,
        west: -123.0,
        ppd: 40.0,
        rows: 40,
        cols: 40,
    };
    common::write_f32(&path, geom, &[(common::indexed_grid(geom, 0.0), None)]);

    let mut config = RasterConfig::file(&path);
    config.max_tile_size = 24;
    config.tile_cache_capacity = 2;
    let mut source: RasterSource<f32> = RasterSource::new(config).unwrap();
    let mut query = |row: u32, col: u32| {
        let (lat, lon) = geom.at(row, col);
        source.value_at(lat, lon, 1).unwrap()
    };

    // Tile (0, 0) spans two strips of the file; the window read stitches
    // them together.
    assert_eq!(query(8, 8), Sample::Valid(8008.0));
    // Same tile again: recent-tile fast path.
    assert_eq!(query(9, 9), Sample::Valid(9009.0));
    // Two more tiles; capacity 2 evicts the least recently used.
    assert_eq!(query(8, 30), Sample::Valid(8030.0));
    assert_eq!(query(30, 8), Sample::Valid(30008.0));
    // Tile (0, 0) was evicted and must be decoded again.
    assert_eq!(query(8, 8), Sample::Valid(8008.0));
    // Tile (24, 0) is still cached: a plain cache hit, not the fast path.
    assert_eq!(query(25, 9), Sample::Valid(25009.0));

    let stats = source.stats();
    assert_eq!(stats.queries, 6);
    assert_eq!(stats.tile_loads, 4);
    assert_eq!(stats.recent_tile_hits, 1);
    assert_eq!(stats.tile_hits, 1);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.file_opens, 1);
    assert_eq!(source.cached_tiles(), 2);
}

#[test]
fn test_nodata_intrinsic_and_override() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    let geom = degree_tile(48.0, -123.0);
    let mut data = common::indexed_grid(geom, 0.0);
    data[0] = -9999.0;
    data[1] = -500.0;
    data[2] = 7.0;
    common::write_f32(&path, geom, &[(data, Some(-9999.0))]);

    let mut source: RasterSource<f32> = RasterSource::new(RasterConfig::file(&path)).unwrap();
    let (lat, c0) = geom.at(0, 0);
    let (_, c1) = geom.at(0, 1);
    let (_, c2) = geom.at(0, 2);

    // Intrinsic sentinel carries the raw value.
    assert_eq!(source.value_at(lat, c0, 1).unwrap(), Sample::NoData(-9999.0));
    assert_eq!(source.value_at(lat, c1, 1).unwrap(), Sample::Valid(-500.0));

    // With an override, both sentinels match and the override is carried.
    source.set_nodata_override(1, -500.0);
    assert_eq!(source.value_at(lat, c0, 1).unwrap(), Sample::NoData(-500.0));
    assert_eq!(source.value_at(lat, c1, 1).unwrap(), Sample::NoData(-500.0));
    assert_eq!(source.value_at(lat, c2, 1).unwrap(), Sample::Valid(7.0));
}

#[test]
fn test_direct_mode_matches_tiled_mode() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    let geom = Geometry {
        north: 48.0,
        west: -123.0,
        ppd: 40.0,
        rows: 40,
        cols: 40,
    };
    let mut data = common::indexed_grid(geom, 0.0);
    data[(17 * geom.cols + 21) as usize] = -9999.0;
    common::write_f32(&path, geom, &[(data, Some(-9999.0))]);

    let mut tiled: RasterSource<f32> = RasterSource::new(RasterConfig::file(&path)).unwrap();
    let mut config = RasterConfig::file(&path);
    config.read_mode = ReadMode::Direct;
    let mut direct: RasterSource<f32> = RasterSource::new(config).unwrap();

    for (row, col) in [(0, 0), (8, 8), (17, 21), (25, 30), (39, 39)] {
        let (lat, lon) = geom.at(row, col);
        assert_eq!(
            tiled.value_at(lat, lon, 1).unwrap(),
            direct.value_at(lat, lon, 1).unwrap(),
            "pixel ({row}, {col})"
        );
    }
    assert_eq!(direct.stats().tile_loads, 0);
    assert_eq!(direct.cached_tiles(), 0);
    assert!(tiled.stats().tile_loads > 0);
}

#[test]
fn test_probe_resolver_directory() {
    let dir = TempDir::new().unwrap();
    let west_tile = degree_tile(48.0, -123.0);
    let east_tile = degree_tile(48.0, -122.0);
    common::write_f32(
        &dir.path().join("alpha.tif"),
        west_tile,
        &[(common::indexed_grid(west_tile, 0.0), None)],
    );
    common::write_f32(
        &dir.path().join("beta.tif"),
        east_tile,
        &[(common::indexed_grid(east_tile, 70000.0), None)],
    );

    let mut source: RasterSource<f32> =
        RasterSource::new(RasterConfig::probed(dir.path(), "*.tif")).unwrap();
    assert_eq!(
        source.value_at(47.5, -122.5, 1).unwrap(),
        Sample::Valid(5005.0)
    );
    assert_eq!(
        source.value_at(47.5, -121.5, 1).unwrap(),
        Sample::Valid(75005.0)
    );
    // The shared meridian belongs to the eastern tile alone.
    assert_eq!(
        source.value_at(47.5, -122.0, 1).unwrap(),
        Sample::Valid(75000.0)
    );
    assert_eq!(source.value_at(47.5, -120.5, 1).unwrap(), Sample::Outside);
}

#[test]
fn test_probe_of_empty_directory_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let err = RasterSource::<f32>::new(RasterConfig::probed(dir.path(), "*.tif")).unwrap_err();
    assert!(matches!(err, SourceError::Configuration(_)));
}

#[test]
fn test_handle_cache_eviction() {
    let dir = TempDir::new().unwrap();
    let north = degree_tile(48.0, -123.0);
    let south = degree_tile(47.0, -123.0);
    common::write_f32(
        &dir.path().join("n48w123.tif"),
        north,
        &[(common::indexed_grid(north, 0.0), None)],
    );
    common::write_f32(
        &dir.path().join("n47w123.tif"),
        south,
        &[(common::indexed_grid(south, 50000.0), None)],
    );

    let mut config = RasterConfig::tiled(dir.path(), TILE_TEMPLATE);
    config.max_open_files = 1;
    config.read_mode = ReadMode::Direct;
    let mut source: RasterSource<f32> = RasterSource::new(config).unwrap();

    // Alternating files with one handle slot reopens on every switch.
    assert_eq!(
        source.value_at(47.5, -122.5, 1).unwrap(),
        Sample::Valid(5005.0)
    );
    assert_eq!(
        source.value_at(46.5, -122.5, 1).unwrap(),
        Sample::Valid(55005.0)
    );
    assert_eq!(
        source.value_at(47.5, -122.5, 1).unwrap(),
        Sample::Valid(5005.0)
    );
    assert_eq!(source.stats().file_opens, 3);
    assert_eq!(source.open_files(), 1);
}

#[test]
fn test_multi_band_pages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("surface.tif");
    let geom = degree_tile(48.0, -123.0);
    let mut ground = common::indexed_grid(geom, 0.0);
    ground[(3 * geom.cols + 3) as usize] = -9999.0;
    let mut top = common::indexed_grid(geom, 100000.0);
    top[(4 * geom.cols + 4) as usize] = -1.0;

    common::write_f32(&path, geom, &[(ground, Some(-9999.0)), (top, Some(-1.0))]);
    let mut config = RasterConfig::file(&path);
    config.bands = 2;
    let mut source: RasterSource<f32> = RasterSource::new(config).unwrap();

    let (lat, lon) = geom.at(5, 5);
    assert_eq!(source.value_at(lat, lon, 1).unwrap(), Sample::Valid(5005.0));
    assert_eq!(
        source.value_at(lat, lon, 2).unwrap(),
        Sample::Valid(105005.0)
    );

    // Sentinels are per band.
    let (lat, lon) = geom.at(3, 3);
    assert_eq!(source.value_at(lat, lon, 1).unwrap(), Sample::NoData(-9999.0));
    assert_eq!(
        source.value_at(lat, lon, 2).unwrap(),
        Sample::Valid(103003.0)
    );
    let (lat, lon) = geom.at(4, 4);
    assert_eq!(source.value_at(lat, lon, 2).unwrap(), Sample::NoData(-1.0));

    // Bands outside the declared range are caller bugs.
    let err = source.value_at(lat, lon, 3).unwrap_err();
    assert!(matches!(err, SourceError::InternalConsistency(_)));
    let err = source.value_at(lat, lon, 0).unwrap_err();
    assert!(matches!(err, SourceError::InternalConsistency(_)));
}

#[test]
fn test_declared_bands_exceed_pages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    let geom = degree_tile(48.0, -123.0);
    common::write_f32(&path, geom, &[(common::indexed_grid(geom, 0.0), None)]);

    let mut config = RasterConfig::file(&path);
    config.bands = 2;
    let err = RasterSource::<f32>::new(config).unwrap_err();
    assert!(matches!(err, SourceError::Configuration(_)));
}

#[test]
fn test_i16_file_read_as_f32() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    let geom = degree_tile(48.0, -123.0);
    let mut data: Vec<i16> = (0..geom.rows as i16)
        .flat_map(|row| (0..geom.cols as i16).map(move |col| row * 100 + col))
        .collect();
    data[0] = -32768;
    common::write_i16(&path, geom, &data, Some(-32768));

    let mut source: RasterSource<f32> = RasterSource::new(RasterConfig::file(&path)).unwrap();
    let (lat, lon) = geom.at(5, 5);
    assert_eq!(source.value_at(lat, lon, 1).unwrap(), Sample::Valid(505.0));
    let (lat, lon) = geom.at(0, 0);
    assert_eq!(
        source.value_at(lat, lon, 1).unwrap(),
        Sample::NoData(-32768.0)
    );
}

#[test]
fn test_wildcard_template_resolves_newest_revision() {
    let dir = TempDir::new().unwrap();
    let geom = degree_tile(48.0, -123.0);
    common::write_f32(
        &dir.path().join("USGS_13_n48w123_20240327.tif"),
        geom,
        &[(common::indexed_grid(geom, 0.0), None)],
    );
    common::write_f32(
        &dir.path().join("USGS_13_n48w123_20250813.tif"),
        geom,
        &[(common::indexed_grid(geom, 11111.0), None)],
    );

    let template = "USGS_13_{latHem:ns}{latDegCeil:02}{lonHem:ew}{lonDegFloor:03}_*.tif";
    let mut source: RasterSource<f32> =
        RasterSource::new(RasterConfig::tiled(dir.path(), template)).unwrap();
    assert_eq!(
        source.value_at(47.5, -122.5, 1).unwrap(),
        Sample::Valid(16116.0)
    );
}

#[test]
fn test_transform_adjuster_trims_overlap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dem.tif");
    // Half-pixel registered file: stated extent overhangs the whole-degree
    // window by half a pixel on every edge.
    let geom = Geometry {
        north: 25.05,
        west: -81.05,
        ppd: 10.0,
        rows: 11,
        cols: 11,
    };
    common::write_f32(&path, geom, &[(common::indexed_grid(geom, 0.0), None)]);

    let mut source: RasterSource<f32> = RasterSource::new(RasterConfig::file(&path)).unwrap();
    // Raw transform: the overhang strip answers.
    assert!(matches!(
        source.value_at(25.04, -80.5, 1).unwrap(),
        Sample::Valid(_)
    ));

    source
        .set_transform_adjuster(|t| t.snap_margin_to_degree_grid())
        .unwrap();
    // Rectified: the strip outside the degree window is no longer ours.
    assert_eq!(source.value_at(25.04, -80.5, 1).unwrap(), Sample::Outside);
    // The degree line itself is, inclusively at the north edge.
    assert_eq!(source.value_at(25.0, -80.5, 1).unwrap(), Sample::Valid(5.0));
    // The southern degree line belongs to the next tile down.
    assert_eq!(source.value_at(24.0, -80.5, 1).unwrap(), Sample::Outside);
}
