//! North-up geodetic grid transforms.

use crate::bounds::BoundRect;
use crate::error::SourceError;
use crate::Result;

/// Affine mapping between geographic degrees and pixel space for one
/// north-up, axis-aligned raster (a whole file or a tile sub-window).
///
/// Rows run north to south with row 0 at the north edge; columns run west
/// to east. Offsets are kept in pixel units: `lat_origin_px` is the north
/// edge latitude times `ppd_lat`, `lon_origin_px` the west edge longitude
/// times `ppd_lon`. `margin` is a pixel count trimmed from every edge of
/// the authoritative [`BoundRect`], used when a source's stated extent
/// overlaps its neighbors; it never affects [`pixel_of`](Self::pixel_of).
#[derive(Debug, Clone, PartialEq)]
pub struct GridTransform {
    ppd_lat: f64,
    ppd_lon: f64,
    lat_origin_px: f64,
    lon_origin_px: f64,
    rows: u32,
    cols: u32,
    margin: f64,
}

impl GridTransform {
    /// Build a transform from a raster's declared parameters.
    ///
    /// `north_deg`/`west_deg` locate the north-west corner; `ppd_lat` and
    /// `ppd_lon` are pixels per degree. Anything that does not describe a
    /// north-up, axis-aligned grid of at least one pixel is rejected.
    pub fn new(
        north_deg: f64,
        west_deg: f64,
        ppd_lat: f64,
        ppd_lon: f64,
        rows: u32,
        cols: u32,
    ) -> Result<Self> {
        if !(ppd_lat.is_finite() && ppd_lon.is_finite() && ppd_lat > 0.0 && ppd_lon > 0.0) {
            return Err(SourceError::Configuration(format!(
                "not a north-up grid: pixels per degree ({ppd_lat}, {ppd_lon}) must be positive"
            )));
        }
        if !(north_deg.is_finite() && west_deg.is_finite()) {
            return Err(SourceError::Configuration(format!(
                "bad raster origin ({north_deg}, {west_deg})"
            )));
        }
        if rows == 0 || cols == 0 {
            return Err(SourceError::Configuration(format!(
                "empty raster: {rows} x {cols} pixels"
            )));
        }
        Ok(Self {
            ppd_lat,
            ppd_lon,
            lat_origin_px: north_deg * ppd_lat,
            lon_origin_px: west_deg * ppd_lon,
            rows,
            cols,
            margin: 0.0,
        })
    }

    /// Pixels per degree of latitude.
    pub fn ppd_lat(&self) -> f64 {
        self.ppd_lat
    }

    /// Pixels per degree of longitude.
    pub fn ppd_lon(&self) -> f64 {
        self.ppd_lon
    }

    /// Number of pixel rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of pixel columns.
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Margin in pixels trimmed from every edge of the bound rectangle.
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Set the margin directly (clamped to be non-negative).
    pub fn set_margin(&mut self, margin: f64) {
        self.margin = margin.max(0.0);
    }

    /// Latitude of the north edge in degrees.
    pub fn north_deg(&self) -> f64 {
        self.lat_origin_px / self.ppd_lat
    }

    /// Longitude of the west edge in degrees.
    pub fn west_deg(&self) -> f64 {
        self.lon_origin_px / self.ppd_lon
    }

    /// Rebase a longitude by whole turns into `[west, west + 360)`.
    fn rebase_lon(&self, lon: f64) -> f64 {
        let west = self.west_deg();
        west + (lon - west).rem_euclid(360.0)
    }

    /// Map a geographic point to integer pixel indices.
    ///
    /// The longitude is rebased across the ±180° seam first. Indices that
    /// land exactly one pixel outside the raster clamp into range, which
    /// absorbs the rounding slack of callers that tested containment in
    /// continuous coordinates. Indices further out are a caller bug and
    /// fail with [`SourceError::InternalConsistency`]. The margin plays no
    /// part here.
    pub fn pixel_of(&self, lat: f64, lon: f64) -> Result<(u32, u32)> {
        let lon = self.rebase_lon(lon);
        let row = (self.lat_origin_px - lat * self.ppd_lat).floor();
        let col = (lon * self.ppd_lon - self.lon_origin_px).floor();
        let row = clamp_index(row as i64, self.rows, "row")?;
        let col = clamp_index(col as i64, self.cols, "column")?;
        Ok((row, col))
    }

    /// Whether a point lies inside the margin-trimmed raster extent.
    ///
    /// Computed in continuous pixel units because the margin may be
    /// fractional; half-open, so abutting rasters with consistent margins
    /// partition the plane.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let lon = self.rebase_lon(lon);
        let row = self.lat_origin_px - lat * self.ppd_lat;
        let col = lon * self.ppd_lon - self.lon_origin_px;
        row >= self.margin
            && row < self.rows as f64 - self.margin
            && col >= self.margin
            && col < self.cols as f64 - self.margin
    }

    /// The geographic rectangle this raster is authoritative for, margin
    /// trimmed from every edge.
    pub fn bound_rect(&self) -> BoundRect {
        BoundRect {
            lat_max: (self.lat_origin_px - self.margin) / self.ppd_lat,
            lat_min: (self.lat_origin_px - (self.rows as f64 - self.margin)) / self.ppd_lat,
            lon_min: (self.lon_origin_px + self.margin) / self.ppd_lon,
            lon_max: (self.lon_origin_px + self.cols as f64 - self.margin) / self.ppd_lon,
        }
    }

    /// Derive the transform for a pixel sub-window, e.g. a cached tile.
    ///
    /// Same resolution, origin shifted by whole pixels, margin zero: tile
    /// boundaries are always integral even when the file margin is not.
    pub fn sub_window(&self, row0: u32, col0: u32, rows: u32, cols: u32) -> GridTransform {
        GridTransform {
            ppd_lat: self.ppd_lat,
            ppd_lon: self.ppd_lon,
            lat_origin_px: self.lat_origin_px - row0 as f64,
            lon_origin_px: self.lon_origin_px + col0 as f64,
            rows,
            cols,
            margin: 0.0,
        }
    }

    /// Round the resolution to the nearest multiple of `step` pixels per
    /// degree, preserving the geographic origin.
    ///
    /// Real-world files often state a resolution like 3600.3 where the
    /// product defines 3600.5; snapping makes neighboring tiles agree
    /// exactly. The origin offsets are recomputed in degrees against the
    /// new resolution and snapped to the same step grid in pixel units, so
    /// the corner position does not drift. A non-positive `step` leaves
    /// the transform untouched.
    pub fn round_resolution(&mut self, step: f64) {
        if !(step.is_finite() && step > 0.0) {
            return;
        }
        let north = self.north_deg();
        let west = self.west_deg();
        let ppd_lat = round_to_multiple(self.ppd_lat, step);
        let ppd_lon = round_to_multiple(self.ppd_lon, step);
        if ppd_lat <= 0.0 || ppd_lon <= 0.0 {
            return;
        }
        self.ppd_lat = ppd_lat;
        self.ppd_lon = ppd_lon;
        self.lat_origin_px = round_to_multiple(north * ppd_lat, step);
        self.lon_origin_px = round_to_multiple(west * ppd_lon, step);
    }

    /// Set the margin so that everything outside the whole-degree grid is
    /// excluded from the bound rectangle.
    ///
    /// Each raster edge is measured against its nearest whole-degree line;
    /// the margin becomes the largest overhang, in pixels. Sources whose
    /// stated extent includes a half-pixel border shared with neighboring
    /// tiles come out with a margin of exactly 0.5 after
    /// [`round_resolution`](Self::round_resolution).
    pub fn snap_margin_to_degree_grid(&mut self) {
        let north = overhang(self.lat_origin_px, self.ppd_lat);
        let south = overhang(self.lat_origin_px - self.rows as f64, self.ppd_lat);
        let west = overhang(self.lon_origin_px, self.ppd_lon);
        let east = overhang(self.lon_origin_px + self.cols as f64, self.ppd_lon);
        self.margin = north.max(south).max(west).max(east);
    }
}

/// Distance in pixels from an edge position to its nearest whole-degree
/// line.
fn overhang(edge_px: f64, ppd: f64) -> f64 {
    let line_px = (edge_px / ppd).round() * ppd;
    (edge_px - line_px).abs()
}

fn round_to_multiple(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

/// Validate a floored pixel index, allowing one pixel of rounding slack.
fn clamp_index(index: i64, extent: u32, axis: &str) -> Result<u32> {
    let n = extent as i64;
    if (0..n).contains(&index) {
        Ok(index as u32)
    } else if index == -1 {
        Ok(0)
    } else if index == n {
        Ok(extent - 1)
    } else {
        Err(SourceError::InternalConsistency(format!(
            "{axis} index {index} is more than one pixel outside 0..{n}"
        )))
    }
}
