//! Geographic and pixel-space rectangles.

/// The latitude/longitude rectangle a raster file or tile is authoritative
/// for, edges trimmed by any configured margin.
///
/// Membership follows the half-open rule in pixel space (row and column
/// low edges inclusive, high edges exclusive). Rows grow southward, so in
/// degrees the north and west edges are inclusive while the south and
/// east edges are exclusive: two rasters sharing an edge claim every
/// boundary point exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundRect {
    /// Southern edge in degrees (exclusive).
    pub lat_min: f64,
    /// Western edge in degrees (inclusive).
    pub lon_min: f64,
    /// Northern edge in degrees (inclusive).
    pub lat_max: f64,
    /// Eastern edge in degrees (exclusive).
    pub lon_max: f64,
}

impl BoundRect {
    /// Whether a point lies inside this rectangle.
    ///
    /// The longitude is rebased by whole turns into the rectangle's own
    /// 360° window first, so data crossing the ±180° seam tests correctly.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let lon = self.lon_min + (lon - self.lon_min).rem_euclid(360.0);
        lat > self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon < self.lon_max
    }
}

/// A rectangle of pixel indices within one raster file, inclusive of
/// `row0`/`col0` and exclusive of `row1`/`col1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// First row.
    pub row0: u32,
    /// First column.
    pub col0: u32,
    /// One past the last row.
    pub row1: u32,
    /// One past the last column.
    pub col1: u32,
}

impl PixelRect {
    /// Number of rows covered.
    pub fn rows(&self) -> u32 {
        self.row1 - self.row0
    }

    /// Number of columns covered.
    pub fn cols(&self) -> u32 {
        self.col1 - self.col0
    }

    /// Whether a pixel index falls inside this rectangle.
    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.row0 && row < self.row1 && col >= self.col0 && col < self.col1
    }
}
