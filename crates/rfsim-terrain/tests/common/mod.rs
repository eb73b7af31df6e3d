//! GeoTIFF fixture builders shared by the integration tests.

use std::fs::File;
use std::path::Path;
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GDAL_NODATA: u16 = 42113;

/// Geometry of a fixture raster: north-west corner and resolution.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub north: f64,
    pub west: f64,
    pub ppd: f64,
    pub rows: u32,
    pub cols: u32,
}

impl Geometry {
    pub fn pixel_count(&self) -> usize {
        (self.rows * self.cols) as usize
    }

    /// Geographic center of a pixel, `(lat, lon)`.
    pub fn at(&self, row: u32, col: u32) -> (f64, f64) {
        (
            self.north - (f64::from(row) + 0.5) / self.ppd,
            self.west + (f64::from(col) + 0.5) / self.ppd,
        )
    }
}

/// Write a gray float32 GeoTIFF with one page per band. Geo tags go on
/// the first page only; each band carries its own optional no-data tag.
pub fn write_f32(path: &Path, geom: Geometry, bands: &[(Vec<f32>, Option<f32>)]) {
    let file = File::create(path).unwrap();
    let mut tiff = TiffEncoder::new(file).unwrap();
    for (page, (data, nodata)) in bands.iter().enumerate() {
        assert_eq!(data.len(), geom.pixel_count());
        let mut image = tiff.new_image::<Gray32Float>(geom.cols, geom.rows).unwrap();
        image.rows_per_strip(16).unwrap();
        if page == 0 {
            let scale = 1.0 / geom.ppd;
            image
                .encoder()
                .write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &[scale, scale, 0.0][..])
                .unwrap();
            image
                .encoder()
                .write_tag(
                    Tag::Unknown(TAG_MODEL_TIEPOINT),
                    &[0.0, 0.0, 0.0, geom.west, geom.north, 0.0][..],
                )
                .unwrap();
        }
        if let Some(value) = nodata {
            image
                .encoder()
                .write_tag(Tag::Unknown(TAG_GDAL_NODATA), format!("{value}").as_str())
                .unwrap();
        }
        image.write_data(data).unwrap();
    }
}

/// Fill a raster so each pixel encodes its own position:
/// `base + row * 1000 + col`.
pub fn indexed_grid(geom: Geometry, base: f32) -> Vec<f32> {
    (0..geom.rows)
        .flat_map(|row| (0..geom.cols).map(move |col| base + row as f32 * 1000.0 + col as f32))
        .collect()
}
