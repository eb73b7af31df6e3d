//! GeoTIFF metadata extraction and chunked pixel reads.

use crate::bounds::PixelRect;
use crate::error::SourceError;
use crate::pixel::{self, Pixel, PixelType};
use crate::transform::GridTransform;
use crate::Result;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

type TiffReader = Decoder<BufReader<File>>;

fn open_decoder(path: &Path) -> Result<TiffReader> {
    let file = File::open(path).map_err(|e| SourceError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    // Large uncompressed strips blow through the default decoder limits.
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    let decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| decode_err(path, e))?
        .with_limits(limits);
    Ok(decoder)
}

fn decode_err(path: &Path, source: tiff::TiffError) -> SourceError {
    SourceError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

/// Read just the grid transform of a raster, via a short-lived decoder.
pub(crate) fn read_transform(path: &Path) -> Result<GridTransform> {
    let mut decoder = open_decoder(path)?;
    transform_from_tags(&mut decoder, path)
}

fn transform_from_tags(decoder: &mut TiffReader, path: &Path) -> Result<GridTransform> {
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|e| {
            SourceError::Configuration(format!(
                "{}: missing or unreadable ModelTiepoint tag: {e}",
                path.display()
            ))
        })?;
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|e| {
            SourceError::Configuration(format!(
                "{}: missing or unreadable ModelPixelScale tag: {e}",
                path.display()
            ))
        })?;
    if tiepoint.len() < 6 || scale.len() < 2 {
        return Err(SourceError::Configuration(format!(
            "{}: malformed georeferencing tags ({} tiepoint values, {} scales)",
            path.display(),
            tiepoint.len(),
            scale.len()
        )));
    }
    if scale[0] <= 0.0 || scale[1] <= 0.0 {
        return Err(SourceError::Configuration(format!(
            "{}: not north-up: pixel scale ({}, {})",
            path.display(),
            scale[0],
            scale[1]
        )));
    }
    let (cols, rows) = decoder.dimensions().map_err(|e| decode_err(path, e))?;
    // The tiepoint georeferences pixel (i, j); rebase to pixel (0, 0).
    let west = tiepoint[3] - tiepoint[0] * scale[0];
    let north = tiepoint[4] + tiepoint[1] * scale[1];
    GridTransform::new(north, west, 1.0 / scale[1], 1.0 / scale[0], rows, cols)
}

fn pixel_type_of(decoder: &mut TiffReader, path: &Path) -> Result<PixelType> {
    let color = decoder.colortype().map_err(|e| decode_err(path, e))?;
    let bits = match color {
        ColorType::Gray(bits) => bits,
        other => {
            return Err(SourceError::Configuration(format!(
                "{}: not a single-sample gray raster: {other:?}",
                path.display()
            )));
        }
    };
    // SampleFormat: 1 unsigned, 2 signed, 3 float; absent means unsigned.
    let format = decoder.get_tag_u32(Tag::SampleFormat).unwrap_or(1);
    match (bits, format) {
        (8, 1) => Ok(PixelType::U8),
        (8, 2) => Ok(PixelType::I8),
        (16, 1) => Ok(PixelType::U16),
        (16, 2) => Ok(PixelType::I16),
        (32, 1) => Ok(PixelType::U32),
        (32, 2) => Ok(PixelType::I32),
        (32, 3) => Ok(PixelType::F32),
        (64, 3) => Ok(PixelType::F64),
        (bits, format) => Err(SourceError::Configuration(format!(
            "{}: unsupported sample type ({bits}-bit, sample format {format})",
            path.display()
        ))),
    }
}

fn read_nodata(decoder: &mut TiffReader) -> Option<f64> {
    let text = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()?;
    text.trim_end_matches('\0').trim().parse().ok()
}

/// Everything worth knowing about one raster file, gathered in a single
/// open-parse-close pass the first time the file is touched.
///
/// Shared behind an `Rc` by the engine's file table and every cached tile
/// read from the file, so invalidation is a matter of dropping references.
#[derive(Debug)]
pub struct FileMetadata {
    name: String,
    path: PathBuf,
    transform: GridTransform,
    nodata: Vec<Option<f64>>,
    bands: u32,
    pixel_type: PixelType,
}

impl FileMetadata {
    /// Open `dir/name` once and collect its transform, per-band no-data
    /// sentinels and sample type. The transform adjuster, when given, runs
    /// before anything is derived from the transform.
    ///
    /// Bands map to TIFF directory pages in order; a file with fewer pages
    /// than the declared band count is rejected.
    pub(crate) fn build(
        dir: &Path,
        name: &str,
        bands: u32,
        adjust: Option<&dyn Fn(&mut GridTransform)>,
    ) -> Result<Self> {
        let path = dir.join(name);
        let mut decoder = open_decoder(&path)?;
        let mut transform = transform_from_tags(&mut decoder, &path)?;
        if let Some(adjust) = adjust {
            adjust(&mut transform);
        }
        let pixel_type = pixel_type_of(&mut decoder, &path)?;
        let mut nodata = Vec::with_capacity(bands as usize);
        for page in 0..bands as usize {
            if decoder.seek_to_image(page).is_err() {
                return Err(SourceError::Configuration(format!(
                    "{}: {} TIFF pages but {bands} bands declared",
                    path.display(),
                    page
                )));
            }
            nodata.push(read_nodata(&mut decoder));
        }
        Ok(Self {
            name: name.to_string(),
            path,
            transform,
            nodata,
            bands,
            pixel_type,
        })
    }

    /// Base file name within the source directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Grid transform, adjuster already applied.
    pub fn transform(&self) -> &GridTransform {
        &self.transform
    }

    /// Number of bands the source declared.
    pub fn bands(&self) -> u32 {
        self.bands
    }

    /// Sample type stored in the file.
    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Intrinsic no-data sentinel of a band (1-based), if the file has one.
    pub fn nodata(&self, band: u32) -> Option<f64> {
        let index = (band as usize).checked_sub(1)?;
        self.nodata.get(index).copied().flatten()
    }
}

/// An open raster decoder plus the band page it is seeked to.
///
/// Owned exclusively by the engine's handle cache; dropping it on eviction
/// closes the file descriptor.
pub(crate) struct OpenRaster {
    decoder: TiffReader,
    path: PathBuf,
    band_page: Option<usize>,
}

impl OpenRaster {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            decoder: open_decoder(path)?,
            path: path.to_path_buf(),
            band_page: None,
        })
    }

    fn seek_band(&mut self, page: usize) -> Result<()> {
        if self.band_page == Some(page) {
            return Ok(());
        }
        self.band_page = None;
        self.decoder
            .seek_to_image(page)
            .map_err(|e| decode_err(&self.path, e))?;
        self.band_page = Some(page);
        Ok(())
    }

    /// Read a rectangular window of one band page, row-major.
    ///
    /// Decodes every strip or tile chunk the window touches and copies the
    /// overlapping rows out, so the caller pays only once per chunk however
    /// the file is laid out. The window must lie inside the image.
    pub(crate) fn read_window<P: Pixel>(&mut self, page: usize, window: PixelRect) -> Result<Vec<P>> {
        self.seek_band(page)?;
        let (image_cols, _) = self.decoder.dimensions().map_err(|e| decode_err(&self.path, e))?;
        let (chunk_cols, chunk_rows) = self.decoder.chunk_dimensions();
        let chunks_across = image_cols.div_ceil(chunk_cols);
        let mut out = vec![P::from_f64(0.0); window.rows() as usize * window.cols() as usize];
        for chunk_row in (window.row0 / chunk_rows)..=((window.row1 - 1) / chunk_rows) {
            for chunk_col in (window.col0 / chunk_cols)..=((window.col1 - 1) / chunk_cols) {
                let index = chunk_row * chunks_across + chunk_col;
                let chunk = self
                    .decoder
                    .read_chunk(index)
                    .map_err(|e| decode_err(&self.path, e))?;
                let data: Vec<P> = pixel::convert_buffer(chunk, &self.path)?;
                // Edge chunks are clipped to the image, and the decoded
                // buffer is strided by the clipped width.
                let (data_cols, data_rows) = self.decoder.chunk_data_dimensions(index);
                let base_row = chunk_row * chunk_rows;
                let base_col = chunk_col * chunk_cols;
                let row_lo = window.row0.max(base_row);
                let row_hi = window.row1.min(base_row + data_rows);
                let col_lo = window.col0.max(base_col);
                let col_hi = window.col1.min(base_col + data_cols);
                for row in row_lo..row_hi {
                    let src = ((row - base_row) * data_cols + (col_lo - base_col)) as usize;
                    let dst =
                        ((row - window.row0) * window.cols() + (col_lo - window.col0)) as usize;
                    let run = (col_hi - col_lo) as usize;
                    out[dst..dst + run].copy_from_slice(&data[src..src + run]);
                }
            }
        }
        Ok(out)
    }

    /// Read one pixel of one band page, decoding only the chunk holding it.
    pub(crate) fn read_pixel<P: Pixel>(&mut self, page: usize, row: u32, col: u32) -> Result<P> {
        self.seek_band(page)?;
        let (image_cols, _) = self.decoder.dimensions().map_err(|e| decode_err(&self.path, e))?;
        let (chunk_cols, chunk_rows) = self.decoder.chunk_dimensions();
        let chunks_across = image_cols.div_ceil(chunk_cols);
        let index = (row / chunk_rows) * chunks_across + col / chunk_cols;
        let chunk = self
            .decoder
            .read_chunk(index)
            .map_err(|e| decode_err(&self.path, e))?;
        let data: Vec<P> = pixel::convert_buffer(chunk, &self.path)?;
        let (data_cols, _) = self.decoder.chunk_data_dimensions(index);
        let offset = ((row % chunk_rows) * data_cols + col % chunk_cols) as usize;
        data.get(offset).copied().ok_or_else(|| {
            SourceError::InternalConsistency(format!(
                "pixel ({row}, {col}) fell outside its decoded chunk in {}",
                self.path.display()
            ))
        })
    }
}
