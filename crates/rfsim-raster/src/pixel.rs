//! Raster sample types and per-pixel query outcomes.

use crate::error::SourceError;
use crate::Result;
use std::fmt;
use std::path::Path;
use tiff::decoder::DecodingResult;

/// Tag naming one of the sample types a raster source can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    /// 8-bit signed integer.
    I8,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit signed integer.
    I16,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit signed integer.
    I32,
    /// 32-bit unsigned integer.
    U32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelType::I8 => "i8",
            PixelType::U8 => "u8",
            PixelType::I16 => "i16",
            PixelType::U16 => "u16",
            PixelType::I32 => "i32",
            PixelType::U32 => "u32",
            PixelType::F32 => "f32",
            PixelType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A sample type the raster engine can be instantiated over.
///
/// Implemented for exactly the eight types a source may declare: 8-, 16-
/// and 32-bit integers of either sign plus 32- and 64-bit floats. Values
/// convert through `f64`, which holds every one of them exactly.
pub trait Pixel: Copy + PartialEq + fmt::Debug + 'static {
    /// Tag for this type.
    const TYPE: PixelType;

    /// Convert from a double, saturating out-of-range integers.
    fn from_f64(value: f64) -> Self;

    /// Widen to a double.
    fn to_f64(self) -> f64;

    /// Whether the value is a floating-point NaN.
    fn is_nan(self) -> bool;
}

macro_rules! integer_pixel {
    ($($t:ty => $tag:ident),* $(,)?) => {$(
        impl Pixel for $t {
            const TYPE: PixelType = PixelType::$tag;

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn is_nan(self) -> bool {
                false
            }
        }
    )*};
}

integer_pixel! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
}

impl Pixel for f32 {
    const TYPE: PixelType = PixelType::F32;

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
}

impl Pixel for f64 {
    const TYPE: PixelType = PixelType::F64;

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
}

/// Outcome of a point query against one raster source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample<P> {
    /// A measured value.
    Valid(P),
    /// The pixel holds the band's no-data sentinel. The carried value is
    /// the configured override when one is set, otherwise the raw
    /// sentinel, so callers can substitute it as-is.
    NoData(P),
    /// The point lies outside every file this source knows about.
    Outside,
}

impl<P: Pixel> Sample<P> {
    /// Whether the query found a measured value.
    pub fn is_valid(&self) -> bool {
        matches!(self, Sample::Valid(_))
    }

    /// The measured value, if any.
    pub fn valid(self) -> Option<P> {
        match self {
            Sample::Valid(value) => Some(value),
            _ => None,
        }
    }

    /// The carried value for both valid and no-data pixels.
    pub fn value(self) -> Option<P> {
        match self {
            Sample::Valid(value) | Sample::NoData(value) => Some(value),
            Sample::Outside => None,
        }
    }
}

/// Convert a decoded TIFF buffer into the engine's sample type.
///
/// Every source type in the supported set converts; 64-bit integer
/// rasters fall outside it and are rejected.
pub(crate) fn convert_buffer<P: Pixel>(result: DecodingResult, path: &Path) -> Result<Vec<P>> {
    match result {
        DecodingResult::U8(data) => Ok(data.into_iter().map(|v| P::from_f64(f64::from(v))).collect()),
        DecodingResult::I8(data) => Ok(data.into_iter().map(|v| P::from_f64(f64::from(v))).collect()),
        DecodingResult::U16(data) => {
            Ok(data.into_iter().map(|v| P::from_f64(f64::from(v))).collect())
        }
        DecodingResult::I16(data) => {
            Ok(data.into_iter().map(|v| P::from_f64(f64::from(v))).collect())
        }
        DecodingResult::U32(data) => {
            Ok(data.into_iter().map(|v| P::from_f64(f64::from(v))).collect())
        }
        DecodingResult::I32(data) => {
            Ok(data.into_iter().map(|v| P::from_f64(f64::from(v))).collect())
        }
        DecodingResult::F32(data) => {
            Ok(data.into_iter().map(|v| P::from_f64(f64::from(v))).collect())
        }
        DecodingResult::F64(data) => Ok(data.into_iter().map(P::from_f64).collect()),
        DecodingResult::U64(_) | DecodingResult::I64(_) => Err(SourceError::Configuration(format!(
            "{}: 64-bit integer samples are not supported",
            path.display()
        ))),
    }
}
