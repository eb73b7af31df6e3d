//! Elevation profiles along propagation paths.

use crate::error::TerrainError;
use crate::resolver::{HeightSource, TerrainModel};
use crate::Result;
use serde::Serialize;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One sampled point along a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathPoint {
    /// Distance from the start of the path in meters.
    pub distance_m: f64,
    /// Ground elevation in meters.
    pub terrain_m: f32,
    /// The source that answered.
    pub source: HeightSource,
}

/// Terrain heights sampled at a fixed step along a path.
#[derive(Debug, Clone, Serialize)]
pub struct PathProfile {
    /// Total path length in meters.
    pub length_m: f64,
    /// Samples from start to end, both endpoints included.
    pub points: Vec<PathPoint>,
}

/// Great-circle distance between two `(lon, lat)` points in meters.
pub fn haversine_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lat2) = (a.1.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.0 - a.0).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * h.sqrt().asin()
}

/// Sample terrain heights every `step_m` meters from `a` to `b`, both
/// `(lon, lat)` in degrees.
///
/// Both endpoints are included and the final interval may be shorter than
/// the step. Coordinates are interpolated linearly in degrees, which
/// tracks the great circle to far better than a pixel at the path lengths
/// a propagation model evaluates.
pub fn sample_path(
    model: &mut TerrainModel,
    a: (f64, f64),
    b: (f64, f64),
    step_m: f64,
) -> Result<PathProfile> {
    if !(step_m.is_finite() && step_m > 0.0) {
        return Err(TerrainError::Configuration(format!(
            "path sampling step {step_m} must be positive"
        )));
    }
    let length_m = haversine_distance(a, b);
    let steps = if length_m > 0.0 {
        (length_m / step_m).ceil() as usize
    } else {
        1
    };
    let mut points = Vec::with_capacity(steps + 1);
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let lon = a.0 + t * (b.0 - a.0);
        let lat = a.1 + t * (b.1 - a.1);
        let sample = model.query(lon, lat)?;
        points.push(PathPoint {
            distance_m: t * length_m,
            terrain_m: sample.terrain_m,
            source: sample.source,
        });
    }
    Ok(PathProfile { length_m, points })
}
