//! Reprojection from the store CRS to the display CRS
//!
//! Projection math lives outside this crate; callers supply a
//! [`CoordinateTransformer`]. [`IdentityTransformer`] is used when the store
//! already holds display coordinates.

use super::types::Point3;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReprojectError {
    #[error("point ({0}, {1}, {2}) cannot be reprojected")]
    OutOfDomain(f64, f64, f64),
    #[error("reprojection failed: {0}")]
    Failed(String),
}

pub trait CoordinateTransformer: Send + Sync {
    /// Store CRS to display CRS (lon, lat, elevation)
    fn transform(&self, point: Point3) -> Result<Point3, ReprojectError>;

    /// Reproject a sequence of points as one curve, so implementations that
    /// densify or interpolate along lines see all of them together
    fn transform_curve(&self, points: &[Point3]) -> Result<Vec<Point3>, ReprojectError> {
        points.iter().map(|&p| self.transform(p)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl CoordinateTransformer for IdentityTransformer {
    fn transform(&self, point: Point3) -> Result<Point3, ReprojectError> {
        if point.iter().all(|v| v.is_finite()) {
            Ok(point)
        } else {
            Err(ReprojectError::OutOfDomain(point[0], point[1], point[2]))
        }
    }
}
