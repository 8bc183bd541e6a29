//! Affine placement of implicit (template) geometries
//!
//! Implicit geometry rows carry a 16-element row-major 4x4 matrix as a
//! space-separated string plus a reference point. A template point `p` is
//! placed at `M · p + reference_point` before any other processing.

use super::types::{Point3, Polygon3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TransformParseError {
    #[error("expected 16 matrix elements, found {0}")]
    WrongLength(usize),
    #[error("invalid matrix element '{0}'")]
    InvalidNumber(String),
}

/// Row-major 4x4 affine matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m: [f64; 16],
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        m: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Parse a whitespace separated list of 16 numbers
    pub fn parse(text: &str) -> Result<Self, TransformParseError> {
        let values = text
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| TransformParseError::InvalidNumber(token.to_string()))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let m: [f64; 16] = values
            .as_slice()
            .try_into()
            .map_err(|_| TransformParseError::WrongLength(values.len()))?;
        Ok(Self { m })
    }

    pub fn apply(&self, p: Point3) -> Point3 {
        let m = &self.m;
        [
            m[0] * p[0] + m[1] * p[1] + m[2] * p[2] + m[3],
            m[4] * p[0] + m[5] * p[1] + m[6] * p[2] + m[7],
            m[8] * p[0] + m[9] * p[1] + m[10] * p[2] + m[11],
        ]
    }
}

/// Placement of one implicit geometry instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImplicitPlacement {
    pub transform: AffineTransform,
    pub reference_point: Point3,
}

impl ImplicitPlacement {
    pub fn place(&self, p: Point3) -> Point3 {
        let q = self.transform.apply(p);
        [
            q[0] + self.reference_point[0],
            q[1] + self.reference_point[1],
            q[2] + self.reference_point[2],
        ]
    }

    pub fn place_polygon(&self, polygon: &mut Polygon3) {
        polygon.map_points(|p| self.place(p));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity() {
        let t = AffineTransform::parse("1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1").unwrap();
        assert_eq!(t, AffineTransform::IDENTITY);
    }

    #[test]
    fn test_parse_wrong_length() {
        assert_eq!(
            AffineTransform::parse("1 0 0"),
            Err(TransformParseError::WrongLength(3))
        );
        assert!(matches!(
            AffineTransform::parse("1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 x"),
            Err(TransformParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_scale_translate_and_reference_point() {
        // scale by 2, translate x by 10
        let t = AffineTransform::parse("2 0 0 10  0 2 0 0  0 0 2 0  0 0 0 1").unwrap();
        let placement = ImplicitPlacement { transform: t, reference_point: [100.0, 200.0, 5.0] };
        assert_eq!(placement.place([1.0, 1.0, 1.0]), [112.0, 202.0, 7.0]);
    }
}
