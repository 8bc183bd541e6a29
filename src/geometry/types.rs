//! Core geometry types for city-model surfaces
//!
//! Surfaces arrive from the store as planar polygons in 3D: one outer ring
//! followed by zero or more holes. Rings never repeat their first point at
//! the end once they are wrapped in a [`Polygon3`].

use serde::Serialize;

/// A 3D coordinate `[x, y, z]`
pub type Point3 = [f64; 3];

/// A planar polygon with an outer ring and optional holes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon3 {
    /// Outer ring first, then holes in authored order
    pub rings: Vec<Vec<Point3>>,
}

impl Polygon3 {
    /// Wrap rings, dropping closing duplicates and rings with fewer than 3 points
    pub fn new(rings: Vec<Vec<Point3>>) -> Self {
        let rings = rings
            .into_iter()
            .map(|mut ring| {
                strip_closing_point(&mut ring);
                ring
            })
            .filter(|ring| ring.len() >= 3)
            .collect();
        Self { rings }
    }

    /// Convenience constructor for a polygon without holes
    pub fn from_outer(outer: Vec<Point3>) -> Self {
        Self::new(vec![outer])
    }

    pub fn outer(&self) -> &[Point3] {
        self.rings.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn holes(&self) -> &[Vec<Point3>] {
        if self.rings.len() > 1 {
            &self.rings[1..]
        } else {
            &[]
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Iterate over every point of every ring
    pub fn points(&self) -> impl Iterator<Item = &Point3> {
        self.rings.iter().flatten()
    }

    /// True if any coordinate is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.points().any(|p| p.iter().any(|c| !c.is_finite()))
    }

    /// Lowest z over all rings
    pub fn min_z(&self) -> Option<f64> {
        self.points().map(|p| p[2]).reduce(f64::min)
    }

    /// Apply `f` to every point in place
    pub fn map_points(&mut self, mut f: impl FnMut(Point3) -> Point3) {
        for ring in &mut self.rings {
            for p in ring.iter_mut() {
                *p = f(*p);
            }
        }
    }
}

/// Remove a trailing point equal to the first one
pub fn strip_closing_point(ring: &mut Vec<Point3>) {
    if ring.len() >= 2 && ring.first() == ring.last() {
        ring.pop();
    }
}

/// Unnormalized polygon normal using Newell's method
pub fn newell_normal(ring: &[Point3]) -> [f64; 3] {
    let mut n = [0.0f64; 3];
    let len = ring.len();
    for i in 0..len {
        let a = ring[i];
        let b = ring[(i + 1) % len];
        n[0] += (a[1] - b[1]) * (a[2] + b[2]);
        n[1] += (a[2] - b[2]) * (a[0] + b[0]);
        n[2] += (a[0] - b[0]) * (a[1] + b[1]);
    }
    n
}

/// Normalize a vector, `None` for zero length
pub fn normalize(v: [f64; 3]) -> Option<[f64; 3]> {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len < 1e-12 || !len.is_finite() {
        None
    } else {
        Some([v[0] / len, v[1] / len, v[2] / len])
    }
}

pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn sub(a: Point3, b: Point3) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Signed area of the ring projected on the XY plane (positive = counter-clockwise)
pub fn signed_area_xy(ring: &[Point3]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut a = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        a += ring[i][0] * ring[j][1] - ring[j][0] * ring[i][1];
    }
    0.5 * a
}

/// Re-wind a ring counter-clockwise in the XY plane
pub fn ensure_ccw(ring: &mut [Point3]) {
    if signed_area_xy(ring) < 0.0 {
        ring.reverse();
    }
}

/// Round to 1e-7, the precision of every emitted coordinate
#[inline]
pub fn round7(value: f64) -> f64 {
    (value * 1e7).round() / 1e7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_point_is_stripped() {
        let poly = Polygon3::from_outer(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
        ]);
        assert_eq!(poly.outer().len(), 3);
    }

    #[test]
    fn test_degenerate_rings_dropped() {
        let poly = Polygon3::new(vec![vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]]);
        assert!(poly.is_empty());
    }

    #[test]
    fn test_newell_normal_points_up_for_ccw() {
        let ring = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
        let n = normalize(newell_normal(&ring)).unwrap();
        assert!((n[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ensure_ccw() {
        let mut ring = vec![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0]];
        assert!(signed_area_xy(&ring) < 0.0);
        ensure_ccw(&mut ring);
        assert!(signed_area_xy(&ring) > 0.0);
    }

    #[test]
    fn test_round7() {
        assert_eq!(round7(13.123456789), 13.1234568);
        assert_eq!(round7(-0.00000004), -0.0);
    }
}
