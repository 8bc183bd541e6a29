//! Lowest-point candidates of a feature
//!
//! The elevation lookup anchors a feature at its lowest point. When the
//! external elevation service may be asked, every point tied at the minimum
//! is kept so the service can sample along all of them; otherwise a single
//! minimum is enough.

use super::types::Point3;

#[derive(Debug, Clone, PartialEq)]
pub struct LowestPoints {
    keep_ties: bool,
    points: Vec<Point3>,
}

impl LowestPoints {
    pub fn new(keep_ties: bool) -> Self {
        Self { keep_ties, points: Vec::new() }
    }

    pub fn keeps_ties(&self) -> bool {
        self.keep_ties
    }

    pub fn offer(&mut self, point: Point3) {
        let Some(current) = self.min_z() else {
            self.points.push(point);
            return;
        };
        if point[2] < current {
            self.points.clear();
            self.points.push(point);
        } else if point[2] == current && self.keep_ties && !self.points.contains(&point) {
            self.points.push(point);
        }
    }

    /// Merge another candidate set, e.g. when two accumulators are combined
    pub fn absorb(&mut self, other: &LowestPoints) {
        for &p in &other.points {
            self.offer(p);
        }
    }

    pub fn min_z(&self) -> Option<f64> {
        self.points.first().map(|p| p[2])
    }

    /// First candidate seen at the minimum
    pub fn anchor(&self) -> Option<Point3> {
        self.points.first().copied()
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_ties_kept_when_requested() {
        let mut lowest = LowestPoints::new(true);
        lowest.offer([0.0, 0.0, 5.0]);
        lowest.offer([1.0, 0.0, 2.0]);
        lowest.offer([2.0, 0.0, 2.0]);
        lowest.offer([2.0, 0.0, 2.0]);
        lowest.offer([3.0, 0.0, 4.0]);
        assert_eq!(lowest.points(), &[[1.0, 0.0, 2.0], [2.0, 0.0, 2.0]]);
        assert_eq!(lowest.min_z(), Some(2.0));
    }

    #[test]
    fn test_single_minimum_otherwise() {
        let mut lowest = LowestPoints::new(false);
        lowest.offer([1.0, 0.0, 2.0]);
        lowest.offer([2.0, 0.0, 2.0]);
        lowest.offer([0.0, 0.0, 1.0]);
        assert_eq!(lowest.points(), &[[0.0, 0.0, 1.0]]);
        assert_eq!(lowest.anchor(), Some([0.0, 0.0, 1.0]));
    }
}
