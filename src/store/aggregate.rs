//! Footprint aggregation
//!
//! When a building, bridge or tunnel has no stored footprint at a LOD, its
//! footprint is the union of all its renderable surfaces projected to the
//! ground. Coordinates are snapped to the union tolerance first so that
//! nearly coincident edges merge. Polygons whose projected area is below
//! the minimum (walls seen from above) never enter the union.
//!
//! Aggregated rings come out clockwise with counter-clockwise holes, the
//! opposite of stored footprints; consumers reverse them.

use crate::geometry::{Point3, Polygon3};
use geo::orient::Direction;
use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Orient, Polygon};

fn snap(value: f64, tolerance: f64) -> f64 {
    (value / tolerance).round() * tolerance
}

fn to_ring(points: &[Point3], tolerance: f64) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord { x: snap(p[0], tolerance), y: snap(p[1], tolerance) })
        .collect();
    coords.dedup();
    LineString::new(coords)
}

fn to_geo(polygon: &Polygon3, tolerance: f64) -> Polygon<f64> {
    let exterior = to_ring(polygon.outer(), tolerance);
    let interiors = polygon.holes().iter().map(|hole| to_ring(hole, tolerance)).collect();
    Polygon::new(exterior, interiors)
}

fn from_ring(ring: &LineString<f64>, z: f64) -> Vec<Point3> {
    ring.coords().map(|c| [c.x, c.y, z]).collect()
}

/// Union of `polygons` in the ground plane. Every output point carries the
/// highest z of the input so extrusion can read the height per point.
pub fn union_footprints(polygons: &[Polygon3], tolerance: f64, min_area: f64) -> Vec<Polygon3> {
    let top = polygons.iter().flat_map(|p| p.points()).map(|p| p[2]).fold(f64::NEG_INFINITY, f64::max);

    let mut union = MultiPolygon::<f64>::new(Vec::new());
    for polygon in polygons {
        if polygon.is_empty() || polygon.has_non_finite() {
            continue;
        }
        let flat = to_geo(polygon, tolerance);
        if flat.unsigned_area() < min_area {
            continue;
        }
        union = union.union(&MultiPolygon::new(vec![flat]));
    }

    union
        .orient(Direction::Reversed)
        .into_iter()
        .filter(|p| p.unsigned_area() >= min_area)
        .map(|p| {
            let mut rings = vec![from_ring(p.exterior(), top)];
            rings.extend(p.interiors().iter().map(|r| from_ring(r, top)));
            Polygon3::new(rings)
        })
        .filter(|p| !p.is_empty())
        .collect()
}
