//! Surface triangulation with consistent winding
//!
//! A planar surface (outer ring + holes) is projected onto the axis plane
//! its normal is most aligned with and triangulated with earcut. Normals are
//! generated from the resulting triangles, then the winding is corrected so
//! the triangles follow the authored direction of the outer ring no matter
//! how earcut emitted them.

use crate::geometry::{cross, newell_normal, normalize, sub, Point3};

/// Triangles below this doubled area are treated as degenerate
const DEGENERATE_AREA: f64 = 1e-12;

/// Triangulation of one surface. Indices are local: they address the
/// surface's vertex list (outer ring first, then holes).
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceTriangulation {
    pub indices: Vec<usize>,
    /// One normal per local vertex
    pub normals: Vec<[f64; 3]>,
}

impl SurfaceTriangulation {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Triangulate a surface whose rings are laid out back to back in `points`
/// with sizes `ring_sizes`. Returns `None` if nothing could be triangulated.
pub fn triangulate_surface(points: &[Point3], ring_sizes: &[usize]) -> Option<SurfaceTriangulation> {
    let outer_len = *ring_sizes.first()?;
    if outer_len < 3 || ring_sizes.iter().sum::<usize>() != points.len() {
        return None;
    }

    let plane_normal = newell_normal(&points[..outer_len]);
    let (u_axis, v_axis) = projection_axes(plane_normal);

    let mut flat_coords: Vec<f64> = Vec::with_capacity(points.len() * 2);
    for p in points {
        flat_coords.push(p[u_axis]);
        flat_coords.push(p[v_axis]);
    }

    let mut hole_indices: Vec<usize> = Vec::new();
    let mut offset = outer_len;
    for &size in &ring_sizes[1..] {
        hole_indices.push(offset);
        offset += size;
    }

    let indices = earcutr::earcut(&flat_coords, &hole_indices, 2).unwrap_or_default();
    if indices.chunks_exact(3).all(|tri| is_degenerate(points, tri[0], tri[1], tri[2])) {
        return None;
    }

    let fallback = normalize(plane_normal).unwrap_or([0.0, 0.0, 1.0]);
    let normals = vertex_normals(points, &indices, fallback);

    let mut triangulation = SurfaceTriangulation { indices, normals };
    fix_orientation(&mut triangulation, points, outer_len);
    Some(triangulation)
}

/// Pick the two coordinate axes spanning the plane best aligned with the surface
fn projection_axes(normal: [f64; 3]) -> (usize, usize) {
    let (ax, ay, az) = (normal[0].abs(), normal[1].abs(), normal[2].abs());
    if az >= ax && az >= ay {
        (0, 1)
    } else if ax >= ay {
        (1, 2)
    } else {
        (2, 0)
    }
}

fn triangle_normal(points: &[Point3], a: usize, b: usize, c: usize) -> [f64; 3] {
    cross(sub(points[b], points[a]), sub(points[c], points[a]))
}

fn is_degenerate(points: &[Point3], a: usize, b: usize, c: usize) -> bool {
    let n = triangle_normal(points, a, b, c);
    (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt() < DEGENERATE_AREA
}

/// Area-weighted average of the triangle normals around each vertex
fn vertex_normals(points: &[Point3], indices: &[usize], fallback: [f64; 3]) -> Vec<[f64; 3]> {
    let mut sums = vec![[0.0f64; 3]; points.len()];
    for tri in indices.chunks_exact(3) {
        let n = triangle_normal(points, tri[0], tri[1], tri[2]);
        for &i in tri {
            sums[i][0] += n[0];
            sums[i][1] += n[1];
            sums[i][2] += n[2];
        }
    }
    sums.into_iter().map(|n| normalize(n).unwrap_or(fallback)).collect()
}

/// Make the triangles follow the outer ring's authored direction.
///
/// The first non-degenerate triangle with an edge between two adjacent
/// outer-ring vertices decides: if it walks that edge with descending
/// indices, the whole index list is reversed and all normals negated.
pub fn fix_orientation(triangulation: &mut SurfaceTriangulation, points: &[Point3], outer_len: usize) {
    let mut descending = None;
    'triangles: for tri in triangulation.indices.chunks_exact(3) {
        if is_degenerate(points, tri[0], tri[1], tri[2]) {
            continue;
        }
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            if a < outer_len && b < outer_len && a.abs_diff(b) == 1 {
                descending = Some(a > b);
                break 'triangles;
            }
        }
    }

    if descending == Some(true) {
        triangulation.indices.reverse();
        for n in &mut triangulation.normals {
            *n = [-n[0], -n[1], -n[2]];
        }
    }
}
