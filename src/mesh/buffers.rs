//! Final indexed mesh buffers
//!
//! Positions are written in vertex first-seen order. Normals are written per
//! surface vertex. Texture coordinates are shared by value. Triangles are
//! grouped into one batch per appearance, with every textured batch ahead of
//! the material-only ones.

use super::accumulator::MeshAccumulator;
use super::material::SurfaceAppearance;
use super::triangulate::SurfaceTriangulation;
use indexmap::IndexMap;

/// Indices of one triangle corner into the buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    pub position: usize,
    pub normal: usize,
    pub texcoord: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriangleBatch {
    pub appearance: SurfaceAppearance,
    pub triangles: Vec<[Corner; 3]>,
}

impl TriangleBatch {
    pub fn is_textured(&self) -> bool {
        self.appearance.is_textured()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    pub positions: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
    pub texcoords: Vec<[f64; 2]>,
    pub batches: Vec<TriangleBatch>,
}

/// Value-deduplicated texture coordinate list
#[derive(Default)]
struct TexcoordTable {
    values: Vec<[f64; 2]>,
    lookup: IndexMap<[u64; 2], usize>,
}

impl TexcoordTable {
    fn index_of(&mut self, uv: [f64; 2]) -> usize {
        let key = [uv[0].to_bits(), uv[1].to_bits()];
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let index = self.values.len();
        self.values.push(uv);
        self.lookup.insert(key, index);
        index
    }
}

impl MeshBuffers {
    /// Build buffers from an accumulator and the triangulation of its
    /// surfaces, given as (surface index, triangulation) pairs
    pub fn build(acc: &MeshAccumulator, triangulations: &[(usize, SurfaceTriangulation)]) -> Self {
        let positions = acc.vertices().records().iter().map(|r| r.coords).collect();
        let mut normals = Vec::new();
        let mut texcoords = TexcoordTable::default();
        let mut batches: IndexMap<SurfaceAppearance, Vec<[Corner; 3]>> = IndexMap::new();

        for (surface_index, triangulation) in triangulations {
            let Some(surface) = acc.surfaces().get(*surface_index) else {
                continue;
            };
            let textured = surface.appearance.is_textured();

            let normal_base = normals.len();
            normals.extend_from_slice(&triangulation.normals);

            let corner = |local: usize, texcoords: &mut TexcoordTable| -> Option<Corner> {
                let vertex = *surface.vertices.get(local)?;
                let texcoord = if textured {
                    let uv = acc.vertices().get(vertex)?.uvs.get(&surface.id).copied().unwrap_or([0.0, 0.0]);
                    Some(texcoords.index_of(uv))
                } else {
                    None
                };
                Some(Corner { position: vertex, normal: normal_base + local, texcoord })
            };

            let triangles = batches.entry(surface.appearance.clone()).or_default();
            for tri in triangulation.indices.chunks_exact(3) {
                let corners = (
                    corner(tri[0], &mut texcoords),
                    corner(tri[1], &mut texcoords),
                    corner(tri[2], &mut texcoords),
                );
                if let (Some(a), Some(b), Some(c)) = corners {
                    triangles.push([a, b, c]);
                }
            }
        }

        let mut batches: Vec<TriangleBatch> = batches
            .into_iter()
            .filter(|(_, triangles)| !triangles.is_empty())
            .map(|(appearance, triangles)| TriangleBatch { appearance, triangles })
            .collect();
        // stable: keeps first-seen order within each class
        batches.sort_by_key(|batch| !batch.is_textured());

        Self { positions, normals, texcoords: texcoords.values, batches }
    }

    pub fn triangle_count(&self) -> usize {
        self.batches.iter().map(|b| b.triangles.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Material, SurfaceRecord};

    fn add(acc: &mut MeshAccumulator, id: i64, points: &[[f64; 3]], uvs: Option<&[[f64; 2]]>, appearance: SurfaceAppearance) {
        let vertices = points
            .iter()
            .enumerate()
            .map(|(i, &p)| acc.intern(id, p, uvs.map(|uvs| uvs[i])))
            .collect();
        acc.add_surface(SurfaceRecord { id, gml_id: None, ring_sizes: vec![points.len()], vertices, appearance });
    }

    #[test]
    fn test_shared_corner_is_one_vertex() {
        let mut acc = MeshAccumulator::new("A", 1e-7, false);
        let wall = SurfaceAppearance::Material(acc.register_material(Material::default()));
        add(&mut acc, 1, &[[0.0, 0.0, 5.0], [1.0, 0.0, 5.0], [1.0, 1.0, 5.0]], None, wall.clone());
        add(&mut acc, 2, &[[0.0, 0.0, 5.0], [1.0, 1.0, 5.0], [0.0, 1.0, 5.0]], None, wall);

        let buffers = acc.finish();
        assert_eq!(buffers.positions.len(), 4);
        let shared: Vec<usize> = buffers.batches[0]
            .triangles
            .iter()
            .flat_map(|t| t.iter().map(|c| c.position))
            .filter(|&p| buffers.positions[p] == [0.0, 0.0, 5.0])
            .collect();
        assert_eq!(shared, vec![0, 0]);
        assert_eq!(acc.surfaces()[0].vertices[0], acc.surfaces()[1].vertices[0]);
    }

    #[test]
    fn test_textured_batches_come_first() {
        let mut acc = MeshAccumulator::new("A", 1e-7, false);
        let roof = SurfaceAppearance::Material(acc.register_material(Material::from_rgb([1.0, 0.0, 0.0])));
        let wall = SurfaceAppearance::Material(acc.register_material(Material::default()));
        let tri = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        add(&mut acc, 1, &tri, None, roof);
        add(&mut acc, 2, &tri, Some(&uvs), SurfaceAppearance::Texture("a.png".into()));
        add(&mut acc, 3, &tri, None, wall);
        add(&mut acc, 4, &tri, Some(&uvs), SurfaceAppearance::Texture("b.png".into()));

        let buffers = acc.finish();
        let textured: Vec<bool> = buffers.batches.iter().map(|b| b.is_textured()).collect();
        assert_eq!(textured, vec![true, true, false, false]);
        assert_eq!(buffers.batches[0].appearance, SurfaceAppearance::Texture("a.png".into()));
        assert_eq!(buffers.batches[2].appearance, SurfaceAppearance::Material("mat_0".into()));
        // both textured surfaces use the same three uv values
        assert_eq!(buffers.texcoords.len(), 3);
        assert!(buffers.batches[2].triangles[0].iter().all(|c| c.texcoord.is_none()));
    }

    #[test]
    fn test_normals_per_surface_vertex() {
        let mut acc = MeshAccumulator::new("A", 1e-7, false);
        let wall = SurfaceAppearance::Material(acc.register_material(Material::default()));
        add(&mut acc, 1, &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]], None, wall);
        let buffers = acc.finish();
        assert_eq!(buffers.normals.len(), 4);
        assert_eq!(buffers.triangle_count(), 2);
        for n in &buffers.normals {
            assert!((n[2] - 1.0).abs() < 1e-9);
        }
    }
}
