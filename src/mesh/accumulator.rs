//! Per-feature mesh state
//!
//! A [`MeshAccumulator`] owns everything collected for one exported feature
//! (or a merged group of features): the deduplicated vertices, the surfaces
//! referencing them, the materials and images they are drawn with, and the
//! lowest-point candidates used to anchor the feature.

use super::buffers::MeshBuffers;
use super::material::{Material, SurfaceAppearance};
use super::triangulate::{triangulate_surface, SurfaceTriangulation};
use super::vertex_index::{SurfaceId, VertexId, VertexIndex};
use crate::geometry::{LowestPoints, Point3};
use crate::texture::TextureAtlasJob;
use image::RgbaImage;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::debug;

/// One surface of the mesh. Vertices are listed ring by ring, outer first.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRecord {
    pub id: SurfaceId,
    pub gml_id: Option<String>,
    pub ring_sizes: Vec<usize>,
    pub vertices: Vec<VertexId>,
    pub appearance: SurfaceAppearance,
}

impl SurfaceRecord {
    pub fn ring_count(&self) -> usize {
        self.ring_sizes.len()
    }
}

#[derive(Debug, Clone)]
pub struct MeshAccumulator {
    output_id: String,
    vertices: VertexIndex,
    surfaces: Vec<SurfaceRecord>,
    materials: IndexMap<String, Material>,
    images: IndexMap<String, RgbaImage>,
    unsupported_images: HashSet<String>,
    lowest: LowestPoints,
    geometry_count: usize,
}

impl MeshAccumulator {
    pub fn new(output_id: impl Into<String>, tolerance: f64, keep_lowest_ties: bool) -> Self {
        Self {
            output_id: output_id.into(),
            vertices: VertexIndex::new(tolerance),
            surfaces: Vec::new(),
            materials: IndexMap::new(),
            images: IndexMap::new(),
            unsupported_images: HashSet::new(),
            lowest: LowestPoints::new(keep_lowest_ties),
            geometry_count: 0,
        }
    }

    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    /// Intern a vertex of `surface_id`, tracking the lowest point
    pub fn intern(&mut self, surface_id: SurfaceId, point: Point3, uv: Option<[f64; 2]>) -> VertexId {
        self.lowest.offer(point);
        self.vertices.intern(surface_id, point, uv)
    }

    pub fn add_surface(&mut self, surface: SurfaceRecord) {
        self.geometry_count += 1;
        self.surfaces.push(surface);
    }

    /// Register a material, reusing the id of an equal one
    pub fn register_material(&mut self, material: Material) -> String {
        if let Some((id, _)) = self.materials.iter().find(|(_, m)| **m == material) {
            return id.clone();
        }
        let id = format!("mat_{}", self.materials.len());
        self.materials.insert(id.clone(), material);
        id
    }

    pub fn has_image(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    pub fn add_image(&mut self, name: impl Into<String>, image: RgbaImage) {
        self.images.insert(name.into(), image);
    }

    pub fn mark_unsupported(&mut self, name: impl Into<String>) {
        self.unsupported_images.insert(name.into());
    }

    pub fn is_unsupported(&self, name: &str) -> bool {
        self.unsupported_images.contains(name)
    }

    pub fn vertices(&self) -> &VertexIndex {
        &self.vertices
    }

    pub fn surfaces(&self) -> &[SurfaceRecord] {
        &self.surfaces
    }

    pub fn materials(&self) -> &IndexMap<String, Material> {
        &self.materials
    }

    pub fn images(&self) -> &IndexMap<String, RgbaImage> {
        &self.images
    }

    pub fn lowest_points(&self) -> &LowestPoints {
        &self.lowest
    }

    pub fn geometry_count(&self) -> usize {
        self.geometry_count
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Coordinates of a surface's vertices in ring order
    pub fn surface_points(&self, surface: &SurfaceRecord) -> Vec<Point3> {
        surface
            .vertices
            .iter()
            .filter_map(|&v| self.vertices.get(v).map(|r| r.coords))
            .collect()
    }

    /// UVs of a surface in ring order, `None` if any vertex lacks one
    pub fn surface_uvs(&self, surface: &SurfaceRecord) -> Option<Vec<[f64; 2]>> {
        surface
            .vertices
            .iter()
            .map(|&v| self.vertices.get(v).and_then(|r| r.uvs.get(&surface.id).copied()))
            .collect()
    }

    /// Merge a donor accumulator into this one. Vertices are re-interned
    /// since ids are local to each accumulator.
    pub fn absorb(&mut self, donor: MeshAccumulator) {
        let mut material_ids: IndexMap<String, String> = IndexMap::new();
        for (id, material) in &donor.materials {
            material_ids.insert(id.clone(), self.register_material(material.clone()));
        }
        for (name, image) in &donor.images {
            if !self.images.contains_key(name) {
                self.images.insert(name.clone(), image.clone());
            }
        }
        self.unsupported_images.extend(donor.unsupported_images.iter().cloned());

        for surface in &donor.surfaces {
            let vertices = surface
                .vertices
                .iter()
                .filter_map(|&v| donor.vertices.get(v))
                .map(|record| {
                    let uv = record.uvs.get(&surface.id).copied();
                    self.vertices.intern(surface.id, record.coords, uv)
                })
                .collect();
            let appearance = match &surface.appearance {
                SurfaceAppearance::Material(id) => {
                    SurfaceAppearance::Material(material_ids.get(id).cloned().unwrap_or_else(|| id.clone()))
                }
                texture => texture.clone(),
            };
            self.surfaces.push(SurfaceRecord {
                id: surface.id,
                gml_id: surface.gml_id.clone(),
                ring_sizes: surface.ring_sizes.clone(),
                vertices,
                appearance,
            });
        }

        self.lowest.absorb(&donor.lowest);
        self.geometry_count += donor.geometry_count;
        let merged = merge_id_ranges(&self.output_id, &donor.output_id);
        debug!(recipient = %self.output_id, donor = %donor.output_id, merged = %merged, "merged feature meshes");
        self.output_id = merged;
    }

    /// Textures and UVs of every textured surface, for the atlas passes
    pub fn texture_job(&self) -> TextureAtlasJob {
        let mut job = TextureAtlasJob::default();
        for surface in &self.surfaces {
            let SurfaceAppearance::Texture(name) = &surface.appearance else {
                continue;
            };
            let Some(uvs) = self.surface_uvs(surface) else {
                continue;
            };
            job.surface_images.insert(surface.id, name.clone());
            job.surface_uvs.insert(surface.id, uvs);
        }
        for name in job.surface_images.values() {
            if let Some(image) = self.images.get(name) {
                job.images.entry(name.clone()).or_insert_with(|| image.clone());
            }
        }
        job
    }

    /// Take over the images and UVs produced by the atlas passes
    pub fn apply_texture_job(&mut self, job: TextureAtlasJob) {
        for surface in &mut self.surfaces {
            let (Some(name), Some(uvs)) = (job.surface_images.get(&surface.id), job.surface_uvs.get(&surface.id))
            else {
                continue;
            };
            for (&vertex, &uv) in surface.vertices.iter().zip(uvs) {
                self.vertices.attach_uv(vertex, surface.id, uv);
            }
            surface.appearance = SurfaceAppearance::Texture(name.clone());
        }
        self.images = job.images;
    }

    /// Triangulate every surface; surfaces that yield no triangles are left out
    pub fn triangulate(&self) -> Vec<(usize, SurfaceTriangulation)> {
        self.surfaces
            .iter()
            .enumerate()
            .filter_map(|(index, surface)| {
                let points = self.surface_points(surface);
                match triangulate_surface(&points, &surface.ring_sizes) {
                    Some(t) => Some((index, t)),
                    None => {
                        debug!(surface_id = surface.id, "surface produced no triangles");
                        None
                    }
                }
            })
            .collect()
    }

    /// Triangulate and build the final buffers
    pub fn finish(&self) -> MeshBuffers {
        let triangulations = self.triangulate();
        MeshBuffers::build(self, &triangulations)
    }
}

fn id_bounds(id: &str) -> (&str, &str) {
    match id.split_once("_to_") {
        Some((first, last)) => (first, last),
        None => (id, id),
    }
}

/// Combine two (possibly already combined) output ids into `min_to_max`
pub fn merge_id_ranges(a: &str, b: &str) -> String {
    let (a0, a1) = id_bounds(a);
    let (b0, b1) = id_bounds(b);
    let min = [a0, a1, b0, b1].into_iter().min().unwrap_or(a0);
    let max = [a0, a1, b0, b1].into_iter().max().unwrap_or(a1);
    if min == max {
        min.to_string()
    } else {
        format!("{}_to_{}", min, max)
    }
}
