//! Mesh assembly from surface rows
//!
//! Rows are consumed in store order. Closure surfaces are skipped, and so are
//! cross-referenced surfaces whose gml id was already emitted. Every other
//! surface with geometry is placed (implicit geometries), interned vertex by
//! vertex and given an appearance. Triangulation is deferred to
//! [`MeshAccumulator::finish`].

use super::accumulator::{MeshAccumulator, SurfaceRecord};
use super::material::{sanitize_image_name, SurfaceAppearance};
use crate::config::ExportConfig;
use crate::error::Result;
use crate::export::CancellationToken;
use crate::geometry::Polygon3;
use crate::lod::SurfaceKind;
use crate::store::{GeometryStore, SurfaceRow, TextureRef};
use crate::texture::TextureError;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub struct MeshAssembler<'a> {
    config: &'a ExportConfig,
    cancel: &'a CancellationToken,
}

/// Texture coordinates matching a polygon ring for ring, trimmed of a
/// closing duplicate. `None` if any ring has too few.
fn fit_tex_coords(polygon: &Polygon3, coords: &[Vec<[f64; 2]>]) -> Option<Vec<Vec<[f64; 2]>>> {
    if coords.len() < polygon.rings.len() {
        return None;
    }
    polygon
        .rings
        .iter()
        .zip(coords)
        .map(|(ring, uvs)| (uvs.len() >= ring.len()).then(|| uvs[..ring.len()].to_vec()))
        .collect()
}

impl<'a> MeshAssembler<'a> {
    pub fn new(config: &'a ExportConfig, cancel: &'a CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Build a fresh accumulator for `output_id` from one feature's rows
    pub fn assemble(&self, output_id: &str, rows: &[SurfaceRow], store: &mut dyn GeometryStore) -> Result<MeshAccumulator> {
        let mut acc = MeshAccumulator::new(
            output_id,
            self.config.mesh.vertex_tolerance,
            self.config.may_query_elevation_service(),
        );
        self.add_rows(&mut acc, rows, store)?;
        Ok(acc)
    }

    /// Add one feature's rows to an existing accumulator
    pub fn add_rows(&self, acc: &mut MeshAccumulator, rows: &[SurfaceRow], store: &mut dyn GeometryStore) -> Result<()> {
        let mut resolved: HashMap<i64, SurfaceAppearance> = HashMap::new();
        let mut emitted_gml_ids: HashSet<String> = HashSet::new();

        for row in rows {
            self.cancel.check()?;

            if row.is_closure() {
                continue;
            }
            if row.is_xlink {
                if let Some(gml_id) = &row.gml_id {
                    if emitted_gml_ids.contains(gml_id) {
                        debug!(surface_id = row.id, gml_id = %gml_id, "skipping repeated xlink surface");
                        continue;
                    }
                }
            }

            let geometry = row.placed_geometry();
            let (appearance, tex_coords) = self.resolve_appearance(acc, row, geometry.as_ref(), &resolved, store);
            if let Some(appearance) = &appearance {
                resolved.insert(row.id, appearance.clone());
            }

            let Some(polygon) = geometry else {
                continue;
            };
            if polygon.has_non_finite() {
                warn!(surface_id = row.id, "skipping surface with non-finite coordinates");
                continue;
            }
            if let Some(gml_id) = &row.gml_id {
                emitted_gml_ids.insert(gml_id.clone());
            }

            let appearance = appearance.unwrap_or_else(|| {
                SurfaceAppearance::Material(acc.register_material(self.config.materials.wall.clone()))
            });

            let mut vertices = Vec::new();
            let mut ring_sizes = Vec::with_capacity(polygon.rings.len());
            for (ring_index, ring) in polygon.rings.iter().enumerate() {
                for (point_index, &point) in ring.iter().enumerate() {
                    let uv = tex_coords.as_ref().map(|rings| rings[ring_index][point_index]);
                    vertices.push(acc.intern(row.id, point, uv));
                }
                ring_sizes.push(ring.len());
            }

            acc.add_surface(SurfaceRecord { id: row.id, gml_id: row.gml_id.clone(), ring_sizes, vertices, appearance });
        }
        Ok(())
    }

    /// Appearance of a row and, for textures, its ring-matched UVs.
    /// `None` means nothing better than the default wall material was found.
    fn resolve_appearance(
        &self,
        acc: &mut MeshAccumulator,
        row: &SurfaceRow,
        geometry: Option<&Polygon3>,
        resolved: &HashMap<i64, SurfaceAppearance>,
        store: &mut dyn GeometryStore,
    ) -> (Option<SurfaceAppearance>, Option<Vec<Vec<[f64; 2]>>>) {
        if self.config.display.appearance_theme.is_none() {
            if geometry.is_none() {
                return (None, None);
            }
            let material = match row.surface_kind() {
                Some(SurfaceKind::Roof) => self.config.materials.roof.clone(),
                _ => self.config.materials.wall.clone(),
            };
            return (Some(SurfaceAppearance::Material(acc.register_material(material))), None);
        }

        if let Some(appearance) = &row.appearance {
            if let (Some(texture), Some(polygon)) = (&appearance.texture, geometry) {
                if let Some(uvs) = fit_tex_coords(polygon, &appearance.tex_coords) {
                    if let Some(name) = self.load_texture(acc, texture, store) {
                        return (Some(SurfaceAppearance::Texture(name)), Some(uvs));
                    }
                } else {
                    warn!(surface_id = row.id, "texture coordinates do not match the surface rings");
                }
            }
            if let Some(material) = &appearance.material {
                return (Some(SurfaceAppearance::Material(acc.register_material(material.clone()))), None);
            }
        }

        // Inherit a material from the parent or root; textures need own UVs
        let inherited = [row.parent_id, Some(row.root_id)]
            .into_iter()
            .flatten()
            .filter(|&id| id != row.id)
            .find_map(|id| match resolved.get(&id) {
                Some(appearance @ SurfaceAppearance::Material(_)) => Some(appearance.clone()),
                _ => None,
            });
        (inherited, None)
    }

    /// Load and decode a texture once per sanitized name. Returns the name
    /// under which the image is registered, or `None` if it is unusable.
    fn load_texture(&self, acc: &mut MeshAccumulator, texture: &TextureRef, store: &mut dyn GeometryStore) -> Option<String> {
        let name = sanitize_image_name(&texture.uri, texture.image_id);
        if acc.is_unsupported(&name) {
            return None;
        }
        if acc.has_image(&name) {
            return Some(name);
        }

        let bytes = match store.load_texture(texture) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(image = %name, "cannot load texture: {}", e);
                acc.mark_unsupported(name);
                return None;
            }
        };
        match image::load_from_memory(&bytes) {
            Ok(decoded) => {
                acc.add_image(name.clone(), decoded.to_rgba8());
                Some(name)
            }
            Err(source) => {
                let e = TextureError::Decode { name: name.clone(), source };
                warn!(image = %name, "{}; falling back to material", e);
                acc.mark_unsupported(name);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::geometry::{AffineTransform, ImplicitPlacement};
    use crate::lod::surface_class_id;
    use crate::mesh::Material;
    use crate::store::{AppearanceRow, ObjectInfo, QueryKey, QueryPurpose, StoreError};
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    /// Serves textures from memory and counts loads
    #[derive(Default)]
    struct TextureStore {
        images: HashMap<i64, Vec<u8>>,
        loads: usize,
    }

    impl GeometryStore for TextureStore {
        fn count(&mut self, _key: &QueryKey, _purpose: QueryPurpose) -> std::result::Result<u64, StoreError> {
            Ok(0)
        }
        fn surfaces(&mut self, _key: &QueryKey) -> std::result::Result<Vec<SurfaceRow>, StoreError> {
            Ok(Vec::new())
        }
        fn aggregate_footprint(
            &mut self,
            _key: &QueryKey,
            _tolerance: f64,
            _min_area: f64,
        ) -> std::result::Result<Vec<Polygon3>, StoreError> {
            Ok(Vec::new())
        }
        fn load_texture(&mut self, texture: &TextureRef) -> std::result::Result<Vec<u8>, StoreError> {
            self.loads += 1;
            self.images.get(&texture.image_id).cloned().ok_or(StoreError::MissingImage(texture.image_id))
        }
        fn object_info(&mut self, _object_id: i64) -> std::result::Result<Option<ObjectInfo>, StoreError> {
            Ok(None)
        }
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbaImage::new(4, 4).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn square(z: f64) -> Polygon3 {
        Polygon3::from_outer(vec![[0.0, 0.0, z], [1.0, 0.0, z], [1.0, 1.0, z], [0.0, 1.0, z]])
    }

    fn row(id: i64, geometry: Option<Polygon3>) -> SurfaceRow {
        SurfaceRow {
            id,
            cityobject_id: 1,
            root_id: id,
            parent_id: None,
            gml_id: None,
            is_xlink: false,
            thematic_class: None,
            geometry,
            implicit: None,
            appearance: None,
        }
    }

    fn textured(id: i64, image_id: i64, uri: &str) -> SurfaceRow {
        let mut r = row(id, Some(square(0.0)));
        r.appearance = Some(AppearanceRow {
            material: None,
            texture: Some(TextureRef { image_id, uri: uri.to_string() }),
            tex_coords: vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]],
        });
        r
    }

    fn themed_config() -> ExportConfig {
        let mut config = ExportConfig::default();
        config.display.appearance_theme = Some("rgbTexture".to_string());
        config
    }

    #[test]
    fn test_closure_and_repeated_xlinks_are_skipped() {
        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        let mut closure = row(1, Some(square(0.0)));
        closure.thematic_class = Some(surface_class_id::BUILDING_CLOSURE);
        let mut first = row(2, Some(square(1.0)));
        first.gml_id = Some("shared".into());
        let mut again = row(3, Some(square(2.0)));
        again.gml_id = Some("shared".into());
        again.is_xlink = true;

        let acc = MeshAssembler::new(&config, &cancel)
            .assemble("A", &[closure, first, again], &mut TextureStore::default())
            .unwrap();
        let ids: Vec<i64> = acc.surfaces().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_roof_and_wall_materials_without_theme() {
        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        let mut roof = row(1, Some(square(3.0)));
        roof.thematic_class = Some(surface_class_id::BUILDING_ROOF);
        let mut wall = row(2, Some(square(0.0)));
        wall.thematic_class = Some(surface_class_id::BUILDING_WALL);

        let acc = MeshAssembler::new(&config, &cancel)
            .assemble("A", &[roof, wall], &mut TextureStore::default())
            .unwrap();
        let material_of = |i: usize| match &acc.surfaces()[i].appearance {
            SurfaceAppearance::Material(id) => acc.materials().get(id).cloned().unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(material_of(0), config.materials.roof);
        assert_eq!(material_of(1), config.materials.wall);
    }

    #[test]
    fn test_texture_loaded_once_per_name() {
        let config = themed_config();
        let cancel = CancellationToken::new();
        let mut store = TextureStore::default();
        store.images.insert(1, png_bytes());
        let rows = [textured(10, 1, "tex/facade 1.png"), textured(11, 1, "other/facade 1.png")];

        let acc = MeshAssembler::new(&config, &cancel).assemble("A", &rows, &mut store).unwrap();
        assert_eq!(store.loads, 1);
        assert_eq!(acc.images().len(), 1);
        for surface in acc.surfaces() {
            assert_eq!(surface.appearance, SurfaceAppearance::Texture("facade_1.png".into()));
            assert_eq!(acc.surface_uvs(surface).unwrap().len(), 4);
        }
    }

    #[test]
    fn test_unsupported_image_falls_back_and_is_remembered() {
        let config = themed_config();
        let cancel = CancellationToken::new();
        let mut store = TextureStore::default();
        store.images.insert(1, b"not an image".to_vec());
        let mut with_material = textured(10, 1, "broken.png");
        if let Some(appearance) = with_material.appearance.as_mut() {
            appearance.material = Some(Material::from_rgb([0.0, 1.0, 0.0]));
        }
        let rows = [with_material, textured(11, 1, "broken.png")];

        let acc = MeshAssembler::new(&config, &cancel).assemble("A", &rows, &mut store).unwrap();
        assert_eq!(store.loads, 1);
        assert!(acc.is_unsupported("broken.png"));
        let first = &acc.surfaces()[0].appearance;
        let SurfaceAppearance::Material(id) = first else { panic!("expected material") };
        assert_eq!(acc.materials().get(id).unwrap().diffuse, [0.0, 1.0, 0.0]);
        // no material of its own: default wall
        let SurfaceAppearance::Material(id) = &acc.surfaces()[1].appearance else { panic!("expected material") };
        assert_eq!(acc.materials().get(id).unwrap(), &config.materials.wall);
    }

    #[test]
    fn test_material_inherited_from_parent() {
        let config = themed_config();
        let cancel = CancellationToken::new();
        let mut solid = row(1, None);
        solid.appearance = Some(AppearanceRow { material: Some(Material::from_rgb([0.1, 0.2, 0.3])), ..Default::default() });
        let mut child = row(2, Some(square(0.0)));
        child.parent_id = Some(1);
        child.root_id = 1;

        let acc = MeshAssembler::new(&config, &cancel)
            .assemble("A", &[solid, child], &mut TextureStore::default())
            .unwrap();
        assert_eq!(acc.surfaces().len(), 1);
        let SurfaceAppearance::Material(id) = &acc.surfaces()[0].appearance else { panic!("expected material") };
        assert_eq!(acc.materials().get(id).unwrap().diffuse, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_implicit_geometry_is_placed() {
        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        let mut template = row(1, Some(square(0.0)));
        let mut transform = AffineTransform::IDENTITY;
        transform.m[0] = 2.0;
        template.implicit = Some(ImplicitPlacement { transform, reference_point: [100.0, 200.0, 10.0] });

        let acc = MeshAssembler::new(&config, &cancel)
            .assemble("A", &[template], &mut TextureStore::default())
            .unwrap();
        let points = acc.surface_points(&acc.surfaces()[0]);
        assert_eq!(points[1], [102.0, 200.0, 10.0]);
        assert_eq!(acc.lowest_points().min_z(), Some(10.0));
    }

    #[test]
    fn test_cancellation_stops_assembly() {
        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = MeshAssembler::new(&config, &cancel).assemble("A", &[row(1, Some(square(0.0)))], &mut TextureStore::default());
        assert!(matches!(result, Err(crate::error::ExportError::Cancelled)));
    }
}
