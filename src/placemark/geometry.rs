use super::types::{AltitudeMode, Placemark, PlacemarkContext, PlacemarkGeometry};
use crate::geometry::{newell_normal, normalize, Polygon3, ReprojectError};
use crate::lod::SurfaceKind;
use crate::store::SurfaceRow;
use indexmap::IndexMap;
use std::collections::HashSet;

const LOWEST_TOLERANCE: f64 = 1e-3;
const ROOF_NORMAL_Z: f64 = 0.999;

/// Label for surfaces of classes without thematic typing
pub const OBJECT_LABEL: &str = "Object";

/// A renderable surface with its explicit type, if any
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleSurface {
    pub kind: Option<SurfaceKind>,
    pub polygon: Polygon3,
}

/// Placed geometry of every row that is drawn: closures and repeated
/// cross-references are left out
pub fn visible_surfaces(rows: &[SurfaceRow]) -> Vec<VisibleSurface> {
    let mut emitted_gml_ids: HashSet<&str> = HashSet::new();
    let mut surfaces = Vec::new();
    for row in rows {
        if row.is_closure() {
            continue;
        }
        if row.is_xlink && row.gml_id.as_deref().is_some_and(|id| emitted_gml_ids.contains(id)) {
            continue;
        }
        let Some(polygon) = row.placed_geometry() else {
            continue;
        };
        if polygon.is_empty() || polygon.has_non_finite() {
            continue;
        }
        if let Some(gml_id) = &row.gml_id {
            emitted_gml_ids.insert(gml_id);
        }
        surfaces.push(VisibleSurface { kind: row.surface_kind(), polygon });
    }
    surfaces
}

/// Surface type for one untyped surface. The roof test is deliberately
/// crude at LOD 1, where only near-horizontal non-ground faces qualify.
pub fn infer_kind(polygon: &Polygon3, lod: u8, lowest_z: f64) -> SurfaceKind {
    let touches_lowest = polygon.points().any(|p| (p[2] - lowest_z).abs() <= LOWEST_TOLERANCE);
    let probably_roof = if lod == 1 {
        let normal_z = normalize(newell_normal(polygon.outer())).map_or(0.0, |n| n[2]);
        !touches_lowest && normal_z > ROOF_NORMAL_Z
    } else {
        !touches_lowest
    };
    if probably_roof {
        SurfaceKind::Roof
    } else if polygon.points().all(|p| (p[2] - lowest_z).abs() <= LOWEST_TOLERANCE) {
        SurfaceKind::Ground
    } else {
        SurfaceKind::Wall
    }
}

/// One placemark per surface-type label, in first-seen label order
pub fn build_geometry(
    ctx: &PlacemarkContext,
    surfaces: &[VisibleSurface],
    thematic: bool,
) -> Result<Vec<Placemark>, ReprojectError> {
    let lowest_z = surfaces
        .iter()
        .filter_map(|s| s.polygon.min_z())
        .reduce(f64::min)
        .unwrap_or(0.0);

    let z_offset = ctx.z_offset;
    let mut groups: IndexMap<&'static str, Vec<_>> = IndexMap::new();
    for surface in surfaces {
        let label = if thematic {
            surface.kind.unwrap_or_else(|| infer_kind(&surface.polygon, ctx.lod, lowest_z)).label()
        } else {
            OBJECT_LABEL
        };
        let polygon = ctx.reproject_polygon(&surface.polygon, false, |z| z + z_offset)?;
        groups.entry(label).or_default().push(polygon);
    }

    Ok(groups
        .into_iter()
        .map(|(label, polygons)| Placemark {
            name: format!("{}_{}", ctx.name, label),
            style_url: ctx.style_url(label, false),
            altitude_mode: AltitudeMode::Absolute,
            geometry: PlacemarkGeometry::Polygons(polygons),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{DisplayForm, DisplaySelection, ExportTask};
    use crate::geometry::IdentityTransformer;
    use crate::config::ExportConfig;
    use crate::export::CancellationToken;
    use crate::lod::{surface_class_id, ObjectClass};
    use crate::mesh::MeshAssembler;
    use crate::store::schema::create_schema;
    use crate::store::SqliteStore;

    fn row(id: i64, thematic_class: Option<i32>, ring: Vec<[f64; 3]>) -> SurfaceRow {
        SurfaceRow {
            id,
            cityobject_id: 1,
            root_id: id,
            parent_id: None,
            gml_id: None,
            is_xlink: false,
            thematic_class,
            geometry: Some(Polygon3::from_outer(ring)),
            implicit: None,
            appearance: None,
        }
    }

    fn flat(z: f64) -> Polygon3 {
        Polygon3::from_outer(vec![[0.0, 0.0, z], [4.0, 0.0, z], [4.0, 4.0, z], [0.0, 4.0, z]])
    }

    fn wall() -> Polygon3 {
        Polygon3::from_outer(vec![[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [4.0, 0.0, 6.0], [0.0, 0.0, 6.0]])
    }

    #[test]
    fn test_lod1_roof_needs_vertical_normal() {
        assert_eq!(infer_kind(&flat(6.0), 1, 0.0), SurfaceKind::Roof);
        assert_eq!(infer_kind(&wall(), 1, 0.0), SurfaceKind::Wall);
        assert_eq!(infer_kind(&flat(0.0), 1, 0.0), SurfaceKind::Ground);

        // slightly tilted roof plane: normal z below the threshold at LOD 1
        let tilted = Polygon3::from_outer(vec![[0.0, 0.0, 6.0], [4.0, 0.0, 6.0], [4.0, 4.0, 7.0], [0.0, 4.0, 7.0]]);
        assert_eq!(infer_kind(&tilted, 1, 0.0), SurfaceKind::Wall);
        assert_eq!(infer_kind(&tilted, 2, 0.0), SurfaceKind::Roof);
    }

    #[test]
    fn test_explicit_type_wins_and_groups_by_label() {
        let task = ExportTask::new(1, "B1", ObjectClass::Building, DisplaySelection::new(DisplayForm::Geometry));
        let transformer = IdentityTransformer;
        let ctx = PlacemarkContext::new(&task, "B1", 2, 10.0, &transformer);
        let rows = vec![
            row(1, Some(surface_class_id::BUILDING_WALL), wall().rings[0].clone()),
            row(2, None, flat(6.0).rings[0].clone()),
            row(3, Some(surface_class_id::BUILDING_CLOSURE), flat(3.0).rings[0].clone()),
            row(4, Some(surface_class_id::BUILDING_ROOF), flat(0.0).rings[0].clone()),
        ];
        let surfaces = visible_surfaces(&rows);
        assert_eq!(surfaces.len(), 3);

        let placemarks = build_geometry(&ctx, &surfaces, true).unwrap();
        let names: Vec<&str> = placemarks.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["B1_Wall", "B1_Roof"]);
        assert_eq!(placemarks[1].polygon_count(), 2);
        assert_eq!(placemarks[0].style_url, "#BuildingWallNormal");
        let PlacemarkGeometry::Polygons(polygons) = &placemarks[1].geometry else {
            panic!("expected polygons");
        };
        assert_eq!(polygons[0].outer[0][2], 16.0);
    }

    #[test]
    fn test_untyped_classes_use_one_group() {
        let task = ExportTask::new(1, "W1", ObjectClass::WaterBody, DisplaySelection::new(DisplayForm::Geometry));
        let transformer = IdentityTransformer;
        let ctx = PlacemarkContext::new(&task, "W1", 1, 0.0, &transformer);
        let rows = vec![row(1, None, wall().rings[0].clone()), row(2, None, flat(6.0).rings[0].clone())];
        let placemarks = build_geometry(&ctx, &visible_surfaces(&rows), false).unwrap();
        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].name, "W1_Object");
    }

    #[test]
    fn test_repeated_xlink_dropped() {
        let mut a = row(1, None, flat(1.0).rings[0].clone());
        a.gml_id = Some("shared".into());
        a.is_xlink = true;
        let mut b = a.clone();
        b.id = 2;
        assert_eq!(visible_surfaces(&[a, b]).len(), 1);
    }

    #[test]
    fn test_xlink_to_emitted_surface_matches_mesh() {
        let mut source = row(1, None, flat(1.0).rings[0].clone());
        source.gml_id = Some("shared".into());
        let mut link = source.clone();
        link.id = 2;
        link.is_xlink = true;
        let rows = vec![source, link];

        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        let mut store = SqliteStore::from_connection(conn);
        let acc = MeshAssembler::new(&config, &cancel).assemble("B1", &rows, &mut store).unwrap();

        assert_eq!(acc.surfaces().len(), 1);
        assert_eq!(visible_surfaces(&rows).len(), acc.surfaces().len());
    }
}
