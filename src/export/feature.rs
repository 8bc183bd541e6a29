//! Export of one feature or one group of features
//!
//! A group is resolved member by member. Any error aborts the whole group,
//! so a caller never sees part of a feature; members without geometry are
//! simply left out.

use super::cancel::CancellationToken;
use super::task::{DisplayForm, ExportTask};
use crate::config::{ExportConfig, MaterialConfig};
use crate::elevation::{DeadlineElevationService, ElevationService, OffsetResolver};
use crate::error::Result;
use crate::geometry::{CoordinateTransformer, LowestPoints, Point3, Polygon3};
use crate::lod::{LodResolver, ObjectClass, Resolution, ResolvedGeometry};
use crate::mesh::{merge_id_ranges, Material, MeshAccumulator, MeshAssembler, MeshBuffers};
use crate::output::{write_collada_bundle, write_kml_file, ColladaModel, KmlDocument};
use crate::placemark::{
    build_extruded,
    build_footprint,
    build_geometry,
    build_highlight,
    build_model,
    visible_surfaces,
    ExtrusionHeight,
    Placemark,
    PlacemarkContext,
    VisibleSurface,
};
use crate::store::{GeometryStore, OffsetAttributeStore};
use crate::texture::{crop_surfaces, pack_atlases, resize_images};
use image::RgbaImage;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Mesh, materials and images of a textured-mesh feature
#[derive(Debug, Clone)]
pub struct ColladaBundle {
    /// Store coordinates the mesh vertices are made relative to
    pub origin: Point3,
    pub buffers: MeshBuffers,
    pub materials: IndexMap<String, Material>,
    pub images: IndexMap<String, RgbaImage>,
}

/// Everything produced for one feature or group
#[derive(Debug, Clone)]
pub struct FeatureOutput {
    /// Output id, `A_to_B` for merged groups
    pub name: String,
    pub class: ObjectClass,
    pub form: DisplayForm,
    pub lod: u8,
    pub placemarks: Vec<Placemark>,
    pub collada: Option<ColladaBundle>,
    pub geometry_count: usize,
}

/// File-system safe version of an output id
pub fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect()
}

impl FeatureOutput {
    pub fn image_count(&self) -> usize {
        self.collada.as_ref().map_or(0, |c| c.images.len())
    }

    /// Write `<dir>/<name>.kml` and, for textured meshes, `<dir>/<name>/`
    /// holding the `.dae` and its images. Returns the KML path.
    pub fn write(&self, dir: &Path, materials: &MaterialConfig) -> Result<PathBuf> {
        let stem = file_stem(&self.name);
        if let Some(bundle) = &self.collada {
            let model = ColladaModel {
                name: &stem,
                origin: bundle.origin,
                buffers: &bundle.buffers,
                materials: &bundle.materials,
            };
            write_collada_bundle(&dir.join(&stem), &model, &bundle.images)?;
        }
        let path = dir.join(format!("{}.kml", stem));
        write_kml_file(&path, &KmlDocument { name: &self.name, placemarks: &self.placemarks, materials })?;
        Ok(path)
    }
}

pub struct FeatureExporter<'a> {
    config: &'a ExportConfig,
    transformer: &'a dyn CoordinateTransformer,
    elevation: Option<DeadlineElevationService<dyn ElevationService>>,
    cancel: &'a CancellationToken,
}

impl<'a> FeatureExporter<'a> {
    pub fn new(config: &'a ExportConfig, transformer: &'a dyn CoordinateTransformer, cancel: &'a CancellationToken) -> Self {
        Self { config, transformer, elevation: None, cancel }
    }

    /// Every service call is bounded by `elevation.service_timeout_ms`
    pub fn with_elevation_service(mut self, service: Option<Arc<dyn ElevationService>>) -> Self {
        let timeout = Duration::from_millis(self.config.elevation.service_timeout_ms);
        self.elevation = service.map(|s| DeadlineElevationService::from_shared(s, timeout));
        self
    }

    fn offset(&self, object_id: i64, lod: u8, lowest: &LowestPoints, store: &mut dyn OffsetAttributeStore) -> f64 {
        let service = self.elevation.as_ref().map(|s| s as &dyn ElevationService);
        OffsetResolver::new(&self.config.elevation, self.transformer, service).resolve(object_id, lod, lowest, store)
    }

    fn lowest_of<'p>(&self, polygons: impl IntoIterator<Item = &'p Polygon3>) -> LowestPoints {
        let mut lowest = LowestPoints::new(self.config.may_query_elevation_service());
        for polygon in polygons {
            for &p in polygon.points() {
                lowest.offer(p);
            }
        }
        lowest
    }

    /// Export all tasks of one group. `Ok(None)` when no member has
    /// exportable geometry.
    pub fn export_group<S>(&self, tasks: &[ExportTask], store: &mut S) -> Result<Option<FeatureOutput>>
    where
        S: GeometryStore + OffsetAttributeStore,
    {
        let Some(first) = tasks.first() else {
            return Ok(None);
        };
        let resolver = LodResolver::new(self.config, self.cancel);
        let mut members = Vec::with_capacity(tasks.len());
        for task in tasks {
            if let Some(resolution) = resolver.resolve(task, store)? {
                members.push((task, resolution));
            }
        }
        if members.is_empty() {
            info!(group = %first.group_key(), "nothing to export");
            return Ok(None);
        }

        match first.display.form {
            DisplayForm::Collada => self.export_collada(&members, store),
            _ => self.export_placemarks(&members, store),
        }
    }

    fn export_placemarks<S>(&self, members: &[(&ExportTask, Resolution)], store: &mut S) -> Result<Option<FeatureOutput>>
    where
        S: GeometryStore + OffsetAttributeStore,
    {
        let (first, first_resolution) = &members[0];
        let mut name = first.gml_id.clone();
        let mut placemarks = Vec::new();
        let mut geometry_count = 0;

        for (index, (task, resolution)) in members.iter().enumerate() {
            self.cancel.check()?;
            if index > 0 {
                name = merge_id_ranges(&name, &task.gml_id);
            }
            let (member_placemarks, count) = self.member_placemarks(task, resolution, store)?;
            placemarks.extend(member_placemarks);
            geometry_count += count;
        }

        if placemarks.is_empty() {
            return Ok(None);
        }
        Ok(Some(FeatureOutput {
            name,
            class: first.class,
            form: first.display.form,
            lod: first_resolution.lod,
            placemarks,
            collada: None,
            geometry_count,
        }))
    }

    fn member_placemarks<S>(
        &self,
        task: &ExportTask,
        resolution: &Resolution,
        store: &mut S,
    ) -> Result<(Vec<Placemark>, usize)>
    where
        S: GeometryStore + OffsetAttributeStore,
    {
        let surfaces: Vec<VisibleSurface> = match &resolution.geometry {
            ResolvedGeometry::Surfaces(rows) => visible_surfaces(rows),
            ResolvedGeometry::AggregatedFootprint(polygons) => {
                polygons.iter().map(|p| VisibleSurface { kind: None, polygon: p.clone() }).collect()
            }
        };
        let count = surfaces.len();
        let polygons: Vec<Polygon3> = surfaces.iter().map(|s| s.polygon.clone()).collect();
        let aggregated = matches!(resolution.geometry, ResolvedGeometry::AggregatedFootprint(_));
        let lod = resolution.lod;

        let placemarks = match task.display.form {
            DisplayForm::Footprint => {
                let ctx = PlacemarkContext::new(task, &task.gml_id, lod, 0.0, self.transformer);
                vec![build_footprint(&ctx, &polygons, resolution.reversed_winding)?]
            }
            DisplayForm::Extruded if aggregated => {
                let offset = self.offset(task.id, lod, &self.lowest_of(&polygons), store);
                let ctx = PlacemarkContext::new(task, &task.gml_id, lod, offset, self.transformer);
                vec![build_extruded(&ctx, &polygons, ExtrusionHeight::PerPoint)?]
            }
            DisplayForm::Extruded => {
                let height = match store.object_info(task.id) {
                    Ok(info) => info.and_then(|i| i.measured_height),
                    Err(e) => {
                        warn!(object_id = task.id, "cannot read measured height: {}", e);
                        None
                    }
                };
                let height = height.unwrap_or_else(|| {
                    debug!(object_id = task.id, "no measured height, extruding by 0");
                    0.0
                });
                let ctx = PlacemarkContext::new(task, &task.gml_id, lod, 0.0, self.transformer);
                vec![build_extruded(&ctx, &polygons, ExtrusionHeight::Measured(height))?]
            }
            DisplayForm::Geometry | DisplayForm::Collada => {
                let offset = self.offset(task.id, lod, &self.lowest_of(&polygons), store);
                let ctx = PlacemarkContext::new(task, &task.gml_id, lod, offset, self.transformer);
                let thematic = task.class.capability().has_thematic_surfaces;
                let mut placemarks = build_geometry(&ctx, &surfaces, thematic)?;
                if task.display.highlight {
                    placemarks.push(build_highlight(&ctx, &surfaces, self.config.display.highlight_distance)?);
                }
                placemarks
            }
        };
        Ok((placemarks, count))
    }

    fn export_collada<S>(&self, members: &[(&ExportTask, Resolution)], store: &mut S) -> Result<Option<FeatureOutput>>
    where
        S: GeometryStore + OffsetAttributeStore,
    {
        let (first, first_resolution) = &members[0];
        let assembler = MeshAssembler::new(self.config, self.cancel);
        let mut merged: Option<MeshAccumulator> = None;
        let mut highlight_surfaces = Vec::new();

        for (task, resolution) in members {
            let ResolvedGeometry::Surfaces(rows) = &resolution.geometry else {
                continue;
            };
            let acc = assembler.assemble(&task.gml_id, rows, store)?;
            if acc.is_empty() {
                continue;
            }
            if task.display.highlight {
                highlight_surfaces.extend(visible_surfaces(rows));
            }
            match merged.as_mut() {
                Some(recipient) => recipient.absorb(acc),
                None => merged = Some(acc),
            }
        }

        let Some(mut acc) = merged else {
            return Ok(None);
        };
        self.cancel.check()?;
        self.process_textures(&mut acc);

        let buffers = acc.finish();
        let Some(anchor) = acc.lowest_points().anchor() else {
            return Ok(None);
        };
        if buffers.triangle_count() == 0 {
            info!(name = %acc.output_id(), "mesh has no triangles");
            return Ok(None);
        }

        let lod = first_resolution.lod;
        let offset = self.offset(first.id, lod, acc.lowest_points(), store);
        let name = acc.output_id().to_string();
        let stem = file_stem(&name);
        let ctx = PlacemarkContext::new(first, &name, lod, offset, self.transformer);
        let mut placemarks = vec![build_model(&ctx, anchor, format!("{}/{}.dae", stem, stem))?];
        if !highlight_surfaces.is_empty() {
            placemarks.push(build_highlight(&ctx, &highlight_surfaces, self.config.display.highlight_distance)?);
        }

        debug!(
            name = %name,
            triangles = buffers.triangle_count(),
            batches = buffers.batches.len(),
            images = acc.images().len(),
            "mesh assembled"
        );
        Ok(Some(FeatureOutput {
            name,
            class: first.class,
            form: DisplayForm::Collada,
            lod,
            placemarks,
            geometry_count: acc.geometry_count(),
            collada: Some(ColladaBundle {
                origin: anchor,
                buffers,
                materials: acc.materials().clone(),
                images: acc.images().clone(),
            }),
        }))
    }

    /// Crop, pack and resize per configuration
    fn process_textures(&self, acc: &mut MeshAccumulator) {
        let texture = &self.config.texture;
        let mut job = acc.texture_job();
        if job.is_empty() {
            return;
        }
        if texture.crop {
            crop_surfaces(&mut job);
        }
        if texture.pack_atlas {
            pack_atlases(&mut job, texture.atlas_max_size);
        }
        if texture.scale_factor < 1.0 {
            resize_images(&mut job, texture.scale_factor);
        }
        job.prune_images();
        acc.apply_texture_job(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::DisplaySelection;
    use crate::geometry::IdentityTransformer;
    use crate::lod::{class_id, surface_class_id};
    use crate::placemark::PlacemarkGeometry;
    use crate::store::schema::{create_schema, insert_object, insert_surface, NewSurface};
    use crate::store::SqliteStore;
    use rusqlite::Connection;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64, z: f64) -> Polygon3 {
        Polygon3::from_outer(vec![[x0, y0, z], [x1, y0, z], [x1, y1, z], [x0, y1, z]])
    }

    /// Box of side 4 and height 6 at LOD 2 with typed surfaces
    fn building_store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        insert_object(&conn, 1, "BLDG_1", class_id::BUILDING, Some(6.0)).unwrap();
        let surfaces = [
            (rect(0.0, 0.0, 4.0, 4.0, 0.0), surface_class_id::BUILDING_GROUND),
            (rect(0.0, 0.0, 4.0, 4.0, 6.0), surface_class_id::BUILDING_ROOF),
            (
                Polygon3::from_outer(vec![[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [4.0, 0.0, 6.0], [0.0, 0.0, 6.0]]),
                surface_class_id::BUILDING_WALL,
            ),
        ];
        for (i, (polygon, class)) in surfaces.into_iter().enumerate() {
            let mut surface = NewSurface::polygon(10 + i as i64, 1, 2, polygon);
            surface.thematic_class = Some(class);
            insert_surface(&conn, &surface).unwrap();
        }
        SqliteStore::from_connection(conn)
    }

    fn task(form: DisplayForm) -> ExportTask {
        ExportTask::new(1, "BLDG_1", ObjectClass::Building, DisplaySelection::new(form))
    }

    #[test]
    fn test_geometry_form_groups_surfaces() {
        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        let transformer = IdentityTransformer;
        let mut store = building_store();
        let exporter = FeatureExporter::new(&config, &transformer, &cancel);

        let output = exporter.export_group(&[task(DisplayForm::Geometry)], &mut store).unwrap().unwrap();
        assert_eq!(output.lod, 2);
        assert_eq!(output.geometry_count, 3);
        let names: Vec<&str> = output.placemarks.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["BLDG_1_Ground", "BLDG_1_Roof", "BLDG_1_Wall"]);
    }

    #[test]
    fn test_collada_form_builds_mesh_and_model() {
        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        let transformer = IdentityTransformer;
        let mut store = building_store();
        let exporter = FeatureExporter::new(&config, &transformer, &cancel);

        let output = exporter.export_group(&[task(DisplayForm::Collada)], &mut store).unwrap().unwrap();
        let bundle = output.collada.as_ref().unwrap();
        assert_eq!(bundle.origin, [0.0, 0.0, 0.0]);
        assert_eq!(bundle.buffers.triangle_count(), 6);
        // ground shares its corners with roof and wall where they coincide
        assert_eq!(bundle.buffers.positions.len(), 8);
        assert_eq!(output.placemarks.len(), 1);
        assert!(matches!(output.placemarks[0].geometry, PlacemarkGeometry::Model(_)));

        let dir = tempfile::tempdir().unwrap();
        let kml = output.write(dir.path(), &config.materials).unwrap();
        assert!(kml.exists());
        assert!(dir.path().join("BLDG_1").join("BLDG_1.dae").exists());
    }

    #[test]
    fn test_group_members_merge_names() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        insert_object(&conn, 1, "B_1", class_id::BUILDING, None).unwrap();
        insert_object(&conn, 2, "B_2", class_id::BUILDING, None).unwrap();
        insert_object(&conn, 3, "B_3", class_id::BUILDING, None).unwrap();
        insert_surface(&conn, &NewSurface::polygon(10, 1, 1, rect(0.0, 0.0, 1.0, 1.0, 3.0))).unwrap();
        insert_surface(&conn, &NewSurface::polygon(20, 2, 1, rect(5.0, 0.0, 6.0, 1.0, 3.0))).unwrap();
        let mut store = SqliteStore::from_connection(conn);

        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        let transformer = IdentityTransformer;
        let exporter = FeatureExporter::new(&config, &transformer, &cancel);
        let display = DisplaySelection::new(DisplayForm::Collada);
        let tasks = vec![
            ExportTask::new(2, "B_2", ObjectClass::Building, display).in_group("G"),
            ExportTask::new(3, "B_3", ObjectClass::Building, display).in_group("G"),
            ExportTask::new(1, "B_1", ObjectClass::Building, display).in_group("G"),
        ];
        let output = exporter.export_group(&tasks, &mut store).unwrap().unwrap();
        // B_3 has no geometry and does not widen the range
        assert_eq!(output.name, "B_1_to_B_2");
        assert_eq!(output.geometry_count, 2);
    }

    #[test]
    fn test_nothing_to_export() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        insert_object(&conn, 1, "EMPTY", class_id::BUILDING, None).unwrap();
        let mut store = SqliteStore::from_connection(conn);
        let config = ExportConfig::default();
        let cancel = CancellationToken::new();
        let transformer = IdentityTransformer;
        let exporter = FeatureExporter::new(&config, &transformer, &cancel);
        let task = ExportTask::new(1, "EMPTY", ObjectClass::Building, DisplaySelection::new(DisplayForm::Footprint));
        assert!(exporter.export_group(&[task], &mut store).unwrap().is_none());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("urn:adv:BLDG/1"), "urn_adv_BLDG_1");
        assert_eq!(file_stem("B_1_to_B_2"), "B_1_to_B_2");
    }
}
