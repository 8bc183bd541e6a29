use city_kml::export::{
    CancellationToken, DisplayForm, DisplaySelection, ExportPool, ExportTask, FeatureOutput, ProgressCounters,
};
use city_kml::config::AltitudeOffsetMode;
use city_kml::elevation::{ElevationError, ElevationService};
use city_kml::geometry::{IdentityTransformer, Point3, Polygon3};
use city_kml::lod::{class_id, ObjectClass};
use city_kml::store::schema::{create_schema, insert_image, insert_object, insert_surface, insert_texture, NewSurface};
use city_kml::store::SqliteStoreFactory;
use city_kml::ExportConfig;
use image::{ImageFormat, Rgba, RgbaImage};
use rusqlite::Connection;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn rect(x0: f64, y0: f64, x1: f64, y1: f64, z: f64) -> Polygon3 {
    Polygon3::from_outer(vec![[x0, y0, z], [x1, y0, z], [x1, y1, z], [x0, y1, z]])
}

/// Two buildings: one with two adjoining LOD-1 roof slabs and no stored
/// footprint, one textured LOD-2 facade
fn create_city(path: &Path) {
    let conn = Connection::open(path).unwrap();
    create_schema(&conn).unwrap();

    insert_object(&conn, 1, "BLDG_SLABS", class_id::BUILDING, Some(3.0)).unwrap();
    insert_surface(&conn, &NewSurface::polygon(10, 1, 1, rect(0.0, 0.0, 10.0, 5.0, 3.0))).unwrap();
    insert_surface(&conn, &NewSurface::polygon(11, 1, 1, rect(10.0, 0.0, 20.0, 5.0, 3.0))).unwrap();

    insert_object(&conn, 2, "BLDG_FACADE", class_id::BUILDING, Some(8.0)).unwrap();
    let facade = Polygon3::from_outer(vec![[0.0, 10.0, 0.0], [4.0, 10.0, 0.0], [4.0, 10.0, 8.0], [0.0, 10.0, 8.0]]);
    insert_surface(&conn, &NewSurface::polygon(20, 2, 2, facade)).unwrap();

    let mut png = Vec::new();
    RgbaImage::from_pixel(100, 100, Rgba([200, 120, 40, 255]))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    insert_image(&conn, 1, "facade.png", Some(&png[..])).unwrap();
    let uvs = vec![vec![[0.25, 0.25], [0.75, 0.25], [0.75, 0.75], [0.25, 0.75]]];
    insert_texture(&conn, 20, "rgbTexture", 1, &uvs).unwrap();
}

fn run(config: &ExportConfig, db: &Path, tasks: Vec<ExportTask>, out: &Path) -> (city_kml::export::RunSummary, Vec<String>) {
    run_with_service(config, db, tasks, out, None)
}

fn run_with_service(
    config: &ExportConfig,
    db: &Path,
    tasks: Vec<ExportTask>,
    out: &Path,
    service: Option<Arc<dyn ElevationService>>,
) -> (city_kml::export::RunSummary, Vec<String>) {
    let transformer = IdentityTransformer;
    let factory = SqliteStoreFactory::new(db);
    let counters = ProgressCounters::new();
    let cancel = CancellationToken::new();
    let written = Mutex::new(Vec::new());
    let summary = ExportPool::new(config, &transformer)
        .with_elevation_service(service)
        .run(tasks, &factory, &counters, &cancel, |output: &FeatureOutput| {
            output.write(out, &config.materials)?;
            written.lock().unwrap().push(output.name.clone());
            Ok(())
        })
        .unwrap();
    assert_eq!(counters.snapshot().exported as usize, summary.exported);
    (summary, written.into_inner().unwrap())
}

#[test]
fn test_footprint_is_aggregated_from_roof_slabs() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("city.db");
    create_city(&db);
    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();

    let config = ExportConfig::default();
    let task = ExportTask::new(1, "BLDG_SLABS", ObjectClass::Building, DisplaySelection::new(DisplayForm::Footprint));
    let (summary, written) = run(&config, &db, vec![task], &out);

    assert_eq!(summary.exported, 1);
    assert_eq!(written, vec!["BLDG_SLABS".to_string()]);
    let kml = std::fs::read_to_string(out.join("BLDG_SLABS.kml")).unwrap();
    assert!(kml.contains("<altitudeMode>clampToGround</altitudeMode>"));
    // one unioned polygon
    assert_eq!(kml.matches("<Polygon>").count(), 1);
    assert!(kml.contains("20,5,0"));
}

#[test]
fn test_extruded_aggregate_keeps_top_height() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("city.db");
    create_city(&db);

    let config = ExportConfig::default();
    let task = ExportTask::new(1, "BLDG_SLABS", ObjectClass::Building, DisplaySelection::new(DisplayForm::Extruded));
    let (summary, _) = run(&config, &db, vec![task], dir.path());

    assert_eq!(summary.exported, 1);
    let kml = std::fs::read_to_string(dir.path().join("BLDG_SLABS.kml")).unwrap();
    assert!(kml.contains("<extrude>1</extrude>"));
    assert!(kml.contains("<altitudeMode>absolute</altitudeMode>"));
    assert!(kml.contains("20,5,3"));
}

#[test]
fn test_textured_facade_writes_collada_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("city.db");
    create_city(&db);

    let mut config = ExportConfig::default();
    config.display.appearance_theme = Some("rgbTexture".into());
    let task = ExportTask::new(2, "BLDG_FACADE", ObjectClass::Building, DisplaySelection::new(DisplayForm::Collada));
    let (summary, _) = run(&config, &db, vec![task], dir.path());

    assert_eq!(summary.exported, 1);
    let kml = std::fs::read_to_string(dir.path().join("BLDG_FACADE.kml")).unwrap();
    assert!(kml.contains("<href>BLDG_FACADE/BLDG_FACADE.dae</href>"));

    let bundle = dir.path().join("BLDG_FACADE");
    let dae = std::fs::read_to_string(bundle.join("BLDG_FACADE.dae")).unwrap();
    assert!(dae.contains("<init_from>"));
    let pngs = std::fs::read_dir(&bundle)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
        .count();
    assert_eq!(pngs, 1);
}

#[test]
fn test_missing_object_is_skipped_and_siblings_export() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("city.db");
    create_city(&db);

    let config = ExportConfig::default();
    let display = DisplaySelection::new(DisplayForm::Geometry);
    let tasks = vec![
        ExportTask::new(99, "NOPE", ObjectClass::Building, display),
        ExportTask::new(1, "BLDG_SLABS", ObjectClass::Building, display),
    ];
    let (summary, written) = run(&config, &db, tasks, dir.path());

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.exported, 1);
    assert_eq!(written, vec!["BLDG_SLABS".to_string()]);
}

struct SlowElevation;

impl ElevationService for SlowElevation {
    fn elevation_offset(&self, _points: &[Point3]) -> Result<f64, ElevationError> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(100.0)
    }
}

#[test]
fn test_slow_elevation_service_degrades_to_zero_offset() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("city.db");
    create_city(&db);

    let mut config = ExportConfig::default();
    config.elevation.mode = AltitudeOffsetMode::GenericAttribute;
    config.elevation.call_service = true;
    config.elevation.service_timeout_ms = 20;
    let task = ExportTask::new(1, "BLDG_SLABS", ObjectClass::Building, DisplaySelection::new(DisplayForm::Geometry));
    let (summary, _) = run_with_service(&config, &db, vec![task], dir.path(), Some(Arc::new(SlowElevation)));

    assert_eq!(summary.exported, 1);
    let kml = std::fs::read_to_string(dir.path().join("BLDG_SLABS.kml")).unwrap();
    assert!(kml.contains("20,5,3"));
    assert!(!kml.contains(",103"));
}
