use crate::export::{DisplayForm, ExportTask};
use crate::geometry::{round7, CoordinateTransformer, Point3, Polygon3, ReprojectError};
use crate::lod::ObjectClass;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AltitudeMode {
    ClampToGround,
    RelativeToGround,
    Absolute,
}

impl AltitudeMode {
    pub fn as_kml(self) -> &'static str {
        match self {
            AltitudeMode::ClampToGround => "clampToGround",
            AltitudeMode::RelativeToGround => "relativeToGround",
            AltitudeMode::Absolute => "absolute",
        }
    }
}

/// Polygon in display coordinates with open rings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KmlPolygon {
    pub outer: Vec<Point3>,
    pub inner: Vec<Vec<Point3>>,
    pub extrude: bool,
}

/// Where a COLLADA model is anchored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPlacement {
    /// lon, lat, altitude
    pub location: Point3,
    /// Relative path of the `.dae` file
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlacemarkGeometry {
    Polygons(Vec<KmlPolygon>),
    Model(ModelPlacement),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placemark {
    pub name: String,
    pub style_url: String,
    pub altitude_mode: AltitudeMode,
    pub geometry: PlacemarkGeometry,
}

impl Placemark {
    pub fn polygon_count(&self) -> usize {
        match &self.geometry {
            PlacemarkGeometry::Polygons(polygons) => polygons.len(),
            PlacemarkGeometry::Model(_) => 0,
        }
    }
}

/// Everything the builders share for one feature
pub struct PlacemarkContext<'a> {
    /// Output id, `A_to_B` for merged groups
    pub name: &'a str,
    pub class: ObjectClass,
    pub form: DisplayForm,
    pub lod: u8,
    pub z_offset: f64,
    pub transformer: &'a dyn CoordinateTransformer,
}

impl<'a> PlacemarkContext<'a> {
    pub fn new(task: &ExportTask, name: &'a str, lod: u8, z_offset: f64, transformer: &'a dyn CoordinateTransformer) -> Self {
        Self { name, class: task.class, form: task.display.form, lod, z_offset, transformer }
    }

    /// `#BuildingExtrudedNormal`, `#BuildingRoofNormal`, ...
    pub fn style_url(&self, variant: &str, highlight: bool) -> String {
        let state = if highlight { "Highlight" } else { "Normal" };
        format!("#{}{}{}", self.class.style_name(), variant, state)
    }

    pub fn form_variant(&self) -> &'static str {
        match self.form {
            DisplayForm::Footprint => "Footprint",
            DisplayForm::Extruded => "Extruded",
            DisplayForm::Geometry => "Geometry",
            DisplayForm::Collada => "Collada",
        }
    }

    /// Reproject and round one point, then replace its altitude with
    /// `altitude(reprojected z)`
    pub fn reproject(&self, point: Point3, altitude: impl Fn(f64) -> f64) -> Result<Point3, ReprojectError> {
        let p = self.transformer.transform(point)?;
        Ok([round7(p[0]), round7(p[1]), round7(altitude(p[2]))])
    }

    pub fn reproject_ring(&self, ring: &[Point3], altitude: impl Fn(f64) -> f64) -> Result<Vec<Point3>, ReprojectError> {
        ring.iter().map(|&p| self.reproject(p, &altitude)).collect()
    }

    /// Reproject a polygon keeping its ring order
    pub fn reproject_polygon(
        &self,
        polygon: &Polygon3,
        extrude: bool,
        altitude: impl Fn(f64) -> f64,
    ) -> Result<KmlPolygon, ReprojectError> {
        let outer = self.reproject_ring(polygon.outer(), &altitude)?;
        let inner = polygon
            .holes()
            .iter()
            .map(|ring| self.reproject_ring(ring, &altitude))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KmlPolygon { outer, inner, extrude })
    }
}
