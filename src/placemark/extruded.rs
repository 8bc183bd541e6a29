use super::types::{AltitudeMode, Placemark, PlacemarkContext, PlacemarkGeometry};
use crate::geometry::{ensure_ccw, Polygon3, ReprojectError};

/// Source of the extrusion height
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtrusionHeight {
    /// One height for the whole feature, above ground
    Measured(f64),
    /// Per-point top elevation carried by aggregated footprints
    PerPoint,
}

pub fn build_extruded(
    ctx: &PlacemarkContext,
    polygons: &[Polygon3],
    height: ExtrusionHeight,
) -> Result<Placemark, ReprojectError> {
    let mut out = Vec::with_capacity(polygons.len());
    let altitude_mode = match height {
        ExtrusionHeight::Measured(h) => {
            for polygon in polygons {
                let mut kml = ctx.reproject_polygon(polygon, true, |_| h)?;
                ensure_ccw(&mut kml.outer);
                out.push(kml);
            }
            AltitudeMode::RelativeToGround
        }
        ExtrusionHeight::PerPoint => {
            let z_offset = ctx.z_offset;
            for polygon in polygons {
                out.push(ctx.reproject_polygon(polygon, true, |z| z + z_offset)?);
            }
            AltitudeMode::Absolute
        }
    };
    Ok(Placemark {
        name: ctx.name.to_string(),
        style_url: ctx.style_url("Extruded", false),
        altitude_mode,
        geometry: PlacemarkGeometry::Polygons(out),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{DisplayForm, DisplaySelection, ExportTask};
    use crate::geometry::{signed_area_xy, IdentityTransformer};
    use crate::lod::ObjectClass;

    fn clockwise_square(z: f64) -> Polygon3 {
        Polygon3::from_outer(vec![[0.0, 0.0, z], [0.0, 5.0, z], [5.0, 5.0, z], [5.0, 0.0, z]])
    }

    #[test]
    fn test_measured_height_rewinds_outer() {
        let task = ExportTask::new(1, "B1", ObjectClass::Building, DisplaySelection::new(DisplayForm::Extruded));
        let transformer = IdentityTransformer;
        let ctx = PlacemarkContext::new(&task, "B1", 1, 2.0, &transformer);
        let placemark = build_extruded(&ctx, &[clockwise_square(0.0)], ExtrusionHeight::Measured(12.5)).unwrap();
        assert_eq!(placemark.altitude_mode, AltitudeMode::RelativeToGround);
        let PlacemarkGeometry::Polygons(polygons) = &placemark.geometry else {
            panic!("expected polygons");
        };
        assert!(polygons[0].extrude);
        assert!(signed_area_xy(&polygons[0].outer) > 0.0);
        assert!(polygons[0].outer.iter().all(|p| p[2] == 12.5));
    }

    #[test]
    fn test_per_point_height_keeps_ring_order() {
        let task = ExportTask::new(1, "B1", ObjectClass::Building, DisplaySelection::new(DisplayForm::Extruded));
        let transformer = IdentityTransformer;
        let ctx = PlacemarkContext::new(&task, "B1", 1, 2.0, &transformer);
        let placemark = build_extruded(&ctx, &[clockwise_square(9.0)], ExtrusionHeight::PerPoint).unwrap();
        assert_eq!(placemark.altitude_mode, AltitudeMode::Absolute);
        let PlacemarkGeometry::Polygons(polygons) = &placemark.geometry else {
            panic!("expected polygons");
        };
        assert!(signed_area_xy(&polygons[0].outer) < 0.0);
        assert!(polygons[0].outer.iter().all(|p| p[2] == 11.0));
    }
}
