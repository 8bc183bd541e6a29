use super::types::{AltitudeMode, KmlPolygon, Placemark, PlacemarkContext, PlacemarkGeometry};
use crate::geometry::{ensure_ccw, Polygon3, ReprojectError};

/// Ground-clamped footprint. Aggregated footprints come with rings reversed
/// relative to stored ones and are flipped back first; outer rings always
/// end up counter-clockwise.
pub fn build_footprint(
    ctx: &PlacemarkContext,
    polygons: &[Polygon3],
    reversed_winding: bool,
) -> Result<Placemark, ReprojectError> {
    let mut out = Vec::with_capacity(polygons.len());
    for polygon in polygons {
        let mut kml = ctx.reproject_polygon(polygon, false, |_| 0.0)?;
        if reversed_winding {
            reverse_rings(&mut kml);
        }
        ensure_ccw(&mut kml.outer);
        out.push(kml);
    }
    Ok(Placemark {
        name: ctx.name.to_string(),
        style_url: ctx.style_url("Footprint", false),
        altitude_mode: AltitudeMode::ClampToGround,
        geometry: PlacemarkGeometry::Polygons(out),
    })
}

fn reverse_rings(polygon: &mut KmlPolygon) {
    polygon.outer.reverse();
    for ring in &mut polygon.inner {
        ring.reverse();
    }
}
