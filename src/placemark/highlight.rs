use super::geometry::VisibleSurface;
use super::types::{AltitudeMode, Placemark, PlacemarkContext, PlacemarkGeometry};
use crate::geometry::{newell_normal, normalize, ReprojectError};
use tracing::debug;

/// Shell of all surfaces pushed outward along their own normals, drawn on
/// top of the feature for hover highlighting
pub fn build_highlight(
    ctx: &PlacemarkContext,
    surfaces: &[VisibleSurface],
    distance: f64,
) -> Result<Placemark, ReprojectError> {
    let z_offset = ctx.z_offset;
    let mut polygons = Vec::with_capacity(surfaces.len());
    for surface in surfaces {
        let Some(n) = normalize(newell_normal(surface.polygon.outer())) else {
            debug!(name = ctx.name, "skipping degenerate surface in highlight");
            continue;
        };
        let mut shifted = surface.polygon.clone();
        shifted.map_points(|p| [p[0] + n[0] * distance, p[1] + n[1] * distance, p[2] + n[2] * distance]);
        polygons.push(ctx.reproject_polygon(&shifted, false, |z| z + z_offset)?);
    }
    Ok(Placemark {
        name: format!("{}_Highlight", ctx.name),
        style_url: ctx.style_url(ctx.form_variant(), true),
        altitude_mode: AltitudeMode::Absolute,
        geometry: PlacemarkGeometry::Polygons(polygons),
    })
}
