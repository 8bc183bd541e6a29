use super::types::{AltitudeMode, ModelPlacement, Placemark, PlacemarkContext, PlacemarkGeometry};
use crate::geometry::{Point3, ReprojectError};

/// Placemark referencing a COLLADA model whose vertices are relative to
/// `anchor`, the lowest point of the feature in store coordinates
pub fn build_model(ctx: &PlacemarkContext, anchor: Point3, href: impl Into<String>) -> Result<Placemark, ReprojectError> {
    let z_offset = ctx.z_offset;
    let location = ctx.reproject(anchor, |z| z + z_offset)?;
    Ok(Placemark {
        name: ctx.name.to_string(),
        style_url: ctx.style_url("Collada", false),
        altitude_mode: AltitudeMode::Absolute,
        geometry: PlacemarkGeometry::Model(ModelPlacement { location, href: href.into() }),
    })
}
