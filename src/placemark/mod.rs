//! Placemark assembly per display form
//!
//! All builders reproject through the feature's [`PlacemarkContext`] and
//! round every coordinate to 1e-7.
//!
//! # Submodules
//! - `types` - Placemark object model and shared context
//! - `footprint` - Ground-clamped footprints
//! - `extruded` - Extruded footprints
//! - `geometry` - Surfaces grouped by wall/roof/ground
//! - `highlight` - Outward-offset highlight shell
//! - `model` - COLLADA model placement

mod extruded;
mod footprint;
mod geometry;
mod highlight;
mod model;
mod types;

pub use extruded::{build_extruded, ExtrusionHeight};
pub use footprint::build_footprint;
pub use geometry::{build_geometry, infer_kind, visible_surfaces, VisibleSurface, OBJECT_LABEL};
pub use highlight::build_highlight;
pub use model::build_model;
pub use types::{AltitudeMode, KmlPolygon, ModelPlacement, Placemark, PlacemarkContext, PlacemarkGeometry};
