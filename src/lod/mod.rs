//! Object classes and LOD selection
//!
//! # Submodules
//! - `capability` - Per-class capabilities and store class ids
//! - `resolver` - Walks LODs until geometry for a display form is found

mod capability;
mod resolver;

pub use capability::{class_id, surface_class_id, ClassCapability, ObjectClass, ProbeRule, SurfaceKind};
pub use resolver::{LodProbeState, LodResolver, ProbeMode, Resolution, ResolvedGeometry, ResolverState};
