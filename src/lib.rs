//! Export of 3D city models from a SQLite store to KML and COLLADA
//!
//! The pipeline per feature: resolve the LOD to export ([`lod`]), fetch its
//! surfaces ([`store`]), build placemarks ([`placemark`]) or a textured mesh
//! ([`mesh`], [`texture`]), lift it by the elevation offset ([`elevation`])
//! and write the documents ([`output`]). [`export`] runs that over a worker
//! pool.

pub mod config;
pub mod elevation;
pub mod error;
pub mod export;
pub mod geometry;
pub mod lod;
pub mod mesh;
pub mod output;
pub mod placemark;
pub mod store;
pub mod texture;

pub use config::ExportConfig;
pub use error::{ExportError, Result};
pub use export::{CancellationToken, DisplayForm, DisplaySelection, ExportPool, ExportTask, FeatureExporter, FeatureOutput};
pub use lod::ObjectClass;
