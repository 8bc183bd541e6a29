//! Geometry module for city-model surfaces
//!
//! # Submodules
//! - `types` - Points, polygons and planar helpers (normals, winding, rounding)
//! - `wkb` - Binary geometry decoding/encoding for store blobs
//! - `transform` - Affine placement of implicit geometries
//! - `lowest` - Lowest-point candidates used to anchor a feature
//! - `reproject` - Store CRS to display CRS hook

mod lowest;
mod reproject;
mod transform;
mod types;
pub mod wkb;

pub use types::{
    cross,
    ensure_ccw,
    newell_normal,
    normalize,
    round7,
    signed_area_xy,
    strip_closing_point,
    sub,
    Point3,
    Polygon3,
};

pub use lowest::LowestPoints;

pub use reproject::{CoordinateTransformer, IdentityTransformer, ReprojectError};

pub use transform::{AffineTransform, ImplicitPlacement, TransformParseError};

pub use wkb::{decode_point, decode_polygon, encode_point_z, encode_polygon_z, WkbError};
