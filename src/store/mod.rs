//! City-model store access
//!
//! The export engine talks to the store through the [`GeometryStore`] and
//! [`OffsetAttributeStore`] traits. [`SqliteStore`] implements both on top
//! of a SQLite database; tests substitute in-memory mocks.
//!
//! # Submodules
//! - `planner` - Query text per (object class, LOD, display form, purpose)
//! - `schema` - Table definitions and fixture helpers
//! - `sqlite` - `rusqlite` backed store
//! - `aggregate` - Footprint union of surface polygons

mod aggregate;
mod planner;
pub mod schema;
mod sqlite;

use crate::export::DisplayForm;
use crate::geometry::{ImplicitPlacement, Polygon3, TransformParseError, WkbError};
use crate::lod::{ObjectClass, SurfaceKind};
use crate::mesh::Material;
use thiserror::Error;

pub use aggregate::union_footprints;
pub use planner::{QueryPlanner, QueryPurpose, SqlQueryPlanner};
pub use sqlite::{SqliteStore, SqliteStoreFactory};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid geometry in surface {surface_id}: {source}")]
    Geometry {
        surface_id: i64,
        #[source]
        source: WkbError,
    },
    #[error("invalid transform in surface {surface_id}: {source}")]
    Transform {
        surface_id: i64,
        #[source]
        source: TransformParseError,
    },
    #[error("malformed row: {0}")]
    Malformed(String),
    #[error("texture image {0} not found")]
    MissingImage(i64),
}

/// Texture image referenced by a surface
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRef {
    pub image_id: i64,
    /// File name, path or `data:` URI of the image
    pub uri: String,
}

/// Appearance data of one surface for the requested theme
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppearanceRow {
    pub material: Option<Material>,
    pub texture: Option<TextureRef>,
    /// One list per ring, outer ring first
    pub tex_coords: Vec<Vec<[f64; 2]>>,
}

/// One row of a feature's surface hierarchy. Grouping rows (solids,
/// composite surfaces) carry no geometry but may carry appearance that
/// their children inherit.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRow {
    pub id: i64,
    pub cityobject_id: i64,
    pub root_id: i64,
    pub parent_id: Option<i64>,
    pub gml_id: Option<String>,
    pub is_xlink: bool,
    /// Store class id of the thematic surface this row belongs to
    pub thematic_class: Option<i32>,
    pub geometry: Option<Polygon3>,
    pub implicit: Option<ImplicitPlacement>,
    pub appearance: Option<AppearanceRow>,
}

impl SurfaceRow {
    pub fn surface_kind(&self) -> Option<SurfaceKind> {
        self.thematic_class.and_then(SurfaceKind::from_class_id)
    }

    pub fn is_closure(&self) -> bool {
        self.surface_kind() == Some(SurfaceKind::Closure)
    }

    /// Geometry with the implicit placement applied
    pub fn placed_geometry(&self) -> Option<Polygon3> {
        let mut polygon = self.geometry.clone()?;
        if let Some(placement) = &self.implicit {
            placement.place_polygon(&mut polygon);
        }
        Some(polygon)
    }
}

/// Identifies one probe or fetch against the store
#[derive(Debug, Clone, PartialEq)]
pub struct QueryKey {
    pub object_id: i64,
    pub class: ObjectClass,
    pub lod: u8,
    pub form: DisplayForm,
    pub theme: Option<String>,
}

impl QueryKey {
    pub fn at_lod(&self, lod: u8) -> Self {
        Self { lod, ..self.clone() }
    }
}

/// Attributes of a city object needed outside its geometry
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub id: i64,
    pub gml_id: String,
    pub class_id: i32,
    pub measured_height: Option<f64>,
}

pub trait GeometryStore {
    /// Number of matching rows for an existence or marker probe
    fn count(&mut self, key: &QueryKey, purpose: QueryPurpose) -> Result<u64, StoreError>;

    /// Surface rows of the object at `key.lod`, ordered by id. Footprint
    /// forms get only stored footprint rows.
    fn surfaces(&mut self, key: &QueryKey) -> Result<Vec<SurfaceRow>, StoreError>;

    /// Union of all renderable surfaces at `key.lod` projected to the ground
    fn aggregate_footprint(
        &mut self,
        key: &QueryKey,
        tolerance: f64,
        min_area: f64,
    ) -> Result<Vec<Polygon3>, StoreError>;

    /// Encoded bytes of a texture image
    fn load_texture(&mut self, texture: &TextureRef) -> Result<Vec<u8>, StoreError>;

    fn object_info(&mut self, object_id: i64) -> Result<Option<ObjectInfo>, StoreError>;
}

/// Cached elevation offsets, stored as generic attributes of the object
pub trait OffsetAttributeStore {
    fn read_offset(&mut self, object_id: i64, lod: u8) -> Result<Option<String>, StoreError>;
    fn write_offset(&mut self, object_id: i64, lod: u8, value: &str) -> Result<(), StoreError>;
}

/// Opens one store connection per worker
pub trait StoreFactory: Sync {
    type Store: GeometryStore + OffsetAttributeStore;

    fn open(&self) -> Result<Self::Store, StoreError>;
}

/// Name of the generic attribute holding the cached offset for `lod`
pub fn offset_attribute_name(lod: u8) -> String {
    format!("zoffset_lod{}", lod)
}
