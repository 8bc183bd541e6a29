//! SQLite backed store

use super::planner::{QueryPlanner, QueryPurpose, SqlQueryPlanner};
use super::schema::parse_tex_coords;
use super::{
    offset_attribute_name,
    union_footprints,
    AppearanceRow,
    GeometryStore,
    ObjectInfo,
    OffsetAttributeStore,
    QueryKey,
    StoreError,
    StoreFactory,
    SurfaceRow,
    TextureRef,
};
use crate::geometry::{decode_point, decode_polygon, AffineTransform, ImplicitPlacement, Polygon3};
use crate::mesh::Material;
use base64::{engine::general_purpose, Engine as _};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct SqliteStore {
    conn: Connection,
    planner: Arc<dyn QueryPlanner>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        // offsets are the only writes
        if let Err(e) = conn.pragma_update(None, "synchronous", "NORMAL") {
            debug!("cannot relax synchronous pragma: {}", e);
        }
        Self { conn, planner: Arc::new(SqlQueryPlanner) }
    }

    pub fn with_planner(mut self, planner: Arc<dyn QueryPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Ids, gml ids and class ids of every top-level city object
    pub fn list_objects(&self) -> Result<Vec<ObjectInfo>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, gmlid, objectclass_id, measured_height FROM cityobject ORDER BY id")?;
        let rows = stmt.query_map([], object_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn object_from_row(r: &Row<'_>) -> rusqlite::Result<ObjectInfo> {
    Ok(ObjectInfo { id: r.get(0)?, gml_id: r.get(1)?, class_id: r.get(2)?, measured_height: r.get(3)? })
}

fn parse_rgb(text: Option<String>) -> Option<[f64; 3]> {
    let values: Vec<f64> = text?.split_whitespace().map(|v| v.parse().ok()).collect::<Option<_>>()?;
    values.as_slice().try_into().ok()
}

/// Raw columns of a surface fetch, decoded outside the rusqlite closure so
/// geometry errors keep their own error type
struct RawSurface {
    id: i64,
    cityobject_id: i64,
    root_id: i64,
    parent_id: Option<i64>,
    gml_id: Option<String>,
    is_xlink: bool,
    thematic_class: Option<i32>,
    geometry: Option<Vec<u8>>,
    ref_point: Option<Vec<u8>>,
    transform: Option<String>,
    diffuse: Option<String>,
    ambient: Option<f64>,
    specular: Option<String>,
    emissive: Option<String>,
    shininess: Option<f64>,
    transparency: Option<f64>,
    tex_image_id: Option<i64>,
    tex_uri: Option<String>,
    tex_coords: Option<String>,
}

impl RawSurface {
    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            cityobject_id: r.get(1)?,
            root_id: r.get(2)?,
            parent_id: r.get(3)?,
            gml_id: r.get(4)?,
            is_xlink: r.get::<_, Option<bool>>(5)?.unwrap_or(false),
            thematic_class: r.get(6)?,
            geometry: r.get(7)?,
            ref_point: r.get(8)?,
            transform: r.get(9)?,
            diffuse: r.get(10)?,
            ambient: r.get(11)?,
            specular: r.get(12)?,
            emissive: r.get(13)?,
            shininess: r.get(14)?,
            transparency: r.get(15)?,
            tex_image_id: r.get(16)?,
            tex_uri: r.get(17)?,
            tex_coords: r.get(18)?,
        })
    }

    fn material(&self) -> Option<Material> {
        if self.diffuse.is_none() && self.ambient.is_none() && self.specular.is_none() && self.emissive.is_none() {
            return None;
        }
        let defaults = Material::default();
        Some(Material {
            diffuse: parse_rgb(self.diffuse.clone()).unwrap_or(defaults.diffuse),
            ambient_intensity: self.ambient.unwrap_or(defaults.ambient_intensity),
            specular: parse_rgb(self.specular.clone()).unwrap_or(defaults.specular),
            emissive: parse_rgb(self.emissive.clone()).unwrap_or(defaults.emissive),
            shininess: self.shininess.unwrap_or(defaults.shininess),
            transparency: self.transparency.unwrap_or(defaults.transparency),
        })
    }

    fn into_surface(self) -> Result<SurfaceRow, StoreError> {
        let surface_id = self.id;
        let geometry = self
            .geometry
            .as_deref()
            .map(decode_polygon)
            .transpose()
            .map_err(|source| StoreError::Geometry { surface_id, source })?;

        let implicit = match &self.ref_point {
            Some(blob) => {
                let reference_point =
                    decode_point(blob).map_err(|source| StoreError::Geometry { surface_id, source })?;
                let transform = match self.transform.as_deref() {
                    Some(text) => {
                        AffineTransform::parse(text).map_err(|source| StoreError::Transform { surface_id, source })?
                    }
                    None => AffineTransform::IDENTITY,
                };
                Some(ImplicitPlacement { transform, reference_point })
            }
            None => None,
        };

        let material = self.material();
        let texture = match (self.tex_image_id, &self.tex_uri) {
            (Some(image_id), Some(uri)) => Some(TextureRef { image_id, uri: uri.clone() }),
            _ => None,
        };
        let tex_coords = match self.tex_coords.as_deref() {
            Some(text) => parse_tex_coords(text)
                .ok_or_else(|| StoreError::Malformed(format!("texture coordinates of surface {}", surface_id)))?,
            None => Vec::new(),
        };
        let appearance = if material.is_some() || texture.is_some() {
            Some(AppearanceRow { material, texture, tex_coords })
        } else {
            None
        };

        Ok(SurfaceRow {
            id: self.id,
            cityobject_id: self.cityobject_id,
            root_id: self.root_id,
            parent_id: self.parent_id,
            gml_id: self.gml_id,
            is_xlink: self.is_xlink,
            thematic_class: self.thematic_class,
            geometry,
            implicit,
            appearance,
        })
    }
}

impl GeometryStore for SqliteStore {
    fn count(&mut self, key: &QueryKey, purpose: QueryPurpose) -> Result<u64, StoreError> {
        let sql = self.planner.plan(key, purpose);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let count: i64 = stmt.query_row(params![key.object_id, key.lod], |r| r.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn surfaces(&mut self, key: &QueryKey) -> Result<Vec<SurfaceRow>, StoreError> {
        let sql = self.planner.plan(key, QueryPurpose::Surfaces);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let raw: Vec<RawSurface> = if stmt.parameter_count() == 3 {
            let theme = key.theme.clone().unwrap_or_default();
            stmt.query_map(params![key.object_id, key.lod, theme], RawSurface::from_row)?
                .collect::<rusqlite::Result<_>>()?
        } else {
            stmt.query_map(params![key.object_id, key.lod], RawSurface::from_row)?
                .collect::<rusqlite::Result<_>>()?
        };
        debug!(object_id = key.object_id, lod = key.lod, rows = raw.len(), "fetched surfaces");
        raw.into_iter().map(RawSurface::into_surface).collect()
    }

    fn aggregate_footprint(
        &mut self,
        key: &QueryKey,
        tolerance: f64,
        min_area: f64,
    ) -> Result<Vec<Polygon3>, StoreError> {
        let sql = self.planner.plan(key, QueryPurpose::Aggregate);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![key.object_id, key.lod], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Vec<u8>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut polygons = Vec::with_capacity(rows.len());
        for (surface_id, blob) in rows {
            let polygon = decode_polygon(&blob).map_err(|source| StoreError::Geometry { surface_id, source })?;
            polygons.push(polygon);
        }
        Ok(union_footprints(&polygons, tolerance, min_area))
    }

    fn load_texture(&mut self, texture: &TextureRef) -> Result<Vec<u8>, StoreError> {
        if let Some(rest) = texture.uri.strip_prefix("data:") {
            let payload = rest
                .split_once(',')
                .map(|(_, data)| data)
                .ok_or_else(|| StoreError::Malformed(format!("data URI of image {}", texture.image_id)))?;
            return general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| StoreError::Malformed(format!("base64 payload of image {}: {}", texture.image_id, e)));
        }
        let mut stmt = self.conn.prepare_cached("SELECT data FROM tex_image WHERE id = ?1")?;
        let data: Option<Option<Vec<u8>>> =
            stmt.query_row(params![texture.image_id], |r| r.get(0)).optional()?;
        data.flatten().ok_or(StoreError::MissingImage(texture.image_id))
    }

    fn object_info(&mut self, object_id: i64) -> Result<Option<ObjectInfo>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, gmlid, objectclass_id, measured_height FROM cityobject WHERE id = ?1")?;
        Ok(stmt.query_row(params![object_id], object_from_row).optional()?)
    }
}

impl OffsetAttributeStore for SqliteStore {
    fn read_offset(&mut self, object_id: i64, lod: u8) -> Result<Option<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT strval FROM cityobject_genericattrib WHERE cityobject_id = ?1 AND attrname = ?2")?;
        let value: Option<Option<String>> = stmt
            .query_row(params![object_id, offset_attribute_name(lod)], |r| r.get(0))
            .optional()?;
        Ok(value.flatten())
    }

    fn write_offset(&mut self, object_id: i64, lod: u8, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO cityobject_genericattrib (cityobject_id, attrname, strval) VALUES (?1, ?2, ?3) \
             ON CONFLICT(cityobject_id, attrname) DO UPDATE SET strval = excluded.strval",
            params![object_id, offset_attribute_name(lod), value],
        )?;
        Ok(())
    }
}

/// Opens a fresh connection to one database file per call
#[derive(Debug, Clone)]
pub struct SqliteStoreFactory {
    path: PathBuf,
}

impl SqliteStoreFactory {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreFactory for SqliteStoreFactory {
    type Store = SqliteStore;

    fn open(&self) -> Result<SqliteStore, StoreError> {
        SqliteStore::open(&self.path)
    }
}
