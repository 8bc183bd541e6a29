//! SQLite schema of the city-model store
//!
//! The insert helpers write the same layout the store reads and are used to
//! build databases for tests and tooling.

use super::StoreError;
use crate::geometry::{encode_point_z, encode_polygon_z, AffineTransform, Point3, Polygon3};
use crate::mesh::Material;
use rusqlite::{params, Connection};

pub const CREATE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cityobject (
    id INTEGER PRIMARY KEY,
    gmlid TEXT NOT NULL,
    objectclass_id INTEGER NOT NULL,
    measured_height REAL
);
CREATE TABLE IF NOT EXISTS surface_geometry (
    id INTEGER PRIMARY KEY,
    cityobject_id INTEGER NOT NULL REFERENCES cityobject(id),
    root_id INTEGER NOT NULL,
    parent_id INTEGER,
    lod INTEGER NOT NULL,
    role TEXT NOT NULL DEFAULT 'multisurface',
    gmlid TEXT,
    is_xlink INTEGER NOT NULL DEFAULT 0,
    thematic_class INTEGER,
    geometry BLOB,
    ref_point BLOB,
    transform TEXT
);
CREATE INDEX IF NOT EXISTS idx_surface_geometry_object_lod ON surface_geometry(cityobject_id, lod);
CREATE TABLE IF NOT EXISTS tex_image (
    id INTEGER PRIMARY KEY,
    uri TEXT NOT NULL,
    data BLOB
);
CREATE TABLE IF NOT EXISTS surface_data (
    surface_geometry_id INTEGER NOT NULL REFERENCES surface_geometry(id),
    theme TEXT NOT NULL,
    diffuse TEXT,
    ambient REAL,
    specular TEXT,
    emissive TEXT,
    shininess REAL,
    transparency REAL,
    tex_image_id INTEGER REFERENCES tex_image(id),
    tex_coords TEXT
);
CREATE INDEX IF NOT EXISTS idx_surface_data_surface ON surface_data(surface_geometry_id, theme);
CREATE TABLE IF NOT EXISTS cityobject_genericattrib (
    cityobject_id INTEGER NOT NULL REFERENCES cityobject(id),
    attrname TEXT NOT NULL,
    strval TEXT,
    PRIMARY KEY (cityobject_id, attrname)
);
";

pub fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(CREATE_SCHEMA)?;
    Ok(())
}

/// Role of a surface geometry row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    Solid,
    MultiSurface,
    Footprint,
    Implicit,
}

impl SurfaceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceRole::Solid => "solid",
            SurfaceRole::MultiSurface => "multisurface",
            SurfaceRole::Footprint => "footprint",
            SurfaceRole::Implicit => "implicit",
        }
    }
}

/// A surface geometry row to insert
#[derive(Debug, Clone)]
pub struct NewSurface {
    pub id: i64,
    pub cityobject_id: i64,
    pub root_id: i64,
    pub parent_id: Option<i64>,
    pub lod: u8,
    pub role: SurfaceRole,
    pub gml_id: Option<String>,
    pub is_xlink: bool,
    pub thematic_class: Option<i32>,
    pub geometry: Option<Polygon3>,
    pub reference_point: Option<Point3>,
    pub transform: Option<AffineTransform>,
}

impl NewSurface {
    /// A plain multi-surface member that is its own root
    pub fn polygon(id: i64, cityobject_id: i64, lod: u8, geometry: Polygon3) -> Self {
        Self {
            id,
            cityobject_id,
            root_id: id,
            parent_id: None,
            lod,
            role: SurfaceRole::MultiSurface,
            gml_id: None,
            is_xlink: false,
            thematic_class: None,
            geometry: Some(geometry),
            reference_point: None,
            transform: None,
        }
    }
}

pub fn insert_object(
    conn: &Connection,
    id: i64,
    gml_id: &str,
    class_id: i32,
    measured_height: Option<f64>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO cityobject (id, gmlid, objectclass_id, measured_height) VALUES (?1, ?2, ?3, ?4)",
        params![id, gml_id, class_id, measured_height],
    )?;
    Ok(())
}

pub fn insert_surface(conn: &Connection, surface: &NewSurface) -> Result<(), StoreError> {
    let transform = surface
        .transform
        .map(|t| t.m.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" "));
    conn.execute(
        "INSERT INTO surface_geometry (id, cityobject_id, root_id, parent_id, lod, role, gmlid, is_xlink, \
         thematic_class, geometry, ref_point, transform) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            surface.id,
            surface.cityobject_id,
            surface.root_id,
            surface.parent_id,
            surface.lod,
            surface.role.as_str(),
            surface.gml_id,
            surface.is_xlink,
            surface.thematic_class,
            surface.geometry.as_ref().map(encode_polygon_z),
            surface.reference_point.map(encode_point_z),
            transform,
        ],
    )?;
    Ok(())
}

fn rgb_text(c: [f64; 3]) -> String {
    format!("{} {} {}", c[0], c[1], c[2])
}

pub fn insert_material(conn: &Connection, surface_id: i64, theme: &str, material: &Material) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO surface_data (surface_geometry_id, theme, diffuse, ambient, specular, emissive, shininess, transparency) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            surface_id,
            theme,
            rgb_text(material.diffuse),
            material.ambient_intensity,
            rgb_text(material.specular),
            rgb_text(material.emissive),
            material.shininess,
            material.transparency,
        ],
    )?;
    Ok(())
}

pub fn insert_image(conn: &Connection, image_id: i64, uri: &str, data: Option<&[u8]>) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO tex_image (id, uri, data) VALUES (?1, ?2, ?3)",
        params![image_id, uri, data],
    )?;
    Ok(())
}

/// Bind a texture to a surface; `tex_coords` holds one list per ring
pub fn insert_texture(
    conn: &Connection,
    surface_id: i64,
    theme: &str,
    image_id: i64,
    tex_coords: &[Vec<[f64; 2]>],
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO surface_data (surface_geometry_id, theme, tex_image_id, tex_coords) VALUES (?1, ?2, ?3, ?4)",
        params![surface_id, theme, image_id, format_tex_coords(tex_coords)],
    )?;
    Ok(())
}

/// `s t s t;s t ...`, one ring per `;` separated part
pub fn format_tex_coords(rings: &[Vec<[f64; 2]>]) -> String {
    rings
        .iter()
        .map(|ring| ring.iter().map(|uv| format!("{} {}", uv[0], uv[1])).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(";")
}

/// Inverse of [`format_tex_coords`]; `None` for malformed numbers or odd counts
pub fn parse_tex_coords(text: &str) -> Option<Vec<Vec<[f64; 2]>>> {
    text.split(';')
        .map(|ring| {
            let values: Vec<f64> = ring.split_whitespace().map(|v| v.parse().ok()).collect::<Option<_>>()?;
            if values.len() % 2 != 0 {
                return None;
            }
            Some(values.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tex_coords_text() {
        let rings = vec![vec![[0.0, 0.0], [1.0, 0.5], [0.25, 1.0]], vec![[0.5, 0.5]]];
        let text = format_tex_coords(&rings);
        assert_eq!(text, "0 0 1 0.5 0.25 1;0.5 0.5");
        assert_eq!(parse_tex_coords(&text), Some(rings));
        assert_eq!(parse_tex_coords("0 0 1"), None);
        assert_eq!(parse_tex_coords("0 x"), None);
    }

    #[test]
    fn test_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();
        insert_object(&conn, 1, "BLDG_1", 26, Some(12.0)).unwrap();
        let square = Polygon3::from_outer(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]]);
        insert_surface(&conn, &NewSurface::polygon(10, 1, 2, square)).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM surface_geometry", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
