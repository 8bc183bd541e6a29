//! WKB decoding and encoding for surface geometry blobs
//!
//! The store keeps one polygon per surface row as ISO or extended WKB, in
//! either byte order. Reference points of implicit geometries are WKB points.

use super::types::{Point3, Polygon3};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};
use thiserror::Error;

const WKB_POINT: u32 = 1;
const WKB_POLYGON: u32 = 3;
const ISO_Z_OFFSET: u32 = 1000;
const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;

/// Largest ring/point count accepted before the blob is treated as corrupt
const MAX_COUNT: u32 = 10_000_000;

#[derive(Debug, Error)]
pub enum WkbError {
    #[error("input too short")]
    TooShort,
    #[error("unsupported byte order marker {0}")]
    UnsupportedByteOrder(u8),
    #[error("unsupported geometry type {0}")]
    UnsupportedGeomType(u32),
    #[error("invalid counts in WKB")]
    InvalidCounts,
}

impl From<io::Error> for WkbError {
    fn from(_: io::Error) -> Self {
        WkbError::TooShort
    }
}

/// Header information shared by all geometry types
struct Header {
    big_endian: bool,
    base_type: u32,
    has_z: bool,
    has_m: bool,
}

fn read_u32(cursor: &mut Cursor<&[u8]>, big_endian: bool) -> io::Result<u32> {
    if big_endian {
        cursor.read_u32::<BigEndian>()
    } else {
        cursor.read_u32::<LittleEndian>()
    }
}

fn read_f64(cursor: &mut Cursor<&[u8]>, big_endian: bool) -> io::Result<f64> {
    if big_endian {
        cursor.read_f64::<BigEndian>()
    } else {
        cursor.read_f64::<LittleEndian>()
    }
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<Header, WkbError> {
    let big_endian = match cursor.read_u8()? {
        0 => true,
        1 => false,
        other => return Err(WkbError::UnsupportedByteOrder(other)),
    };
    let raw = read_u32(cursor, big_endian)?;

    // EWKB flags first, then ISO thousands
    let mut has_z = raw & EWKB_Z_FLAG != 0;
    let mut has_m = raw & EWKB_M_FLAG != 0;
    if raw & EWKB_SRID_FLAG != 0 {
        read_u32(cursor, big_endian)?;
    }
    let mut base_type = raw & 0x0FFF_FFFF;
    match base_type / ISO_Z_OFFSET {
        0 => {}
        1 => has_z = true,
        2 => has_m = true,
        3 => {
            has_z = true;
            has_m = true;
        }
        _ => return Err(WkbError::UnsupportedGeomType(raw)),
    }
    base_type %= ISO_Z_OFFSET;

    Ok(Header { big_endian, base_type, has_z, has_m })
}

fn read_point(cursor: &mut Cursor<&[u8]>, header: &Header) -> Result<Point3, WkbError> {
    let x = read_f64(cursor, header.big_endian)?;
    let y = read_f64(cursor, header.big_endian)?;
    let z = if header.has_z { read_f64(cursor, header.big_endian)? } else { 0.0 };
    if header.has_m {
        read_f64(cursor, header.big_endian)?;
    }
    Ok([x, y, z])
}

fn read_count(cursor: &mut Cursor<&[u8]>, big_endian: bool) -> Result<usize, WkbError> {
    let count = read_u32(cursor, big_endian)?;
    if count > MAX_COUNT {
        return Err(WkbError::InvalidCounts);
    }
    Ok(count as usize)
}

/// Capacity for `count` elements of at least `min_size` bytes each, never
/// more than the unread part of the blob can hold
fn bounded_capacity(cursor: &Cursor<&[u8]>, count: usize, min_size: usize) -> usize {
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    count.min(remaining / min_size.max(1))
}

/// Decode a Polygon / PolygonZ blob. 2D input gets z = 0.
pub fn decode_polygon(blob: &[u8]) -> Result<Polygon3, WkbError> {
    let mut cursor = Cursor::new(blob);
    let header = read_header(&mut cursor)?;
    if header.base_type != WKB_POLYGON {
        return Err(WkbError::UnsupportedGeomType(header.base_type));
    }

    let point_size = 8 * (2 + header.has_z as usize + header.has_m as usize);
    let ring_count = read_count(&mut cursor, header.big_endian)?;
    let mut rings = Vec::with_capacity(bounded_capacity(&cursor, ring_count, 4));
    for _ in 0..ring_count {
        let point_count = read_count(&mut cursor, header.big_endian)?;
        let mut ring = Vec::with_capacity(bounded_capacity(&cursor, point_count, point_size));
        for _ in 0..point_count {
            ring.push(read_point(&mut cursor, &header)?);
        }
        rings.push(ring);
    }

    Ok(Polygon3::new(rings))
}

/// Decode a Point / PointZ blob
pub fn decode_point(blob: &[u8]) -> Result<Point3, WkbError> {
    let mut cursor = Cursor::new(blob);
    let header = read_header(&mut cursor)?;
    if header.base_type != WKB_POINT {
        return Err(WkbError::UnsupportedGeomType(header.base_type));
    }
    let point = read_point(&mut cursor, &header)?;
    // Trailing bytes mean the blob is not what the row claims
    let mut rest = [0u8; 1];
    if cursor.read(&mut rest)? != 0 {
        return Err(WkbError::InvalidCounts);
    }
    Ok(point)
}

/// Encode a polygon as little-endian ISO PolygonZ, closing every ring
pub fn encode_polygon_z(polygon: &Polygon3) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.push(1u8);
    // Writing into a Vec cannot fail
    let _ = buffer.write_u32::<LittleEndian>(ISO_Z_OFFSET + WKB_POLYGON);
    let _ = buffer.write_u32::<LittleEndian>(polygon.rings.len() as u32);
    for ring in &polygon.rings {
        let needs_close = ring.first().map(|first| ring.last() != Some(first)).unwrap_or(false);
        let count = ring.len() + usize::from(needs_close);
        let _ = buffer.write_u32::<LittleEndian>(count as u32);
        for p in ring.iter().chain(ring.first().filter(|_| needs_close)) {
            for &c in p {
                let _ = buffer.write_f64::<LittleEndian>(c);
            }
        }
    }
    buffer
}

/// Encode a point as little-endian ISO PointZ
pub fn encode_point_z(point: Point3) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(29);
    buffer.push(1u8);
    let _ = buffer.write_u32::<LittleEndian>(ISO_Z_OFFSET + WKB_POINT);
    for c in point {
        let _ = buffer.write_f64::<LittleEndian>(c);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon3 {
        Polygon3::new(vec![
            vec![[0.0, 0.0, 5.0], [4.0, 0.0, 5.0], [4.0, 4.0, 5.0], [0.0, 4.0, 5.0]],
            vec![[1.0, 1.0, 5.0], [1.0, 2.0, 5.0], [2.0, 2.0, 5.0], [2.0, 1.0, 5.0]],
        ])
    }

    #[test]
    fn test_polygon_z_decodes_with_holes() {
        let decoded = decode_polygon(&encode_polygon_z(&square())).unwrap();
        assert_eq!(decoded, square());
        assert_eq!(decoded.holes().len(), 1);
    }

    #[test]
    fn test_big_endian_2d_polygon() {
        let mut blob = vec![0u8];
        blob.extend_from_slice(&3u32.to_be_bytes());
        blob.extend_from_slice(&1u32.to_be_bytes());
        blob.extend_from_slice(&4u32.to_be_bytes());
        for (x, y) in [(0.0f64, 0.0f64), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)] {
            blob.extend_from_slice(&x.to_be_bytes());
            blob.extend_from_slice(&y.to_be_bytes());
        }
        let decoded = decode_polygon(&blob).unwrap();
        assert_eq!(decoded.outer(), &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_ewkb_with_srid() {
        let mut blob = vec![1u8];
        blob.extend_from_slice(&(WKB_POINT | EWKB_Z_FLAG | EWKB_SRID_FLAG).to_le_bytes());
        blob.extend_from_slice(&4326u32.to_le_bytes());
        for c in [7.0f64, 8.0, 9.0] {
            blob.extend_from_slice(&c.to_le_bytes());
        }
        assert_eq!(decode_point(&blob).unwrap(), [7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let blob = encode_polygon_z(&square());
        assert!(matches!(decode_polygon(&blob[..20]), Err(WkbError::TooShort)));
    }

    #[test]
    fn test_huge_count_is_bounded_by_blob_size() {
        // little-endian PolygonZ claiming 9M rings with no ring data
        let mut blob = vec![1u8];
        blob.extend_from_slice(&1003u32.to_le_bytes());
        blob.extend_from_slice(&9_000_000u32.to_le_bytes());
        assert!(matches!(decode_polygon(&blob), Err(WkbError::TooShort)));

        let data = [0u8; 100];
        let mut cursor = Cursor::new(&data[..]);
        cursor.set_position(52);
        assert_eq!(bounded_capacity(&cursor, 9_000_000, 24), 2);
        assert_eq!(bounded_capacity(&cursor, 1, 24), 1);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let blob = encode_point_z([1.0, 2.0, 3.0]);
        assert!(matches!(decode_polygon(&blob), Err(WkbError::UnsupportedGeomType(1))));
    }
}
