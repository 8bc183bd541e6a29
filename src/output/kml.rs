use super::XmlOut;
use crate::config::MaterialConfig;
use crate::error::Result;
use crate::geometry::Point3;
use crate::placemark::{KmlPolygon, ModelPlacement, Placemark, PlacemarkGeometry};
use indexmap::IndexSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// One KML file: the placemarks of a feature or merged group
pub struct KmlDocument<'a> {
    pub name: &'a str,
    pub placemarks: &'a [Placemark],
    pub materials: &'a MaterialConfig,
}

/// `lon,lat,alt` tuples of a closed ring
fn ring_coordinates(ring: &[Point3]) -> String {
    ring.iter()
        .chain(ring.first())
        .map(|p| format!("{},{},{}", p[0], p[1], p[2]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Polygon fill of a style id; roofs get the roof material
fn style_color(style_id: &str, materials: &MaterialConfig) -> String {
    let material = if style_id.contains("Roof") { &materials.roof } else { &materials.wall };
    let color = material.kml_color();
    if style_id.ends_with("Highlight") {
        // translucent so the feature stays visible underneath
        format!("66{}", &color[2..])
    } else {
        color
    }
}

fn write_style<W: Write>(xml: &mut XmlOut<W>, style_id: &str, materials: &MaterialConfig) -> Result<()> {
    let color = style_color(style_id, materials);
    xml.start("Style", &[("id", style_id)])?;
    xml.start("LineStyle", &[])?;
    xml.text_element("color", &[], "ff000000")?;
    xml.text_element("width", &[], if style_id.ends_with("Highlight") { "2" } else { "1" })?;
    xml.end("LineStyle")?;
    xml.start("PolyStyle", &[])?;
    xml.text_element("color", &[], &color)?;
    xml.end("PolyStyle")?;
    xml.end("Style")
}

fn write_polygon<W: Write>(xml: &mut XmlOut<W>, polygon: &KmlPolygon, altitude_mode: &str) -> Result<()> {
    xml.start("Polygon", &[])?;
    if polygon.extrude {
        xml.text_element("extrude", &[], "1")?;
    }
    xml.text_element("altitudeMode", &[], altitude_mode)?;
    xml.start("outerBoundaryIs", &[])?;
    xml.start("LinearRing", &[])?;
    xml.text_element("coordinates", &[], &ring_coordinates(&polygon.outer))?;
    xml.end("LinearRing")?;
    xml.end("outerBoundaryIs")?;
    for ring in &polygon.inner {
        xml.start("innerBoundaryIs", &[])?;
        xml.start("LinearRing", &[])?;
        xml.text_element("coordinates", &[], &ring_coordinates(ring))?;
        xml.end("LinearRing")?;
        xml.end("innerBoundaryIs")?;
    }
    xml.end("Polygon")
}

fn write_model<W: Write>(xml: &mut XmlOut<W>, model: &ModelPlacement, altitude_mode: &str) -> Result<()> {
    xml.start("Model", &[])?;
    xml.text_element("altitudeMode", &[], altitude_mode)?;
    xml.start("Location", &[])?;
    xml.text_element("longitude", &[], &model.location[0].to_string())?;
    xml.text_element("latitude", &[], &model.location[1].to_string())?;
    xml.text_element("altitude", &[], &model.location[2].to_string())?;
    xml.end("Location")?;
    xml.start("Link", &[])?;
    xml.text_element("href", &[], &model.href)?;
    xml.end("Link")?;
    xml.end("Model")
}

fn write_placemark<W: Write>(xml: &mut XmlOut<W>, placemark: &Placemark) -> Result<()> {
    let altitude_mode = placemark.altitude_mode.as_kml();
    xml.start("Placemark", &[])?;
    xml.text_element("name", &[], &placemark.name)?;
    xml.text_element("styleUrl", &[], &placemark.style_url)?;
    match &placemark.geometry {
        PlacemarkGeometry::Polygons(polygons) => {
            xml.start("MultiGeometry", &[])?;
            for polygon in polygons {
                write_polygon(xml, polygon, altitude_mode)?;
            }
            xml.end("MultiGeometry")?;
        }
        PlacemarkGeometry::Model(model) => write_model(xml, model, altitude_mode)?,
    }
    xml.end("Placemark")
}

pub fn write_kml<W: Write>(out: W, doc: &KmlDocument) -> Result<W> {
    let mut xml = XmlOut::new(out);
    xml.declaration()?;
    xml.start("kml", &[("xmlns", KML_NAMESPACE)])?;
    xml.start("Document", &[])?;
    xml.text_element("name", &[], doc.name)?;

    let style_ids: IndexSet<&str> = doc
        .placemarks
        .iter()
        .filter(|p| matches!(p.geometry, PlacemarkGeometry::Polygons(_)))
        .map(|p| p.style_url.trim_start_matches('#'))
        .collect();
    for style_id in style_ids {
        write_style(&mut xml, style_id, doc.materials)?;
    }

    for placemark in doc.placemarks {
        write_placemark(&mut xml, placemark)?;
    }

    xml.end("Document")?;
    xml.end("kml")?;
    Ok(xml.into_inner())
}

pub fn kml_to_string(doc: &KmlDocument) -> Result<String> {
    let buffer = write_kml(Vec::with_capacity(4096), doc)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn write_kml_file<P: AsRef<Path>>(path: P, doc: &KmlDocument) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = write_kml(BufWriter::with_capacity(64 * 1024, file), doc)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placemark::AltitudeMode;

    fn placemarks() -> Vec<Placemark> {
        vec![
            Placemark {
                name: "B<1>_Roof".into(),
                style_url: "#BuildingRoofNormal".into(),
                altitude_mode: AltitudeMode::Absolute,
                geometry: PlacemarkGeometry::Polygons(vec![KmlPolygon {
                    outer: vec![[13.0, 52.0, 10.0], [13.1, 52.0, 10.0], [13.1, 52.1, 10.0]],
                    inner: vec![],
                    extrude: false,
                }]),
            },
            Placemark {
                name: "B1".into(),
                style_url: "#BuildingColladaNormal".into(),
                altitude_mode: AltitudeMode::Absolute,
                geometry: PlacemarkGeometry::Model(ModelPlacement { location: [13.0, 52.0, 4.5], href: "B1/B1.dae".into() }),
            },
        ]
    }

    #[test]
    fn test_document_structure() {
        let materials = MaterialConfig::default();
        let placemarks = placemarks();
        let text = kml_to_string(&KmlDocument { name: "B1", placemarks: &placemarks, materials: &materials }).unwrap();

        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<kml xmlns=\"http://www.opengis.net/kml/2.2\">"));
        assert!(text.contains("<Style id=\"BuildingRoofNormal\">"));
        assert!(!text.contains("<Style id=\"BuildingColladaNormal\">"));
        assert!(text.contains(&format!("<color>{}</color>", materials.roof.kml_color())));
        // ring closed by repeating the first point
        assert!(text.contains("<coordinates>13,52,10 13.1,52,10 13.1,52.1,10 13,52,10</coordinates>"));
        assert!(text.contains("<name>B&lt;1&gt;_Roof</name>"));
        assert!(text.contains("<href>B1/B1.dae</href>"));
        assert!(text.contains("<altitude>4.5</altitude>"));
    }

    #[test]
    fn test_highlight_style_is_translucent() {
        let materials = MaterialConfig::default();
        let color = style_color("BuildingGeometryHighlight", &materials);
        assert!(color.starts_with("66"));
        assert_eq!(&color[2..], &materials.wall.kml_color()[2..]);
    }
}
