//! Document writers
//!
//! # Submodules
//! - `kml` - KML documents from placemarks
//! - `collada` - COLLADA meshes and their texture images

mod collada;
mod kml;

use crate::error::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

pub use collada::{collada_to_string, write_collada, write_collada_bundle, write_images, ColladaModel};
pub use kml::{kml_to_string, write_kml, write_kml_file, KmlDocument};

/// Thin layer over the quick-xml event writer with indentation
pub(crate) struct XmlOut<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> XmlOut<W> {
    pub fn new(inner: W) -> Self {
        Self { writer: Writer::new_with_indent(inner, b' ', 2) }
    }

    pub fn declaration(&mut self) -> Result<()> {
        self.writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(())
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut elem = BytesStart::new(name);
        for &attr in attrs {
            elem.push_attribute(attr);
        }
        self.writer.write_event(Event::Start(elem))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut elem = BytesStart::new(name);
        for &attr in attrs {
            elem.push_attribute(attr);
        }
        self.writer.write_event(Event::Empty(elem))?;
        Ok(())
    }

    /// `<name attrs>text</name>`, text escaped
    pub fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        self.start(name, attrs)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Space separated numbers, the list format of both KML and COLLADA
pub(crate) fn join_numbers<I: IntoIterator<Item = f64>>(values: I) -> String {
    let mut out = String::new();
    for (i, v) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&v.to_string());
    }
    out
}
