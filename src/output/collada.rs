use super::{join_numbers, XmlOut};
use crate::error::Result;
use crate::geometry::{round7, Point3};
use crate::mesh::{Material, MeshBuffers, SurfaceAppearance};
use crate::texture::TextureError;
use image::{DynamicImage, RgbaImage};
use indexmap::IndexMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const COLLADA_NAMESPACE: &str = "http://www.collada.org/2005/11/COLLADASchema";
const GEOMETRY_ID: &str = "geom";

/// Mesh of one feature with vertices relative to `origin`
pub struct ColladaModel<'a> {
    pub name: &'a str,
    pub origin: Point3,
    pub buffers: &'a MeshBuffers,
    pub materials: &'a IndexMap<String, Material>,
}

/// What one batch is bound to in the document
enum Binding<'a> {
    Material { id: String, material: &'a Material },
    Texture { id: String, image: &'a str },
}

impl Binding<'_> {
    fn id(&self) -> &str {
        match self {
            Binding::Material { id, .. } | Binding::Texture { id, .. } => id,
        }
    }
}

/// One binding per distinct batch appearance, in batch order. Materials
/// no batch uses are left out.
fn bindings<'a>(model: &ColladaModel<'a>) -> Vec<Binding<'a>> {
    let mut out: IndexMap<&SurfaceAppearance, Binding<'a>> = IndexMap::new();
    let mut textures = 0;
    for batch in &model.buffers.batches {
        if out.contains_key(&batch.appearance) {
            continue;
        }
        let binding = match &batch.appearance {
            SurfaceAppearance::Material(id) => match model.materials.get(id) {
                Some(material) => Binding::Material { id: id.clone(), material },
                None => continue,
            },
            SurfaceAppearance::Texture(image) => {
                textures += 1;
                Binding::Texture { id: format!("tex_{}", textures - 1), image: image.as_str() }
            }
        };
        out.insert(&batch.appearance, binding);
    }
    out.into_values().collect()
}

fn color_text(rgb: [f64; 3], alpha: f64) -> String {
    join_numbers([rgb[0], rgb[1], rgb[2], alpha])
}

fn write_effect<W: Write>(xml: &mut XmlOut<W>, binding: &Binding) -> Result<()> {
    let effect_id = format!("{}_fx", binding.id());
    xml.start("effect", &[("id", effect_id.as_str())])?;
    xml.start("profile_COMMON", &[])?;
    if let Binding::Texture { id, .. } = binding {
        let surface_sid = format!("{}_surface", id);
        let sampler_sid = format!("{}_sampler", id);
        xml.start("newparam", &[("sid", surface_sid.as_str())])?;
        xml.start("surface", &[("type", "2D")])?;
        xml.text_element("init_from", &[], &format!("{}_img", id))?;
        xml.end("surface")?;
        xml.end("newparam")?;
        xml.start("newparam", &[("sid", sampler_sid.as_str())])?;
        xml.start("sampler2D", &[])?;
        xml.text_element("source", &[], &surface_sid)?;
        xml.end("sampler2D")?;
        xml.end("newparam")?;
    }
    xml.start("technique", &[("sid", "COMMON")])?;
    xml.start("lambert", &[])?;
    match binding {
        Binding::Material { material, .. } => {
            let opacity = 1.0 - material.transparency;
            xml.start("emission", &[])?;
            xml.text_element("color", &[], &color_text(material.emissive, 1.0))?;
            xml.end("emission")?;
            xml.start("ambient", &[])?;
            let ambient = material.diffuse.map(|c| c * material.ambient_intensity);
            xml.text_element("color", &[], &color_text(ambient, 1.0))?;
            xml.end("ambient")?;
            xml.start("diffuse", &[])?;
            xml.text_element("color", &[], &color_text(material.diffuse, opacity))?;
            xml.end("diffuse")?;
            xml.start("transparency", &[])?;
            xml.text_element("float", &[], &opacity.to_string())?;
            xml.end("transparency")?;
        }
        Binding::Texture { id, .. } => {
            xml.start("diffuse", &[])?;
            xml.empty("texture", &[("texture", format!("{}_sampler", id).as_str()), ("texcoord", "TEX0")])?;
            xml.end("diffuse")?;
        }
    }
    xml.end("lambert")?;
    xml.end("technique")?;
    xml.end("profile_COMMON")?;
    xml.end("effect")
}

fn write_source<W: Write>(xml: &mut XmlOut<W>, id: &str, params: &[&str], values: &[f64]) -> Result<()> {
    let array_id = format!("{}-array", id);
    let stride = params.len();
    xml.start("source", &[("id", id)])?;
    xml.text_element(
        "float_array",
        &[("id", array_id.as_str()), ("count", values.len().to_string().as_str())],
        &join_numbers(values.iter().copied()),
    )?;
    xml.start("technique_common", &[])?;
    xml.start(
        "accessor",
        &[
            ("source", format!("#{}", array_id).as_str()),
            ("count", (values.len() / stride).to_string().as_str()),
            ("stride", stride.to_string().as_str()),
        ],
    )?;
    for &param in params {
        xml.empty("param", &[("name", param), ("type", "float")])?;
    }
    xml.end("accessor")?;
    xml.end("technique_common")?;
    xml.end("source")
}

fn write_geometry<W: Write>(xml: &mut XmlOut<W>, model: &ColladaModel, bindings: &[Binding]) -> Result<()> {
    let buffers = model.buffers;
    let o = model.origin;
    let positions: Vec<f64> =
        buffers.positions.iter().flat_map(|p| [round7(p[0] - o[0]), round7(p[1] - o[1]), round7(p[2] - o[2])]).collect();
    let normals: Vec<f64> = buffers.normals.iter().flat_map(|n| n.map(round7)).collect();
    let texcoords: Vec<f64> = buffers.texcoords.iter().flat_map(|t| t.map(round7)).collect();

    let positions_id = format!("{}-positions", GEOMETRY_ID);
    let normals_id = format!("{}-normals", GEOMETRY_ID);
    let texcoords_id = format!("{}-texcoords", GEOMETRY_ID);
    let vertices_id = format!("{}-vertices", GEOMETRY_ID);

    xml.start("geometry", &[("id", GEOMETRY_ID), ("name", model.name)])?;
    xml.start("mesh", &[])?;
    write_source(xml, &positions_id, &["X", "Y", "Z"], &positions)?;
    write_source(xml, &normals_id, &["X", "Y", "Z"], &normals)?;
    if !texcoords.is_empty() {
        write_source(xml, &texcoords_id, &["S", "T"], &texcoords)?;
    }
    xml.start("vertices", &[("id", vertices_id.as_str())])?;
    xml.empty("input", &[("semantic", "POSITION"), ("source", format!("#{}", positions_id).as_str())])?;
    xml.end("vertices")?;

    for batch in &buffers.batches {
        let Some(binding) = bindings.iter().find(|b| appearance_matches(b, &batch.appearance)) else {
            continue;
        };
        let textured = batch.is_textured();
        let mut indices = Vec::with_capacity(batch.triangles.len() * 9);
        for triangle in &batch.triangles {
            for corner in triangle {
                indices.push(corner.position);
                indices.push(corner.normal);
                if textured {
                    indices.push(corner.texcoord.unwrap_or(0));
                }
            }
        }
        let symbol = format!("{}_sym", binding.id());
        xml.start("triangles", &[("material", symbol.as_str()), ("count", batch.triangles.len().to_string().as_str())])?;
        xml.empty("input", &[("semantic", "VERTEX"), ("source", format!("#{}", vertices_id).as_str()), ("offset", "0")])?;
        xml.empty("input", &[("semantic", "NORMAL"), ("source", format!("#{}", normals_id).as_str()), ("offset", "1")])?;
        if textured {
            xml.empty(
                "input",
                &[("semantic", "TEXCOORD"), ("source", format!("#{}", texcoords_id).as_str()), ("offset", "2"), ("set", "0")],
            )?;
        }
        let p = indices.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        xml.text_element("p", &[], &p)?;
        xml.end("triangles")?;
    }

    xml.end("mesh")?;
    xml.end("geometry")
}

fn appearance_matches(binding: &Binding, appearance: &SurfaceAppearance) -> bool {
    match (binding, appearance) {
        (Binding::Material { id, .. }, SurfaceAppearance::Material(other)) => id == other,
        (Binding::Texture { image, .. }, SurfaceAppearance::Texture(other)) => *image == other.as_str(),
        _ => false,
    }
}

pub fn write_collada<W: Write>(out: W, model: &ColladaModel) -> Result<W> {
    let bindings = bindings(model);
    let mut xml = XmlOut::new(out);
    xml.declaration()?;
    xml.start("COLLADA", &[("xmlns", COLLADA_NAMESPACE), ("version", "1.4.1")])?;

    xml.start("asset", &[])?;
    xml.start("contributor", &[])?;
    xml.text_element("authoring_tool", &[], env!("CARGO_PKG_NAME"))?;
    xml.end("contributor")?;
    xml.empty("unit", &[("name", "meters"), ("meter", "1")])?;
    xml.text_element("up_axis", &[], "Z_UP")?;
    xml.end("asset")?;

    if bindings.iter().any(|b| matches!(b, Binding::Texture { .. })) {
        xml.start("library_images", &[])?;
        for binding in &bindings {
            if let Binding::Texture { id, image } = binding {
                xml.start("image", &[("id", format!("{}_img", id).as_str()), ("name", *image)])?;
                xml.text_element("init_from", &[], image)?;
                xml.end("image")?;
            }
        }
        xml.end("library_images")?;
    }

    xml.start("library_materials", &[])?;
    for binding in &bindings {
        xml.start("material", &[("id", binding.id())])?;
        xml.empty("instance_effect", &[("url", format!("#{}_fx", binding.id()).as_str())])?;
        xml.end("material")?;
    }
    xml.end("library_materials")?;

    xml.start("library_effects", &[])?;
    for binding in &bindings {
        write_effect(&mut xml, binding)?;
    }
    xml.end("library_effects")?;

    xml.start("library_geometries", &[])?;
    write_geometry(&mut xml, model, &bindings)?;
    xml.end("library_geometries")?;

    xml.start("library_visual_scenes", &[])?;
    xml.start("visual_scene", &[("id", "scene")])?;
    xml.start("node", &[("id", "node"), ("name", model.name)])?;
    xml.start("instance_geometry", &[("url", format!("#{}", GEOMETRY_ID).as_str())])?;
    xml.start("bind_material", &[])?;
    xml.start("technique_common", &[])?;
    for binding in &bindings {
        let symbol = format!("{}_sym", binding.id());
        let target = format!("#{}", binding.id());
        if matches!(binding, Binding::Texture { .. }) {
            xml.start("instance_material", &[("symbol", symbol.as_str()), ("target", target.as_str())])?;
            xml.empty("bind_vertex_input", &[("semantic", "TEX0"), ("input_semantic", "TEXCOORD"), ("input_set", "0")])?;
            xml.end("instance_material")?;
        } else {
            xml.empty("instance_material", &[("symbol", symbol.as_str()), ("target", target.as_str())])?;
        }
    }
    xml.end("technique_common")?;
    xml.end("bind_material")?;
    xml.end("instance_geometry")?;
    xml.end("node")?;
    xml.end("visual_scene")?;
    xml.end("library_visual_scenes")?;

    xml.start("scene", &[])?;
    xml.empty("instance_visual_scene", &[("url", "#scene")])?;
    xml.end("scene")?;

    xml.end("COLLADA")?;
    Ok(xml.into_inner())
}

pub fn collada_to_string(model: &ColladaModel) -> Result<String> {
    let buffer = write_collada(Vec::with_capacity(16 * 1024), model)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Encode every image into `dir`, format chosen by file extension. JPEG has
/// no alpha channel, so those are flattened to RGB first.
pub fn write_images(dir: &Path, images: &IndexMap<String, RgbaImage>) -> Result<()> {
    for (name, image) in images {
        let path = dir.join(name);
        let lower = name.to_ascii_lowercase();
        let saved = if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            DynamicImage::ImageRgba8(image.clone()).to_rgb8().save(&path)
        } else {
            image.save(&path)
        };
        saved.map_err(|source| TextureError::Encode { name: name.clone(), source })?;
        debug!(image = %name, "texture written");
    }
    Ok(())
}

/// Write `<dir>/<name>.dae` and its images, returning the `.dae` path
pub fn write_collada_bundle(dir: &Path, model: &ColladaModel, images: &IndexMap<String, RgbaImage>) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.dae", model.name));
    let file = File::create(&path)?;
    let mut writer = write_collada(BufWriter::with_capacity(256 * 1024, file), model)?;
    writer.flush()?;
    write_images(dir, images)?;
    Ok(path)
}
