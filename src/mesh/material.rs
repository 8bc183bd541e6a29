//! Materials and appearance keys for mesh surfaces

use serde::{Deserialize, Serialize};

/// X3D-style material as stored with a surface or configured for roofs/walls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub diffuse: [f64; 3],
    pub ambient_intensity: f64,
    pub specular: [f64; 3],
    pub emissive: [f64; 3],
    pub shininess: f64,
    pub transparency: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: [0.8, 0.8, 0.8],
            ambient_intensity: 0.2,
            specular: [1.0, 1.0, 1.0],
            emissive: [0.0, 0.0, 0.0],
            shininess: 0.2,
            transparency: 0.0,
        }
    }
}

impl Material {
    pub fn from_rgb(diffuse: [f64; 3]) -> Self {
        Self { diffuse, ..Self::default() }
    }

    /// KML `aabbggrr` colour of the diffuse channel
    pub fn kml_color(&self) -> String {
        let to_byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let alpha = to_byte(1.0 - self.transparency);
        format!(
            "{:02x}{:02x}{:02x}{:02x}",
            alpha,
            to_byte(self.diffuse[2]),
            to_byte(self.diffuse[1]),
            to_byte(self.diffuse[0])
        )
    }
}

/// What a surface is drawn with once appearance resolution is done
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceAppearance {
    /// Id of a material registered with the accumulator
    Material(String),
    /// Name of a texture image registered with the accumulator
    Texture(String),
}

impl SurfaceAppearance {
    pub fn is_textured(&self) -> bool {
        matches!(self, SurfaceAppearance::Texture(_))
    }
}

/// Reduce an image location to the file name used inside the output bundle.
/// Paths are stripped and spaces replaced; `data:` URIs get a name derived
/// from the image id.
pub fn sanitize_image_name(uri: &str, image_id: i64) -> String {
    if uri.starts_with("data:") {
        let ext = uri
            .strip_prefix("data:image/")
            .and_then(|rest| rest.split(';').next())
            .filter(|ext| !ext.is_empty())
            .unwrap_or("png");
        return format!("image_{}.{}", image_id, ext);
    }
    let file = uri.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(uri);
    file.replace(' ', "_")
}
