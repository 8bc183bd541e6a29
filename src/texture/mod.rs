//! Texture processing for textured mesh output
//!
//! A [`TextureAtlasJob`] collects the images of one feature together with
//! the image and UV list of every textured surface. The passes run in this
//! order, each optional:
//!
//! 1. `crop_surfaces` - cut every surface's image down to its UV extent
//! 2. `pack_atlases` - merge images into shelf-packed atlases
//! 3. `resize_images` - uniform downscale
//!
//! Each pass keeps the job consistent: every textured surface references an
//! image present in the job and carries one UV per vertex. A failure affects
//! only the surface or image concerned, which keeps its previous state.

mod atlas;
mod crop;

use crate::mesh::SurfaceId;
use image::RgbaImage;
use indexmap::IndexMap;
use thiserror::Error;

pub use atlas::{pack_atlases, resize_images};
pub use crop::crop_surfaces;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to decode image {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode image {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot crop image {name} for surface {surface_id}: {reason}")]
    Crop { name: String, surface_id: SurfaceId, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct TextureAtlasJob {
    /// Decoded images by output file name
    pub images: IndexMap<String, RgbaImage>,
    /// Image used by each textured surface
    pub surface_images: IndexMap<SurfaceId, String>,
    /// UVs of each textured surface in vertex order
    pub surface_uvs: IndexMap<SurfaceId, Vec<[f64; 2]>>,
}

impl TextureAtlasJob {
    pub fn is_empty(&self) -> bool {
        self.surface_images.is_empty()
    }

    /// Drop images no surface references anymore
    pub fn prune_images(&mut self) {
        let used: Vec<&String> = self.surface_images.values().collect();
        let unused: Vec<String> = self.images.keys().filter(|name| !used.contains(name)).cloned().collect();
        for name in unused {
            self.images.shift_remove(&name);
        }
    }

    /// Surfaces using image `name`, in job order
    pub fn surfaces_using(&self, name: &str) -> Vec<SurfaceId> {
        self.surface_images.iter().filter(|(_, image)| image.as_str() == name).map(|(&id, _)| id).collect()
    }
}

/// UV extent `(s_min, t_min, s_max, t_max)`, `None` for an empty list
pub(crate) fn uv_bounds(uvs: &[[f64; 2]]) -> Option<(f64, f64, f64, f64)> {
    let first = uvs.first()?;
    let mut bounds = (first[0], first[1], first[0], first[1]);
    for uv in uvs {
        bounds.0 = bounds.0.min(uv[0]);
        bounds.1 = bounds.1.min(uv[1]);
        bounds.2 = bounds.2.max(uv[0]);
        bounds.3 = bounds.3.max(uv[1]);
    }
    Some(bounds)
}

/// True if every UV lies in the unit square, i.e. the texture does not repeat
pub(crate) fn within_unit_square(uvs: &[[f64; 2]]) -> bool {
    uvs.iter().all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]))
}
