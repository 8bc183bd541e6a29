//! Cropping textures to the part a surface actually uses
//!
//! UVs have their origin at the bottom left while image rows start at the
//! top, so the t range is flipped when converted to pixel rows.

use super::{uv_bounds, within_unit_square, TextureAtlasJob, TextureError};
use crate::mesh::SurfaceId;
use image::imageops;
use image::RgbaImage;
use tracing::{debug, warn};

/// Pixel window of an image and the UV rewrite into it
#[derive(Debug, Clone, Copy, PartialEq)]
struct CropWindow {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
}

fn crop_window(name: &str, surface_id: SurfaceId, image: &RgbaImage, uvs: &[[f64; 2]]) -> Result<CropWindow, TextureError> {
    let fail = |reason: &str| TextureError::Crop { name: name.to_string(), surface_id, reason: reason.to_string() };

    if !within_unit_square(uvs) {
        return Err(fail("texture coordinates outside [0, 1]"));
    }
    let (s_min, t_min, s_max, t_max) = uv_bounds(uvs).ok_or_else(|| fail("no texture coordinates"))?;
    let (w, h) = (image.width() as f64, image.height() as f64);

    let x0 = (s_min * w).floor();
    let x1 = (s_max * w).ceil();
    let y0 = ((1.0 - t_max) * h).floor();
    let y1 = ((1.0 - t_min) * h).ceil();
    if x1 <= x0 || y1 <= y0 {
        return Err(fail("empty texture extent"));
    }
    Ok(CropWindow { x0: x0 as u32, y0: y0 as u32, width: (x1 - x0) as u32, height: (y1 - y0) as u32 })
}

/// Rewrite a UV of the full image into the cropped frame
fn remap_uv(uv: [f64; 2], window: CropWindow, full_width: u32, full_height: u32) -> [f64; 2] {
    let (w, h) = (full_width as f64, full_height as f64);
    let y1 = (window.y0 + window.height) as f64;
    [
        (uv[0] * w - window.x0 as f64) / window.width as f64,
        (uv[1] * h - (h - y1)) / window.height as f64,
    ]
}

/// Replace every surface's image by the sub-image its UVs span. Surfaces
/// that cannot be cropped keep their original image.
pub fn crop_surfaces(job: &mut TextureAtlasJob) {
    let surfaces: Vec<SurfaceId> = job.surface_images.keys().copied().collect();
    let mut cropped_images = Vec::new();

    for surface_id in surfaces {
        let (Some(name), Some(uvs)) = (job.surface_images.get(&surface_id), job.surface_uvs.get(&surface_id)) else {
            continue;
        };
        let Some(image) = job.images.get(name) else {
            continue;
        };

        let window = match crop_window(name, surface_id, image, uvs) {
            Ok(window) => window,
            Err(e) => {
                warn!(surface_id, image = %name, "{}; keeping the uncropped texture", e);
                continue;
            }
        };

        let cropped = imageops::crop_imm(image, window.x0, window.y0, window.width, window.height).to_image();
        let new_uvs: Vec<[f64; 2]> =
            uvs.iter().map(|&uv| remap_uv(uv, window, image.width(), image.height())).collect();
        let new_name = format!("s{}_{}", surface_id, name);
        debug!(surface_id, image = %name, width = window.width, height = window.height, "cropped texture");

        cropped_images.push((new_name.clone(), cropped));
        job.surface_images.insert(surface_id, new_name);
        job.surface_uvs.insert(surface_id, new_uvs);
    }

    for (name, image) in cropped_images {
        job.images.insert(name, image);
    }
    job.prune_images();
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn job_with(uvs: Vec<[f64; 2]>) -> TextureAtlasJob {
        let mut job = TextureAtlasJob::default();
        let image = RgbaImage::from_fn(100, 100, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        job.images.insert("facade.png".to_string(), image);
        job.surface_images.insert(7, "facade.png".to_string());
        job.surface_uvs.insert(7, uvs);
        job
    }

    #[test]
    fn test_crop_to_centre_quarter() {
        let mut job = job_with(vec![[0.25, 0.25], [0.75, 0.25], [0.75, 0.75], [0.25, 0.75]]);
        crop_surfaces(&mut job);

        let name = job.surface_images.get(&7).unwrap();
        assert_eq!(name, "s7_facade.png");
        let image = job.images.get(name).unwrap();
        assert_eq!(image.dimensions(), (50, 50));
        // top-left pixel of the crop is pixel (25, 25) of the original
        assert_eq!(image.get_pixel(0, 0), &Rgba([25, 25, 0, 255]));
        assert_eq!(job.surface_uvs.get(&7).unwrap(), &vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        assert_eq!(job.images.len(), 1);
    }

    #[test]
    fn test_vertical_flip() {
        // the bottom fifth of the texture is the bottom rows of the image
        let mut job = job_with(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 0.2], [0.0, 0.2]]);
        crop_surfaces(&mut job);
        let image = job.images.get("s7_facade.png").unwrap();
        assert_eq!(image.dimensions(), (100, 20));
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 80, 0, 255]));
    }

    #[test]
    fn test_repeating_uvs_keep_original() {
        let uvs = vec![[0.0, 0.0], [2.0, 0.0], [2.0, 1.0]];
        let mut job = job_with(uvs.clone());
        crop_surfaces(&mut job);
        assert_eq!(job.surface_images.get(&7).unwrap(), "facade.png");
        assert_eq!(job.surface_uvs.get(&7).unwrap(), &uvs);
        assert_eq!(job.images.get("facade.png").unwrap().dimensions(), (100, 100));
    }
}
