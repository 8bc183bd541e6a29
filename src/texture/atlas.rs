//! Atlas packing and resizing
//!
//! Packing uses a shelf heuristic: images sorted by height are placed left
//! to right on horizontal shelves no wider than the atlas limit; a shelf
//! that would overflow the limit vertically starts the next atlas. Images
//! sampled with repeating UVs, or larger than the limit, cannot share an
//! atlas and are left standalone.

use super::{within_unit_square, TextureAtlasJob};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Position of one source image inside an atlas
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    atlas: usize,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

#[derive(Debug, Default)]
struct AtlasLayout {
    width: u32,
    height: u32,
    members: Vec<String>,
}

/// Shelf-pack `sizes` (name, width, height) into atlases of at most `max_size`
fn shelf_pack(sizes: &[(String, u32, u32)], max_size: u32) -> (Vec<AtlasLayout>, IndexMap<String, Placement>) {
    let mut order: Vec<&(String, u32, u32)> = sizes.iter().collect();
    order.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| b.1.cmp(&a.1)));

    let mut atlases = vec![AtlasLayout::default()];
    let mut placements = IndexMap::new();
    let (mut cursor_x, mut shelf_y, mut shelf_height) = (0u32, 0u32, 0u32);

    for (name, width, height) in order {
        if cursor_x + width > max_size {
            shelf_y += shelf_height;
            cursor_x = 0;
            shelf_height = 0;
        }
        if shelf_y + height > max_size {
            atlases.push(AtlasLayout::default());
            shelf_y = 0;
            cursor_x = 0;
            shelf_height = 0;
        }
        let atlas = atlases.len() - 1;
        placements.insert(name.clone(), Placement { atlas, x: cursor_x, y: shelf_y, width: *width, height: *height });

        let layout = &mut atlases[atlas];
        layout.width = layout.width.max(cursor_x + width);
        layout.height = layout.height.max(shelf_y + height);
        layout.members.push(name.clone());

        cursor_x += width;
        shelf_height = shelf_height.max(*height);
    }
    (atlases, placements)
}

/// Remap a UV of a source image into its atlas
fn remap_uv(uv: [f64; 2], placement: Placement, atlas_width: u32, atlas_height: u32) -> [f64; 2] {
    let (x, y) = (placement.x as f64, placement.y as f64);
    let (w, h) = (placement.width as f64, placement.height as f64);
    let (aw, ah) = (atlas_width as f64, atlas_height as f64);
    [(x + uv[0] * w) / aw, (ah - y - h + uv[1] * h) / ah]
}

/// Merge the job's images into as few atlases as the heuristic finds.
/// Does nothing unless at least two distinct images are in use.
pub fn pack_atlases(job: &mut TextureAtlasJob, max_size: u32) {
    job.prune_images();
    if job.images.len() < 2 {
        return;
    }

    let mut sizes = Vec::new();
    for (name, image) in &job.images {
        let surfaces = job.surfaces_using(name);
        let repeats = surfaces
            .iter()
            .filter_map(|id| job.surface_uvs.get(id))
            .any(|uvs| !within_unit_square(uvs));
        if repeats {
            debug!(image = %name, "repeating texture stays standalone");
            continue;
        }
        if image.width() > max_size || image.height() > max_size {
            debug!(image = %name, "texture larger than the atlas stays standalone");
            continue;
        }
        sizes.push((name.clone(), image.width(), image.height()));
    }
    if sizes.len() < 2 {
        return;
    }

    let (layouts, placements) = shelf_pack(&sizes, max_size);
    let mut atlas_index = 0;
    for (index, layout) in layouts.iter().enumerate() {
        // an atlas holding a single image gains nothing
        if layout.members.len() < 2 {
            continue;
        }
        let atlas_name = format!("atlas_{}.png", atlas_index);
        atlas_index += 1;

        let mut atlas = RgbaImage::new(layout.width, layout.height);
        for member in &layout.members {
            let (Some(image), Some(placement)) = (job.images.get(member), placements.get(member)) else {
                continue;
            };
            imageops::replace(&mut atlas, image, placement.x as i64, placement.y as i64);
        }

        for member in &layout.members {
            let Some(&placement) = placements.get(member) else {
                continue;
            };
            debug_assert_eq!(placement.atlas, index);
            for surface_id in job.surfaces_using(member) {
                if let Some(uvs) = job.surface_uvs.get_mut(&surface_id) {
                    for uv in uvs.iter_mut() {
                        *uv = remap_uv(*uv, placement, layout.width, layout.height);
                    }
                }
                job.surface_images.insert(surface_id, atlas_name.clone());
            }
        }
        debug!(atlas = %atlas_name, images = layout.members.len(), width = layout.width, height = layout.height, "packed atlas");
        job.images.insert(atlas_name, atlas);
    }
    job.prune_images();
}

/// Scale every image by `factor`, skipping images that would lose a dimension
pub fn resize_images(job: &mut TextureAtlasJob, factor: f64) {
    if factor >= 1.0 || factor <= 0.0 {
        return;
    }
    for (name, image) in job.images.iter_mut() {
        let width = (image.width() as f64 * factor).round() as u32;
        let height = (image.height() as f64 * factor).round() as u32;
        if width < 1 || height < 1 {
            warn!(image = %name, "texture too small to resize");
            continue;
        }
        *image = imageops::resize(&*image, width, height, FilterType::Triangle);
    }
}
