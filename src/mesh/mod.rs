//! Indexed mesh construction
//!
//! # Submodules
//! - `vertex_index` - Tolerance-based vertex deduplication
//! - `material` - Materials, appearance keys and image names
//! - `triangulate` - Earcut triangulation with winding correction
//! - `accumulator` - Per-feature vertices, surfaces, materials and images
//! - `assembler` - Surface rows to accumulator
//! - `buffers` - Position/normal/texcoord buffers and triangle batches

mod accumulator;
mod assembler;
mod buffers;
mod material;
mod triangulate;
mod vertex_index;

pub use accumulator::{merge_id_ranges, MeshAccumulator, SurfaceRecord};
pub use assembler::MeshAssembler;
pub use buffers::{Corner, MeshBuffers, TriangleBatch};
pub use material::{sanitize_image_name, Material, SurfaceAppearance};
pub use triangulate::{fix_orientation, triangulate_surface, SurfaceTriangulation};
pub use vertex_index::{SurfaceId, VertexId, VertexIndex, VertexRecord};
