//! Export configuration
//!
//! Loaded from a TOML file; every section and field has a default so an
//! empty file is a valid configuration.
//!
//! ```toml
//! [lod]
//! export_from = 5        # 0..=4, or 5 for "highest available"
//!
//! [elevation]
//! mode = "generic_attribute"
//! call_service = true
//!
//! [texture]
//! crop = true
//! atlas_max_size = 2048
//! ```

use crate::mesh::Material;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// LOD value meaning "walk down from 4 and take the first available"
pub const LOD_AUTO: u8 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub lod: LodConfig,
    pub display: DisplayConfig,
    pub elevation: ElevationConfig,
    pub materials: MaterialConfig,
    pub texture: TextureConfig,
    pub footprint: FootprintConfig,
    pub mesh: MeshConfig,
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// LOD to export from, `LOD_AUTO` for the highest available
    pub export_from: u8,
    /// Lowest LOD to fall back to. Ignored for `LOD_AUTO`, which always
    /// walks down to the object class floor.
    pub floor: Option<u8>,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self { export_from: LOD_AUTO, floor: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Outward offset of highlight shells, in source CRS units
    pub highlight_distance: f64,
    /// Appearance theme to export; `None` colours surfaces by type
    pub appearance_theme: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { highlight_distance: 0.75, appearance_theme: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltitudeOffsetMode {
    NoOffset,
    Constant,
    BottomZero,
    GenericAttribute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    pub mode: AltitudeOffsetMode,
    /// Offset used by `AltitudeOffsetMode::Constant`
    pub constant_offset: f64,
    /// Whether the external elevation service may be queried
    pub call_service: bool,
    pub service_timeout_ms: u64,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            mode: AltitudeOffsetMode::NoOffset,
            constant_offset: 0.0,
            call_service: false,
            service_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    pub roof: Material,
    /// Used for walls and for any surface without a better choice
    pub wall: Material,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            roof: Material::from_rgb([0.75, 0.25, 0.2]),
            wall: Material::from_rgb([0.8, 0.8, 0.8]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    /// Crop every texture to the UV extent of the surface using it
    pub crop: bool,
    /// Merge a feature's textures into atlases
    pub pack_atlas: bool,
    pub atlas_max_size: u32,
    /// Uniform downscale applied after packing, in (0, 1]
    pub scale_factor: f64,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self { crop: false, pack_atlas: true, atlas_max_size: 2048, scale_factor: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FootprintConfig {
    /// Snapping tolerance for the polygon union
    pub union_tolerance: f64,
    /// Polygons smaller than this (after projection to the ground) are discarded
    pub min_area: f64,
}

impl Default for FootprintConfig {
    fn default() -> Self {
        Self { union_tolerance: 0.001, min_area: 0.001 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Per-axis tolerance under which two vertices are the same
    pub vertex_tolerance: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self { vertex_tolerance: 1e-7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self { threads }
    }
}

impl ExportConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ExportConfig = toml::from_str(text).context("Failed to parse export configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.lod.export_from <= LOD_AUTO, "lod.export_from must be 0..=5");
        if let Some(floor) = self.lod.floor {
            anyhow::ensure!(floor <= 4, "lod.floor must be 0..=4");
            anyhow::ensure!(
                self.lod.export_from == LOD_AUTO || floor <= self.lod.export_from,
                "lod.floor must not exceed lod.export_from"
            );
        }
        anyhow::ensure!(self.mesh.vertex_tolerance > 0.0, "mesh.vertex_tolerance must be positive");
        anyhow::ensure!(self.footprint.union_tolerance > 0.0, "footprint.union_tolerance must be positive");
        anyhow::ensure!(self.footprint.min_area >= 0.0, "footprint.min_area must not be negative");
        anyhow::ensure!(self.workers.threads > 0, "workers.threads must be at least 1");
        anyhow::ensure!(self.texture.atlas_max_size > 0, "texture.atlas_max_size must be positive");
        anyhow::ensure!(
            self.texture.scale_factor > 0.0 && self.texture.scale_factor <= 1.0,
            "texture.scale_factor must be in (0, 1]"
        );
        Ok(())
    }

    /// True if the offset chain may end up asking the elevation service
    pub fn may_query_elevation_service(&self) -> bool {
        self.elevation.call_service && self.elevation.mode == AltitudeOffsetMode::GenericAttribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ExportConfig::from_toml_str("").unwrap();
        assert_eq!(config.lod.export_from, LOD_AUTO);
        assert_eq!(config.elevation.mode, AltitudeOffsetMode::NoOffset);
        assert!(config.texture.pack_atlas);
    }

    #[test]
    fn test_sections_parse() {
        let config = ExportConfig::from_toml_str(
            r#"
            [lod]
            export_from = 3
            floor = 1

            [elevation]
            mode = "constant"
            constant_offset = -12.5

            [display]
            appearance_theme = "rgbTexture"
            "#,
        )
        .unwrap();
        assert_eq!(config.lod.export_from, 3);
        assert_eq!(config.lod.floor, Some(1));
        assert_eq!(config.elevation.mode, AltitudeOffsetMode::Constant);
        assert_eq!(config.elevation.constant_offset, -12.5);
        assert_eq!(config.display.appearance_theme.as_deref(), Some("rgbTexture"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ExportConfig::from_toml_str("[lod]\nexport_from = 7").is_err());
        assert!(ExportConfig::from_toml_str("[lod]\nexport_from = 2\nfloor = 3").is_err());
        assert!(ExportConfig::from_toml_str("[texture]\nscale_factor = 0.0").is_err());
        assert!(ExportConfig::from_toml_str("[workers]\nthreads = 0").is_err());
    }
}
