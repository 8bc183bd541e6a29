//! Crate-level error type

use crate::elevation::ElevationError;
use crate::geometry::ReprojectError;
use crate::store::StoreError;
use crate::texture::TextureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Elevation(#[from] ElevationError),
    #[error(transparent)]
    Reproject(#[from] ReprojectError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("export cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ExportError>;
