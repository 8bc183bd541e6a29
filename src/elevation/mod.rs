//! Vertical offset of exported features
//!
//! # Submodules
//! - `service` - External elevation lookup and its deadline guard
//! - `offset` - Offset chain: none, constant, bottom-zero, cached attribute

mod offset;
mod service;

pub use offset::{CachedOffset, OffsetResolver};
pub use service::{DeadlineElevationService, ElevationError, ElevationService};
