use super::service::{ElevationError, ElevationService};
use crate::config::{AltitudeOffsetMode, ElevationConfig};
use crate::geometry::{CoordinateTransformer, LowestPoints};
use crate::store::OffsetAttributeStore;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Offset cached as a generic attribute, encoded `mode|value|timestamp`
#[derive(Debug, Clone, PartialEq)]
pub struct CachedOffset {
    pub mode: String,
    pub value: f64,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

impl CachedOffset {
    pub const AUTO: &'static str = "auto";

    pub fn auto(value: f64) -> Self {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        Self { mode: Self::AUTO.to_string(), value, timestamp }
    }

    /// `None` for anything that is not three fields with a finite value
    pub fn parse(text: &str) -> Option<Self> {
        let mut fields = text.trim().split('|');
        let mode = fields.next()?.trim();
        let value: f64 = fields.next()?.trim().parse().ok()?;
        let timestamp: u64 = fields.next()?.trim().parse().ok()?;
        if fields.next().is_some() || mode.is_empty() || !value.is_finite() {
            return None;
        }
        Some(Self { mode: mode.to_string(), value, timestamp })
    }
}

impl fmt::Display for CachedOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.mode, self.value, self.timestamp)
    }
}

/// Resolves the vertical offset applied to a feature
pub struct OffsetResolver<'a> {
    config: &'a ElevationConfig,
    transformer: &'a dyn CoordinateTransformer,
    service: Option<&'a dyn ElevationService>,
}

impl<'a> OffsetResolver<'a> {
    pub fn new(
        config: &'a ElevationConfig,
        transformer: &'a dyn CoordinateTransformer,
        service: Option<&'a dyn ElevationService>,
    ) -> Self {
        Self { config, transformer, service }
    }

    fn service_permitted(&self) -> Option<&'a dyn ElevationService> {
        self.service.filter(|_| self.config.call_service)
    }

    /// Never fails: every error along the chain degrades to 0
    pub fn resolve(
        &self,
        object_id: i64,
        lod: u8,
        lowest: &LowestPoints,
        store: &mut dyn OffsetAttributeStore,
    ) -> f64 {
        match self.try_resolve(object_id, lod, lowest, store) {
            Ok(offset) => offset,
            Err(e) => {
                warn!(object_id, lod, "elevation offset unavailable, using 0: {}", e);
                0.0
            }
        }
    }

    fn try_resolve(
        &self,
        object_id: i64,
        lod: u8,
        lowest: &LowestPoints,
        store: &mut dyn OffsetAttributeStore,
    ) -> Result<f64, ElevationError> {
        match self.config.mode {
            AltitudeOffsetMode::NoOffset => Ok(0.0),
            AltitudeOffsetMode::Constant => Ok(self.config.constant_offset),
            AltitudeOffsetMode::BottomZero => {
                if lowest.is_empty() {
                    return Err(ElevationError::NoCandidates);
                }
                let reprojected = self.transformer.transform_curve(lowest.points())?;
                let min_z = reprojected.iter().map(|p| p[2]).fold(f64::INFINITY, f64::min);
                Ok(-min_z)
            }
            AltitudeOffsetMode::GenericAttribute => self.resolve_cached(object_id, lod, lowest, store),
        }
    }

    fn resolve_cached(
        &self,
        object_id: i64,
        lod: u8,
        lowest: &LowestPoints,
        store: &mut dyn OffsetAttributeStore,
    ) -> Result<f64, ElevationError> {
        let raw = store.read_offset(object_id, lod)?;
        if let Some(cached) = raw.as_deref().and_then(CachedOffset::parse) {
            debug!(object_id, lod, mode = %cached.mode, "using cached elevation offset");
            return Ok(cached.value);
        }
        if let Some(text) = &raw {
            warn!(object_id, lod, "ignoring malformed cached offset '{}'", text);
        }

        let Some(service) = self.service_permitted() else {
            return Ok(0.0);
        };
        if lowest.is_empty() {
            return Err(ElevationError::NoCandidates);
        }
        let reprojected = self.transformer.transform_curve(lowest.points())?;
        let value = service.elevation_offset(&reprojected)?;
        let cached = CachedOffset::auto(value);
        store.write_offset(object_id, lod, &cached.to_string())?;
        debug!(object_id, lod, value, "elevation offset fetched and cached");
        Ok(value)
    }
}
