//! LOD resolution
//!
//! The resolver walks LODs from high to low and stops at the first one that
//! holds geometry for the task's display form:
//!
//! ```text
//! Probing(lod) --rows--> Found(lod)
//!      |
//!      +--none, footprint aggregation allowed--> Aggregating(lod) --union--> Found(lod)
//!      |                                              |
//!      +--none----------------------------------------+--> Probing(lod - 1) ... Exhausted
//!
//! form not achievable from lod --> Unachievable(lod)
//! ```
//!
//! A failing query is logged and counts as "no geometry at this LOD".

use super::capability::{ClassCapability, ProbeRule};
use crate::config::{ExportConfig, LOD_AUTO};
use crate::error::Result;
use crate::export::{CancellationToken, ExportTask};
use crate::geometry::Polygon3;
use crate::store::{GeometryStore, QueryKey, QueryPurpose, StoreError, SurfaceRow};
use tracing::{debug, info, warn};

/// Whether a probe only checks existence before fetching or fetches directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    Existence,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodProbeState {
    pub lod: u8,
    pub floor: u8,
    pub mode: ProbeMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Probing(u8),
    Aggregating(u8),
    Found(u8),
    Unachievable(u8),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedGeometry {
    /// Surface rows as stored
    Surfaces(Vec<SurfaceRow>),
    /// Footprint unioned from all surfaces
    AggregatedFootprint(Vec<Polygon3>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub lod: u8,
    pub geometry: ResolvedGeometry,
    /// Rings run opposite to stored footprints and must be reversed
    pub reversed_winding: bool,
    /// States passed through, ending in `Found`
    pub trace: Vec<ResolverState>,
}

pub struct LodResolver<'a> {
    config: &'a ExportConfig,
    cancel: &'a CancellationToken,
}

impl<'a> LodResolver<'a> {
    pub fn new(config: &'a ExportConfig, cancel: &'a CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// First LOD to probe and the floor for a class
    pub fn lod_range(&self, capability: &ClassCapability) -> (u8, u8) {
        let lod = &self.config.lod;
        if lod.export_from == LOD_AUTO {
            (4, capability.lod_floor)
        } else {
            let floor = lod.floor.unwrap_or(lod.export_from).max(capability.lod_floor);
            (lod.export_from, floor)
        }
    }

    pub fn initial_state(&self, task: &ExportTask) -> LodProbeState {
        let capability = task.class.capability();
        let (lod, floor) = self.lod_range(&capability);
        let mode = if task.display.form.is_footprint_based() || capability.probe_rule == ProbeRule::MarkerNonZero {
            ProbeMode::Existence
        } else {
            ProbeMode::Full
        };
        LodProbeState { lod, floor, mode }
    }

    /// Find the geometry to export for `task`. `Ok(None)` means nothing
    /// exportable exists, which is not an error.
    pub fn resolve(&self, task: &ExportTask, store: &mut dyn GeometryStore) -> Result<Option<Resolution>> {
        let capability = task.class.capability();
        let form = task.display.form;
        let state = self.initial_state(task);
        let key = QueryKey {
            object_id: task.id,
            class: task.class,
            lod: state.lod,
            form,
            theme: self.config.display.appearance_theme.clone(),
        };
        let mut trace = Vec::new();

        if !capability.supports(form) {
            info!(object_id = task.id, gml_id = %task.gml_id, form = %form, "display form not supported by class");
            return Ok(None);
        }

        for lod in (state.floor..=state.lod).rev() {
            self.cancel.check()?;

            if !form.is_achievable_from(lod) {
                trace.push(ResolverState::Unachievable(lod));
                info!(object_id = task.id, gml_id = %task.gml_id, lod, form = %form, "display form not achievable from LOD");
                return Ok(None);
            }

            trace.push(ResolverState::Probing(lod));
            let key = key.at_lod(lod);
            match self.probe(&key, &capability, state.mode, store) {
                Ok(Some(rows)) => {
                    trace.push(ResolverState::Found(lod));
                    debug!(object_id = task.id, lod, rows = rows.len(), "geometry found");
                    return Ok(Some(Resolution {
                        lod,
                        geometry: ResolvedGeometry::Surfaces(rows),
                        reversed_winding: false,
                        trace,
                    }));
                }
                Ok(None) => {}
                Err(e) => warn!(object_id = task.id, lod, "query failed, trying next LOD: {}", e),
            }

            if capability.aggregates_footprint && form.is_footprint_based() {
                self.cancel.check()?;
                trace.push(ResolverState::Aggregating(lod));
                let footprint = &self.config.footprint;
                match store.aggregate_footprint(&key, footprint.union_tolerance, footprint.min_area) {
                    Ok(polygons) if !polygons.is_empty() => {
                        trace.push(ResolverState::Found(lod));
                        debug!(object_id = task.id, lod, polygons = polygons.len(), "footprint aggregated");
                        return Ok(Some(Resolution {
                            lod,
                            geometry: ResolvedGeometry::AggregatedFootprint(polygons),
                            reversed_winding: true,
                            trace,
                        }));
                    }
                    Ok(_) => {}
                    Err(e) => warn!(object_id = task.id, lod, "footprint aggregation failed: {}", e),
                }
            }
        }

        trace.push(ResolverState::Exhausted);
        info!(object_id = task.id, gml_id = %task.gml_id, form = %form, "no exportable geometry at any LOD");
        Ok(None)
    }

    fn probe(
        &self,
        key: &QueryKey,
        capability: &ClassCapability,
        mode: ProbeMode,
        store: &mut dyn GeometryStore,
    ) -> std::result::Result<Option<Vec<SurfaceRow>>, StoreError> {
        if mode == ProbeMode::Existence {
            let purpose = match capability.probe_rule {
                ProbeRule::AnyRow => QueryPurpose::Existence,
                ProbeRule::MarkerNonZero => QueryPurpose::Marker,
            };
            if store.count(key, purpose)? == 0 {
                return Ok(None);
            }
        }
        let rows = store.surfaces(key)?;
        let has_geometry = rows.iter().any(|r| r.geometry.is_some());
        Ok(has_geometry.then_some(rows))
    }
}
