//! Parallel export of many tasks
//!
//! Tasks are grouped by output id and every group is exported on a rayon
//! worker. Each worker split opens its own store connection. A failing group
//! is logged and reported, its siblings carry on.

use super::cancel::CancellationToken;
use super::feature::{FeatureExporter, FeatureOutput};
use super::progress::{ProgressEvent, ProgressSink};
use super::task::ExportTask;
use crate::config::ExportConfig;
use crate::elevation::ElevationService;
use crate::error::{ExportError, Result};
use crate::geometry::CoordinateTransformer;
use crate::store::StoreFactory;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome counts of one run, one unit per group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub exported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

enum GroupOutcome {
    Exported,
    Skipped,
    Failed,
    Cancelled,
}

pub struct ExportPool<'a> {
    config: &'a ExportConfig,
    transformer: &'a dyn CoordinateTransformer,
    elevation: Option<Arc<dyn ElevationService>>,
}

/// Group tasks by output id, keeping first-seen order
pub fn group_tasks(tasks: Vec<ExportTask>) -> IndexMap<String, Vec<ExportTask>> {
    let mut groups: IndexMap<String, Vec<ExportTask>> = IndexMap::new();
    for task in tasks {
        groups.entry(task.group_key().to_string()).or_default().push(task);
    }
    groups
}

impl<'a> ExportPool<'a> {
    pub fn new(config: &'a ExportConfig, transformer: &'a dyn CoordinateTransformer) -> Self {
        Self { config, transformer, elevation: None }
    }

    /// Shared by all workers; each call is bounded by the configured timeout
    pub fn with_elevation_service(mut self, service: Option<Arc<dyn ElevationService>>) -> Self {
        self.elevation = service;
        self
    }

    /// Export every task and hand each output to `handler` (usually a
    /// writer). Only a pool that cannot be built fails the run.
    pub fn run<F, H>(
        &self,
        tasks: Vec<ExportTask>,
        factory: &F,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        handler: H,
    ) -> Result<RunSummary>
    where
        F: StoreFactory,
        H: Fn(&FeatureOutput) -> Result<()> + Sync + Send,
    {
        let start = Instant::now();
        let groups: Vec<(String, Vec<ExportTask>)> = group_tasks(tasks).into_iter().collect();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.threads)
            .build()
            .map_err(|e| ExportError::Config(format!("cannot build worker pool: {}", e)))?;
        info!(groups = groups.len(), threads = self.config.workers.threads, "starting export");

        let outcomes: Vec<GroupOutcome> = pool.install(|| {
            groups
                .par_iter()
                .map_init(
                    || factory.open(),
                    |store, (key, group)| {
                        let store = match store {
                            Ok(store) => store,
                            Err(e) => {
                                error!(group = %key, "no store connection: {}", e);
                                sink.report(ProgressEvent::FeatureFailed { gml_id: key.clone(), error: e.to_string() });
                                return GroupOutcome::Failed;
                            }
                        };
                        self.export_one(key, group, store, sink, cancel, &handler)
                    },
                )
                .collect()
        });

        let mut summary = RunSummary::default();
        for outcome in outcomes {
            match outcome {
                GroupOutcome::Exported => summary.exported += 1,
                GroupOutcome::Skipped => summary.skipped += 1,
                GroupOutcome::Failed => summary.failed += 1,
                GroupOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        info!(
            exported = summary.exported,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "export finished in {:.2?}",
            start.elapsed()
        );
        Ok(summary)
    }

    fn export_one<S, H>(
        &self,
        key: &str,
        group: &[ExportTask],
        store: &mut S,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        handler: &H,
    ) -> GroupOutcome
    where
        S: crate::store::GeometryStore + crate::store::OffsetAttributeStore,
        H: Fn(&FeatureOutput) -> Result<()>,
    {
        let exporter = FeatureExporter::new(self.config, self.transformer, cancel).with_elevation_service(self.elevation.clone());
        let result = exporter.export_group(group, store).and_then(|output| match output {
            Some(output) => handler(&output).map(|_| Some(output)),
            None => Ok(None),
        });
        match result {
            Ok(Some(output)) => {
                sink.report(ProgressEvent::GeometriesProcessed(output.geometry_count));
                sink.report(ProgressEvent::ImagesProcessed(output.image_count()));
                sink.report(ProgressEvent::FeatureExported {
                    name: output.name.clone(),
                    placemarks: output.placemarks.len(),
                });
                GroupOutcome::Exported
            }
            Ok(None) => {
                sink.report(ProgressEvent::FeatureSkipped { gml_id: key.to_string() });
                GroupOutcome::Skipped
            }
            Err(ExportError::Cancelled) => {
                warn!(group = %key, "export cancelled");
                GroupOutcome::Cancelled
            }
            Err(e) => {
                error!(group = %key, "export failed: {}", e);
                sink.report(ProgressEvent::FeatureFailed { gml_id: key.to_string(), error: e.to_string() });
                GroupOutcome::Failed
            }
        }
    }
}
