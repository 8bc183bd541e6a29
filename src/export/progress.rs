use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A feature or group produced output
    FeatureExported { name: String, placemarks: usize },
    /// No geometry at any probed LOD
    FeatureSkipped { gml_id: String },
    FeatureFailed { gml_id: String, error: String },
    GeometriesProcessed(usize),
    ImagesProcessed(usize),
}

/// Receives progress from the workers. Implementations must tolerate calls
/// from several threads at once.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Sink that only counts
#[derive(Debug, Default)]
pub struct ProgressCounters {
    exported: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    geometries: AtomicU64,
    images: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub exported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub geometries: u64,
    pub images: u64,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            exported: self.exported.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            geometries: self.geometries.load(Ordering::Relaxed),
            images: self.images.load(Ordering::Relaxed),
        }
    }
}

impl ProgressSink for ProgressCounters {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FeatureExported { .. } => self.exported.fetch_add(1, Ordering::Relaxed),
            ProgressEvent::FeatureSkipped { .. } => self.skipped.fetch_add(1, Ordering::Relaxed),
            ProgressEvent::FeatureFailed { .. } => self.failed.fetch_add(1, Ordering::Relaxed),
            ProgressEvent::GeometriesProcessed(n) => self.geometries.fetch_add(n as u64, Ordering::Relaxed),
            ProgressEvent::ImagesProcessed(n) => self.images.fetch_add(n as u64, Ordering::Relaxed),
        };
    }
}

/// Forward events to a consumer thread; a hung-up receiver is ignored
impl ProgressSink for Sender<ProgressEvent> {
    fn report(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}
