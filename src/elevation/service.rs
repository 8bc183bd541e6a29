use crate::geometry::{Point3, ReprojectError};
use crate::store::StoreError;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("elevation service failed: {0}")]
    Service(String),
    #[error("elevation service did not answer within {0:?}")]
    Timeout(Duration),
    #[error("elevation service worker exited without an answer")]
    Disconnected,
    #[error("no lowest-point candidates")]
    NoCandidates,
    #[error(transparent)]
    Reproject(#[from] ReprojectError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// External lookup turning display-CRS points (lon, lat, elevation) into a
/// single vertical offset
pub trait ElevationService: Send + Sync {
    fn elevation_offset(&self, points: &[Point3]) -> Result<f64, ElevationError>;
}

/// Bounds every call of the wrapped service by a deadline. A call that
/// misses it is reported as [`ElevationError::Timeout`]; its thread is left
/// to finish on its own and its answer is dropped.
pub struct DeadlineElevationService<S: ?Sized> {
    inner: Arc<S>,
    timeout: Duration,
}

impl<S: ElevationService + 'static> DeadlineElevationService<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self::from_shared(Arc::new(inner), timeout)
    }
}

impl<S: ElevationService + ?Sized + 'static> DeadlineElevationService<S> {
    /// Guard a service that is shared with other workers
    pub fn from_shared(inner: Arc<S>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<S: ElevationService + ?Sized + 'static> ElevationService for DeadlineElevationService<S> {
    fn elevation_offset(&self, points: &[Point3]) -> Result<f64, ElevationError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let points = points.to_vec();
        thread::spawn(move || {
            let _ = tx.send(inner.elevation_offset(&points));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ElevationError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ElevationError::Disconnected),
        }
    }
}
