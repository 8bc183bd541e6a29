//! Export driver
//!
//! # Submodules
//! - `task` - Export tasks and display forms
//! - `cancel` - Shared cancellation flag
//! - `progress` - Progress events and sinks
//! - `feature` - Export of one feature or group
//! - `pool` - Parallel export over a rayon pool

mod cancel;
mod feature;
mod pool;
mod progress;
mod task;

pub use cancel::CancellationToken;
pub use feature::{file_stem, ColladaBundle, FeatureExporter, FeatureOutput};
pub use pool::{group_tasks, ExportPool, RunSummary};
pub use progress::{ProgressCounters, ProgressEvent, ProgressSink, ProgressSnapshot};
pub use task::{DisplayForm, DisplaySelection, ExportTask};
