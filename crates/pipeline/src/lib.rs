//! Run orchestration: ingest, cluster, mine per cluster, aggregate, export.

pub mod orchestrator;
pub mod report;

pub use orchestrator::Pipeline;
pub use report::{ClusterSkip, ExportStatus, PhaseCounts, RunMode, RunReport, SkipReason};
