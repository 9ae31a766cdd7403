//! Analysis pipeline
//!
//! ```text
//!  SCAN ──keys──► TYPE ──records──► size ──sized──► aggregate ──► forest
//! ```
//!
//! One task per stage, bounded channels between them, and a supervisor that
//! joins the four and compresses the forest on success.

mod aggregator;
mod classifier;
mod coordinator;
mod scanner;
mod sizer;
mod stats;

pub use coordinator::{
    request_shutdown, AnalysisHandle, AnalysisReport, AnalysisSummary, Analyzer,
    PROGRESS_INTERVAL,
};
pub use stats::{AnalysisProgress, PipelineStats};

/// Stage names used in errors and logs
pub const STAGE_SCAN: &str = "scan";
pub const STAGE_CLASSIFY: &str = "classify";
pub const STAGE_SIZE: &str = "size";
pub const STAGE_AGGREGATE: &str = "aggregate";
