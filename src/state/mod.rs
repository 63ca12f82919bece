//! State module for tracking record assembly and crawl progress
//!
//! # Components
//!
//! - `RecordStage`: the stage a drug record has reached (listed, detailed, files enumerated, complete)
//! - `RecordAssembly`: the per-record state machine merging asynchronous fetch results
//! - `ProgressTracker`: expected versus completed record counter

mod assembly;
mod progress;
mod record_stage;

// Re-export main types
pub use assembly::{FileLink, PendingFetch, RecordAssembly};
pub use progress::ProgressTracker;
pub use record_stage::RecordStage;
