//! Persistent storage for file status, stage logs, and tasks

mod status_store;

pub use status_store::{PipelineStats, QueueStats, StatusStore};
