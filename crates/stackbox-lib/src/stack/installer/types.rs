use crate::stack::components::Component;
use std::path::PathBuf;

/// Progress reporter trait for acquisition steps.
/// Implementations forward updates to a terminal or any other front end.
pub trait ProgressReporter: Send + Sync {
    /// Start a new named step (one download, one extraction)
    fn start_step(&self, name: &str);

    /// Update bytes transferred for download progress
    fn update_bytes(&self, transferred: u64, total: Option<u64>);

    /// Set a short status message
    fn set_message(&self, message: &str);

    /// Mark the current step as complete
    fn done(&self, success: bool, message: Option<&str>);
}

/// A progress reporter that does nothing (silent).
/// Useful for background verification or tests.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn start_step(&self, _name: &str) {}
    fn update_bytes(&self, _transferred: u64, _total: Option<u64>) {}
    fn set_message(&self, _message: &str) {}
    fn done(&self, _success: bool, _message: Option<&str>) {}
}

/// Domain failures the pipeline surfaces to its caller.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("{component}: expected {} after extraction but it is missing", .marker.display())]
    MarkerMissing { component: Component, marker: PathBuf },

    #[error("{component}: extraction failed: {reason}")]
    ExtractionFailed { component: Component, reason: String },

    #[error("archive entry escapes the destination directory: {entry}")]
    UnsafeArchiveEntry { entry: String },

    #[error("{} is {actual} bytes, below the {minimum} byte minimum", .path.display())]
    Undersized {
        path: PathBuf,
        actual: u64,
        minimum: u64,
    },

    #[error("generated configuration disagrees with the parameter set: {detail}")]
    ConfigDrift { detail: String },

    #[error("database initialization failed after every strategy; last error: {last_error}")]
    DatabaseInitFailed { last_error: String },
}
