//! Error taxonomy for the verification engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid or missing configuration, detected before any work starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Requested bitset geometry overflows platform array bounds.
    #[error("coverage bitset capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A thread-local word array disagrees with the segment's word count at
    /// merge time. Invariant violation; the segment is aborted.
    #[error("segment {segment}: thread-local word count {got} != segment word count {expected}")]
    WordCountMismatch {
        segment: usize,
        expected: usize,
        got: usize,
    },

    /// Audit read/write failure. The segment's result is not durable and
    /// will be recomputed on a resumed run.
    #[error("audit I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit JSON encode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("summary CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    /// A worker thread or pool failed to run to completion.
    #[error("parallel execution failed: {0}")]
    Parallel(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
