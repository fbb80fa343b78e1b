use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single detector invocation.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Parameter file not found: {0}")]
    MissingParams(PathBuf),

    #[error("Detector code path not found: {0}")]
    MissingCodePath(PathBuf),

    #[error("Failed to start detector `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Detector exited with code {code}: {stderr}")]
    Exited { code: i32, stderr: String },

    #[error("Detector timed out after {0:?}")]
    Timeout(Duration),

    #[error("Detector I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed detector output: {0}")]
    Output(String),

    #[error("Detector returned {found} fields per point, expected {expected}")]
    FieldCount { expected: usize, found: usize },
}

impl DetectError {
    /// Session start, communication and timeouts are worth retrying.
    /// Everything else points at the configuration and will fail again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DetectError::Spawn { .. }
                | DetectError::Exited { .. }
                | DetectError::Timeout(_)
                | DetectError::Io(_)
        )
    }
}

/// Errors surfaced by a blockwise detection run.
#[derive(Error, Debug)]
pub enum BlockspotError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unsupported array element type for `{0}` (need bool, an 8 to 64-bit integer, f32 or f64)")]
    UnsupportedDtype(String),

    #[error("Block {index:?} returned {found} columns, expected {expected}")]
    ColumnMismatch {
        index: [usize; 3],
        expected: usize,
        found: usize,
    },

    #[error("Block at origin {origin:?} failed after {attempts} attempt(s): {source}")]
    BlockFailed {
        origin: [u64; 3],
        attempts: u32,
        #[source]
        source: DetectError,
    },

    #[error("Failed to read region {origin:?}+{shape:?}: {message}")]
    Read {
        origin: [u64; 3],
        shape: [u64; 3],
        message: String,
    },

    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Zarr: {0}")]
    Zarr(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T, E = BlockspotError> = std::result::Result<T, E>;
