//! Crate-wide error type.

use thiserror::Error;

/// Errors surfaced by the detection and registration pipeline.
#[derive(Error, Debug)]
pub enum MatchError {
    /// A vertex row carried an unexpected number of components.
    #[error("vertex rows must have 3 or 6 float components (got {found})")]
    InvalidLayout {
        /// Number of components actually found.
        found: usize,
    },

    /// Downsampling produced zero output rows.
    #[error("sampling produced an empty point cloud")]
    EmptyCloud,

    /// A match was requested before the detector was trained.
    #[error("the detector has not been trained")]
    NotTrained,

    /// A persisted record did not start with the expected magic word.
    #[error("bad magic word {found:#010x} (expected {expected:#010x})")]
    BadMagic {
        /// Magic word the format requires.
        expected: u32,
        /// Magic word actually read.
        found: u32,
    },

    /// A persisted record ended before all fields were read.
    #[error("truncated record while reading {0}")]
    ShortRead(&'static str),

    /// The ICP normal equations were singular at the current level.
    #[error("normal equations are ill-conditioned")]
    IllConditioned,

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MatchError>;
