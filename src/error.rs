//! Error types for the Digital RF write engine.
//!
//! `DigitalRfError` consolidates every failure mode described by the
//! format's write path: invalid channel configuration, a property file
//! that disagrees with the channel it is reopened against, attempts to
//! clobber or rewrite existing data, and I/O failures from the
//! underlying HDF5 library. Using `thiserror`, each variant carries
//! exactly the context a caller needs to decide whether to retry.

use thiserror::Error;

/// Convenience alias for results returned by this crate.
pub type DigitalRfResult<T> = std::result::Result<T, DigitalRfError>;

/// Errors produced by the Digital RF write engine.
#[derive(Error, Debug)]
pub enum DigitalRfError {
    /// The channel configuration failed validation (bad cadence,
    /// zero-valued sample rate, unknown sample type, ...).
    #[error("invalid channel configuration: {0}")]
    ConfigInvalid(String),

    /// `drf_properties.h5` already exists for this channel and
    /// disagrees with the configuration passed to `init`.
    #[error("channel properties conflict with existing drf_properties.h5: {0}")]
    PropertiesConflict(String),

    /// The file the planner selected for a write already exists on
    /// disk. The engine never overwrites or reopens a finished file.
    #[error("file already exists: {}", .0.display())]
    FileExists(std::path::PathBuf),

    /// A write attempted to place samples at or before
    /// `next_expected_index`.
    #[error("write overlaps already-written data: global index {attempted} < next expected {expected}")]
    OverlapError {
        /// The offending global sample index from the caller's request.
        attempted: u64,
        /// The channel's current `next_expected_index`.
        expected: u64,
    },

    /// Indices or offsets within a single `write_blocks` call were not
    /// strictly increasing, or a buffer offset did not leave room for
    /// its run.
    #[error("non-monotonic write request: {0}")]
    OrderError(String),

    /// A filesystem or HDF5 library failure.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Indicates a bug in this crate; callers should never receive
    /// this variant under normal operation.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolated(String),
}

impl From<std::io::Error> for DigitalRfError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
