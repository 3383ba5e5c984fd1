//! Error types for proximity analysis.

use crate::cell::CellId;
use thiserror::Error;

/// Errors raised by engine construction and threshold queries.
#[derive(Error, Debug)]
pub enum ProximaError {
    /// A query argument was rejected before any work was performed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested interaction count addresses a bucket beyond the
    /// configured maximum.
    #[error("Interaction count {n} exceeds the configured maximum of {max}")]
    IndexOutOfRange { n: usize, max: usize },

    /// An input cell carried a degenerate geometry (no centroid or extent).
    /// Fatal: initialization aborts before any query becomes available.
    #[error("Cell {0:?} has an empty or degenerate geometry")]
    EmptyGeometry(CellId),

    /// The spatial index faulted during a concurrent read and the exclusive
    /// rebuild-and-retry also failed.
    #[error("Spatial index fault persisted after rebuild")]
    IndexFault,

    /// Cooperative cancellation was observed. Not an error in the usual
    /// sense: the instance under construction is discarded, never retried.
    #[error("Initialization cancelled")]
    Cancelled,

    /// A distribution fit did not converge or received degenerate input.
    /// Downgraded to NaN sentinels by the measurement writers.
    #[error("Distribution fit failed: {0}")]
    FitFailed(String),
}

pub type Result<T> = std::result::Result<T, ProximaError>;
