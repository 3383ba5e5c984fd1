//! Spatial proximity analysis between two labeled 2D cell populations.
//!
//! For each target cell the engine resolves the k nearest reference cells
//! under a configurable distance metric, then answers repeated threshold
//! queries ("how many targets have at least/exactly n reference neighbors
//! within distance d") from a precomputed distance-bucket index instead of
//! rescanning the populations.
//!
//! ```rust
//! use proxima::{Cell, CellGeometry, CellId, Config, ProximityEngine};
//! use geo::Point;
//!
//! let engine = ProximityEngine::builder()
//!     .targets([Cell::new(CellId(1), CellGeometry::Point(Point::new(0.0, 0.0)))])
//!     .references([Cell::new(CellId(2), CellGeometry::Point(Point::new(3.0, 4.0)))])
//!     .config(Config::default().with_max_neighbors(1))
//!     .build()?;
//!
//! let within = engine.get(10.0, 1)?;
//! assert!(within.contains(&CellId(1)));
//! # Ok::<(), proxima::ProximaError>(())
//! ```

pub mod buckets;
pub mod cancel;
pub mod cell;
pub mod config;
pub mod connections;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod measurements;
pub mod stats;
pub mod tracker;

mod index;

pub use cancel::CancelToken;
pub use cell::{Cell, CellGeometry, CellId, PartitionId, Population};
pub use config::{Config, DistanceMetric, LineStyle, PartitionMode};
pub use connections::LineConnection;
pub use engine::{
    DisplayObserver, EngineBuilder, LabelAnnotation, NoopObserver, ProximityEngine,
};
pub use error::{ProximaError, Result};
pub use measurements::MeasurementList;
pub use stats::{Summary, WeibullFit, fit_weibull, summarize};
pub use tracker::NeighborTracker;

pub use geo::{Point, Polygon};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{Cell, CellGeometry, CellId, PartitionId, Population};

    pub use crate::{Config, DistanceMetric, LineStyle, PartitionMode};

    pub use crate::{EngineBuilder, ProximityEngine};

    pub use crate::{CancelToken, MeasurementList, ProximaError, Result};

    pub use geo::{Point, Polygon};
}
