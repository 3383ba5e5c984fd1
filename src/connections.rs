//! Connection line annotations between targets and their tracked neighbors.

use crate::cell::{CellGeometry, CellId};
use crate::config::{DistanceMetric, LineStyle};
use crate::geometry;
use geo::{Line, Point};
use std::sync::atomic::{AtomicBool, Ordering};

/// A line annotation from a target cell to one of its tracked reference
/// neighbors. Visibility is toggled in place by highlight queries, so it
/// sits behind an atomic rather than requiring exclusive access to the
/// whole connection set.
#[derive(Debug)]
pub struct LineConnection {
    target: CellId,
    neighbor: CellId,
    segment: Line<f64>,
    distance: f64,
    style: LineStyle,
    shown: AtomicBool,
}

impl LineConnection {
    /// Build the connection for a target/neighbor pair. Under the edge
    /// metric the segment joins the closest boundary points; under the
    /// centroid metric it joins the centroids. `pixel_size` scales the
    /// stored distance into physical units; endpoints stay in pixel
    /// coordinates for rendering.
    pub fn new(
        target: CellId,
        target_geometry: &CellGeometry,
        neighbor: CellId,
        neighbor_geometry: &CellGeometry,
        metric: DistanceMetric,
        style: LineStyle,
        pixel_size: f64,
    ) -> Option<Self> {
        let (start, end, distance) = match metric {
            DistanceMetric::Edge => {
                let pair = geometry::closest_boundary_pair(target_geometry, neighbor_geometry);
                (pair.on_first, pair.on_second, pair.distance)
            }
            DistanceMetric::Centroid => {
                let a = geometry::centroid(target_geometry)?;
                let b = geometry::centroid(neighbor_geometry)?;
                (a, b, geometry::centroid_distance(a, b))
            }
        };
        Some(Self {
            target,
            neighbor,
            segment: Line::new(start.0, end.0),
            distance: distance * pixel_size,
            style,
            shown: AtomicBool::new(false),
        })
    }

    pub fn target(&self) -> CellId {
        self.target
    }

    pub fn neighbor(&self) -> CellId {
        self.neighbor
    }

    pub fn segment(&self) -> Line<f64> {
        self.segment
    }

    pub fn endpoints(&self) -> (Point<f64>, Point<f64>) {
        (self.segment.start.into(), self.segment.end.into())
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn style(&self) -> LineStyle {
        self.style
    }

    pub fn is_shown(&self) -> bool {
        self.shown.load(Ordering::Relaxed)
    }

    /// Returns the previous visibility.
    pub fn set_shown(&self, shown: bool) -> bool {
        self.shown.swap(shown, Ordering::Relaxed)
    }
}
