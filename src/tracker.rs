//! Per-target nearest-neighbor record.

use crate::cell::CellId;
use geo::Point;
use rustc_hash::FxHashMap;

/// Nearest-neighbor data for one target cell: distance by neighbor rank,
/// distance by neighbor identity, and the label anchor point at the target
/// centroid.
///
/// Each rank must be written at most once: `add_data` does not check for
/// overwrites, and writing the same rank twice silently desynchronizes the
/// two maps. The engine writes every rank exactly once by construction;
/// external callers carry the same obligation.
#[derive(Debug, Clone)]
pub struct NeighborTracker {
    cell: CellId,
    by_rank: FxHashMap<usize, f64>,
    by_neighbor: FxHashMap<CellId, f64>,
    /// Anchor for label annotations, at the target centroid.
    anchor: Point<f64>,
}

impl NeighborTracker {
    pub fn new(cell: CellId, anchor: Point<f64>) -> Self {
        Self {
            cell,
            by_rank: FxHashMap::default(),
            by_neighbor: FxHashMap::default(),
            anchor,
        }
    }

    /// Record the neighbor at rank `n` (0-based) with its distance.
    pub fn add_data(&mut self, n: usize, neighbor: CellId, distance: f64) {
        self.by_rank.insert(n, distance);
        self.by_neighbor.insert(neighbor, distance);
    }

    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// Distance to the n-th nearest neighbor; `None` when the target has no
    /// n-th neighbor (reference population smaller than n + 1).
    pub fn distance_by_rank(&self, n: usize) -> Option<f64> {
        self.by_rank.get(&n).copied()
    }

    /// Distance to a specific tracked neighbor, if tracked.
    pub fn distance_by_neighbor(&self, neighbor: CellId) -> Option<f64> {
        self.by_neighbor.get(&neighbor).copied()
    }

    /// Identities of all tracked neighbors, in no particular order.
    pub fn neighbors(&self) -> impl Iterator<Item = CellId> + '_ {
        self.by_neighbor.keys().copied()
    }

    /// Number of tracked neighbors.
    pub fn neighbor_count(&self) -> usize {
        self.by_rank.len()
    }

    /// (rank, distance) pairs sorted by rank, for per-cell measurements.
    pub fn ranked_distances(&self) -> Vec<(usize, f64)> {
        let mut pairs: Vec<_> = self.by_rank.iter().map(|(n, d)| (*n, *d)).collect();
        pairs.sort_by_key(|(n, _)| *n);
        pairs
    }

    pub fn anchor(&self) -> Point<f64> {
        self.anchor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_by_rank_and_neighbor() {
        let mut tracker = NeighborTracker::new(CellId(1), Point::new(0.0, 0.0));
        tracker.add_data(0, CellId(10), 2.0);
        tracker.add_data(1, CellId(11), 5.0);

        assert_eq!(tracker.distance_by_rank(0), Some(2.0));
        assert_eq!(tracker.distance_by_rank(1), Some(5.0));
        assert_eq!(tracker.distance_by_rank(2), None);
        assert_eq!(tracker.distance_by_neighbor(CellId(11)), Some(5.0));
        assert_eq!(tracker.distance_by_neighbor(CellId(12)), None);
        assert_eq!(tracker.neighbor_count(), 2);
    }

    #[test]
    fn ranked_distances_are_sorted() {
        let mut tracker = NeighborTracker::new(CellId(1), Point::new(0.0, 0.0));
        tracker.add_data(2, CellId(12), 9.0);
        tracker.add_data(0, CellId(10), 1.0);
        tracker.add_data(1, CellId(11), 4.0);

        assert_eq!(
            tracker.ranked_distances(),
            vec![(0, 1.0), (1, 4.0), (2, 9.0)]
        );
    }
}
