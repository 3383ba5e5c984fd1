//! Spatial index over reference-cell geometries.
//!
//! One R-tree per partition in partitioned mode, one global tree otherwise.
//! Trees are bulk-loaded once and queried read-only afterwards; reads run
//! under the shared side of a reader/writer lock, and a fault caught during
//! a read triggers an exclusive rebuild followed by a single retry (the
//! {Ready, Rebuilding} protocol).
//!
//! Nearest-neighbor resolution walks the tree in ascending envelope-distance
//! order from the target centroid and keeps a bounded heap of exact metric
//! distances, stopping once the envelope lower bound can no longer improve
//! the k-th best hit. The result is exact for both metrics; ties land
//! wherever the traversal puts them.

use crate::cell::{CellGeometry, CellId, PartitionId};
use crate::config::DistanceMetric;
use crate::error::{ProximaError, Result};
use crate::geometry;
use geo::Point;
use ordered_float::NotNan;
use parking_lot::RwLock;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// A reference cell prepared for indexing, with its envelope and centroid
/// cached at build time.
#[derive(Debug, Clone)]
pub(crate) struct IndexedCell {
    pub id: CellId,
    pub geometry: Arc<CellGeometry>,
    pub centroid: Point<f64>,
    envelope: AABB<[f64; 2]>,
}

impl IndexedCell {
    pub fn new(
        id: CellId,
        geometry: Arc<CellGeometry>,
        centroid: Point<f64>,
        envelope: AABB<[f64; 2]>,
    ) -> Self {
        Self {
            id,
            geometry,
            centroid,
            envelope,
        }
    }
}

impl RTreeObject for IndexedCell {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexedCell {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.envelope.distance_2(point)
    }
}

/// A query target: the geometry plus the precomputed values the traversal
/// bound needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueryTarget<'a> {
    pub geometry: &'a CellGeometry,
    pub centroid: Point<f64>,
    /// Largest centroid-to-boundary distance; slack term for the edge
    /// metric's lower bound.
    pub boundary_radius: f64,
}

/// One resolved neighbor: reference cell id and its distance in pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NeighborHit {
    pub id: CellId,
    pub distance: f64,
}

pub(crate) type NeighborHits = SmallVec<[NeighborHit; 8]>;

/// An R-tree guarded by the read/retry-on-fault protocol.
///
/// Ordinary queries hold the shared lock (Ready state). A panic caught
/// inside the traversal is treated as a transient index fault: the shared
/// lock is released, the exclusive lock taken (Rebuilding state), the tree
/// rebuilt from its retained entries, and the query retried once. A second
/// failure propagates as fatal.
pub(crate) struct RetryTree {
    state: RwLock<RTree<IndexedCell>>,
    entries: Vec<IndexedCell>,
}

impl RetryTree {
    pub fn build(entries: Vec<IndexedCell>) -> Self {
        let tree = RTree::bulk_load(entries.clone());
        Self {
            state: RwLock::new(tree),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Run a read-only query, retrying once after an exclusive rebuild if
    /// the traversal faults. Invisible to callers except for latency.
    pub fn with_read<R>(&self, query: impl Fn(&RTree<IndexedCell>) -> R) -> Result<R> {
        {
            let guard = self.state.read();
            if let Ok(result) = catch_unwind(AssertUnwindSafe(|| query(&guard))) {
                return Ok(result);
            }
        }

        log::warn!("Spatial index fault caught during read; rebuilding index and retrying");
        let mut guard = self.state.write();
        *guard = RTree::bulk_load(self.entries.clone());
        catch_unwind(AssertUnwindSafe(|| query(&guard))).map_err(|_| ProximaError::IndexFault)
    }
}

/// Index scope: the partition a query is confined to, or the whole image.
pub(crate) type IndexScope = Option<PartitionId>;

/// Bulk-built spatial search structure, one tree per scope.
pub(crate) struct SpatialIndex {
    trees: FxHashMap<IndexScope, RetryTree>,
}

impl SpatialIndex {
    /// Build one tree per scope group. Entry preparation has already run in
    /// parallel; bulk load is the explicit finalize-before-read step.
    pub fn build(groups: FxHashMap<IndexScope, Vec<IndexedCell>>) -> Self {
        let trees = groups
            .into_iter()
            .map(|(scope, entries)| (scope, RetryTree::build(entries)))
            .collect();
        Self { trees }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn total_entries(&self) -> usize {
        self.trees.values().map(RetryTree::len).sum()
    }

    /// Resolve the k nearest reference cells to `target` within `scope`,
    /// ascending by the chosen metric. Returns fewer than k hits when the
    /// scoped reference population is smaller than k; a missing scope
    /// (partition with no references) yields an empty list.
    pub fn nearest(
        &self,
        scope: IndexScope,
        target: QueryTarget<'_>,
        k: usize,
        metric: DistanceMetric,
    ) -> Result<NeighborHits> {
        if k == 0 {
            return Ok(NeighborHits::new());
        }
        let Some(tree) = self.trees.get(&scope) else {
            return Ok(NeighborHits::new());
        };

        tree.with_read(|tree| nearest_in_tree(tree, target, k, metric))
    }
}

/// Entry in the bounded best-k heap; max-heap order by distance so the
/// current worst of the best k sits on top.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct HeapHit {
    distance: NotNan<f64>,
    id: CellId,
}

fn nearest_in_tree(
    tree: &RTree<IndexedCell>,
    target: QueryTarget<'_>,
    k: usize,
    metric: DistanceMetric,
) -> NeighborHits {
    let origin = [target.centroid.x(), target.centroid.y()];
    let slack = match metric {
        DistanceMetric::Edge => target.boundary_radius,
        DistanceMetric::Centroid => 0.0,
    };

    let mut best: BinaryHeap<HeapHit> = BinaryHeap::with_capacity(k + 1);
    for (item, envelope_distance_2) in tree.nearest_neighbor_iter_with_distance_2(&origin) {
        if best.len() == k
            && let Some(worst) = best.peek()
        {
            // Envelope distance only grows along the iteration; once its
            // lower bound exceeds the current k-th best, no later item can
            // improve the result.
            let lower_bound = envelope_distance_2.max(0.0).sqrt() - slack;
            if lower_bound > worst.distance.into_inner() {
                break;
            }
        }

        let exact = match metric {
            DistanceMetric::Edge => geometry::edge_distance(target.geometry, &item.geometry),
            DistanceMetric::Centroid => geometry::centroid_distance(target.centroid, item.centroid),
        };
        let Ok(distance) = NotNan::new(exact) else {
            continue;
        };

        if best.len() < k {
            best.push(HeapHit {
                distance,
                id: item.id,
            });
        } else if let Some(worst) = best.peek()
            && distance < worst.distance
        {
            best.pop();
            best.push(HeapHit {
                distance,
                id: item.id,
            });
        }
    }

    let mut hits: NeighborHits = best
        .into_iter()
        .map(|hit| NeighborHit {
            id: hit.id,
            distance: hit.distance.into_inner(),
        })
        .collect();
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
}
