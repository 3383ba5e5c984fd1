//! The proximity engine: phased parallel initialization plus the threshold
//! query surface.
//!
//! An engine is built once per (populations, config) pair and never mutated
//! afterwards except for display state (selection, labels, connection
//! visibility), which is last-write-wins. Changing inputs means discarding
//! the engine and building a new one.

use crate::buckets::DistanceBucketIndex;
use crate::cancel::CancelToken;
use crate::cell::{Cell, CellId, PartitionId, Population};
use crate::config::{Config, PartitionMode};
use crate::connections::LineConnection;
use crate::error::{ProximaError, Result};
use crate::geometry;
use crate::index::{IndexScope, IndexedCell, QueryTarget, SpatialIndex};
use crate::measurements::MeasurementList;
use crate::stats;
use crate::tracker::NeighborTracker;
use geo::Point;
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::time::Instant;

/// In-process seam to the presentation layer. Implementations receive
/// display side effects; all methods default to no-ops so headless callers
/// can ignore rendering entirely.
pub trait DisplayObserver: Send + Sync {
    /// The selection was replaced (last-write-wins, never additive).
    fn selection_replaced(&self, _selected: &FxHashSet<CellId>) {}

    /// Label annotations were rewritten for the given cells.
    fn labels_updated(&self, _labels: &FxHashMap<CellId, LabelAnnotation>) {}

    /// `count` currently hidden connections should be dropped from the
    /// display to bound memory.
    fn hidden_connections_pruned(&self, _count: usize) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl DisplayObserver for NoopObserver {}

/// A label attached to a target cell's anchor point, reporting its
/// interaction count as text ("0", "1", ... or an overflow marker like
/// "5+").
#[derive(Debug, Clone, PartialEq)]
pub struct LabelAnnotation {
    pub anchor: Point<f64>,
    pub text: String,
}

/// Builder for [`ProximityEngine`]. All parameters other than the two
/// populations are optional.
pub struct EngineBuilder {
    targets: Population,
    references: Population,
    config: Config,
    cancel: CancelToken,
    observer: Arc<dyn DisplayObserver>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            targets: Population::default(),
            references: Population::default(),
            config: Config::default(),
            cancel: CancelToken::new(),
            observer: Arc::new(NoopObserver),
            pool: None,
        }
    }

    /// The population to analyze.
    pub fn targets(mut self, targets: impl IntoIterator<Item = Cell>) -> Self {
        self.targets = Population::new(targets);
        self
    }

    /// The population to test against.
    pub fn references(mut self, references: impl IntoIterator<Item = Cell>) -> Self {
        self.references = Population::new(references);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Token polled throughout initialization; cancelling it makes `build`
    /// return [`ProximaError::Cancelled`] with no engine constructed.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DisplayObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run initialization on a caller-supplied pool instead of the global
    /// one, for deterministic shutdown and test isolation.
    pub fn thread_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Build the engine. All four phases (index construction, neighbor
    /// resolution, connection construction, bucket construction) run to
    /// completion before this returns; a failed or cancelled build returns
    /// an error and publishes nothing.
    pub fn build(self) -> Result<ProximityEngine> {
        let Self {
            targets,
            references,
            config,
            cancel,
            observer,
            pool,
        } = self;
        match pool {
            Some(pool) => {
                pool.install(|| ProximityEngine::initialize(targets, references, config, cancel, observer))
            }
            None => ProximityEngine::initialize(targets, references, config, cancel, observer),
        }
    }
}

/// Fully initialized proximity analysis over one target/reference
/// population pair.
///
/// `get` and `exclusive` are pure and safe to call concurrently; the
/// display operations (`show`, `label`, `connect`) mutate shared display
/// state with last-write-wins semantics.
pub struct ProximityEngine {
    config: Config,
    targets: Population,
    references: Population,
    trackers: FxHashMap<CellId, NeighborTracker>,
    buckets: DistanceBucketIndex,
    connections: Vec<LineConnection>,
    partition_targets: FxHashMap<PartitionId, FxHashSet<CellId>>,
    partition_references: FxHashMap<PartitionId, FxHashSet<CellId>>,
    observer: Arc<dyn DisplayObserver>,
    selection: RwLock<FxHashSet<CellId>>,
    labels: RwLock<FxHashMap<CellId, LabelAnnotation>>,
}

impl ProximityEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn initialize(
        targets: Population,
        references: Population,
        config: Config,
        cancel: CancelToken,
        observer: Arc<dyn DisplayObserver>,
    ) -> Result<Self> {
        let total = Instant::now();
        log::info!(
            "Initializing proximity engine: {} targets, {} references, k={}",
            targets.len(),
            references.len(),
            config.max_neighbors
        );

        // Phase 1: prepare reference entries in parallel, then bulk-load
        // one tree per scope.
        cancel.check()?;
        let started = Instant::now();
        let prepared = references
            .as_slice()
            .par_iter()
            .map(|cell| {
                cancel.check()?;
                let geometry = Arc::new(cell.geometry.clone());
                let centroid =
                    geometry::centroid(&geometry).ok_or(ProximaError::EmptyGeometry(cell.id))?;
                let envelope =
                    geometry::envelope(&geometry).ok_or(ProximaError::EmptyGeometry(cell.id))?;
                Ok((
                    cell.partition,
                    IndexedCell::new(cell.id, geometry, centroid, envelope),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut partition_references: FxHashMap<PartitionId, FxHashSet<CellId>> =
            FxHashMap::default();
        let mut groups: FxHashMap<IndexScope, Vec<IndexedCell>> = FxHashMap::default();
        for (partition, entry) in prepared {
            if let Some(partition) = partition {
                partition_references
                    .entry(partition)
                    .or_default()
                    .insert(entry.id);
            }
            match config.partition_mode {
                PartitionMode::WholeImage => groups.entry(None).or_default().push(entry),
                PartitionMode::PerPartition => {
                    // References outside any partition are unreachable in
                    // per-partition mode.
                    if let Some(partition) = partition {
                        groups.entry(Some(partition)).or_default().push(entry);
                    }
                }
            }
        }
        cancel.check()?;
        let index = SpatialIndex::build(groups);
        log::info!(
            "Built {} spatial tree(s) with {} entries in {:?}",
            index.tree_count(),
            index.total_entries(),
            started.elapsed()
        );

        // Phase 2: resolve the k+1 nearest references per target.
        cancel.check()?;
        let started = Instant::now();
        let query_depth = config.bucket_count();
        let resolved = targets
            .as_slice()
            .par_iter()
            .map(|cell| {
                cancel.check()?;
                let centroid =
                    geometry::centroid(&cell.geometry).ok_or(ProximaError::EmptyGeometry(cell.id))?;
                let mut tracker = NeighborTracker::new(cell.id, centroid);

                let scope = match config.partition_mode {
                    PartitionMode::WholeImage => Some(None),
                    // Targets outside any partition keep an empty tracker.
                    PartitionMode::PerPartition => cell.partition.map(Some),
                };
                if let Some(scope) = scope {
                    let target = QueryTarget {
                        geometry: &cell.geometry,
                        centroid,
                        boundary_radius: geometry::boundary_radius(&cell.geometry, centroid),
                    };
                    let hits = index.nearest(scope, target, query_depth, config.metric)?;
                    for (rank, hit) in hits.iter().enumerate() {
                        tracker.add_data(rank, hit.id, hit.distance * config.pixel_size);
                    }
                }
                Ok((cell.id, cell.partition, tracker))
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "Resolved nearest neighbors for {} targets in {:?}",
            resolved.len(),
            started.elapsed()
        );

        // Phase 3: one connection line per tracked pair.
        cancel.check()?;
        let started = Instant::now();
        let connections = resolved
            .par_iter()
            .map(|(id, _, tracker)| {
                cancel.check()?;
                let Some(target_cell) = targets.get(*id) else {
                    return Ok(Vec::new());
                };
                let mut lines = Vec::new();
                for neighbor in tracker.neighbors() {
                    let Some(reference) = references.get(neighbor) else {
                        continue;
                    };
                    if let Some(line) = LineConnection::new(
                        *id,
                        &target_cell.geometry,
                        neighbor,
                        &reference.geometry,
                        config.metric,
                        config.line_style,
                        config.pixel_size,
                    ) {
                        lines.push(line);
                    }
                }
                Ok(lines)
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        log::info!(
            "Built {} connection line(s) in {:?}",
            connections.len(),
            started.elapsed()
        );

        // Phase 4: one distance bucket per rank, built as independent
        // parallel tasks.
        cancel.check()?;
        let started = Instant::now();
        let buckets = DistanceBucketIndex::build_parallel(config.bucket_count(), |rank| {
            cancel.check()?;
            Ok(resolved
                .iter()
                .map(|(id, _, tracker)| (*id, tracker.distance_by_rank(rank)))
                .collect())
        })?;
        log::info!(
            "Built {} distance bucket(s) in {:?}",
            buckets.bucket_count(),
            started.elapsed()
        );

        let mut partition_targets: FxHashMap<PartitionId, FxHashSet<CellId>> =
            FxHashMap::default();
        let mut trackers = FxHashMap::default();
        for (id, partition, tracker) in resolved {
            if let Some(partition) = partition {
                partition_targets.entry(partition).or_default().insert(id);
            }
            trackers.insert(id, tracker);
        }

        log::info!("Proximity engine initialized in {:?}", total.elapsed());
        Ok(Self {
            config,
            targets,
            references,
            trackers,
            buckets,
            connections,
            partition_targets,
            partition_references,
            observer,
            selection: RwLock::new(FxHashSet::default()),
            labels: RwLock::new(FxHashMap::default()),
        })
    }

    /// Targets with at least `n` reference interactions within `threshold`.
    ///
    /// `n = 0` trivially returns the whole target population; otherwise the
    /// one-based interaction count maps to bucket `n - 1`. Valid for
    /// `n <= max_neighbors + 1`, where the topmost value asks about the
    /// overflow bucket.
    pub fn get(&self, threshold: f64, n: usize) -> Result<FxHashSet<CellId>> {
        validate_threshold(threshold)?;
        if n == 0 {
            return Ok(self.targets.ids().collect());
        }
        let bucket_count = self.buckets.bucket_count();
        if n > bucket_count {
            return Err(ProximaError::IndexOutOfRange {
                n,
                max: bucket_count,
            });
        }
        self.buckets.cells_within(n - 1, threshold)
    }

    /// Targets with exactly `n` reference interactions within `threshold`:
    /// `get(threshold, n)` minus `get(threshold, n + 1)`. Valid for
    /// `n <= max_neighbors`.
    pub fn exclusive(&self, threshold: f64, n: usize) -> Result<FxHashSet<CellId>> {
        validate_threshold(threshold)?;
        let bucket_count = self.buckets.bucket_count();
        if n + 1 > bucket_count {
            return Err(ProximaError::IndexOutOfRange {
                n,
                max: bucket_count - 1,
            });
        }
        let mut within = self.get(threshold, n)?;
        for cell in self.get(threshold, n + 1)? {
            within.remove(&cell);
        }
        Ok(within)
    }

    /// Targets with no `n`-th nearest reference neighbor at any distance,
    /// so counted by no threshold. Empty for `n = 0` (every target trivially
    /// has zero neighbors); otherwise valid for `n <= max_neighbors + 1`.
    pub fn not_applicable(&self, n: usize) -> Result<FxHashSet<CellId>> {
        if n == 0 {
            return Ok(FxHashSet::default());
        }
        let bucket_count = self.buckets.bucket_count();
        if n > bucket_count {
            return Err(ProximaError::IndexOutOfRange {
                n,
                max: bucket_count,
            });
        }
        Ok(self.buckets.cells_not_applicable(n - 1)?.clone())
    }

    /// Compute the matching set (`get` or `exclusive` per `exclusive_mode`)
    /// and replace the current selection with it, notifying the observer.
    pub fn highlight(
        &self,
        threshold: f64,
        n: usize,
        exclusive_mode: bool,
    ) -> Result<FxHashSet<CellId>> {
        let selected = if exclusive_mode {
            self.exclusive(threshold, n)?
        } else {
            self.get(threshold, n)?
        };
        *self.selection.write() = selected.clone();
        self.observer.selection_replaced(&selected);
        Ok(selected)
    }

    /// Alias for [`ProximityEngine::highlight`] without exclusive mode.
    pub fn show(&self, threshold: f64, n: usize) -> Result<FxHashSet<CellId>> {
        self.highlight(threshold, n, false)
    }

    /// Label every target with its interaction count at `threshold`: the
    /// exact count for cells with fewer than `max_neighbors` interactions,
    /// an overflow marker ("k+") for the rest. Labels anchor at each
    /// target's centroid and replace any labels from a previous call.
    pub fn label(&self, threshold: f64) -> Result<()> {
        validate_threshold(threshold)?;
        let k = self.config.max_neighbors;
        let mut labels = FxHashMap::default();
        for i in 0..k {
            for cell in self.exclusive(threshold, i)? {
                self.put_label(&mut labels, cell, i.to_string());
            }
        }
        for cell in self.get(threshold, k)? {
            self.put_label(&mut labels, cell, format!("{k}+"));
        }
        *self.labels.write() = labels.clone();
        self.observer.labels_updated(&labels);
        Ok(())
    }

    fn put_label(&self, labels: &mut FxHashMap<CellId, LabelAnnotation>, cell: CellId, text: String) {
        if let Some(tracker) = self.trackers.get(&cell) {
            labels.insert(
                cell,
                LabelAnnotation {
                    anchor: tracker.anchor(),
                    text,
                },
            );
        }
    }

    /// Show every connection whose distance is within `threshold` and hide
    /// the rest. With `keep_hidden` unset the observer is asked to prune
    /// hidden connections from the display; interactive sessions pass
    /// `true` to keep them resident for the next call.
    pub fn connect(&self, threshold: f64, keep_hidden: bool) -> Result<()> {
        validate_threshold(threshold)?;
        let mut hidden = 0usize;
        for connection in &self.connections {
            let shown = connection.distance() <= threshold;
            connection.set_shown(shown);
            if !shown {
                hidden += 1;
            }
        }
        if !keep_hidden && hidden > 0 {
            self.observer.hidden_connections_pruned(hidden);
        }
        Ok(())
    }

    /// Drop all labels.
    pub fn clear_labels(&self) {
        self.labels.write().clear();
        self.observer.labels_updated(&FxHashMap::default());
    }

    /// Hide all connections and ask the observer to prune them.
    pub fn clear_connections(&self) {
        let mut hidden = 0usize;
        for connection in &self.connections {
            connection.set_shown(false);
            hidden += 1;
        }
        if hidden > 0 {
            self.observer.hidden_connections_pruned(hidden);
        }
    }

    /// Clear the whole display: connections, labels, and selection.
    pub fn cleanup(&self) {
        self.clear_connections();
        self.clear_labels();
        self.selection.write().clear();
        self.observer.selection_replaced(&FxHashSet::default());
    }

    /// Write the aggregate measurement schema onto `list`: population
    /// counts and areas, cumulative and exact interaction rows, the
    /// overflow row, and per-rank distance statistics. Subsets restrict the
    /// populations without rebuilding anything.
    pub fn add_measurements(
        &self,
        list: &mut MeasurementList,
        target_name: &str,
        reference_name: &str,
        target_subset: Option<&FxHashSet<CellId>>,
        reference_subset: Option<&FxHashSet<CellId>>,
        threshold: f64,
    ) -> Result<()> {
        validate_threshold(threshold)?;
        let formatted = format!("{threshold:.2}");
        let k = self.config.max_neighbors;

        let restrict = |ids: FxHashSet<CellId>, subset: Option<&FxHashSet<CellId>>| match subset {
            Some(subset) => ids.intersection(subset).copied().collect(),
            None => ids,
        };
        let target_ids: FxHashSet<CellId> = restrict(self.targets.ids().collect(), target_subset);
        let reference_ids: FxHashSet<CellId> =
            restrict(self.references.ids().collect(), reference_subset);

        list.put(
            format!("Total count of {target_name}"),
            target_ids.len() as f64,
        );
        list.put(
            format!("Total area of {target_name}"),
            self.population_area(&self.targets, &target_ids),
        );
        list.put(
            format!("Total count of {reference_name}"),
            reference_ids.len() as f64,
        );
        list.put(
            format!("Total area of {reference_name}"),
            self.population_area(&self.references, &reference_ids),
        );

        let cumulative = restrict(self.get(threshold, 1)?, target_subset);
        let mut count_sets = Vec::with_capacity(k + 2);
        count_sets.push((
            format!(
                "'{target_name}' with 1 or more '{reference_name}' interactions (<= {formatted})"
            ),
            cumulative,
        ));
        for i in 0..k {
            let word = if i == 1 { "interaction" } else { "interactions" };
            count_sets.push((
                format!(
                    "'{target_name}' with exactly {i} '{reference_name}' {word} (<= {formatted})"
                ),
                restrict(self.exclusive(threshold, i)?, target_subset),
            ));
        }
        let overflow_bound = k as i64 - 1;
        let word = if overflow_bound == 1 { "interaction" } else { "interactions" };
        count_sets.push((
            format!(
                "'{target_name}' with more than {overflow_bound} '{reference_name}' {word} (<= {formatted})"
            ),
            restrict(self.get(threshold, k)?, target_subset),
        ));

        for (description, cells) in &count_sets {
            list.put(format!("Count of {description}"), cells.len() as f64);
        }
        for (description, cells) in &count_sets {
            list.put(
                format!("Area of {description}"),
                self.population_area(&self.targets, cells),
            );
        }

        self.add_statistics_measurements(list, target_name, reference_name, target_subset);
        log::info!("Measurements added for '{target_name}' vs '{reference_name}'");
        Ok(())
    }

    fn population_area(&self, population: &Population, ids: &FxHashSet<CellId>) -> f64 {
        let scale = self.config.pixel_size * self.config.pixel_size;
        ids.iter()
            .filter_map(|id| population.get(*id))
            .map(|cell| geometry::unsigned_area(&cell.geometry) * scale)
            .sum()
    }

    /// Per-rank mean/median/standard-deviation/Weibull rows. A failed
    /// Weibull fit is downgraded to NaN values with a warning; the rest of
    /// the schema still gets written.
    fn add_statistics_measurements(
        &self,
        list: &mut MeasurementList,
        target_name: &str,
        reference_name: &str,
        target_subset: Option<&FxHashSet<CellId>>,
    ) {
        for rank in 0..self.config.max_neighbors {
            let distances: Vec<f64> = self
                .trackers
                .iter()
                .filter(|(id, _)| target_subset.is_none_or(|subset| subset.contains(id)))
                .filter_map(|(_, tracker)| tracker.distance_by_rank(rank))
                .collect();

            let prefix = format!(
                "'{target_name}': #{} nearest '{reference_name}' distance",
                rank + 1
            );
            let summary = stats::summarize(&distances);
            list.put(
                format!("{prefix}: mean"),
                summary.map_or(f64::NAN, |s| s.mean),
            );
            list.put(
                format!("{prefix}: median"),
                summary.map_or(f64::NAN, |s| s.median),
            );
            list.put(
                format!("{prefix}: standard deviation"),
                summary.map_or(f64::NAN, |s| s.std_dev),
            );

            let fit = match stats::fit_weibull(&distances) {
                Ok(fit) => Some(fit),
                Err(err) => {
                    log::warn!("Weibull fit failed for rank {rank}: {err}");
                    None
                }
            };
            list.put(
                format!("{prefix}: shape (Weibull parameter)"),
                fit.map_or(f64::NAN, |f| f.shape),
            );
            list.put(
                format!("{prefix}: scale (Weibull parameter)"),
                fit.map_or(f64::NAN, |f| f.scale),
            );
        }
    }

    /// Emit each target's distance to its 1st..k-th nearest reference
    /// through `write`, which receives the cell, the measurement name, and
    /// the distance. The extra overflow rank stays internal to the bucket
    /// index.
    pub fn add_cell_measurements<F>(&self, target_name: &str, reference_name: &str, mut write: F)
    where
        F: FnMut(CellId, String, f64),
    {
        let k = self.config.max_neighbors;
        for (id, tracker) in &self.trackers {
            for (rank, distance) in tracker.ranked_distances() {
                if rank >= k {
                    continue;
                }
                write(
                    *id,
                    format!(
                        "This cell ('{target_name}') to #{} nearest '{reference_name}' distance",
                        rank + 1
                    ),
                    distance,
                );
            }
        }
        log::info!("Cell measurements added for {} targets", self.trackers.len());
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn targets(&self) -> &Population {
        &self.targets
    }

    pub fn references(&self) -> &Population {
        &self.references
    }

    pub fn tracker(&self, id: CellId) -> Option<&NeighborTracker> {
        self.trackers.get(&id)
    }

    pub fn connections(&self) -> &[LineConnection] {
        &self.connections
    }

    /// Current selection (snapshot).
    pub fn selection(&self) -> FxHashSet<CellId> {
        self.selection.read().clone()
    }

    /// Current labels (snapshot).
    pub fn labels(&self) -> FxHashMap<CellId, LabelAnnotation> {
        self.labels.read().clone()
    }

    /// Target cells grouped under a partition, if any.
    pub fn partition_targets(&self, partition: PartitionId) -> Option<&FxHashSet<CellId>> {
        self.partition_targets.get(&partition)
    }

    /// Reference cells grouped under a partition, if any.
    pub fn partition_references(&self, partition: PartitionId) -> Option<&FxHashSet<CellId>> {
        self.partition_references.get(&partition)
    }
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ProximaError::InvalidArgument(format!(
            "distance threshold must be finite and non-negative, got {threshold}"
        )));
    }
    Ok(())
}
