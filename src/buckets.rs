//! Distance-bucket index backing threshold queries.
//!
//! Bucket `n` maps "distance to the (n+1)-th nearest reference neighbor" to
//! the set of target cells at that distance. Targets with no such neighbor
//! are filed under [`BucketKey::NotApplicable`] so they never match a
//! numeric threshold scan but remain countable.

use crate::cell::CellId;
use crate::error::{ProximaError, Result};
use ordered_float::NotNan;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Key in a distance bucket. `Distance` keys order numerically and sort
/// before `NotApplicable`, so closed-interval range scans over distances
/// never touch the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BucketKey {
    Distance(NotNan<f64>),
    NotApplicable,
}

impl BucketKey {
    pub(crate) fn from_distance(distance: f64) -> Result<Self> {
        NotNan::new(distance)
            .map(BucketKey::Distance)
            .map_err(|_| ProximaError::InvalidArgument("NaN neighbor distance".into()))
    }
}

type Bucket = BTreeMap<BucketKey, FxHashSet<CellId>>;

/// One bucket per neighbor rank, `max_neighbors + 1` in total. The extra
/// bucket at index `max_neighbors` holds the (k+1)-th neighbor distance and
/// serves the "more than k within threshold" query.
#[derive(Debug)]
pub struct DistanceBucketIndex {
    buckets: Vec<Bucket>,
}

impl DistanceBucketIndex {
    /// `bucket_count` is `max_neighbors + 1`.
    pub fn new(bucket_count: usize) -> Self {
        Self {
            buckets: (0..bucket_count).map(|_| Bucket::new()).collect(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Build all buckets as independent parallel tasks, one per rank.
    /// `per_rank` yields the (cell, distance) pairs to file under a given
    /// rank; a `None` distance files the cell under the sentinel. Any task
    /// error aborts the whole build.
    pub(crate) fn build_parallel<F>(bucket_count: usize, per_rank: F) -> Result<Self>
    where
        F: Fn(usize) -> Result<Vec<(CellId, Option<f64>)>> + Sync,
    {
        let buckets = (0..bucket_count)
            .into_par_iter()
            .map(|rank| {
                let mut bucket = Bucket::new();
                for (cell, distance) in per_rank(rank)? {
                    let key = match distance {
                        Some(d) => BucketKey::from_distance(d)?,
                        None => BucketKey::NotApplicable,
                    };
                    bucket.entry(key).or_default().insert(cell);
                }
                Ok(bucket)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { buckets })
    }

    /// File `cell` under rank bucket `rank` with the given distance, or
    /// under the not-applicable sentinel when `distance` is `None`.
    pub fn insert(&mut self, rank: usize, cell: CellId, distance: Option<f64>) -> Result<()> {
        let key = match distance {
            Some(d) => BucketKey::from_distance(d)?,
            None => BucketKey::NotApplicable,
        };
        let max = self.buckets.len();
        let bucket = self
            .buckets
            .get_mut(rank)
            .ok_or(ProximaError::IndexOutOfRange { n: rank, max })?;
        bucket.entry(key).or_default().insert(cell);
        Ok(())
    }

    /// Targets whose (n+1)-th nearest neighbor lies within `threshold`
    /// (closed interval `[0, threshold]`). Not-applicable entries never
    /// match.
    pub fn cells_within(&self, n: usize, threshold: f64) -> Result<FxHashSet<CellId>> {
        let upper = BucketKey::from_distance(threshold)?;
        let bucket = self.buckets.get(n).ok_or(ProximaError::IndexOutOfRange {
            n,
            max: self.buckets.len(),
        })?;
        let mut out = FxHashSet::default();
        for (_, cells) in bucket.range((
            Bound::Included(BucketKey::Distance(NotNan::new(0.0).map_err(|_| {
                ProximaError::InvalidArgument("NaN threshold".into())
            })?)),
            Bound::Included(upper),
        )) {
            out.extend(cells.iter().copied());
        }
        Ok(out)
    }

    /// Targets with no (n+1)-th neighbor at all.
    pub fn cells_not_applicable(&self, n: usize) -> Result<&FxHashSet<CellId>> {
        static EMPTY: std::sync::OnceLock<FxHashSet<CellId>> = std::sync::OnceLock::new();
        let bucket = self.buckets.get(n).ok_or(ProximaError::IndexOutOfRange {
            n,
            max: self.buckets.len(),
        })?;
        Ok(bucket
            .get(&BucketKey::NotApplicable)
            .unwrap_or_else(|| EMPTY.get_or_init(FxHashSet::default)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_keys_sort_before_sentinel() {
        let a = BucketKey::from_distance(1e12).unwrap();
        assert!(a < BucketKey::NotApplicable);
    }

    #[test]
    fn threshold_scan_is_closed_interval() {
        let mut index = DistanceBucketIndex::new(2);
        index.insert(0, CellId(1), Some(2.0)).unwrap();
        index.insert(0, CellId(2), Some(5.0)).unwrap();
        index.insert(0, CellId(3), None).unwrap();

        let within = index.cells_within(0, 5.0).unwrap();
        assert_eq!(within.len(), 2);
        assert!(within.contains(&CellId(1)));
        assert!(within.contains(&CellId(2)));

        let within = index.cells_within(0, 4.999).unwrap();
        assert_eq!(within.len(), 1);
        assert!(within.contains(&CellId(1)));
    }

    #[test]
    fn not_applicable_never_matches_thresholds() {
        let mut index = DistanceBucketIndex::new(1);
        index.insert(0, CellId(7), None).unwrap();
        assert!(index.cells_within(0, f64::MAX).unwrap().is_empty());
        assert!(index.cells_not_applicable(0).unwrap().contains(&CellId(7)));
    }

    #[test]
    fn out_of_range_bucket_is_an_error() {
        let mut index = DistanceBucketIndex::new(2);
        assert!(matches!(
            index.cells_within(2, 1.0),
            Err(ProximaError::IndexOutOfRange { n: 2, max: 2 })
        ));
        assert!(matches!(
            index.insert(2, CellId(1), Some(1.0)),
            Err(ProximaError::IndexOutOfRange { n: 2, max: 2 })
        ));
    }

    #[test]
    fn cancellation_during_construction_aborts_the_build() {
        use crate::cancel::CancelToken;

        // The first rank to trip the flag fails every rank polled after it,
        // so the build as a whole must surface the cancellation.
        let cancel = CancelToken::new();
        let result = DistanceBucketIndex::build_parallel(3, |rank| {
            if rank > 0 {
                cancel.cancel();
            }
            cancel.check()?;
            Ok(vec![(CellId(rank as u64), Some(rank as f64))])
        });
        assert!(matches!(result, Err(ProximaError::Cancelled)));
    }

    #[test]
    fn nan_distance_is_rejected() {
        let mut index = DistanceBucketIndex::new(1);
        assert!(index.insert(0, CellId(1), Some(f64::NAN)).is_err());
    }
}
