//! Engine configuration.
//!
//! A `Config` captures everything that parameterizes one analysis session:
//! how many neighbors to track, how distances are measured, whether the
//! image is analyzed whole or per partition, and how connection lines are
//! decorated. Changing any of these requires rebuilding the engine.

/// Distance metric used when resolving nearest neighbors.
///
/// - **Edge**: shortest distance between geometry boundaries. Two touching
///   cells are at distance zero.
/// - **Centroid**: distance between geometric centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DistanceMetric {
    /// Boundary-to-boundary distance.
    #[default]
    Edge,
    /// Centroid-to-centroid distance.
    Centroid,
}

/// Whether analysis runs over the whole image or independently within each
/// spatial partition (e.g. a TMA core).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PartitionMode {
    /// One global reference index for the whole image.
    #[default]
    WholeImage,
    /// One reference index per partition; targets only see references in
    /// their own partition.
    PerPartition,
}

/// Decoration applied to connection line segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum LineStyle {
    /// Plain segment.
    #[default]
    Plain,
    /// Single arrowhead at the neighbor end.
    Arrow,
    /// Arrowheads at both ends.
    DoubleArrow,
}

/// Analysis session configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum number of reference interactions to test per target cell.
    /// The bucket index has `max_neighbors + 1` entries because isolating
    /// "exactly n" interactions differences bucket n from bucket n + 1.
    #[serde(default)]
    pub max_neighbors: usize,

    /// Physical size of one pixel; geometric distances are multiplied by
    /// this, areas by its square.
    #[serde(default = "Config::default_pixel_size")]
    pub pixel_size: f64,

    #[serde(default)]
    pub partition_mode: PartitionMode,

    #[serde(default)]
    pub metric: DistanceMetric,

    #[serde(default)]
    pub line_style: LineStyle,
}

impl Config {
    const fn default_pixel_size() -> f64 {
        1.0
    }

    pub fn with_max_neighbors(mut self, max_neighbors: usize) -> Self {
        self.max_neighbors = max_neighbors;
        self
    }

    pub fn with_pixel_size(mut self, pixel_size: f64) -> Self {
        assert!(
            pixel_size.is_finite() && pixel_size > 0.0,
            "Pixel size must be positive and finite"
        );
        self.pixel_size = pixel_size;
        self
    }

    pub fn with_partition_mode(mut self, mode: PartitionMode) -> Self {
        self.partition_mode = mode;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_line_style(mut self, style: LineStyle) -> Self {
        self.line_style = style;
        self
    }

    /// Number of distance buckets (`max_neighbors + 1`): the extra bucket
    /// holds the (k+1)-th tested neighbor used for overflow queries.
    pub(crate) fn bucket_count(&self) -> usize {
        self.max_neighbors + 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_neighbors: 0,
            pixel_size: Self::default_pixel_size(),
            partition_mode: PartitionMode::default(),
            metric: DistanceMetric::default(),
            line_style: LineStyle::default(),
        }
    }
}
