//! Cell objects and populations.
//!
//! A [`Cell`] is one immutable 2D object from a segmented image: an identity,
//! a point or polygon geometry, an optional link to its enclosing partition,
//! and an optional classification tag. Two labeled [`Population`]s of cells
//! (targets and references) are the inputs to one analysis session.

use geo::{Point, Polygon};

/// Stable identity of a cell for the lifetime of one analysis session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CellId(pub u64);

/// Identity of a spatial partition (e.g. a TMA core) grouping cells by
/// enclosing region. The mapping from cell to partition is resolved once by
/// the loader, not re-walked per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PartitionId(pub u64);

/// Geometry of a cell: a detection polygon or a bare point.
#[derive(Debug, Clone, PartialEq)]
pub enum CellGeometry {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
}

impl From<Point<f64>> for CellGeometry {
    fn from(point: Point<f64>) -> Self {
        CellGeometry::Point(point)
    }
}

impl From<Polygon<f64>> for CellGeometry {
    fn from(polygon: Polygon<f64>) -> Self {
        CellGeometry::Polygon(polygon)
    }
}

/// One cell object. Immutable for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: CellId,
    pub geometry: CellGeometry,
    /// Enclosing partition, when the image carries partitions.
    pub partition: Option<PartitionId>,
    /// Optional classification tag carried through to display consumers.
    pub class: Option<String>,
}

impl Cell {
    pub fn new(id: CellId, geometry: impl Into<CellGeometry>) -> Self {
        Self {
            id,
            geometry: geometry.into(),
            partition: None,
            class: None,
        }
    }

    pub fn with_partition(mut self, partition: PartitionId) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }
}

/// A deduplicated set of cells, stored sorted by id.
///
/// Sets rather than lists because duplicates are not expected; sorted order
/// keeps index builds and bucket contents identical across rebuilds with the
/// same inputs. Target and reference populations are disjoint by convention,
/// not enforced.
#[derive(Debug, Clone, Default)]
pub struct Population {
    cells: Vec<Cell>,
}

impl Population {
    /// Build a population, dropping duplicate ids (first occurrence wins).
    pub fn new(cells: impl IntoIterator<Item = Cell>) -> Self {
        let mut cells: Vec<Cell> = cells.into_iter().collect();
        let before = cells.len();
        cells.sort_by_key(|cell| cell.id);
        cells.dedup_by_key(|cell| cell.id);
        if cells.len() != before {
            log::warn!("Duplicates removed from population ({} dropped)", before - cells.len());
        }
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter().map(|cell| cell.id)
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.binary_search_by_key(&id, |cell| cell.id).is_ok()
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells
            .binary_search_by_key(&id, |cell| cell.id)
            .ok()
            .map(|i| &self.cells[i])
    }

    pub fn as_slice(&self) -> &[Cell] {
        &self.cells
    }
}

impl FromIterator<Cell> for Population {
    fn from_iter<T: IntoIterator<Item = Cell>>(iter: T) -> Self {
        Self::new(iter)
    }
}
