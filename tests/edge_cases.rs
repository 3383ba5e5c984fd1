use geo::{polygon, LineString, Point, Polygon};
use proxima::{
    Cell, CellGeometry, CellId, Config, MeasurementList, ProximaError, ProximityEngine,
};
use rustc_hash::FxHashSet;

fn point_cell(id: u64, x: f64, y: f64) -> Cell {
    Cell::new(CellId(id), CellGeometry::Point(Point::new(x, y)))
}

/// Test 1: an empty reference population still builds; every bucket holds
/// only not-applicable entries and every threshold query comes back empty.
#[test]
fn test_empty_reference_population() {
    let engine = ProximityEngine::builder()
        .targets([point_cell(1, 0.0, 0.0), point_cell(2, 5.0, 0.0)])
        .references(std::iter::empty::<Cell>())
        .config(Config::default().with_max_neighbors(3))
        .build()
        .expect("Failed to build engine");

    assert_eq!(engine.get(1e9, 0).expect("get failed").len(), 2);
    for n in 1..=4 {
        assert!(engine.get(1e9, n).expect("get failed").is_empty());
    }
    let tracker = engine.tracker(CellId(1)).expect("missing tracker");
    assert_eq!(tracker.neighbor_count(), 0);
    assert!(engine.connections().is_empty());
}

/// Test 2: an empty target population builds and answers trivially.
#[test]
fn test_empty_target_population() {
    let engine = ProximityEngine::builder()
        .targets(std::iter::empty::<Cell>())
        .references([point_cell(10, 0.0, 0.0)])
        .config(Config::default().with_max_neighbors(2))
        .build()
        .expect("Failed to build engine");

    assert!(engine.get(100.0, 0).expect("get failed").is_empty());
    assert!(engine.get(100.0, 1).expect("get failed").is_empty());
}

/// Test 3: with fewer references than tracked ranks, targets drop out of
/// higher buckets instead of being padded.
#[test]
fn test_sparse_reference_population() {
    // One reference, k = 3: ranks 1..3 have no data for any target.
    let engine = ProximityEngine::builder()
        .targets([point_cell(1, 0.0, 0.0), point_cell(2, 1.0, 0.0)])
        .references([point_cell(10, 0.5, 0.0)])
        .config(Config::default().with_max_neighbors(3))
        .build()
        .expect("Failed to build engine");

    assert_eq!(engine.get(1e9, 1).expect("get failed").len(), 2);
    for n in 2..=4 {
        assert!(
            engine.get(1e9, n).expect("get failed").is_empty(),
            "unexpected cells at n={n}"
        );
    }
    let tracker = engine.tracker(CellId(1)).expect("missing tracker");
    assert_eq!(tracker.neighbor_count(), 1);
    assert_eq!(tracker.distance_by_rank(1), None);

    // With data for rank 0 only, the not-applicable group at every higher
    // n is the whole target population.
    assert!(engine.not_applicable(1).expect("not_applicable failed").is_empty());
    let all: FxHashSet<CellId> = engine.targets().ids().collect();
    for n in 2..=4 {
        assert_eq!(
            engine.not_applicable(n).expect("not_applicable failed"),
            all,
            "wrong not-applicable group at n={n}"
        );
    }
    assert!(matches!(
        engine.not_applicable(5),
        Err(ProximaError::IndexOutOfRange { n: 5, max: 4 })
    ));
}

/// Test 4: k = 0 still carries the single overflow bucket; every target
/// with any reference within range is "0+".
#[test]
fn test_zero_max_neighbors() {
    let engine = ProximityEngine::builder()
        .targets([point_cell(1, 0.0, 0.0)])
        .references([point_cell(10, 2.0, 0.0)])
        .config(Config::default().with_max_neighbors(0))
        .build()
        .expect("Failed to build engine");

    assert_eq!(engine.get(5.0, 1).expect("get failed").len(), 1);
    assert!(matches!(
        engine.get(5.0, 2),
        Err(ProximaError::IndexOutOfRange { n: 2, max: 1 })
    ));

    engine.label(5.0).expect("label failed");
    for label in engine.labels().values() {
        assert_eq!(label.text, "0+");
    }
}

/// Test 5: a degenerate (empty) polygon aborts initialization before any
/// query becomes available.
#[test]
fn test_degenerate_geometry_is_fatal() {
    let empty = Polygon::new(LineString::new(Vec::new()), Vec::new());
    let result = ProximityEngine::builder()
        .targets([point_cell(1, 0.0, 0.0)])
        .references([Cell::new(CellId(10), CellGeometry::Polygon(empty))])
        .config(Config::default().with_max_neighbors(1))
        .build();

    assert!(matches!(result, Err(ProximaError::EmptyGeometry(CellId(10)))));
}

/// Test 6: touching polygons are at edge distance zero.
#[test]
fn test_touching_polygons_have_zero_distance() {
    let square = |id: u64, x0: f64| {
        let polygon = polygon![
            (x: x0, y: 0.0),
            (x: x0 + 2.0, y: 0.0),
            (x: x0 + 2.0, y: 2.0),
            (x: x0, y: 2.0),
        ];
        Cell::new(CellId(id), CellGeometry::Polygon(polygon))
    };
    let engine = ProximityEngine::builder()
        .targets([square(1, 0.0)])
        .references([square(2, 2.0)])
        .config(Config::default().with_max_neighbors(1))
        .build()
        .expect("Failed to build engine");

    let tracker = engine.tracker(CellId(1)).expect("missing tracker");
    assert_eq!(tracker.distance_by_rank(0), Some(0.0));
    assert_eq!(engine.get(0.0, 1).expect("get failed").len(), 1);
}

/// Test 7: pixel size scales tracked distances and measured areas.
#[test]
fn test_pixel_size_scaling() {
    let square = polygon![
        (x: 0.0, y: 0.0),
        (x: 2.0, y: 0.0),
        (x: 2.0, y: 2.0),
        (x: 0.0, y: 2.0),
    ];
    let engine = ProximityEngine::builder()
        .targets([Cell::new(CellId(1), CellGeometry::Polygon(square))])
        .references([point_cell(10, 6.0, 1.0)])
        .config(Config::default().with_max_neighbors(1).with_pixel_size(0.5))
        .build()
        .expect("Failed to build engine");

    // Geometric edge distance 4 becomes 2 physical units.
    let tracker = engine.tracker(CellId(1)).expect("missing tracker");
    assert_eq!(tracker.distance_by_rank(0), Some(2.0));
    assert_eq!(engine.get(2.0, 1).expect("get failed").len(), 1);
    assert!(engine.get(1.9, 1).expect("get failed").is_empty());

    // Area 4 px^2 at 0.5 units per pixel is 1 square unit.
    let mut list = MeasurementList::new();
    engine
        .add_measurements(&mut list, "T", "R", None, None, 2.0)
        .expect("add_measurements failed");
    assert_eq!(list.get("Total area of T"), Some(1.0));
}

/// Test 8: thresholds are a closed interval; a neighbor exactly at the
/// threshold counts.
#[test]
fn test_threshold_is_inclusive() {
    let engine = ProximityEngine::builder()
        .targets([point_cell(1, 0.0, 0.0)])
        .references([point_cell(10, 3.0, 0.0)])
        .config(Config::default().with_max_neighbors(1))
        .build()
        .expect("Failed to build engine");

    assert_eq!(engine.get(3.0, 1).expect("get failed").len(), 1);
    assert!(engine.get(2.999_999, 1).expect("get failed").is_empty());
}

/// Test 9: duplicate cell ids are dropped at population construction.
#[test]
fn test_duplicate_targets_are_deduplicated() {
    let engine = ProximityEngine::builder()
        .targets([point_cell(1, 0.0, 0.0), point_cell(1, 50.0, 0.0)])
        .references([point_cell(10, 1.0, 0.0)])
        .config(Config::default().with_max_neighbors(1))
        .build()
        .expect("Failed to build engine");

    assert_eq!(engine.targets().len(), 1);
    assert_eq!(engine.get(1e9, 0).expect("get failed").len(), 1);
}

/// Test 10: initialization runs on a caller-supplied thread pool.
#[test]
fn test_custom_thread_pool() {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .build()
        .expect("Failed to build pool");

    let engine = ProximityEngine::builder()
        .targets((0..100).map(|i| point_cell(i, i as f64, 0.0)))
        .references((0..100).map(|i| point_cell(1000 + i, i as f64, 1.0)))
        .config(Config::default().with_max_neighbors(2))
        .thread_pool(std::sync::Arc::new(pool))
        .build()
        .expect("Failed to build engine");

    assert_eq!(engine.get(1.0, 1).expect("get failed").len(), 100);
}

/// Test 11: a large population keeps exact nearest-neighbor behavior.
#[test]
fn test_large_population() {
    let targets: Vec<Cell> = (0..2_000)
        .map(|i| point_cell(i, (i % 100) as f64, (i / 100) as f64))
        .collect();
    let references: Vec<Cell> = (0..2_000)
        .map(|i| point_cell(10_000 + i, (i % 100) as f64 + 0.25, (i / 100) as f64))
        .collect();

    let engine = ProximityEngine::builder()
        .targets(targets)
        .references(references)
        .config(Config::default().with_max_neighbors(2))
        .build()
        .expect("Failed to build engine");

    // Every target has a reference exactly 0.25 away.
    assert_eq!(engine.get(0.25, 1).expect("get failed").len(), 2_000);
    assert!(engine.get(0.2, 1).expect("get failed").is_empty());

    let tracker = engine.tracker(CellId(0)).expect("missing tracker");
    assert_eq!(tracker.distance_by_rank(0), Some(0.25));
}
