//! Metric math over cell geometries.
//!
//! Everything the index and connection builder need from a [`CellGeometry`]
//! lives here: centroids, R-tree envelopes, areas, boundary-to-boundary
//! (edge) distances, and the closest boundary point pair used as connection
//! line endpoints.

use crate::cell::CellGeometry;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Area, BoundingRect, Centroid, Contains, Coord, Intersects, Line, Point, Polygon};
use rstar::AABB;

/// Geometric centroid. `None` for a polygon with an empty exterior, which
/// the engine treats as a fatal precondition violation.
pub fn centroid(geometry: &CellGeometry) -> Option<Point<f64>> {
    match geometry {
        CellGeometry::Point(point) => Some(*point),
        CellGeometry::Polygon(polygon) => polygon.centroid(),
    }
}

/// Axis-aligned envelope for R-tree insertion.
pub fn envelope(geometry: &CellGeometry) -> Option<AABB<[f64; 2]>> {
    match geometry {
        CellGeometry::Point(point) => Some(AABB::from_point([point.x(), point.y()])),
        CellGeometry::Polygon(polygon) => {
            let rect = polygon.bounding_rect()?;
            Some(AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            ))
        }
    }
}

/// Unsigned geometric area in pixel units. Zero for points.
pub fn unsigned_area(geometry: &CellGeometry) -> f64 {
    match geometry {
        CellGeometry::Point(_) => 0.0,
        CellGeometry::Polygon(polygon) => polygon.unsigned_area(),
    }
}

/// Largest distance from the centroid to any boundary point. Used as the
/// slack term in the edge-metric k-NN stopping bound: for a target t with
/// radius r, edge_distance(t, c) >= envelope_distance(centroid_t, c) - r.
///
/// The maximum over a polygon is attained at an exterior vertex, so interior
/// rings need not be scanned.
pub fn boundary_radius(geometry: &CellGeometry, centroid: Point<f64>) -> f64 {
    match geometry {
        CellGeometry::Point(_) => 0.0,
        CellGeometry::Polygon(polygon) => polygon
            .exterior()
            .coords()
            .map(|coord| distance_coords(*coord, centroid.into()))
            .fold(0.0, f64::max),
    }
}

/// Closest pair of boundary points between two geometries, with their
/// separation. For overlapping geometries the pair degenerates to a single
/// shared point at distance zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPair {
    /// Point on the first geometry's boundary.
    pub on_first: Point<f64>,
    /// Point on the second geometry's boundary.
    pub on_second: Point<f64>,
    pub distance: f64,
}

/// Boundary-to-boundary (edge) distance. Zero when the geometries touch,
/// overlap, or one contains the other.
pub fn edge_distance(a: &CellGeometry, b: &CellGeometry) -> f64 {
    closest_boundary_pair(a, b).distance
}

/// Centroid-to-centroid distance given precomputed centroids.
pub fn centroid_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    distance_coords(a.into(), b.into())
}

/// Compute the closest boundary point pair between two geometries.
///
/// Segment pairs are scanned exhaustively; cell outlines are small, so the
/// quadratic scan stays cheap. Boundary crossings short-circuit to distance
/// zero through `line_intersection`.
pub fn closest_boundary_pair(a: &CellGeometry, b: &CellGeometry) -> ClosestPair {
    match (a, b) {
        (CellGeometry::Point(p), CellGeometry::Point(q)) => ClosestPair {
            on_first: *p,
            on_second: *q,
            distance: distance_coords((*p).into(), (*q).into()),
        },
        (CellGeometry::Point(p), CellGeometry::Polygon(polygon)) => {
            let pair = point_to_polygon(*p, polygon);
            ClosestPair {
                on_first: pair.on_second,
                on_second: pair.on_first,
                distance: pair.distance,
            }
        }
        (CellGeometry::Polygon(polygon), CellGeometry::Point(q)) => {
            let pair = point_to_polygon(*q, polygon);
            ClosestPair {
                on_first: pair.on_first,
                on_second: pair.on_second,
                distance: pair.distance,
            }
        }
        (CellGeometry::Polygon(first), CellGeometry::Polygon(second)) => {
            polygon_to_polygon(first, second)
        }
    }
}

/// Closest pair with the polygon boundary point first. A point inside the
/// polygon collapses to itself at distance zero.
fn point_to_polygon(point: Point<f64>, polygon: &Polygon<f64>) -> ClosestPair {
    if polygon.contains(&point) {
        return ClosestPair {
            on_first: point,
            on_second: point,
            distance: 0.0,
        };
    }

    let target: Coord<f64> = point.into();
    let mut best: Option<(Coord<f64>, f64)> = None;
    for segment in boundary_segments(polygon) {
        let candidate = closest_on_segment(segment, target);
        let distance = distance_coords(candidate, target);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }

    // Validated geometries always carry at least one boundary segment.
    let (on_polygon, distance) = best.unwrap_or((target, 0.0));
    ClosestPair {
        on_first: on_polygon.into(),
        on_second: point,
        distance,
    }
}

fn polygon_to_polygon(first: &Polygon<f64>, second: &Polygon<f64>) -> ClosestPair {
    let overlapping = first.intersects(second);

    let mut best: Option<ClosestPair> = None;
    for seg_a in boundary_segments(first) {
        for seg_b in boundary_segments(second) {
            if overlapping && let Some(hit) = line_intersection(seg_a, seg_b) {
                let shared = match hit {
                    LineIntersection::SinglePoint { intersection, .. } => intersection,
                    LineIntersection::Collinear { intersection } => intersection.start,
                };
                return ClosestPair {
                    on_first: shared.into(),
                    on_second: shared.into(),
                    distance: 0.0,
                };
            }

            let candidate = closest_segment_pair(seg_a, seg_b);
            if best.is_none_or(|pair| candidate.distance < pair.distance) {
                best = Some(candidate);
            }
        }
    }

    if overlapping {
        // Containment without a boundary crossing: any point of the inner
        // boundary is a shared interior point.
        let inner = if first.contains(second) {
            second.exterior().0.first().copied()
        } else {
            first.exterior().0.first().copied()
        };
        if let Some(shared) = inner {
            return ClosestPair {
                on_first: shared.into(),
                on_second: shared.into(),
                distance: 0.0,
            };
        }
    }

    best.unwrap_or(ClosestPair {
        on_first: Point::new(0.0, 0.0),
        on_second: Point::new(0.0, 0.0),
        distance: 0.0,
    })
}

/// All boundary segments: the exterior ring plus any interior rings.
fn boundary_segments(polygon: &Polygon<f64>) -> impl Iterator<Item = Line<f64>> + '_ {
    polygon
        .exterior()
        .lines()
        .chain(polygon.interiors().iter().flat_map(|ring| ring.lines()))
}

/// Closest pair between two disjoint segments: the minimum over the four
/// endpoint-onto-segment projections.
fn closest_segment_pair(a: Line<f64>, b: Line<f64>) -> ClosestPair {
    let candidates = [
        (a.start, closest_on_segment(b, a.start), false),
        (a.end, closest_on_segment(b, a.end), false),
        (closest_on_segment(a, b.start), b.start, true),
        (closest_on_segment(a, b.end), b.end, true),
    ];

    let mut best = ClosestPair {
        on_first: a.start.into(),
        on_second: b.start.into(),
        distance: f64::INFINITY,
    };
    for (on_a, on_b, _) in candidates {
        let distance = distance_coords(on_a, on_b);
        if distance < best.distance {
            best = ClosestPair {
                on_first: on_a.into(),
                on_second: on_b.into(),
                distance,
            };
        }
    }
    best
}

fn closest_on_segment(segment: Line<f64>, point: Coord<f64>) -> Coord<f64> {
    let delta = segment.delta();
    let length_2 = delta.x * delta.x + delta.y * delta.y;
    if length_2 == 0.0 {
        return segment.start;
    }
    let t = ((point.x - segment.start.x) * delta.x + (point.y - segment.start.y) * delta.y)
        / length_2;
    let t = t.clamp(0.0, 1.0);
    Coord {
        x: segment.start.x + t * delta.x,
        y: segment.start.y + t * delta.y,
    }
}

fn distance_coords(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit_square(x0: f64, y0: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + 1.0, y: y0),
            (x: x0 + 1.0, y: y0 + 1.0),
            (x: x0, y: y0 + 1.0),
            (x: x0, y: y0),
        ]
    }

    #[test]
    fn centroid_of_square() {
        let geometry = CellGeometry::Polygon(unit_square(0.0, 0.0));
        let c = centroid(&geometry).unwrap();
        assert!((c.x() - 0.5).abs() < 1e-12);
        assert!((c.y() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn degenerate_polygon_has_no_centroid() {
        let empty = Polygon::new(geo::LineString::new(vec![]), vec![]);
        assert!(centroid(&CellGeometry::Polygon(empty)).is_none());
    }

    #[test]
    fn edge_distance_between_separated_squares() {
        let a = CellGeometry::Polygon(unit_square(0.0, 0.0));
        let b = CellGeometry::Polygon(unit_square(3.0, 0.0));
        assert!((edge_distance(&a, &b) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn edge_distance_zero_for_overlap() {
        let a = CellGeometry::Polygon(unit_square(0.0, 0.0));
        let b = CellGeometry::Polygon(unit_square(0.5, 0.5));
        assert_eq!(edge_distance(&a, &b), 0.0);
    }

    #[test]
    fn closest_pair_endpoints_lie_on_facing_edges() {
        let a = CellGeometry::Polygon(unit_square(0.0, 0.0));
        let b = CellGeometry::Polygon(unit_square(3.0, 0.0));
        let pair = closest_boundary_pair(&a, &b);
        assert!((pair.on_first.x() - 1.0).abs() < 1e-12);
        assert!((pair.on_second.x() - 3.0).abs() < 1e-12);
        assert!((pair.distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn point_inside_polygon_is_distance_zero() {
        let square = CellGeometry::Polygon(unit_square(0.0, 0.0));
        let point = CellGeometry::Point(Point::new(0.5, 0.5));
        assert_eq!(edge_distance(&point, &square), 0.0);
        assert_eq!(edge_distance(&square, &point), 0.0);
    }

    #[test]
    fn point_to_point_pair() {
        let a = CellGeometry::Point(Point::new(0.0, 0.0));
        let b = CellGeometry::Point(Point::new(3.0, 4.0));
        let pair = closest_boundary_pair(&a, &b);
        assert!((pair.distance - 5.0).abs() < 1e-12);
        assert_eq!(pair.on_first, Point::new(0.0, 0.0));
        assert_eq!(pair.on_second, Point::new(3.0, 4.0));
    }

    #[test]
    fn boundary_radius_of_square_reaches_corner() {
        let geometry = CellGeometry::Polygon(unit_square(0.0, 0.0));
        let c = centroid(&geometry).unwrap();
        let radius = boundary_radius(&geometry, c);
        assert!((radius - (0.5f64.powi(2) * 2.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn area_scales() {
        let geometry = CellGeometry::Polygon(unit_square(0.0, 0.0));
        assert!((unsigned_area(&geometry) - 1.0).abs() < 1e-12);
        assert_eq!(unsigned_area(&CellGeometry::Point(Point::new(1.0, 2.0))), 0.0);
    }
}
