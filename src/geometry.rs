use std::f64::consts::PI;

use geo::line_measures::Distance;
use geo::{
    Area, BooleanOps, Closest, ClosestPoint, Coord, Euclidean, EuclideanLength, Intersects,
    LineString, MultiLineString, MultiPolygon, Point, Polygon, Validation,
};

/// Maximum distance at which a point is considered to lie on a boundary.
pub(crate) const ON_BOUNDARY_EPS: f64 = 1e-9;

/// Compactness score `4π·area / perimeter²`, maximal (1.0) for a circle and
/// 0.0 for empty or degenerate geometries.
pub fn isoperimetric_quotient(geom: &MultiPolygon<f64>) -> f64 {
    let perimeter = perimeter(geom);
    if perimeter == 0.0 {
        return 0.0;
    }
    4.0 * PI * geom.unsigned_area() / (perimeter * perimeter)
}

/// Total boundary length (exterior rings plus holes).
pub(crate) fn perimeter(geom: &MultiPolygon<f64>) -> f64 {
    rings(geom).map(|ring| ring.euclidean_length()).sum()
}

/// Iterate over all rings (exteriors then holes, per part).
pub(crate) fn rings(geom: &MultiPolygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    geom.0.iter()
        .flat_map(|poly| std::iter::once(poly.exterior()).chain(poly.interiors().iter()))
}

/// The full boundary of a multi-polygon as closed linestrings.
pub(crate) fn boundary(geom: &MultiPolygon<f64>) -> MultiLineString<f64> {
    MultiLineString::new(rings(geom).cloned().collect())
}

/// Union a slice of multi-polygons by balanced divide-and-conquer, which
/// keeps intermediate operands small on contiguous coverages.
pub(crate) fn union_all(geoms: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
    match geoms.len() {
        0 => MultiPolygon::new(vec![]),
        1 => geoms[0].clone(),
        n => {
            let (left, right) = geoms.split_at(n / 2);
            union_all(left).union(&union_all(right))
        }
    }
}

/// Euclidean distance between two coordinates.
pub(crate) fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Closest point on any boundary ring of `geom` to `point`, with its
/// distance. `None` for empty geometries.
pub(crate) fn closest_boundary_point(
    geom: &MultiPolygon<f64>,
    point: Coord<f64>,
) -> Option<(f64, Coord<f64>)> {
    let query = Point::from(point);
    let mut best: Option<(f64, Coord<f64>)> = None;
    for ring in rings(geom) {
        for line in ring.lines() {
            let candidate = match line.closest_point(&query) {
                Closest::Intersection(p) | Closest::SinglePoint(p) => p.0,
                Closest::Indeterminate => line.start,
            };
            let dist = coord_distance(point, candidate);
            if best.is_none_or(|(d, _)| dist < d) {
                best = Some((dist, candidate));
            }
        }
    }
    best
}

/// Minimum distance between the boundaries of two multi-polygons; 0.0 when
/// they intersect, infinite when either is empty.
pub(crate) fn boundary_distance(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    if a.0.is_empty() || b.0.is_empty() {
        return f64::INFINITY;
    }
    if a.intersects(b) {
        return 0.0;
    }
    let mut min = f64::INFINITY;
    for ring_a in rings(a) {
        for line_a in ring_a.lines() {
            for ring_b in rings(b) {
                for line_b in ring_b.lines() {
                    let dist = Euclidean.distance(&line_a, &line_b);
                    if dist < min {
                        min = dist;
                    }
                }
            }
        }
    }
    min
}

/// Densify a closed ring so that no segment exceeds `max_length`.
pub(crate) fn densify_ring(ring: &LineString<f64>, max_length: f64) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for line in ring.lines() {
        coords.push(line.start);
        let length = coord_distance(line.start, line.end);
        let pieces = (length / max_length).ceil() as usize;
        for k in 1..pieces {
            let t = k as f64 / pieces as f64;
            coords.push(line.start + (line.end - line.start) * t);
        }
    }
    if let Some(&last) = ring.0.last() {
        coords.push(last);
    }
    LineString::new(coords)
}

/// Insert every candidate point lying on a segment of `ring` (within
/// [`ON_BOUNDARY_EPS`]) as a new vertex, ordered by position along the
/// segment. Points coinciding with existing vertices are skipped.
pub(crate) fn insert_ring_vertices(ring: &LineString<f64>, points: &[Coord<f64>]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for line in ring.lines() {
        coords.push(line.start);
        let direction = line.end - line.start;
        let norm2 = direction.x * direction.x + direction.y * direction.y;
        if norm2 == 0.0 {
            continue;
        }
        let mut on_segment: Vec<(f64, Coord<f64>)> = points.iter()
            .filter(|&&p| {
                coord_distance(p, line.start) > ON_BOUNDARY_EPS
                    && coord_distance(p, line.end) > ON_BOUNDARY_EPS
            })
            .filter_map(|&p| {
                let offset = p - line.start;
                let t = (offset.x * direction.x + offset.y * direction.y) / norm2;
                if !(0.0..=1.0).contains(&t) {
                    return None;
                }
                let foot = line.start + direction * t;
                (coord_distance(p, foot) <= ON_BOUNDARY_EPS).then_some((t, p))
            })
            .collect();
        on_segment.sort_by(|a, b| a.0.total_cmp(&b.0));
        on_segment.dedup_by(|a, b| coord_distance(a.1, b.1) <= ON_BOUNDARY_EPS);
        coords.extend(on_segment.into_iter().map(|(_, p)| p));
    }
    if let Some(&last) = ring.0.last() {
        coords.push(last);
    }
    LineString::new(coords)
}

/// Length of the part of `target`'s boundary lying within `neighbor`
/// (its boundary included). Positive exactly when the two share boundary
/// contact of dimension one; a pure point touch contributes zero.
pub(crate) fn shared_boundary_length(target: &MultiPolygon<f64>, neighbor: &MultiPolygon<f64>) -> f64 {
    if target.0.is_empty() || neighbor.0.is_empty() {
        return 0.0;
    }
    neighbor.clip(&boundary(target), false).0.iter()
        .map(|line| line.euclidean_length())
        .sum()
}

/// The largest part of a multi-polygon by area.
pub(crate) fn largest_part(geom: MultiPolygon<f64>) -> Option<Polygon<f64>> {
    geom.0.into_iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
}

/// Check polygon validity (OGC rules: closed, non-self-intersecting rings,
/// holes inside shells).
pub(crate) fn is_valid_polygon(poly: &Polygon<f64>) -> bool {
    poly.is_valid()
}

/// Rebuild a possibly-invalid polygon through an even-odd boolean pass
/// (union with the empty geometry), which extracts the face arrangement of
/// self-intersecting rings as separate parts.
pub(crate) fn even_odd_repair(poly: &Polygon<f64>) -> MultiPolygon<f64> {
    poly.union(&MultiPolygon::<f64>::new(vec![]))
}
