use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Area, BoundingRect, Coord, Intersects, LineString, MultiPolygon, Polygon};
use std::collections::BTreeSet;

use crate::geometry;
use crate::index::Predicate;

/// Faces of the boundary arrangement of a set of polygons.
///
/// Boundaries are noded first: every vertex of one member lying on a
/// segment of another is inserted into that segment, as is every proper
/// crossing point between segments of different members. Each minimal
/// enclosed face of the resulting planar graph is then traced; a ring that
/// encloses a nested component becomes a hole of the smallest face covering
/// it. The unbounded outer face is never returned.
pub(crate) fn arrangement_faces(geoms: &[MultiPolygon<f64>]) -> Result<Vec<Polygon<f64>>> {
    let rings = noded_rings(geoms);
    let (coords, adjacency) = build_graph(&rings);
    assemble_faces(trace_rings(&coords, &adjacency))
}

/// All boundary rings, with vertices of other members and pairwise crossing
/// points inserted.
fn noded_rings(geoms: &[MultiPolygon<f64>]) -> Vec<LineString<f64>> {
    let boxes: Vec<_> = geoms.iter().map(|g| g.bounding_rect()).collect();
    let mut insertions: Vec<Vec<Coord<f64>>> = vec![Vec::new(); geoms.len()];
    for i in 0..geoms.len() {
        for j in (i + 1)..geoms.len() {
            let (Some(box_i), Some(box_j)) = (boxes[i], boxes[j]) else { continue };
            if !box_i.intersects(&box_j) {
                continue;
            }
            for ring_j in geometry::rings(&geoms[j]) {
                insertions[i].extend(ring_j.0.iter().copied());
            }
            for ring_i in geometry::rings(&geoms[i]) {
                insertions[j].extend(ring_i.0.iter().copied());
            }
            for ring_i in geometry::rings(&geoms[i]) {
                for ring_j in geometry::rings(&geoms[j]) {
                    for line_i in ring_i.lines() {
                        for line_j in ring_j.lines() {
                            // The same coordinate goes to both sides, so the
                            // crossing has one bit pattern in the graph.
                            if let Some(LineIntersection::SinglePoint { intersection, .. }) =
                                line_intersection(line_i, line_j)
                            {
                                insertions[i].push(intersection);
                                insertions[j].push(intersection);
                            }
                        }
                    }
                }
            }
        }
    }
    geoms.iter().zip(&insertions)
        .flat_map(|(geom, points)| {
            geometry::rings(geom).map(|ring| geometry::insert_ring_vertices(ring, points))
        })
        .collect()
}

/// Collapse the noded rings into a planar graph: unique coordinates become
/// vertices, consecutive ring coordinates become undirected edges, and each
/// vertex's neighbors are sorted counterclockwise by angle.
fn build_graph(rings: &[LineString<f64>]) -> (Vec<Coord<f64>>, Vec<Vec<usize>>) {
    let mut ids: AHashMap<(u64, u64), usize> = AHashMap::new();
    let mut coords: Vec<Coord<f64>> = Vec::new();
    let mut neighbors: Vec<BTreeSet<usize>> = Vec::new();
    for ring in rings {
        let mut prev: Option<usize> = None;
        for &coord in &ring.0 {
            let id = *ids.entry((coord.x.to_bits(), coord.y.to_bits())).or_insert_with(|| {
                coords.push(coord);
                neighbors.push(BTreeSet::new());
                coords.len() - 1
            });
            if let Some(prev) = prev {
                if prev != id {
                    neighbors[prev].insert(id);
                    neighbors[id].insert(prev);
                }
            }
            prev = Some(id);
        }
    }
    let adjacency = neighbors.iter().enumerate()
        .map(|(v, set)| {
            let mut list: Vec<usize> = set.iter().copied().collect();
            list.sort_by(|&a, &b| {
                let angle = |w: usize| (coords[w].y - coords[v].y).atan2(coords[w].x - coords[v].x);
                angle(a).total_cmp(&angle(b))
            });
            list
        })
        .collect();
    (coords, adjacency)
}

/// Trace every face ring of the planar graph.
///
/// Each directed edge is walked once; from edge `(u, v)` the walk continues
/// along the clockwise-next edge after `(v, u)` around `v`, which keeps the
/// face interior on the left. Enclosed faces come out counterclockwise, the
/// boundary of each unbounded region clockwise.
fn trace_rings(coords: &[Coord<f64>], adjacency: &[Vec<usize>]) -> Vec<LineString<f64>> {
    let mut visited: AHashSet<(usize, usize)> = AHashSet::new();
    let mut rings = Vec::new();
    for start_u in 0..adjacency.len() {
        for &start_v in &adjacency[start_u] {
            if visited.contains(&(start_u, start_v)) {
                continue;
            }
            let mut ring = vec![coords[start_u]];
            let (mut u, mut v) = (start_u, start_v);
            loop {
                visited.insert((u, v));
                ring.push(coords[v]);
                let Some(back) = adjacency[v].iter().position(|&w| w == u) else { break };
                let fan = &adjacency[v];
                let next = fan[(back + fan.len() - 1) % fan.len()];
                (u, v) = (v, next);
                if (u, v) == (start_u, start_v) {
                    break;
                }
            }
            rings.push(LineString::new(ring));
        }
    }
    rings
}

/// Split traced rings into shells and hole candidates by orientation, then
/// attach every hole candidate to the smallest shell that covers it. The
/// candidate with no covering shell bounds the unbounded face and is
/// dropped.
fn assemble_faces(rings: Vec<LineString<f64>>) -> Result<Vec<Polygon<f64>>> {
    let mut shells: Vec<Polygon<f64>> = Vec::new();
    let mut candidates: Vec<Polygon<f64>> = Vec::new();
    for ring in rings {
        let poly = Polygon::new(ring, vec![]);
        let area = poly.signed_area();
        if area.abs() < 1e-12 {
            continue;
        }
        if area > 0.0 {
            shells.push(poly);
        } else {
            candidates.push(poly);
        }
    }

    let mut shell_holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];
    for candidate in candidates {
        let hole_area = candidate.unsigned_area();
        let wrapped = MultiPolygon::new(vec![candidate.clone()]);
        let mut best: Option<(usize, f64)> = None;
        for (idx, shell) in shells.iter().enumerate() {
            let shell_area = shell.unsigned_area();
            if shell_area <= hole_area + 1e-9 {
                continue;
            }
            if matches!(best, Some((_, a)) if a <= shell_area) {
                continue;
            }
            if Predicate::Covers.eval(&MultiPolygon::new(vec![shell.clone()]), &wrapped)? {
                best = Some((idx, shell_area));
            }
        }
        if let Some((idx, _)) = best {
            shell_holes[idx].push(candidate.exterior().clone());
        }
    }

    Ok(shells.into_iter().zip(shell_holes)
        .map(|(shell, holes)| Polygon::new(shell.exterior().clone(), holes))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Rect;

    fn rect_multi(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![
            Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon(),
        ])
    }

    fn sorted_areas(faces: &[Polygon<f64>]) -> Vec<f64> {
        let mut areas: Vec<f64> = faces.iter().map(|f| f.unsigned_area()).collect();
        areas.sort_by(f64::total_cmp);
        areas
    }

    #[test]
    fn adjacent_boxes_yield_one_face_each() {
        let faces = arrangement_faces(&[
            rect_multi(0., 0., 10., 10.),
            rect_multi(10., 0., 20., 10.),
        ])
        .unwrap();
        assert_eq!(sorted_areas(&faces), vec![100.0, 100.0]);
    }

    #[test]
    fn pinch_point_contact_still_separates_faces() {
        // The jagged polygon touches the square only at three isolated
        // vertices, enclosing two triangular pockets between them.
        let jagged = Polygon::new(
            LineString::from(vec![
                (10., 10.), (12., 8.), (10., 6.), (12., 4.), (10., 2.), (20., 5.), (10., 10.),
            ]),
            vec![],
        );
        let faces = arrangement_faces(&[
            rect_multi(0., 0., 10., 10.),
            MultiPolygon::new(vec![jagged]),
        ])
        .unwrap();
        assert_eq!(sorted_areas(&faces), vec![4.0, 4.0, 32.0, 100.0]);
    }

    #[test]
    fn crossing_boundaries_are_noded() {
        // Overlapping boxes: the crossing points exist in neither input's
        // vertex set and must be introduced by noding.
        let faces = arrangement_faces(&[
            rect_multi(0., 0., 10., 10.),
            rect_multi(8., 4., 12., 6.),
        ])
        .unwrap();
        assert_eq!(sorted_areas(&faces), vec![4.0, 4.0, 96.0]);
    }

    #[test]
    fn nested_component_becomes_a_hole() {
        let frame = Polygon::new(
            Rect::new(Coord { x: 0., y: 0. }, Coord { x: 12., y: 12. }).to_polygon().exterior().clone(),
            vec![Rect::new(Coord { x: 2., y: 2. }, Coord { x: 10., y: 10. }).to_polygon().exterior().clone()],
        );
        let faces = arrangement_faces(&[
            MultiPolygon::new(vec![frame]),
            rect_multi(4., 4., 8., 8.),
        ])
        .unwrap();
        // Frame band, opening with the island punched out, island.
        assert_eq!(sorted_areas(&faces), vec![16.0, 48.0, 80.0]);
        assert!(faces.iter().any(|f| f.interiors().len() == 1 && (f.unsigned_area() - 48.0).abs() < 1e-9));
    }

    #[test]
    fn empty_input_has_no_faces() {
        assert!(arrangement_faces(&[]).unwrap().is_empty());
        assert!(arrangement_faces(&[MultiPolygon::new(vec![])]).unwrap().is_empty());
    }
}
