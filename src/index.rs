use anyhow::Result;
use geo::{BoundingRect, Intersects, MultiPolygon, Rect, Relate};
use rstar::{AABB, RTree, RTreeObject};

use crate::collection::PolygonCollection;
use crate::geometry;

/// DE-9IM pattern for `contains` (JTS).
const CONTAINS: &str = "T*****FF*";
/// DE-9IM patterns for `covers`: any interior/boundary contact with nothing
/// of the candidate in the exterior (JTS).
const COVERS: [&str; 4] = ["T*****FF*", "*T****FF*", "***T**FF*", "****T*FF*"];
/// DE-9IM pattern for area/area `overlaps`.
const OVERLAPS: &str = "T*T***T**";

/// Spatial predicate refining R-tree candidate pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Predicate {
    Intersects,
    Overlaps,
    Contains,
    Covers,
    /// Within the given distance of each other (boundary-to-boundary).
    DWithin(f64),
}

impl Predicate {
    /// Extra bounding-box padding needed for candidate enumeration.
    fn padding(&self) -> f64 {
        match self {
            Predicate::DWithin(distance) => *distance,
            _ => 0.0,
        }
    }

    /// Evaluate the exact predicate for the ordered pair `(a, b)`.
    pub(crate) fn eval(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<bool> {
        if a.0.is_empty() || b.0.is_empty() {
            return Ok(false);
        }
        Ok(match self {
            Predicate::Intersects => a.intersects(b),
            Predicate::DWithin(distance) => geometry::boundary_distance(a, b) <= *distance,
            Predicate::Overlaps => a.relate(b).matches(OVERLAPS)?,
            Predicate::Contains => a.relate(b).matches(CONTAINS)?,
            Predicate::Covers => {
                let im = a.relate(b);
                let mut covers = false;
                for pattern in COVERS {
                    if im.matches(pattern)? {
                        covers = true;
                        break;
                    }
                }
                covers
            }
        })
    }
}

#[derive(Debug, Clone)]
struct BoundingBox {
    idx: usize, // Index of corresponding MultiPolygon in geoms
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Bounding-box R-tree over a collection, answering predicate pair queries.
///
/// Built fresh per detector call: repairers mutate the collection after the
/// candidate pairs have been enumerated, so the index never observes stale
/// geometry. Empty members carry no bounding box and are skipped.
pub(crate) struct SpatialIndex<'a> {
    geoms: &'a [MultiPolygon<f64>],
    rtree: RTree<BoundingBox>,
}

impl<'a> SpatialIndex<'a> {
    /// Build an index over the collection's current geometries.
    pub(crate) fn build(collection: &'a PolygonCollection) -> Self {
        let geoms = collection.geoms();
        Self {
            rtree: RTree::bulk_load(
                geoms.iter().enumerate()
                    .filter_map(|(i, geom)| {
                        geom.bounding_rect().map(|bbox| BoundingBox { idx: i, bbox })
                    })
                    .collect(),
            ),
            geoms,
        }
    }

    /// Candidate member positions whose bounding box intersects `rect`
    /// expanded by `pad`, in ascending order.
    fn candidates(&self, rect: &Rect<f64>, pad: f64) -> Vec<usize> {
        let search = AABB::from_corners(
            [rect.min().x - pad, rect.min().y - pad],
            [rect.max().x + pad, rect.max().y + pad],
        );
        let mut found: Vec<usize> = self.rtree
            .locate_in_envelope_intersecting(&search)
            .map(|bb| bb.idx)
            .collect();
        found.sort_unstable();
        found
    }

    /// All ordered pairs `(i, j)`, `i != j`, satisfying the predicate, in
    /// ascending `(i, j)` order (the self-query form; symmetric predicates
    /// report both orientations).
    pub(crate) fn pairs(&self, predicate: Predicate) -> Result<Vec<(usize, usize)>> {
        let pad = predicate.padding();
        let mut out = Vec::new();
        for (i, geom) in self.geoms.iter().enumerate() {
            let Some(rect) = geom.bounding_rect() else { continue };
            for j in self.candidates(&rect, pad) {
                if j != i && predicate.eval(geom, &self.geoms[j])? {
                    out.push((i, j));
                }
            }
        }
        Ok(out)
    }

    /// Unordered pairs `(i, j)` with `i < j` satisfying the predicate for at
    /// least one orientation, deduplicated.
    pub(crate) fn unique_pairs(&self, predicate: Predicate) -> Result<Vec<(usize, usize)>> {
        let mut pairs: Vec<(usize, usize)> = self.pairs(predicate)?
            .into_iter()
            .map(|(i, j)| if i < j { (i, j) } else { (j, i) })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        Ok(pairs)
    }

    /// Member positions satisfying the predicate against an external
    /// geometry (query geometry first), in ascending order.
    pub(crate) fn neighbors_of(
        &self,
        geom: &MultiPolygon<f64>,
        predicate: Predicate,
    ) -> Result<Vec<usize>> {
        let Some(rect) = geom.bounding_rect() else { return Ok(Vec::new()) };
        let mut out = Vec::new();
        for j in self.candidates(&rect, predicate.padding()) {
            if predicate.eval(geom, &self.geoms[j])? {
                out.push(j);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, Polygon};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()
    }

    fn collection() -> PolygonCollection {
        PolygonCollection::from_polygons(vec![
            rect(0., 0., 10., 10.),  // 0: contains 2, overlaps 1
            rect(8., 4., 12., 6.),   // 1: overlaps 0, touches 3
            rect(2., 2., 4., 4.),    // 2: inside 0
            rect(10., 6., 20., 10.), // 3: touches 0 and 1 along boundary
            rect(30., 0., 31., 1.),  // 4: far away
        ])
    }

    #[test]
    fn intersects_pairs_are_symmetric_and_ordered() {
        let c = collection();
        let index = SpatialIndex::build(&c);
        let pairs = index.pairs(Predicate::Intersects).unwrap();
        assert!(pairs.contains(&(0, 1)) && pairs.contains(&(1, 0)));
        assert!(pairs.contains(&(0, 2)) && pairs.contains(&(0, 3)));
        assert!(!pairs.iter().any(|&(i, j)| i == j));
        assert!(!pairs.iter().any(|&(i, j)| i == 4 || j == 4));
        let mut sorted = pairs.clone();
        sorted.sort_unstable();
        assert_eq!(pairs, sorted);
    }

    #[test]
    fn overlaps_excludes_touching_and_containment() {
        let c = collection();
        let index = SpatialIndex::build(&c);
        let pairs = index.unique_pairs(Predicate::Overlaps).unwrap();
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn contains_is_directional() {
        let c = collection();
        let index = SpatialIndex::build(&c);
        let pairs = index.pairs(Predicate::Contains).unwrap();
        assert_eq!(pairs, vec![(0, 2)]);
    }

    #[test]
    fn covers_accepts_boundary_contact() {
        let outer = PolygonCollection::from_polygons(vec![rect(0., 0., 10., 10.)]);
        let index = SpatialIndex::build(&outer);
        // A face sharing part of the member's boundary is covered by it.
        let face = geo::MultiPolygon::new(vec![rect(0., 0., 10., 5.)]);
        assert_eq!(index.neighbors_of(&face, Predicate::Covers).unwrap(), Vec::<usize>::new());
        // Covers is evaluated query-first, so ask the other way around.
        let pairs = SpatialIndex::build(&PolygonCollection::from_polygons(vec![
            rect(0., 0., 10., 10.),
            rect(0., 0., 10., 5.),
        ]))
        .pairs(Predicate::Covers)
        .unwrap();
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn dwithin_pads_the_search() {
        let c = PolygonCollection::from_polygons(vec![
            rect(0., 0., 10., 10.),
            rect(10.05, 0., 20., 10.),
        ]);
        let index = SpatialIndex::build(&c);
        assert_eq!(index.unique_pairs(Predicate::DWithin(0.1)).unwrap(), vec![(0, 1)]);
        assert!(index.unique_pairs(Predicate::DWithin(0.01)).unwrap().is_empty());
    }

    #[test]
    fn empty_members_are_skipped() {
        let mut c = collection();
        c.set_geometry(1, geo::MultiPolygon::new(vec![]));
        let index = SpatialIndex::build(&c);
        let pairs = index.pairs(Predicate::Intersects).unwrap();
        assert!(!pairs.iter().any(|&(i, j)| i == 1 || j == 1));
    }
}
