use ahash::AHashMap;
use anyhow::{Result, ensure};
use geo::{BooleanOps, Coord, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::collection::PolygonCollection;
use crate::geometry;
use crate::graph::NeighborGraph;
use crate::index::{Predicate, SpatialIndex};

/// Aggregate defect report for one collection, produced by
/// [`PolygonCollection::check_validity`].
///
/// All pair lists refer to member positions. The gap rows are a full
/// collection of their own so callers can feed them straight back into
/// [`PolygonCollection::fill_gaps`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidityReport {
    pub self_intersecting_rings: Vec<usize>,
    pub gaps: PolygonCollection,
    pub overlaps: Vec<(usize, usize)>,
    pub non_planar_edges: Vec<(usize, usize)>,
    pub missing_interiors: Vec<(usize, usize)>,
}

impl ValidityReport {
    /// Check if no defect of any class was found.
    pub fn is_clean(&self) -> bool {
        self.self_intersecting_rings.is_empty()
            && self.gaps.is_empty()
            && self.overlaps.is_empty()
            && self.non_planar_edges.is_empty()
            && self.missing_interiors.is_empty()
    }
}

/// Insert each polygon's boundary vertices into the other's exterior rings
/// wherever they fall on a segment, returning both updated geometries.
///
/// Shared edges whose endpoints differ between the two inputs end up
/// carrying the union of both vertex sets, which is what planar topology
/// requires. Parts not touching the other polygon pass through unchanged,
/// as do interior rings.
pub fn insert_intersections(
    a: &MultiPolygon<f64>,
    b: &MultiPolygon<f64>,
) -> (MultiPolygon<f64>, MultiPolygon<f64>) {
    let coords_a = ring_coords(a);
    let coords_b = ring_coords(b);
    (insert_coords(a, &coords_b), insert_coords(b, &coords_a))
}

/// Rebuild a polygon whose exterior ring crosses itself as the union of the
/// faces the crossing produces (the bowtie repair). Interior rings of the
/// input are discarded.
pub fn fix_self_intersecting_ring(poly: &Polygon<f64>) -> MultiPolygon<f64> {
    geometry::even_odd_repair(&Polygon::new(poly.exterior().clone(), vec![]))
}

fn ring_coords(geom: &MultiPolygon<f64>) -> Vec<Coord<f64>> {
    geometry::rings(geom).flat_map(|ring| ring.0.iter().copied()).collect()
}

fn insert_coords(geom: &MultiPolygon<f64>, points: &[Coord<f64>]) -> MultiPolygon<f64> {
    MultiPolygon::new(
        geom.0.iter()
            .map(|part| {
                Polygon::new(
                    geometry::insert_ring_vertices(part.exterior(), points),
                    part.interiors().to_vec(),
                )
            })
            .collect(),
    )
}

impl PolygonCollection {
    /// Contiguity under exact shared vertices: an edge links two members
    /// with at least one identical boundary coordinate.
    fn vertex_contiguity(&self) -> NeighborGraph {
        let mut buckets: AHashMap<(u64, u64), SmallVec<[usize; 4]>> = AHashMap::new();
        for (pos, geom) in self.geoms().iter().enumerate() {
            for ring in geometry::rings(geom) {
                for coord in &ring.0 {
                    let bucket = buckets.entry((coord.x.to_bits(), coord.y.to_bits())).or_default();
                    // Members are visited in order, so a repeat is always last.
                    if bucket.last() != Some(&pos) {
                        bucket.push(pos);
                    }
                }
            }
        }
        let mut graph = NeighborGraph::with_nodes(self.len());
        for bucket in buckets.values() {
            for (k, &i) in bucket.iter().enumerate() {
                for &j in &bucket[k + 1..] {
                    graph.add_edge(i, j);
                }
            }
        }
        graph
    }

    /// Find member pairs that touch geometrically without sharing a single
    /// boundary vertex, as a graph over all positions.
    ///
    /// Computed as the difference of two contiguity graphs: one fuzzy
    /// (any geometric intersection) minus one strict (exact shared vertex).
    pub fn non_planar_edges(&self) -> Result<NeighborGraph> {
        let mut fuzzy = NeighborGraph::with_nodes(self.len());
        for (i, j) in SpatialIndex::build(self).unique_pairs(Predicate::Intersects)? {
            fuzzy.add_edge(i, j);
        }
        Ok(fuzzy.difference(&self.vertex_contiguity()))
    }

    /// Resolve every non-planar edge by mutual vertex insertion, returning
    /// the corrected copy. Requires dense zero-based labels.
    pub fn fix_npe_edges(&self) -> Result<PolygonCollection> {
        let mut fixed = self.clone();
        fixed.fix_npe_edges_in_place()?;
        Ok(fixed)
    }

    /// In-place form of [`Self::fix_npe_edges`].
    pub fn fix_npe_edges_in_place(&mut self) -> Result<()> {
        ensure!(self.has_dense_index(),
            "fixing non-planar edges requires dense zero-based labels");
        let edges = self.non_planar_edges()?.edges();
        for (i, j) in edges {
            let (new_i, new_j) = insert_intersections(self.geom(i), self.geom(j));
            self.set_geometry(i, new_i);
            self.set_geometry(j, new_j);
        }
        Ok(())
    }

    /// Find members whose rings fail validity (self-intersection, holes
    /// outside the shell), by position.
    pub fn self_intersecting_rings(&self) -> Vec<usize> {
        self.geoms().iter().enumerate()
            .filter(|(_, geom)| geom.0.iter().any(|part| !geometry::is_valid_polygon(part)))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Check if the collection forms a planar partition: no overlaps, no
    /// non-planar edges, and (unless `allow_gaps`) no gaps. Checked in that
    /// order, cheapest first, short-circuiting on the first failure.
    pub fn is_planar_enforced(&self, allow_gaps: bool) -> Result<bool> {
        if self.is_overlapping()? {
            return Ok(false);
        }
        if !self.non_planar_edges()?.is_edgeless() {
            return Ok(false);
        }
        if !allow_gaps && !self.gaps()?.is_empty() {
            return Ok(false);
        }
        Ok(true)
    }

    /// Report every defect class at once.
    ///
    /// Invalid rings are repaired on a working copy first, so the remaining
    /// detectors run on geometry they can reason about. The caller's
    /// collection is never modified; this is a diagnosis, not a repair.
    pub fn check_validity(&self) -> Result<ValidityReport> {
        let flagged = self.self_intersecting_rings();
        let mut repaired = self.clone();
        for &pos in &flagged {
            let mut parts = Vec::new();
            for part in &repaired.geom(pos).0 {
                if geometry::is_valid_polygon(part) {
                    parts.push(part.clone());
                } else {
                    parts.extend(fix_self_intersecting_ring(part));
                }
            }
            repaired.set_geometry(pos, MultiPolygon::new(parts));
        }
        Ok(ValidityReport {
            self_intersecting_rings: flagged,
            gaps: repaired.gaps()?,
            overlaps: repaired.overlaps()?,
            non_planar_edges: repaired.non_planar_edges()?.edges(),
            missing_interiors: repaired.missing_interiors()?,
        })
    }

    /// Intersect every member against the dissolved collection.
    ///
    /// A global pass that normalizes each member against the whole; it does
    /// not fill gaps or insert vertices, and members already inside the
    /// dissolved outline come back with their area intact.
    pub fn planar_enforce(&self) -> Result<PolygonCollection> {
        let dissolved = geometry::union_all(self.geoms());
        let geoms = self.geoms().iter()
            .map(|geom| dissolved.intersection(geom))
            .collect();
        Ok(self.rebuild(geoms, self.labels().to_vec()))
    }
}
