use anyhow::{Result, ensure};
use geo::{Area, BooleanOps};
use std::collections::BTreeSet;

use crate::collection::PolygonCollection;
use crate::geometry::{self, isoperimetric_quotient};
use crate::graph::NeighborGraph;
use crate::index::{Predicate, SpatialIndex};
use crate::strategy::Strategy;

impl PolygonCollection {
    /// Find all pairs of members whose interiors overlap without either
    /// containing the other, as deduplicated `(low, high)` position pairs.
    pub fn overlaps(&self) -> Result<Vec<(usize, usize)>> {
        SpatialIndex::build(self).unique_pairs(Predicate::Overlaps)
    }

    /// Check if any two members overlap.
    pub fn is_overlapping(&self) -> Result<bool> {
        Ok(!self.overlaps()?.is_empty())
    }

    /// Summed member area in excess of the dissolved area. Zero (up to
    /// floating-point noise) exactly when no two members overlap; usable as
    /// an index-free cross-check of [`Self::is_overlapping`].
    pub fn overlap_area_excess(&self) -> f64 {
        self.total_area() - geometry::union_all(self.geoms()).unsigned_area()
    }

    /// Remove all pairwise overlaps by differencing one member of each
    /// intersecting pair against the other, returning the trimmed copy.
    ///
    /// Pairs come from an `intersects` query (a superset of `overlaps`, so
    /// merely touching pairs pass through as no-op differences) and are
    /// processed sequentially in ascending position order. Later pairs
    /// observe the geometry left behind by earlier trims, so a member
    /// overlapped by several neighbors loses each contested region in turn.
    /// A trim may leave a member multi-part or empty; neither is an error.
    pub fn trim_overlaps(&self, strategy: Strategy) -> Result<PolygonCollection> {
        let mut trimmed = self.clone();
        trimmed.trim_overlaps_in_place(strategy)?;
        Ok(trimmed)
    }

    /// In-place form of [`Self::trim_overlaps`].
    pub fn trim_overlaps_in_place(&mut self, strategy: Strategy) -> Result<()> {
        let pairs = SpatialIndex::build(self).pairs(Predicate::Intersects)?;
        for (i, j) in pairs {
            if self.geom(i).0.is_empty() || self.geom(j).0.is_empty() {
                continue;
            }
            let area_i = self.geom(i).unsigned_area();
            let area_j = self.geom(j).unsigned_area();
            match strategy {
                Strategy::Largest | Strategy::Smallest => {
                    let larger_first = area_i >= area_j;
                    let trim_larger = strategy == Strategy::Largest;
                    let loser = if larger_first == trim_larger { i } else { j };
                    let keeper = if loser == i { j } else { i };
                    let trimmed = self.geom(loser).difference(self.geom(keeper));
                    self.set_geometry(loser, trimmed);
                }
                Strategy::Compact => {
                    let trim_i = self.geom(i).difference(self.geom(j));
                    let trim_j = self.geom(j).difference(self.geom(i));
                    if isoperimetric_quotient(&trim_i) > isoperimetric_quotient(&trim_j) {
                        self.set_geometry(i, trim_i);
                    } else {
                        self.set_geometry(j, trim_j);
                    }
                }
                Strategy::Arbitrary => {
                    let trimmed = self.geom(j).difference(self.geom(i));
                    self.set_geometry(j, trimmed);
                }
            }
        }
        Ok(())
    }

    /// Dissolve overlapping members into single rows.
    ///
    /// Members related by `overlaps` or containment form the candidate
    /// neighbor set. A member smaller than `merge_limit` merges with every
    /// neighbor unconditionally; a larger member merges only with neighbors
    /// whose shared area exceeds `overlap_limit` times the neighbor's area.
    /// Each connected component of the resulting graph becomes one output
    /// row keyed by the label of its lowest-position member.
    pub fn merge_overlaps(&self, merge_limit: f64, overlap_limit: f64) -> Result<PolygonCollection> {
        let index = SpatialIndex::build(self);
        let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.len()];
        let candidates = index.unique_pairs(Predicate::Overlaps)?
            .into_iter()
            .chain(index.pairs(Predicate::Contains)?);
        for (i, j) in candidates {
            adjacency[i].insert(j);
            adjacency[j].insert(i);
        }

        let areas = self.areas();
        let mut graph = NeighborGraph::with_nodes(self.len());
        for (i, neighbors) in adjacency.iter().enumerate() {
            for &j in neighbors {
                if areas[i] < merge_limit {
                    graph.add_edge(i, j);
                } else {
                    let shared = self.geom(i).intersection(self.geom(j)).unsigned_area();
                    if shared > overlap_limit * areas[j] {
                        graph.add_edge(i, j);
                    }
                }
            }
        }
        Ok(self.dissolve_components(&graph, &BTreeSet::new()))
    }

    /// Attach each target member to one boundary-sharing neighbor and
    /// dissolve, deleting targets that touch nothing.
    ///
    /// The neighbor is chosen by `policy`: longest shared boundary for
    /// [`Strategy::Largest`], shortest for [`Strategy::Smallest`], most
    /// compact merged result for [`Strategy::Compact`], and the first
    /// candidate in position order for [`Strategy::Arbitrary`]. Ties keep
    /// the earliest candidate. Other targets never count as neighbors, so
    /// adjacent slivers each find a real member to join.
    pub fn merge_touching(&self, targets: &[usize], policy: Strategy) -> Result<PolygonCollection> {
        let target_set: BTreeSet<usize> = targets.iter().copied().collect();
        for &target in targets {
            ensure!(target < self.len(),
                "merge target position {} out of bounds for collection of {}", target, self.len());
        }

        let index = SpatialIndex::build(self);
        let mut graph = NeighborGraph::with_nodes(self.len());
        let mut deleted = BTreeSet::new();
        for &target in &target_set {
            let mut candidates = Vec::new();
            for j in index.neighbors_of(self.geom(target), Predicate::Intersects)? {
                if j == target || target_set.contains(&j) {
                    continue;
                }
                let shared = geometry::shared_boundary_length(self.geom(target), self.geom(j));
                if shared > 0.0 {
                    candidates.push((j, shared));
                }
            }
            let chosen = match policy {
                Strategy::Largest => candidates.iter()
                    .fold(None::<(usize, f64)>, |best, &(j, shared)| {
                        match best {
                            Some((_, top)) if top >= shared => best,
                            _ => Some((j, shared)),
                        }
                    })
                    .map(|(j, _)| j),
                Strategy::Smallest => candidates.iter()
                    .fold(None::<(usize, f64)>, |best, &(j, shared)| {
                        match best {
                            Some((_, low)) if low <= shared => best,
                            _ => Some((j, shared)),
                        }
                    })
                    .map(|(j, _)| j),
                Strategy::Compact => candidates.iter()
                    .fold(None::<(usize, f64)>, |best, &(j, _)| {
                        let merged = self.geom(target).union(self.geom(j));
                        let quotient = isoperimetric_quotient(&merged);
                        match best {
                            Some((_, top)) if top >= quotient => best,
                            _ => Some((j, quotient)),
                        }
                    })
                    .map(|(j, _)| j),
                Strategy::Arbitrary => candidates.first().map(|&(j, _)| j),
            };
            match chosen {
                Some(neighbor) => graph.add_edge(target, neighbor),
                None => {
                    deleted.insert(target);
                }
            }
        }
        Ok(self.dissolve_components(&graph, &deleted))
    }

    /// Union each connected component into one row labelled by its
    /// lowest-position member, skipping deleted positions.
    fn dissolve_components(&self, graph: &NeighborGraph, deleted: &BTreeSet<usize>) -> PolygonCollection {
        let mut geoms = Vec::new();
        let mut labels = Vec::new();
        for component in graph.components() {
            let members: Vec<_> = component.iter()
                .filter(|pos| !deleted.contains(pos))
                .map(|&pos| self.geom(pos).clone())
                .collect();
            if members.is_empty() {
                continue;
            }
            geoms.push(geometry::union_all(&members));
            labels.push(self.labels()[component[0]]);
        }
        self.rebuild(geoms, labels)
    }
}
