use anyhow::{Result, anyhow, ensure};
use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon, Simplify};
use std::collections::BTreeMap;

use crate::collection::PolygonCollection;
use crate::faces;
use crate::geometry::{self, isoperimetric_quotient};
use crate::index::{Predicate, SpatialIndex};
use crate::strategy::Strategy;

/// Snap one member onto a fixed reference, part by part. Parts farther than
/// `threshold` from the reference pass through untouched.
fn snap_member(
    source: &MultiPolygon<f64>,
    reference: &MultiPolygon<f64>,
    threshold: f64,
) -> Result<MultiPolygon<f64>> {
    let mut parts = Vec::with_capacity(source.0.len());
    for part in &source.0 {
        let wrapped = MultiPolygon::new(vec![part.clone()]);
        if geometry::boundary_distance(&wrapped, reference) > threshold {
            parts.push(part.clone());
        } else {
            parts.extend(snap_part(part, reference, threshold)?);
        }
    }
    Ok(MultiPolygon::new(parts))
}

/// Pull every exterior vertex within `threshold` of the reference boundary
/// onto its closest boundary point, then clean up the result.
fn snap_part(
    part: &Polygon<f64>,
    reference: &MultiPolygon<f64>,
    threshold: f64,
) -> Result<MultiPolygon<f64>> {
    // Densifying first guarantees a vertex lands near every stretch of the
    // reference boundary that runs alongside this part.
    let dense = geometry::densify_ring(part.exterior(), threshold);
    let snapped: Vec<Coord<f64>> = dense.0.iter()
        .map(|&vertex| match geometry::closest_boundary_point(reference, vertex) {
            Some((dist, point)) if dist < threshold => point,
            _ => vertex,
        })
        .collect();
    let rebuilt = Polygon::new(LineString::new(snapped), part.interiors().to_vec());
    let cleaned = rebuilt.simplify(&(threshold / 100.0));
    if geometry::is_valid_polygon(&cleaned) {
        return Ok(MultiPolygon::new(vec![cleaned]));
    }
    // Snapping can fold the ring over itself. Repair, then keep the largest
    // piece only; secondary slivers are dropped.
    let repaired = geometry::even_odd_repair(&cleaned);
    let largest = geometry::largest_part(repaired)
        .ok_or_else(|| anyhow!("snapping collapsed a member to an empty geometry"))?;
    Ok(MultiPolygon::new(vec![largest]))
}

impl PolygonCollection {
    /// Find enclosed regions covered by no member.
    ///
    /// The member boundaries are noded and polygonized into the faces of
    /// their arrangement; faces no single member covers are the gaps. This
    /// catches regions bounded by members that touch only at isolated
    /// vertices, which never show up as holes of the dissolved collection.
    /// Each gap becomes one row with dense labels and the source CRS tag.
    pub fn gaps(&self) -> Result<PolygonCollection> {
        let faces = faces::arrangement_faces(self.geoms())?;
        let index = SpatialIndex::build(self);
        let mut pieces = Vec::new();
        for face in faces {
            let candidate = MultiPolygon::new(vec![face]);
            let mut covered = false;
            for pos in index.neighbors_of(&candidate, Predicate::Intersects)? {
                if Predicate::Covers.eval(self.geom(pos), &candidate)? {
                    covered = true;
                    break;
                }
            }
            if !covered {
                pieces.push(candidate);
            }
        }
        let labels = (0..pieces.len()).collect();
        Ok(self.rebuild(pieces, labels))
    }

    /// Union every gap into one of its neighboring members, returning the
    /// filled copy. Gaps are computed fresh when `gaps` is `None`.
    pub fn fill_gaps(
        &self,
        gaps: Option<&PolygonCollection>,
        strategy: Strategy,
    ) -> Result<PolygonCollection> {
        let mut filled = self.clone();
        filled.fill_gaps_in_place(gaps, strategy)?;
        Ok(filled)
    }

    /// In-place form of [`Self::fill_gaps`].
    ///
    /// Every gap is assigned to one neighbor chosen by `strategy` (largest
    /// or smallest neighbor area, most compact merged result, or the first
    /// neighbor found), then each receiving member absorbs all its assigned
    /// gaps in a single union. A gap that intersects no member is an error.
    pub fn fill_gaps_in_place(
        &mut self,
        gaps: Option<&PolygonCollection>,
        strategy: Strategy,
    ) -> Result<()> {
        let computed;
        let gap_rows = match gaps {
            Some(rows) => rows,
            None => {
                computed = self.gaps()?;
                &computed
            }
        };

        let areas = self.areas();
        let mut assigned: BTreeMap<usize, Vec<MultiPolygon<f64>>> = BTreeMap::new();
        {
            let index = SpatialIndex::build(self);
            for (pos, gap) in gap_rows.geoms().iter().enumerate() {
                let neighbors = index.neighbors_of(gap, Predicate::Intersects)?;
                ensure!(!neighbors.is_empty(), "gap {} touches no member of the collection", pos);
                let target = match strategy {
                    Strategy::Largest => neighbors.iter()
                        .fold(None::<(usize, f64)>, |best, &n| match best {
                            Some((_, top)) if top >= areas[n] => best,
                            _ => Some((n, areas[n])),
                        })
                        .map(|(n, _)| n),
                    Strategy::Smallest => neighbors.iter()
                        .fold(None::<(usize, f64)>, |best, &n| match best {
                            Some((_, low)) if low <= areas[n] => best,
                            _ => Some((n, areas[n])),
                        })
                        .map(|(n, _)| n),
                    Strategy::Compact => neighbors.iter()
                        .fold(None::<(usize, f64)>, |best, &n| {
                            let quotient = isoperimetric_quotient(&self.geom(n).union(gap));
                            match best {
                                Some((_, top)) if top >= quotient => best,
                                _ => Some((n, quotient)),
                            }
                        })
                        .map(|(n, _)| n),
                    Strategy::Arbitrary => neighbors.first().copied(),
                };
                // The neighbor list is non-empty, so a target always exists.
                if let Some(target) = target {
                    assigned.entry(target).or_default().push(gap.clone());
                }
            }
        }

        for (target, mut batch) in assigned {
            batch.push(self.geom(target).clone());
            self.set_geometry(target, geometry::union_all(&batch));
        }
        Ok(())
    }

    /// Close near-miss joints between members lying within `threshold` of
    /// each other without touching, returning the snapped copy.
    pub fn snap(&self, threshold: f64) -> Result<PolygonCollection> {
        let mut snapped = self.clone();
        snapped.snap_in_place(threshold)?;
        Ok(snapped)
    }

    /// In-place form of [`Self::snap`].
    ///
    /// For each candidate pair the lower-position member moves and the
    /// higher-position member stays fixed. Pairs already sharing boundary
    /// are skipped, including pairs joined by an earlier snap in the same
    /// call; each snap reads the geometry left by the previous one, so
    /// chained corrections accumulate rather than overwrite.
    pub fn snap_in_place(&mut self, threshold: f64) -> Result<()> {
        // Densification segment length is the threshold itself, so a
        // non-positive value would never terminate.
        ensure!(threshold > 0.0 && threshold.is_finite(),
            "snap threshold must be a positive finite distance, got {}", threshold);
        let candidates = SpatialIndex::build(self).unique_pairs(Predicate::DWithin(threshold))?;
        for (source, reference) in candidates {
            if geometry::shared_boundary_length(self.geom(source), self.geom(reference)) > 0.0 {
                continue;
            }
            let moved = snap_member(self.geom(source), self.geom(reference), threshold)?;
            self.set_geometry(source, moved);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Coord, Rect};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()
    }

    fn square_and_jagged() -> PolygonCollection {
        let jagged = Polygon::new(
            LineString::from(vec![
                (10., 10.), (12., 8.), (10., 6.), (12., 4.), (10., 2.), (20., 5.), (10., 10.),
            ]),
            vec![],
        );
        PolygonCollection::from_polygons(vec![rect(0., 0., 10., 10.), jagged])
    }

    fn assert_areas(collection: &PolygonCollection, expected: &[f64], tol: f64) {
        let areas = collection.areas();
        assert_eq!(areas.len(), expected.len());
        for (got, want) in areas.iter().zip(expected) {
            assert!((got - want).abs() < tol, "areas {:?} != {:?}", areas, expected);
        }
    }

    #[test]
    fn gaps_between_square_and_jagged_edge() {
        let found = square_and_jagged().gaps().unwrap();
        assert_eq!(found.len(), 2);
        for area in found.areas() {
            assert!((area - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn gaps_empty_for_clean_coverage() {
        let c = PolygonCollection::from_polygons(vec![
            rect(0., 0., 10., 10.),
            rect(10., 0., 20., 10.),
        ]);
        assert!(c.gaps().unwrap().is_empty());
    }

    #[test]
    fn gaps_carve_out_nested_members() {
        // A frame with a floating box inside its opening: the gap is the
        // opening minus the box, one piece with an interior ring.
        let frame = Polygon::new(
            rect(0., 0., 12., 12.).exterior().clone(),
            vec![rect(2., 2., 10., 10.).exterior().clone()],
        );
        let c = PolygonCollection::new(vec![
            MultiPolygon::new(vec![frame]),
            MultiPolygon::new(vec![rect(4., 4., 8., 8.)]),
        ]);
        let found = c.gaps().unwrap();
        assert_eq!(found.len(), 1);
        assert!((found.areas()[0] - 48.0).abs() < 1e-9);
        assert_eq!(found.geom(0).0[0].interiors().len(), 1);
    }

    #[test]
    fn fill_gaps_largest_feeds_the_big_neighbor() {
        let filled = square_and_jagged().fill_gaps(None, Strategy::Largest).unwrap();
        assert_areas(&filled, &[108.0, 32.0], 1e-9);
        assert!(filled.gaps().unwrap().is_empty());
    }

    #[test]
    fn fill_gaps_smallest_feeds_the_small_neighbor() {
        let filled = square_and_jagged().fill_gaps(None, Strategy::Smallest).unwrap();
        assert_areas(&filled, &[100.0, 40.0], 1e-9);
        assert!(filled.gaps().unwrap().is_empty());
    }

    #[test]
    fn fill_gaps_conserves_total_area() {
        let c = square_and_jagged();
        let gap_area = c.gaps().unwrap().total_area();
        for strategy in [Strategy::Largest, Strategy::Smallest, Strategy::Compact, Strategy::Arbitrary] {
            let filled = c.fill_gaps(None, strategy).unwrap();
            assert!((filled.total_area() - (c.total_area() + gap_area)).abs() < 1e-9);
        }
    }

    #[test]
    fn fill_gaps_accepts_a_subset_of_gaps() {
        let c = square_and_jagged();
        let all = c.gaps().unwrap();
        let first_only = PolygonCollection::new(vec![all.geom(0).clone()]);
        let filled = c.fill_gaps(Some(&first_only), Strategy::Largest).unwrap();
        assert_areas(&filled, &[104.0, 32.0], 1e-9);
        assert_eq!(filled.gaps().unwrap().len(), 1);
    }

    #[test]
    fn fill_gaps_rejects_detached_gaps() {
        let c = square_and_jagged();
        let detached = PolygonCollection::from_polygons(vec![rect(50., 50., 51., 51.)]);
        assert!(c.fill_gaps(Some(&detached), Strategy::Largest).is_err());
    }

    #[test]
    fn fill_gaps_preserves_crs() {
        let c = square_and_jagged().with_crs("EPSG:3035");
        let filled = c.fill_gaps(None, Strategy::Largest).unwrap();
        assert_eq!(filled.crs(), Some("EPSG:3035"));
        assert_eq!(c.gaps().unwrap().crs(), Some("EPSG:3035"));
    }

    #[test]
    fn snap_closes_a_narrow_sliver() {
        let c = PolygonCollection::from_polygons(vec![
            rect(0., 0., 10., 10.),
            rect(10.05, 0., 20., 10.),
        ]);
        let snapped = c.snap(0.1).unwrap();
        // The lower-position member stretches to the fixed reference.
        assert_areas(&snapped, &[100.5, 99.5], 1e-6);
        assert!(snapped.gaps().unwrap().is_empty());
        let union = geometry::union_all(snapped.geoms());
        assert!((union.unsigned_area() - 200.0).abs() < 1e-6);
    }

    #[test]
    fn snap_leaves_touching_members_alone() {
        let c = PolygonCollection::from_polygons(vec![
            rect(0., 0., 10., 10.),
            rect(10., 0., 20., 10.),
        ]);
        let snapped = c.snap(0.1).unwrap();
        assert_areas(&snapped, &[100.0, 100.0], 1e-12);
    }

    #[test]
    fn snap_rejects_non_positive_threshold() {
        // Corner-touching squares survive the shared-boundary filter, so a
        // zero threshold must fail up front instead of densifying forever.
        let c = PolygonCollection::from_polygons(vec![
            rect(0., 0., 1., 1.),
            rect(1., 1., 2., 2.),
        ]);
        assert!(c.snap(0.0).is_err());
        assert!(c.snap(-0.5).is_err());
        assert!(c.snap(f64::INFINITY).is_err());
    }

    #[test]
    fn snap_ignores_members_beyond_threshold() {
        let c = PolygonCollection::from_polygons(vec![
            rect(0., 0., 10., 10.),
            rect(11., 0., 20., 10.),
        ]);
        let snapped = c.snap(0.1).unwrap();
        assert_areas(&snapped, &[100.0, 90.0], 1e-12);
    }
}
