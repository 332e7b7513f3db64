use anyhow::Result;
use geo::{BooleanOps, BoundingRect, ConvexHull, MultiPolygon, Polygon, Rect};

use crate::collection::PolygonCollection;
use crate::geometry::{self, ON_BOUNDARY_EPS};
use crate::index::{Predicate, SpatialIndex};

/// Count exterior-ring segments of `piece` lying flat on a side of `frame`.
///
/// The unbounded face of a bounding-box difference hugs the frame along at
/// least two sides; a genuine enclosed hole touches it along at most one.
fn segments_on_frame(piece: &Polygon<f64>, frame: &Rect<f64>) -> usize {
    let (min, max) = (frame.min(), frame.max());
    piece.exterior()
        .lines()
        .filter(|line| {
            let on_side = |v: f64| {
                (line.start.x - v).abs() <= ON_BOUNDARY_EPS
                    && (line.end.x - v).abs() <= ON_BOUNDARY_EPS
            };
            let on_level = |v: f64| {
                (line.start.y - v).abs() <= ON_BOUNDARY_EPS
                    && (line.end.y - v).abs() <= ON_BOUNDARY_EPS
            };
            on_side(min.x) || on_side(max.x) || on_level(min.y) || on_level(max.y)
        })
        .count()
}

impl PolygonCollection {
    /// Find all `(container, contained)` position pairs where one member
    /// wholly contains another, in ascending order.
    pub fn missing_interiors(&self) -> Result<Vec<(usize, usize)>> {
        SpatialIndex::build(self).pairs(Predicate::Contains)
    }

    /// Punch every contained member out of its container as a hole,
    /// returning the corrected copy.
    pub fn add_interiors(&self) -> Result<PolygonCollection> {
        let mut corrected = self.clone();
        corrected.add_interiors_in_place()?;
        Ok(corrected)
    }

    /// In-place form of [`Self::add_interiors`].
    ///
    /// Violations are applied sequentially in ascending pair order, each
    /// difference against the container geometry left by earlier pairs, so
    /// a container holding several members accumulates one hole per member.
    pub fn add_interiors_in_place(&mut self) -> Result<()> {
        let pairs = SpatialIndex::build(self).pairs(Predicate::Contains)?;
        for (container, contained) in pairs {
            let punched = self.geom(container).difference(self.geom(contained));
            self.set_geometry(container, punched);
        }
        Ok(())
    }

    /// Find uncovered enclosed regions by differencing the dissolved
    /// collection from its bounding box.
    ///
    /// Pieces of that difference are kept only when the collection's convex
    /// hull covers them and they touch the bounding box along fewer than two
    /// segments, which discards the unbounded outer face. Superseded by the
    /// boundary-arrangement detector in [`Self::gaps`]; retained because the
    /// two disagree on regions touching the bounding box itself.
    pub fn holes(&self) -> Result<PolygonCollection> {
        let dissolved = geometry::union_all(self.geoms());
        let Some(frame) = dissolved.bounding_rect() else {
            return Ok(self.rebuild(Vec::new(), Vec::new()));
        };
        let hull = MultiPolygon::new(vec![dissolved.convex_hull()]);

        let mut pieces = Vec::new();
        for piece in frame.to_polygon().difference(&dissolved) {
            let candidate = MultiPolygon::new(vec![piece.clone()]);
            if Predicate::Covers.eval(&hull, &candidate)? && segments_on_frame(&piece, &frame) < 2 {
                pieces.push(candidate);
            }
        }
        let labels = (0..pieces.len()).collect();
        Ok(self.rebuild(pieces, labels))
    }
}
