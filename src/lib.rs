#![doc = "Planar-topology enforcement for polygon coverages: detect and repair \
overlaps, gaps, contained polygons, self-intersecting rings, and non-planar \
shared edges on an in-memory collection of polygons."]
mod collection;
mod faces;
mod gap;
mod geometry;
mod graph;
mod hole;
mod index;
mod overlap;
mod planar;
mod strategy;

#[doc(inline)]
pub use collection::PolygonCollection;

#[doc(inline)]
pub use graph::NeighborGraph;

#[doc(inline)]
pub use planar::{ValidityReport, fix_self_intersecting_ring, insert_intersections};

#[doc(inline)]
pub use strategy::Strategy;

#[doc(inline)]
pub use geometry::isoperimetric_quotient;
