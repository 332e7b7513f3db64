use anyhow::{Result, ensure};
use geo::{Area, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

/// An ordered collection of polygonal geometries with stable labels and an
/// optional CRS tag.
///
/// Geometries are stored canonically as `MultiPolygon<f64>`; single polygons
/// are wrapped on construction. Labels default to the dense range `0..n` but
/// may be any unique set of integers. Defect detectors and repairers report
/// pairs as *positions* (0-based order in the collection); merge operations
/// key their output rows by the representative member's *label*.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonCollection {
    geoms: Vec<MultiPolygon<f64>>,
    labels: Vec<usize>,
    crs: Option<String>,
}

impl PolygonCollection {
    /// Construct a collection from multi-polygons with dense `0..n` labels.
    pub fn new(geoms: Vec<MultiPolygon<f64>>) -> Self {
        Self { labels: (0..geoms.len()).collect(), geoms, crs: None }
    }

    /// Construct a collection from single polygons with dense `0..n` labels.
    pub fn from_polygons(polygons: Vec<Polygon<f64>>) -> Self {
        Self::new(polygons.into_iter().map(|p| MultiPolygon::new(vec![p])).collect())
    }

    /// Construct a collection with explicit labels. Labels must be unique and
    /// match the geometry count, but need not be contiguous or zero-based.
    pub fn with_labels(geoms: Vec<MultiPolygon<f64>>, labels: Vec<usize>) -> Result<Self> {
        ensure!(geoms.len() == labels.len(),
            "label count ({}) must equal geometry count ({})", labels.len(), geoms.len());
        let mut sorted = labels.clone();
        sorted.sort_unstable();
        sorted.dedup();
        ensure!(sorted.len() == labels.len(), "labels must be unique");
        Ok(Self { geoms, labels, crs: None })
    }

    /// Attach a CRS tag. Repair operations copy the tag verbatim; no
    /// coordinate transformation is ever performed.
    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    /// Get the CRS tag, if any.
    #[inline] pub fn crs(&self) -> Option<&str> { self.crs.as_deref() }

    /// Get the number of members.
    #[inline] pub fn len(&self) -> usize { self.geoms.len() }

    /// Check if there are no members.
    #[inline] pub fn is_empty(&self) -> bool { self.geoms.is_empty() }

    /// Get a reference to the list of geometries, in position order.
    #[inline] pub fn geoms(&self) -> &[MultiPolygon<f64>] { &self.geoms }

    /// Get the labels, in position order.
    #[inline] pub fn labels(&self) -> &[usize] { &self.labels }

    /// Get the geometry at a position.
    #[inline] pub fn geom(&self, pos: usize) -> &MultiPolygon<f64> { &self.geoms[pos] }

    /// Replace the geometry at a position.
    #[inline]
    pub fn set_geometry(&mut self, pos: usize, geom: MultiPolygon<f64>) {
        self.geoms[pos] = geom;
    }

    /// Iterate over `(label, geometry)` pairs in position order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &MultiPolygon<f64>)> {
        self.labels.iter().copied().zip(self.geoms.iter())
    }

    /// Get the unsigned area of every member, in position order.
    pub fn areas(&self) -> Vec<f64> {
        self.geoms.iter().map(|g| g.unsigned_area()).collect()
    }

    /// Get the summed unsigned area of all members.
    pub fn total_area(&self) -> f64 {
        self.geoms.iter().map(|g| g.unsigned_area()).sum()
    }

    /// Check if labels are the dense zero-based range `0..n`.
    pub fn has_dense_index(&self) -> bool {
        self.labels.iter().copied().eq(0..self.geoms.len())
    }

    /// Rebuild a collection around new rows, keeping the CRS tag.
    pub(crate) fn rebuild(&self, geoms: Vec<MultiPolygon<f64>>, labels: Vec<usize>) -> Self {
        Self { geoms, labels, crs: self.crs.clone() }
    }
}
