use glam::DVec3;

use crate::types::{NetworkId, NodeRef};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing both points.
    pub fn from_points(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Grows the box by `pad` on every side.
    pub fn padded(&self, pad: f64) -> Self {
        let pad = DVec3::splat(pad);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Closed-interval overlap test on all three axes.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn extent(&self) -> DVec3 {
        self.max - self.min
    }
}

/// A capsule: the segment from a parent node to its child, swept by the
/// child's radius.
///
/// Segments are snapshots taken at the start of a pass; they never observe
/// later moves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: NodeRef,
    pub end: NodeRef,
    pub radius: f64,
}

impl Segment {
    pub fn new(start: NodeRef, end: NodeRef, radius: f64) -> Self {
        Self { start, end, radius }
    }

    pub fn network(&self) -> NetworkId {
        self.end.key.network
    }

    pub fn direction(&self) -> DVec3 {
        self.end.position - self.start.position
    }

    pub fn length(&self) -> f64 {
        self.direction().length()
    }

    /// Point at fraction `f` along the segment, `f = 0` being the start.
    pub fn at_fraction(&self, f: f64) -> DVec3 {
        self.start.position + f * self.direction()
    }

    /// Bounds of the swept capsule.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.start.position, self.end.position).padded(self.radius)
    }

    /// Bounds of the centre line only.
    pub fn line_bounds(&self) -> Aabb {
        Aabb::from_points(self.start.position, self.end.position)
    }
}
