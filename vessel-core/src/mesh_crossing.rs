//! Summary of how a segment crosses a closed surface.

use glam::DVec3;

use crate::segment::Segment;

/// A single segment/triangle hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit {
    /// Index of the triangle in its mesh.
    pub triangle: usize,
    pub normal: DVec3,
    /// Position of the hit along the segment, in `[0, 1]`.
    pub fraction: f64,
    /// The segment leaves the surface here.
    pub outwards: bool,
}

impl TriangleHit {
    /// Classifies a hit by comparing the segment direction with the face normal.
    pub fn new(segment: &Segment, triangle: usize, normal: DVec3, fraction: f64) -> Self {
        Self {
            triangle,
            normal,
            fraction,
            outwards: segment.direction().dot(normal) > 0.0,
        }
    }
}

/// Extremal hits of one segment against a mesh.
///
/// Only the last inward and the first outward hit are kept; together they
/// tell whether the segment finishes outside or only dips out and back in.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshCrossing {
    pub segment: Segment,
    pub last_in: Option<TriangleHit>,
    pub first_out: Option<TriangleHit>,
}

impl MeshCrossing {
    pub fn new(segment: Segment) -> Self {
        Self {
            segment,
            last_in: None,
            first_out: None,
        }
    }

    /// Fraction of the last inward hit, or 0 if there is none.
    pub fn in_fraction(&self) -> f64 {
        self.last_in.map_or(0.0, |h| h.fraction)
    }

    /// Fraction of the first outward hit, or 1 if there is none.
    pub fn out_fraction(&self) -> f64 {
        self.first_out.map_or(1.0, |h| h.fraction)
    }

    pub fn add(&mut self, hit: TriangleHit) {
        if hit.outwards {
            if hit.fraction <= self.out_fraction() {
                self.first_out = Some(hit);
            }
        } else if hit.fraction >= self.in_fraction() {
            self.last_in = Some(hit);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_in.is_none() && self.first_out.is_none()
    }

    pub fn crosses_out(&self) -> bool {
        self.first_out.is_some()
    }

    /// The segment leaves the surface and does not come back in.
    pub fn ends_outside(&self) -> bool {
        self.crosses_out() && self.out_fraction() >= self.in_fraction()
    }

    /// Distance of the segment end past the first outward face, measured
    /// along that face's normal. Zero when the segment never crosses out.
    pub fn depth(&self) -> f64 {
        match self.first_out {
            Some(hit) => ((1.0 - hit.fraction) * self.segment.direction().dot(hit.normal)).max(0.0),
            None => 0.0,
        }
    }
}
