//! Capsule/capsule intersection.
//!
//! Two cases are distinguished by the angle between the segments:
//!
//! - **Definite**: the segments are not parallel, so the closest points of
//!   their infinite lines are unique. These are clamped to the finite
//!   segments using the usual clamp-and-reproject scheme.
//! - **Indeterminate**: the segments are (nearly) parallel, so there is a
//!   whole range of closest points. The separation of the two lines is
//!   measured directly and each segment's window of possible contact is
//!   computed instead.

use glam::DVec3;

use crate::{
    config::ToleranceConfig,
    direction_cycle::DirectionCycle,
    error::{EnforceError, EnforceResult},
    linalg::{line_factor, line_factors, solve_3x3},
    relationship::BranchRelationship,
    segment::Segment,
};

/// Result of testing two capsules against each other.
///
/// All fields are populated whether or not the capsules intersect, with the
/// exception of `overlap` which stays zero for disjoint capsules. `normal`
/// always points from `a` towards `b`.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentIntersection {
    pub a: Segment,
    pub b: Segment,
    pub relationship: BranchRelationship,
    /// Parallel case: fractions describe windows, not unique points.
    pub indeterminate: bool,
    pub intersecting: bool,
    pub normal: DVec3,
    pub distance2: f64,
    /// `ra + rb - distance` when intersecting.
    pub overlap: f64,
    pub closest_a: DVec3,
    pub closest_b: DVec3,
    pub fraction_a: f64,
    pub fraction_b: f64,
    pub start_a: f64,
    pub end_a: f64,
    pub start_b: f64,
    pub end_b: f64,
}

impl SegmentIntersection {
    /// Tests capsule `a` against capsule `b`.
    ///
    /// `cycle` supplies the pushing direction when the capsules are coaxial.
    /// Fails with [`EnforceError::DegenerateGeometry`] if either segment has
    /// zero length.
    pub fn test(
        a: &Segment,
        b: &Segment,
        relationship: BranchRelationship,
        tol: &ToleranceConfig,
        cycle: &mut DirectionCycle,
    ) -> EnforceResult<Self> {
        let dir_a = a.direction();
        let dir_b = b.direction();
        let len_a2 = dir_a.length_squared();
        let len_b2 = dir_b.length_squared();
        if len_a2 == 0.0 || len_b2 == 0.0 {
            return Err(EnforceError::DegenerateGeometry {
                reason: "zero-length segment",
            });
        }

        let mut out = Self {
            a: *a,
            b: *b,
            relationship,
            indeterminate: false,
            intersecting: false,
            normal: DVec3::ZERO,
            distance2: 0.0,
            overlap: 0.0,
            closest_a: a.start.position,
            closest_b: b.start.position,
            fraction_a: 0.0,
            fraction_b: 0.0,
            start_a: 0.0,
            end_a: 1.0,
            start_b: 0.0,
            end_b: 1.0,
        };

        // |n|² = |a|²|b|² sin²θ, so this is a test of angle independent of length.
        let nor = dir_a.cross(dir_b);
        let nor2 = nor.length_squared();
        let sin2 = nor2 / (len_a2 * len_b2);
        if sin2 < tol.parallel_sin2 {
            out.indefinite(dir_a, dir_b, tol, cycle)?;
        } else {
            out.definite(dir_a, dir_b, nor / nor2.sqrt(), tol);
        }

        if out.intersecting {
            out.overlap = a.radius + b.radius - out.distance2.sqrt();
        }
        Ok(out)
    }

    /// Refines a generic relation using shared nodes.
    ///
    /// Upstream becomes Parent when `a` ends where `b` starts, Downstream
    /// becomes Child when `a` starts where `b` ends, and None becomes Sibling
    /// when both start at the same node.
    pub fn update_relationship_detail(&mut self) -> BranchRelationship {
        let (a, b) = (&self.a, &self.b);
        self.relationship = match self.relationship {
            BranchRelationship::Upstream if a.end.key == b.start.key => BranchRelationship::Parent,
            BranchRelationship::Downstream if a.start.key == b.end.key => {
                BranchRelationship::Child
            }
            BranchRelationship::None if a.start.key == b.start.key => BranchRelationship::Sibling,
            other => other,
        };
        self.relationship
    }

    fn definite(&mut self, dir_a: DVec3, dir_b: DVec3, nor: DVec3, tol: &ToleranceConfig) {
        let a_s = self.a.start.position;
        let b_s = self.b.start.position;

        // Solve a_s + x·dir_a + z·n = b_s + y·dir_b.
        let s = solve_3x3(dir_a, -dir_b, nor, b_s - a_s);
        let (fa, fb) = clamped_fractions(a_s, dir_a, b_s, dir_b, s.x, s.y);

        self.fraction_a = fa;
        self.fraction_b = fb;
        self.start_a = fa;
        self.end_a = fa;
        self.start_b = fb;
        self.end_b = fb;
        self.closest_a = a_s + fa * dir_a;
        self.closest_b = b_s + fb * dir_b;

        let separation = self.closest_b - self.closest_a;
        self.distance2 = separation.length_squared();
        // Clamped closest points need not be separated along n.
        self.normal = if self.distance2 > tol.coaxial_distance2 {
            separation / self.distance2.sqrt()
        } else if s.z >= 0.0 {
            nor
        } else {
            -nor
        };

        let r_sum = self.a.radius + self.b.radius;
        self.intersecting = self.distance2 <= r_sum * r_sum;
    }

    fn indefinite(
        &mut self,
        dir_a: DVec3,
        dir_b: DVec3,
        tol: &ToleranceConfig,
        cycle: &mut DirectionCycle,
    ) -> EnforceResult<()> {
        self.indeterminate = true;
        let a_s = self.a.start.position;
        let a_e = self.a.end.position;
        let b_s = self.b.start.position;
        let b_e = self.b.end.position;

        // Point on A's line closest to B's start gives the true separation.
        let (s, e) = line_factors(a_s, dir_a, b_s, b_e);
        let a_to_bs = b_s - (a_s + s * dir_a);
        let sep2 = a_to_bs.length_squared();
        let r_sum = self.a.radius + self.b.radius;
        let r_sum2 = r_sum * r_sum;
        self.distance2 = sep2;
        if sep2 > r_sum2 {
            self.intersecting = false;
            return Ok(());
        }

        // Coaxial capsules have no preferred pushing direction.
        self.normal = if sep2 < tol.coaxial_distance2 {
            cycle.arbitrary_normal(dir_a, tol.normal_tol2)?
        } else {
            a_to_bs / sep2.sqrt()
        };

        let rem2 = r_sum2 - sep2;
        let (sb, eb) = line_factors(b_s, dir_b, a_s, a_e);
        let delta_a = (rem2 / dir_a.length_squared()).sqrt();
        let delta_b = (rem2 / dir_b.length_squared()).sqrt();
        self.start_a = s.min(e) - delta_a;
        self.end_a = s.max(e) + delta_a;
        self.start_b = sb.min(eb) - delta_b;
        self.end_b = sb.max(eb) + delta_b;

        self.intersecting =
            self.start_a <= 1.0 && self.end_a >= 0.0 && self.start_b <= 1.0 && self.end_b >= 0.0;
        if self.intersecting {
            self.fraction_a = 0.5 * (self.start_a.max(0.0) + self.end_a.min(1.0));
            self.fraction_b = 0.5 * (self.start_b.max(0.0) + self.end_b.min(1.0));
            self.closest_a = a_s + self.fraction_a * dir_a;
            self.closest_b = b_s + self.fraction_b * dir_b;
        }
        Ok(())
    }
}

/// Clamps the unconstrained closest-point parameters `(x, y)` to `[0, 1]²`.
///
/// The offending parameter is clamped first and the closest point on the
/// other segment found by projection; if that projection also needs
/// clamping, the first parameter is projected once more.
fn clamped_fractions(
    a_s: DVec3,
    dir_a: DVec3,
    b_s: DVec3,
    dir_b: DVec3,
    x: f64,
    y: f64,
) -> (f64, f64) {
    let unit = 0.0..=1.0;
    if !unit.contains(&x) {
        let fa = x.clamp(0.0, 1.0);
        let raw_b = line_factor(b_s, dir_b, a_s + fa * dir_a);
        let fb = raw_b.clamp(0.0, 1.0);
        if fb != raw_b {
            (line_factor(a_s, dir_a, b_s + fb * dir_b).clamp(0.0, 1.0), fb)
        } else {
            (fa, fb)
        }
    } else if !unit.contains(&y) {
        let fb = y.clamp(0.0, 1.0);
        let raw_a = line_factor(a_s, dir_a, b_s + fb * dir_b);
        let fa = raw_a.clamp(0.0, 1.0);
        if fa != raw_a {
            (fa, line_factor(b_s, dir_b, a_s + fa * dir_a).clamp(0.0, 1.0))
        } else {
            (fa, fb)
        }
    } else {
        (x, y)
    }
}
