use glam::DVec3;

use crate::error::{EnforceError, EnforceResult};

/// Cube corners in Gray-code order: neighbours differ in a single sign, so
/// a candidate parallel to some axis is always followed by one that is not.
const DIRECTIONS: [DVec3; 8] = [
    DVec3::new(1.0, 1.0, 1.0),
    DVec3::new(-1.0, 1.0, 1.0),
    DVec3::new(-1.0, 1.0, -1.0),
    DVec3::new(-1.0, -1.0, -1.0),
    DVec3::new(-1.0, -1.0, 1.0),
    DVec3::new(1.0, -1.0, 1.0),
    DVec3::new(1.0, -1.0, -1.0),
    DVec3::new(1.0, 1.0, -1.0),
];

/// Deterministic round-robin source of directions.
///
/// Used wherever any direction will do: pushing coaxial capsules apart, or
/// lifting a zero-length correction to a minimum size. Each detection job
/// and recorder owns its own cycle, so results do not depend on scheduling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectionCycle {
    next: usize,
}

impl DirectionCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next raw cube-corner direction (not normalized).
    pub fn next_direction(&mut self) -> DVec3 {
        let dir = DIRECTIONS[self.next];
        self.next = (self.next + 1) % DIRECTIONS.len();
        dir
    }

    /// Returns a unit vector perpendicular to `v`.
    ///
    /// Candidates that are (nearly) parallel to `v` are skipped. Fails only
    /// if `v` itself is too short to define an axis.
    pub fn arbitrary_normal(&mut self, v: DVec3, tol2: f64) -> EnforceResult<DVec3> {
        let v2 = v.length_squared();
        if v2.is_nan() || v2 <= tol2 {
            return Err(EnforceError::DegenerateGeometry {
                reason: "axis too short to assign a normal",
            });
        }
        for _ in 0..DIRECTIONS.len() {
            let dir = self.next_direction();
            let normal = dir - v * (dir.dot(v) / v2);
            let mag2 = normal.length_squared();
            if mag2 > tol2 {
                return Ok(normal / mag2.sqrt());
            }
        }
        Err(EnforceError::DegenerateGeometry {
            reason: "no candidate direction is perpendicular to the axis",
        })
    }

    /// Lifts `v` to length `radius` if it is shorter; zero vectors take the
    /// next candidate direction.
    pub fn clamp_outside_ball(&mut self, v: DVec3, radius: f64) -> DVec3 {
        let len = v.length();
        if len >= radius {
            v
        } else if len > 0.0 {
            v * (radius / len)
        } else {
            self.next_direction().normalize() * radius
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_all_corners_in_order() {
        let mut cycle = DirectionCycle::new();
        let seen: Vec<DVec3> = (0..9).map(|_| cycle.next_direction()).collect();
        assert_eq!(&seen[..8], &DIRECTIONS[..]);
        assert_eq!(seen[8], DIRECTIONS[0]);
    }

    #[test]
    fn normal_is_unit_and_perpendicular() {
        let mut cycle = DirectionCycle::new();
        let axis = DVec3::new(0.0, 0.0, 3.0);
        for _ in 0..16 {
            let n = cycle.arbitrary_normal(axis, 1e-10).unwrap();
            assert!((n.length() - 1.0).abs() < 1e-12);
            assert!(n.dot(axis).abs() < 1e-12);
        }
    }

    #[test]
    fn skips_candidate_parallel_to_axis() {
        let mut cycle = DirectionCycle::new();
        // First candidate is (1, 1, 1) itself, so it must be skipped.
        let n = cycle.arbitrary_normal(DVec3::ONE, 1e-10).unwrap();
        assert!(n.dot(DVec3::ONE).abs() < 1e-12);
        assert_eq!(cycle, {
            let mut c = DirectionCycle::new();
            c.next_direction();
            c.next_direction();
            c
        });
    }

    #[test]
    fn same_sequence_for_independent_cycles() {
        let axis = DVec3::new(1.0, 2.0, 0.5);
        let mut a = DirectionCycle::new();
        let mut b = DirectionCycle::new();
        for _ in 0..5 {
            assert_eq!(
                a.arbitrary_normal(axis, 1e-10).unwrap(),
                b.arbitrary_normal(axis, 1e-10).unwrap()
            );
        }
    }

    #[test]
    fn zero_axis_is_degenerate() {
        let mut cycle = DirectionCycle::new();
        let err = cycle.arbitrary_normal(DVec3::ZERO, 1e-10).unwrap_err();
        assert!(matches!(err, EnforceError::DegenerateGeometry { .. }));
    }

    #[test]
    fn clamp_outside_ball_lifts_short_vectors() {
        let mut cycle = DirectionCycle::new();
        let v = cycle.clamp_outside_ball(DVec3::new(0.1, 0.0, 0.0), 0.5);
        assert!(v.abs_diff_eq(DVec3::new(0.5, 0.0, 0.0), 1e-12));

        let long = DVec3::new(0.0, 2.0, 0.0);
        assert_eq!(cycle.clamp_outside_ball(long, 0.5), long);

        let z = cycle.clamp_outside_ball(DVec3::ZERO, 0.5);
        assert!((z.length() - 0.5).abs() < 1e-12);
    }
}
