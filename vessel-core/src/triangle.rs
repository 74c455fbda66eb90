use glam::DVec3;

use crate::{
    error::{EnforceError, EnforceResult},
    segment::Aabb,
};

/// One face of a bounding surface.
///
/// The normal follows the right-hand rule over `p0 -> p1 -> p2`, so a closed
/// mesh wound counter-clockwise from outside has outward-facing normals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub p0: DVec3,
    pub p1: DVec3,
    pub p2: DVec3,
    pub normal: DVec3,
}

impl Triangle {
    pub fn new(p0: DVec3, p1: DVec3, p2: DVec3) -> EnforceResult<Self> {
        let n = (p1 - p0).cross(p2 - p0);
        let len = n.length();
        if !(len.is_finite() && len > 0.0) {
            return Err(EnforceError::DegenerateGeometry {
                reason: "triangle has zero area",
            });
        }
        Ok(Self {
            p0,
            p1,
            p2,
            normal: n / len,
        })
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.p0, self.p1).union(&Aabb::from_points(self.p2, self.p2))
    }

    /// Thin-line Möller–Trumbore test of `origin + t·dir` for `t` in `[0, 1]`.
    ///
    /// Returns the hit fraction `t`, or `None` when the line misses the face
    /// or runs parallel to it.
    pub fn test_ray(&self, origin: DVec3, dir: DVec3) -> Option<f64> {
        let edge1 = self.p1 - self.p0;
        let edge2 = self.p2 - self.p0;
        let h = dir.cross(edge2);
        let a = edge1.dot(h);
        if a == 0.0 {
            return None;
        }
        let f = 1.0 / a;

        let s = origin - self.p0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * dir.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        (0.0..=1.0).contains(&t).then_some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_xy() -> Triangle {
        Triangle::new(DVec3::ZERO, DVec3::X, DVec3::Y).unwrap()
    }

    #[test]
    fn normal_follows_winding() {
        assert_eq!(unit_xy().normal, DVec3::Z);
        let flipped = Triangle::new(DVec3::ZERO, DVec3::Y, DVec3::X).unwrap();
        assert_eq!(flipped.normal, -DVec3::Z);
    }

    #[test]
    fn collinear_vertices_are_rejected() {
        let err = Triangle::new(DVec3::ZERO, DVec3::X, DVec3::X * 2.0).unwrap_err();
        assert!(matches!(err, EnforceError::DegenerateGeometry { .. }));
    }

    #[test]
    fn ray_through_face_reports_fraction() {
        let t = unit_xy()
            .test_ray(DVec3::new(0.25, 0.25, -1.0), DVec3::new(0.0, 0.0, 4.0))
            .unwrap();
        assert!((t - 0.25).abs() < 1e-12);
    }

    #[test]
    fn ray_that_stops_short_misses() {
        let tri = unit_xy();
        assert_eq!(tri.test_ray(DVec3::new(0.25, 0.25, -1.0), DVec3::new(0.0, 0.0, 0.5)), None);
        assert_eq!(tri.test_ray(DVec3::new(0.9, 0.9, -1.0), DVec3::new(0.0, 0.0, 2.0)), None);
    }

    #[test]
    fn parallel_ray_misses() {
        let tri = unit_xy();
        assert_eq!(tri.test_ray(DVec3::new(0.1, 0.1, 0.0), DVec3::X), None);
    }

    #[test]
    fn bounds_cover_vertices() {
        let b = unit_xy().bounds();
        assert_eq!(b.min, DVec3::ZERO);
        assert_eq!(b.max, DVec3::new(1.0, 1.0, 0.0));
    }
}
