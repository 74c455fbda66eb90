//! Small linear algebra helpers used by the predicates.

use glam::DVec3;

/// How far along `dir` from `origin` the point closest to `target` lies,
/// in multiples of `dir`.
#[inline]
pub fn line_factor(origin: DVec3, dir: DVec3, target: DVec3) -> f64 {
    (target - origin).dot(dir) / dir.length_squared()
}

/// [`line_factor`] for two targets sharing the same line.
#[inline]
pub fn line_factors(origin: DVec3, dir: DVec3, start: DVec3, end: DVec3) -> (f64, f64) {
    let scaled = dir / dir.length_squared();
    let offset = origin.dot(scaled);
    (start.dot(scaled) - offset, end.dot(scaled) - offset)
}

/// Solves `[col1 col2 col3] x = v` by Cramer's rule.
///
/// The caller guarantees the columns are independent.
pub fn solve_3x3(col1: DVec3, col2: DVec3, col3: DVec3, v: DVec3) -> DVec3 {
    let row1 = col2.cross(col3);
    let row2 = col3.cross(col1);
    let row3 = col1.cross(col2);
    let inv_det = 1.0 / col1.dot(row1);
    DVec3::new(row1.dot(v), row2.dot(v), row3.dot(v)) * inv_det
}
