//! Scalar fields whose sign defines an allowed region.
//!
//! By convention `f(x) < 0` is inside. The gradient is used to push
//! violating nodes back towards the interior.

use glam::DVec3;

pub trait ImplicitField: Send + Sync {
    /// Returns `(value, gradient)` at `x`.
    fn evaluate(&self, x: DVec3) -> (f64, DVec3);
}

/// First-order forward-difference gradient, `(f(x + dx·eᵢ) - f(x)) / dx`.
///
/// Also returns `f(x)` so callers need not evaluate it twice.
pub fn forward_difference(f: impl Fn(DVec3) -> f64, x: DVec3, dx: f64) -> (f64, DVec3) {
    let f0 = f(x);
    let grad = DVec3::new(
        f(x + DVec3::X * dx) - f0,
        f(x + DVec3::Y * dx) - f0,
        f(x + DVec3::Z * dx) - f0,
    ) / dx;
    (f0, grad)
}

/// Signed distance to a sphere: negative inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphereField {
    pub center: DVec3,
    pub radius: f64,
}

impl SphereField {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }
}

impl ImplicitField for SphereField {
    fn evaluate(&self, x: DVec3) -> (f64, DVec3) {
        let d = x - self.center;
        let len = d.length();
        // The centre has no defined gradient.
        let grad = if len > 0.0 { d / len } else { DVec3::ZERO };
        (len - self.radius, grad)
    }
}

/// A value-only closure with a forward-difference gradient.
pub struct FnField<F> {
    f: F,
    dx: f64,
}

impl<F> FnField<F>
where
    F: Fn(DVec3) -> f64 + Send + Sync,
{
    pub fn new(f: F, dx: f64) -> Self {
        Self { f, dx }
    }
}

impl<F> ImplicitField for FnField<F>
where
    F: Fn(DVec3) -> f64 + Send + Sync,
{
    fn evaluate(&self, x: DVec3) -> (f64, DVec3) {
        forward_difference(&self.f, x, self.dx)
    }
}

/// A closure that supplies its own gradient.
pub struct AnalyticField<F>(pub F);

impl<F> ImplicitField for AnalyticField<F>
where
    F: Fn(DVec3) -> (f64, DVec3) + Send + Sync,
{
    fn evaluate(&self, x: DVec3) -> (f64, DVec3) {
        (self.0)(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_value_and_gradient() {
        let field = SphereField::new(DVec3::ZERO, 5.0);
        let (v, g) = field.evaluate(DVec3::new(6.0, 0.0, 0.0));
        assert_eq!(v, 1.0);
        assert_eq!(g, DVec3::X);
        let (v, g) = field.evaluate(DVec3::ZERO);
        assert_eq!(v, -5.0);
        assert_eq!(g, DVec3::ZERO);
    }

    #[test]
    fn forward_difference_of_linear_function_is_exact() {
        let f = |x: DVec3| 2.0 * x.x - x.y + 0.5 * x.z;
        let (v, g) = forward_difference(f, DVec3::new(1.0, 1.0, 1.0), 1e-3);
        assert!((v - 1.5).abs() < 1e-12);
        assert!(g.abs_diff_eq(DVec3::new(2.0, -1.0, 0.5), 1e-9));
    }

    #[test]
    fn fn_field_approximates_sphere_gradient() {
        let field = FnField::new(|x: DVec3| x.length() - 5.0, 1e-6);
        let (v, g) = field.evaluate(DVec3::new(0.0, 4.0, 0.0));
        assert!((v + 1.0).abs() < 1e-12);
        assert!(g.abs_diff_eq(DVec3::Y, 1e-5));
    }

    #[test]
    fn analytic_field_passes_through() {
        let field = AnalyticField(|x: DVec3| (x.z, DVec3::Z));
        assert_eq!(field.evaluate(DVec3::new(0.0, 0.0, 3.0)), (3.0, DVec3::Z));
    }
}
