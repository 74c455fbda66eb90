//! Keeping nodes inside a region described by an implicit field.

use glam::DVec3;

use crate::{
    config::{ImplicitConfig, RecorderConfig},
    enforcer::{Detection, Detector},
    field::ImplicitField,
    tree::Network,
    types::{NetworkId, NodeRef},
    violation::{Correction, Resolution, Violation},
};

/// A node where the field is at or above its threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImplicitViolation {
    pub node: NodeRef,
    /// `f(x) - threshold`.
    pub value: f64,
    pub gradient: DVec3,
}

impl Violation for ImplicitViolation {
    fn severity(&self) -> f64 {
        self.value
    }

    fn cull_target(&self) -> NodeRef {
        self.node
    }

    /// Newton step towards the level set, scaled by the aggression factor.
    /// Without a gradient there is no direction to move in, so the node is
    /// culled.
    fn resolve(&self, cfg: &RecorderConfig) -> Resolution {
        let g2 = self.gradient.length_squared();
        if !(g2.is_finite() && g2 > 0.0) {
            return Resolution::Cull(self.node);
        }
        Resolution::Correct(vec![Correction {
            node: self.node,
            delta: -self.gradient * (self.value / g2 * cfg.aggression_factor),
        }])
    }
}

/// Per-node threshold subtracted from the field value.
pub type Threshold = Box<dyn Fn(&NodeRef) -> f64 + Send + Sync>;

pub struct ImplicitDetector {
    field: Box<dyn ImplicitField>,
    threshold: Option<Threshold>,
    allow_marginal: bool,
}

impl ImplicitDetector {
    pub fn new(field: impl ImplicitField + 'static, config: &ImplicitConfig) -> Self {
        Self {
            field: Box::new(field),
            threshold: None,
            allow_marginal: config.allow_marginal,
        }
    }

    /// Replaces the default threshold of zero, e.g. to keep thick vessels
    /// further from the boundary than thin ones.
    pub fn with_threshold(mut self, threshold: impl Fn(&NodeRef) -> f64 + Send + Sync + 'static) -> Self {
        self.threshold = Some(Box::new(threshold));
        self
    }

    /// Evaluates the field at `node`, returning a violation if it is not
    /// strictly inside.
    pub fn evaluate(&self, node: &NodeRef) -> Option<ImplicitViolation> {
        let (f, gradient) = self.field.evaluate(node.position);
        let value = f - self.threshold.as_ref().map_or(0.0, |t| t(node));
        let violating = if self.allow_marginal {
            value > 0.0
        } else {
            value >= 0.0
        };
        violating.then_some(ImplicitViolation {
            node: *node,
            value,
            gradient,
        })
    }
}

impl<N: Network> Detector<N> for ImplicitDetector {
    type Violation = ImplicitViolation;

    fn detect(&self, networks: &[N], index: NetworkId) -> Detection<ImplicitViolation> {
        let violations = networks
            .get(index)
            .map(|net| {
                net.node_ids()
                    .into_iter()
                    .filter_map(|id| self.evaluate(&net.node_ref(index, id)))
                    .collect()
            })
            .unwrap_or_default();
        Detection {
            violations,
            degenerate: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{FnField, SphereField},
        types::NodeKey,
    };

    fn at(x: f64) -> NodeRef {
        NodeRef {
            key: NodeKey::new(0, 1),
            position: DVec3::new(x, 0.0, 0.0),
            radius: 0.5,
            movable: true,
            root: false,
        }
    }

    fn ball(allow_marginal: bool) -> ImplicitDetector {
        ImplicitDetector::new(
            SphereField::new(DVec3::ZERO, 5.0),
            &ImplicitConfig { allow_marginal },
        )
    }

    #[test]
    fn outside_inside_and_on_the_boundary() {
        let strict = ball(false);
        let v = strict.evaluate(&at(6.0)).unwrap();
        assert_eq!(v.value, 1.0);
        assert!(strict.evaluate(&at(4.0)).is_none());
        assert!(strict.evaluate(&at(5.0)).is_some());

        let marginal = ball(true);
        assert!(marginal.evaluate(&at(6.0)).is_some());
        assert!(marginal.evaluate(&at(5.0)).is_none());
    }

    #[test]
    fn threshold_shrinks_the_region() {
        let d = ball(false).with_threshold(|n: &NodeRef| -n.radius);
        let v = d.evaluate(&at(4.75)).unwrap();
        assert!((v.value - 0.25).abs() < 1e-12);
    }

    #[test]
    fn newton_step_points_back_inside() {
        let v = ball(false).evaluate(&at(6.0)).unwrap();
        let cfg = RecorderConfig::default();
        match v.resolve(&cfg) {
            Resolution::Correct(c) => {
                assert_eq!(c.len(), 1);
                assert!(c[0].delta.abs_diff_eq(DVec3::new(-1.25, 0.0, 0.0), 1e-12));
            }
            other => panic!("expected correction, got {other:?}"),
        }
    }

    #[test]
    fn flat_field_culls() {
        let d = ImplicitDetector::new(FnField::new(|_| 1.0, 1e-3), &ImplicitConfig::default());
        let v = d.evaluate(&at(0.0)).unwrap();
        assert_eq!(v.gradient, DVec3::ZERO);
        assert_eq!(v.resolve(&RecorderConfig::default()), Resolution::Cull(at(0.0)));
    }
}
