//! What each kind of violation asks the recorder to do.

use glam::DVec3;

use crate::{
    config::RecorderConfig, intersection::SegmentIntersection, mesh_crossing::MeshCrossing,
    segment::Segment, types::NodeRef,
};

/// A proposed displacement of one node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correction {
    pub node: NodeRef,
    pub delta: DVec3,
}

/// How a single violation wants to be fixed.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Correct(Vec<Correction>),
    Cull(NodeRef),
}

/// A detected constraint breach.
pub trait Violation: Send {
    /// Compared against [`RecorderConfig::immediate_cull`].
    fn severity(&self) -> f64;

    /// Node removed when the violation is too severe to correct.
    fn cull_target(&self) -> NodeRef;

    fn resolve(&self, cfg: &RecorderConfig) -> Resolution;
}

impl Violation for SegmentIntersection {
    /// Overlap as a fraction of the combined radii.
    fn severity(&self) -> f64 {
        let r_sum = self.a.radius + self.b.radius;
        if r_sum > 0.0 { self.overlap / r_sum } else { f64::INFINITY }
    }

    /// End of the thinner segment, which is usually the more distal one.
    fn cull_target(&self) -> NodeRef {
        if self.a.radius < self.b.radius {
            self.a.end
        } else {
            self.b.end
        }
    }

    /// Pushes `a` along `-normal` and `b` along `+normal` by the overlap
    /// times the aggression factor, shared equally unless one side has
    /// nothing that can move.
    fn resolve(&self, cfg: &RecorderConfig) -> Resolution {
        let push = self.overlap * cfg.aggression_factor;
        let (ends_a, lever_a) = captured_ends(&self.a, self.fraction_a, cfg.radial_capture_fraction);
        let (ends_b, lever_b) = captured_ends(&self.b, self.fraction_b, cfg.radial_capture_fraction);

        let mobile_a = ends_a.iter().any(|n| n.movable);
        let mobile_b = ends_b.iter().any(|n| n.movable);
        let (mut share_a, mut share_b) = (0.5, 0.5);
        if cfg.reset_stationary_fractions {
            if mobile_a && !mobile_b {
                (share_a, share_b) = (1.0, 0.0);
            } else if mobile_b && !mobile_a {
                (share_a, share_b) = (0.0, 1.0);
            }
        }

        let delta_a = -self.normal * (push * share_a / lever_a);
        let delta_b = self.normal * (push * share_b / lever_b);
        let side_a = (share_a > 0.0).then_some(ends_a).unwrap_or_default();
        let side_b = (share_b > 0.0).then_some(ends_b).unwrap_or_default();
        let corrections = side_a
            .into_iter()
            .map(|node| Correction { node, delta: delta_a })
            .chain(side_b.into_iter().map(|node| Correction { node, delta: delta_b }))
            .collect();
        Resolution::Correct(corrections)
    }
}

/// Smallest lever accepted from [`captured_ends`], capping the
/// amplification of a push applied through one end.
const MIN_LEVER: f64 = 0.25;

/// Segment ends affected by a contact at `fraction`, and how far the
/// contact point moves per unit displacement of those ends.
///
/// An end is captured when the contact lies within `capture` radii of it;
/// a contact far from both ends moves both. Roots never move, so a captured
/// root start is replaced by the segment end, which then has to travel
/// further to shift the contact by the same amount.
fn captured_ends(segment: &Segment, fraction: f64, capture: f64) -> (Vec<NodeRef>, f64) {
    let reach = capture * segment.radius;
    let length = segment.length();
    let near_start = fraction * length <= reach;
    let near_end = (1.0 - fraction) * length <= reach;

    let mut ends = Vec::with_capacity(2);
    if near_start || !near_end {
        ends.push(segment.start);
    }
    if near_end || !near_start {
        ends.push(segment.end);
    }
    ends.retain(|n| !n.root);
    if ends.is_empty() {
        ends.push(segment.end);
    }

    let lever = match ends.as_slice() {
        [only] if only.key == segment.end.key => fraction,
        [only] if only.key == segment.start.key => 1.0 - fraction,
        _ => 1.0,
    };
    (ends, lever.clamp(MIN_LEVER, 1.0))
}

impl Violation for MeshCrossing {
    fn severity(&self) -> f64 {
        self.depth()
    }

    fn cull_target(&self) -> NodeRef {
        self.segment.end
    }

    /// Pulls the end node back through the face it left by. Segments that
    /// come back in cannot be fixed that way and are culled.
    fn resolve(&self, cfg: &RecorderConfig) -> Resolution {
        match self.first_out {
            Some(hit) if self.ends_outside() && !cfg.cull_outward => {
                Resolution::Correct(vec![Correction {
                    node: self.segment.end,
                    delta: -hit.normal * (self.depth() * cfg.aggression_factor),
                }])
            }
            Some(_) => Resolution::Cull(self.segment.end),
            None => Resolution::Correct(Vec::new()),
        }
    }
}
