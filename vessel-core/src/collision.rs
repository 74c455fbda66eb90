//! Vessel/vessel collision detection.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    config::ToleranceConfig,
    direction_cycle::DirectionCycle,
    enforcer::{Detection, Detector},
    intersection::SegmentIntersection,
    relationship::BranchRelationship,
    segment::Segment,
    spatial::{SpatialIndex, UniformGrid},
    tree::Network,
    types::NetworkId,
};

/// Which pairs of segments are compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionMode {
    #[default]
    All,
    /// Only segments from different networks.
    External,
    /// Only segments within the same network.
    Internal,
}

/// Default immunity for collision recorders: contacts that exist by
/// construction are not violations.
pub fn expected_contact(v: &SegmentIntersection) -> bool {
    v.relationship.is_expected_contact()
}

#[derive(Clone, Debug, Default)]
pub struct CollisionDetector {
    pub mode: CollisionMode,
    pub tolerances: ToleranceConfig,
    partners: Vec<(NetworkId, NetworkId)>,
}

impl CollisionDetector {
    pub fn new(mode: CollisionMode, tolerances: ToleranceConfig) -> Self {
        Self {
            mode,
            tolerances,
            partners: Vec::new(),
        }
    }

    /// Marks two networks as matched, e.g. the arterial and venous side of
    /// one bed. Their terminals are expected to meet.
    pub fn with_partners(mut self, a: NetworkId, b: NetworkId) -> Self {
        self.partners.push((a.min(b), a.max(b)));
        self
    }

    fn are_partners(&self, a: NetworkId, b: NetworkId) -> bool {
        self.partners.contains(&(a.min(b), a.max(b)))
    }

    fn test(
        &self,
        a: &Segment,
        b: &Segment,
        relationship: BranchRelationship,
        cycle: &mut DirectionCycle,
        out: &mut Detection<SegmentIntersection>,
    ) -> Option<SegmentIntersection> {
        match SegmentIntersection::test(a, b, relationship, &self.tolerances, cycle) {
            Ok(v) => v.intersecting.then_some(v),
            Err(e) => {
                warn!(
                    a = ?a.end.key,
                    b = ?b.end.key,
                    error = %e,
                    "skipping segment pair"
                );
                out.degenerate += 1;
                None
            }
        }
    }

    fn internal<N: Network>(
        &self,
        net: &N,
        segments: &[Segment],
        cycle: &mut DirectionCycle,
        out: &mut Detection<SegmentIntersection>,
    ) {
        let grid = UniformGrid::from_items(segments.iter().enumerate().map(|(i, s)| (s.bounds(), i)));
        let mut candidates = Vec::new();
        for (ia, a) in segments.iter().enumerate() {
            candidates.clear();
            grid.query(&a.bounds(), &mut |&ib| {
                if ib > ia {
                    candidates.push(ib);
                }
            });
            for &ib in &candidates {
                let b = &segments[ib];
                let relationship = if net.is_ancestor_or_self(a.end.key.node, b.start.key.node) {
                    BranchRelationship::Upstream
                } else if net.is_ancestor_or_self(b.end.key.node, a.start.key.node) {
                    BranchRelationship::Downstream
                } else {
                    BranchRelationship::None
                };
                if let Some(mut v) = self.test(a, b, relationship, cycle, out) {
                    if v.update_relationship_detail() == BranchRelationship::None {
                        v.relationship = BranchRelationship::Internal;
                    }
                    out.violations.push(v);
                }
            }
        }
    }

    fn external<N: Network>(
        &self,
        (index, net, own): (NetworkId, &N, &[Segment]),
        (other_index, other): (NetworkId, &N),
        cycle: &mut DirectionCycle,
        out: &mut Detection<SegmentIntersection>,
    ) {
        let theirs = other.segments(other_index);
        if theirs.is_empty() {
            return;
        }
        let partners = self.are_partners(index, other_index);
        let grid = UniformGrid::from_items(theirs.iter().enumerate().map(|(i, s)| (s.bounds(), i)));
        let mut candidates = Vec::new();
        for a in own {
            candidates.clear();
            grid.query(&a.bounds(), &mut |&ib| candidates.push(ib));
            for &ib in &candidates {
                let b = &theirs[ib];
                let relationship = if partners
                    && net.is_terminal(a.end.key.node)
                    && other.is_terminal(b.end.key.node)
                {
                    BranchRelationship::Matched
                } else {
                    BranchRelationship::Disjoint
                };
                if let Some(v) = self.test(a, b, relationship, cycle, out) {
                    out.violations.push(v);
                }
            }
        }
    }
}

impl<N: Network> Detector<N> for CollisionDetector {
    type Violation = SegmentIntersection;

    /// Segments of `networks[index]` against each other and against every
    /// later network, depending on the mode.
    fn detect(&self, networks: &[N], index: NetworkId) -> Detection<SegmentIntersection> {
        let mut out = Detection::default();
        let Some(net) = networks.get(index) else {
            return out;
        };
        let own = net.segments(index);
        if own.is_empty() {
            return out;
        }
        let mut cycle = DirectionCycle::new();

        if self.mode != CollisionMode::External {
            self.internal(net, &own, &mut cycle, &mut out);
        }
        if self.mode != CollisionMode::Internal {
            for (j, other) in networks.iter().enumerate().skip(index + 1) {
                self.external((index, net, &own), (j, other), &mut cycle, &mut out);
            }
        }
        out
    }
}
