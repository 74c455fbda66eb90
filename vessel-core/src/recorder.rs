//! Aggregation of violations into actions.
//!
//! A [`Recorder`] is fed every violation found in one pass. Corrections on
//! the same node are combined into their mean; nodes that cannot be fixed
//! by moving them are culled instead. [`Recorder::finish`] then emits at
//! most one action per node.

use std::collections::BTreeSet;

use glam::DVec3;
use tracing::debug;

use crate::{
    action::{Action, PassStats},
    config::RecorderConfig,
    correction_buffer::CorrectionBuffer,
    direction_cycle::DirectionCycle,
    error::{EnforceError, EnforceResult},
    types::{NodeKey, NodeRef},
    violation::{Correction, Resolution, Violation},
};

/// Exempts a violation from correction.
pub type Immunity<V> = Box<dyn Fn(&V) -> bool + Send + Sync>;

/// Replaces [`Violation::resolve`] for every violation.
pub type CorrectionFn<V> = Box<dyn Fn(&V, &RecorderConfig) -> Resolution + Send + Sync>;

pub struct Recorder<V> {
    config: RecorderConfig,
    immunity: Option<Immunity<V>>,
    correction: Option<CorrectionFn<V>>,
    buffer: CorrectionBuffer,
    culling: BTreeSet<NodeKey>,
    roots: BTreeSet<NodeKey>,
    stats: PassStats,
    cycle: DirectionCycle,
}

impl<V: Violation> Recorder<V> {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            immunity: None,
            correction: None,
            buffer: CorrectionBuffer::new(),
            culling: BTreeSet::new(),
            roots: BTreeSet::new(),
            stats: PassStats::default(),
            cycle: DirectionCycle::new(),
        }
    }

    pub fn with_immunity(mut self, immunity: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        self.immunity = Some(Box::new(immunity));
        self
    }

    pub fn with_correction(
        mut self,
        correction: impl Fn(&V, &RecorderConfig) -> Resolution + Send + Sync + 'static,
    ) -> Self {
        self.correction = Some(Box::new(correction));
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    /// Number of non-immune violations recorded since the last reset.
    pub fn count(&self) -> usize {
        self.stats.violations
    }

    /// Clears everything accumulated for the current pass.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.culling.clear();
        self.roots.clear();
        self.stats = PassStats::default();
    }

    pub fn is_immune(&self, violation: &V) -> bool {
        self.immunity.as_ref().is_some_and(|f| f(violation))
    }

    /// Counts predicate evaluations that could not be completed.
    pub fn add_degenerate(&mut self, count: usize) {
        self.stats.degenerate += count;
    }

    /// Records one violation.
    ///
    /// Fails only if resolving it requires culling a root node.
    pub fn record(&mut self, violation: &V) -> EnforceResult<()> {
        if self.is_immune(violation) {
            self.stats.immune += 1;
            return Ok(());
        }
        self.stats.violations += 1;

        let severity = violation.severity();
        if severity >= self.config.immediate_cull {
            let target = violation.cull_target();
            debug!(
                network = target.key.network,
                node = target.key.node,
                severity,
                "severity over threshold, culling"
            );
            return self.cull(target);
        }

        let resolution = match &self.correction {
            Some(f) => f(violation, &self.config),
            None => violation.resolve(&self.config),
        };
        match resolution {
            Resolution::Correct(corrections) => {
                for c in corrections {
                    self.register(c)?;
                }
                Ok(())
            }
            Resolution::Cull(node) => self.cull(node),
        }
    }

    pub fn record_all<'a>(&mut self, violations: impl IntoIterator<Item = &'a V>) -> EnforceResult<()>
    where
        V: 'a,
    {
        for v in violations {
            self.record(v)?;
        }
        Ok(())
    }

    fn register(&mut self, c: Correction) -> EnforceResult<()> {
        let key = c.node.key;
        if self.culling.contains(&key) {
            return Ok(());
        }
        if !c.node.movable {
            self.stats.unsupported += 1;
            debug!(network = key.network, node = key.node, "node cannot move, culling");
            return self.cull(c.node);
        }
        if self.config.cull_if_surrounded
            && self.buffer.is_requested(&key)
            && self.buffer.mean(&key).dot(c.delta) < 0.0
        {
            debug!(network = key.network, node = key.node, "opposing corrections, culling");
            return self.cull(c.node);
        }
        if c.node.root {
            self.roots.insert(key);
        }
        self.buffer.add(key, c.node.position, c.delta);
        Ok(())
    }

    fn cull(&mut self, node: NodeRef) -> EnforceResult<()> {
        if node.root {
            return Err(EnforceError::RootCulled {
                network: node.key.network,
                node: node.key.node,
            });
        }
        self.buffer.remove(&node.key);
        self.culling.insert(node.key);
        Ok(())
    }

    /// Turns accumulated requests into actions and clears them.
    ///
    /// Moves come first, then removals, each sorted by [`NodeKey`]. With a
    /// positive minimum perturbation, shorter moves are lengthened to it.
    /// Otherwise a node whose requests cancel out to nothing cannot be
    /// fixed by moving it and is culled.
    ///
    /// ### Returns
    /// The actions for this pass, or [`EnforceError::RootCulled`] if a
    /// root's requests cancelled out.
    pub fn finish(&mut self) -> EnforceResult<Vec<Action>> {
        let min = self.config.minimum_perturbation;
        let mut moves = Vec::with_capacity(self.buffer.len());
        let mut stalled = Vec::new();
        for (key, req) in self.buffer.iter() {
            let mut delta = req.mean();
            if min > 0.0 {
                delta = self.cycle.clamp_outside_ball(delta, min);
            } else if delta == DVec3::ZERO {
                stalled.push(*key);
                continue;
            }
            moves.push(Action::Move {
                node: *key,
                from: req.position,
                delta,
            });
        }

        let root = stalled.iter().find(|k| self.roots.contains(*k)).copied();
        for key in stalled {
            debug!(network = key.network, node = key.node, "correction cancelled out, culling");
            self.culling.insert(key);
        }
        let culling = std::mem::take(&mut self.culling);
        self.buffer.clear();
        self.roots.clear();
        if let Some(key) = root {
            return Err(EnforceError::RootCulled {
                network: key.network,
                node: key.node,
            });
        }

        self.stats.corrections = moves.len();
        self.stats.culls = culling.len();
        moves.extend(culling.into_iter().map(|node| Action::Remove { node }));
        Ok(moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ToleranceConfig, intersection::SegmentIntersection,
        relationship::BranchRelationship, segment::Segment,
    };

    /// Asks for a fixed displacement of one node.
    struct Push {
        node: NodeRef,
        delta: DVec3,
        severity: f64,
    }

    impl Violation for Push {
        fn severity(&self) -> f64 {
            self.severity
        }

        fn cull_target(&self) -> NodeRef {
            self.node
        }

        fn resolve(&self, _: &RecorderConfig) -> Resolution {
            Resolution::Correct(vec![Correction {
                node: self.node,
                delta: self.delta,
            }])
        }
    }

    fn node(id: usize) -> NodeRef {
        NodeRef {
            key: NodeKey::new(0, id),
            position: DVec3::new(id as f64, 0.0, 0.0),
            radius: 0.5,
            movable: true,
            root: false,
        }
    }

    fn push(id: usize, delta: DVec3) -> Push {
        Push {
            node: node(id),
            delta,
            severity: 0.1,
        }
    }

    #[test]
    fn immune_parent_child_contact_yields_no_actions() {
        let parent = Segment::new(node(0), node(1), 0.5);
        let child = Segment::new(node(1), node(2), 0.5);
        let mut v = SegmentIntersection::test(
            &parent,
            &child,
            BranchRelationship::Upstream,
            &ToleranceConfig::default(),
            &mut DirectionCycle::new(),
        )
        .unwrap();
        assert!(v.intersecting);
        assert_eq!(v.update_relationship_detail(), BranchRelationship::Parent);

        let mut rec = Recorder::new(RecorderConfig::default())
            .with_immunity(|v: &SegmentIntersection| v.relationship.is_expected_contact());
        rec.record(&v).unwrap();
        assert!(rec.finish().unwrap().is_empty());
        assert_eq!(rec.stats().immune, 1);
        assert_eq!(rec.count(), 0);
    }

    #[test]
    fn means_are_combined_per_node() {
        let mut rec = Recorder::new(RecorderConfig::default());
        rec.record(&push(3, DVec3::new(1.0, 0.0, 0.0))).unwrap();
        rec.record(&push(3, DVec3::new(0.0, 1.0, 0.0))).unwrap();
        let actions = rec.finish().unwrap();
        assert_eq!(
            actions,
            vec![Action::Move {
                node: NodeKey::new(0, 3),
                from: DVec3::new(3.0, 0.0, 0.0),
                delta: DVec3::new(0.5, 0.5, 0.0),
            }]
        );
        assert_eq!(rec.stats().corrections, 1);
    }

    #[test]
    fn opposing_corrections_cull_instead_of_cancelling() {
        let mut rec = Recorder::new(RecorderConfig::default());
        rec.record(&push(4, DVec3::X)).unwrap();
        rec.record(&push(4, -DVec3::X)).unwrap();
        // Later requests on a culled node are ignored.
        rec.record(&push(4, DVec3::Y)).unwrap();

        let actions = rec.finish().unwrap();
        assert_eq!(actions, vec![Action::Remove { node: NodeKey::new(0, 4) }]);
        assert_eq!(rec.stats().culls, 1);
        assert_eq!(rec.stats().corrections, 0);
    }

    #[test]
    fn without_surround_check_cancelled_corrections_still_cull() {
        let cfg = RecorderConfig {
            cull_if_surrounded: false,
            ..RecorderConfig::default()
        };
        let mut rec = Recorder::new(cfg);
        rec.record(&push(4, DVec3::X)).unwrap();
        rec.record(&push(4, -DVec3::X)).unwrap();
        rec.record(&push(5, DVec3::X)).unwrap();
        rec.record(&push(5, DVec3::Y)).unwrap();
        let actions = rec.finish().unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Move { node, delta, .. }
            if node.node == 5 && delta == DVec3::new(0.5, 0.5, 0.0)));
        assert_eq!(actions[1], Action::Remove { node: NodeKey::new(0, 4) });
        assert_eq!(rec.stats().culls, 1);
    }

    #[test]
    fn zero_correction_culls_instead_of_vanishing() {
        let mut rec = Recorder::new(RecorderConfig::default());
        rec.record(&push(3, DVec3::ZERO)).unwrap();
        assert_eq!(rec.finish().unwrap(), vec![Action::Remove { node: NodeKey::new(0, 3) }]);
    }

    #[test]
    fn cancelled_root_correction_is_fatal() {
        let mut root = node(0);
        root.root = true;
        let mut rec = Recorder::new(RecorderConfig::default());
        rec.record(&Push {
            node: root,
            delta: DVec3::ZERO,
            severity: 0.0,
        })
        .unwrap();
        let err = rec.finish().unwrap_err();
        assert!(matches!(err, EnforceError::RootCulled { network: 0, node: 0 }));
        // Nothing carries over into the next pass.
        rec.reset();
        assert!(rec.finish().unwrap().is_empty());
    }

    #[test]
    fn surrounded_root_is_fatal() {
        let mut root = node(0);
        root.root = true;
        let mut rec = Recorder::new(RecorderConfig::default());
        rec.record(&Push {
            node: root,
            delta: DVec3::Z,
            severity: 0.1,
        })
        .unwrap();
        let err = rec
            .record(&Push {
                node: root,
                delta: -DVec3::Z,
                severity: 0.1,
            })
            .unwrap_err();
        assert!(matches!(err, EnforceError::RootCulled { network: 0, node: 0 }));
    }

    #[test]
    fn immovable_nodes_are_culled_as_unsupported() {
        let mut fixed = node(6);
        fixed.movable = false;
        let mut rec = Recorder::new(RecorderConfig::default());
        rec.record(&Push {
            node: fixed,
            delta: DVec3::X,
            severity: 0.1,
        })
        .unwrap();
        assert_eq!(rec.finish().unwrap(), vec![Action::Remove { node: fixed.key }]);
        assert_eq!(rec.stats().unsupported, 1);
    }

    #[test]
    fn severe_violations_are_culled_immediately() {
        let cfg = RecorderConfig {
            immediate_cull: 0.5,
            ..RecorderConfig::default()
        };
        let mut rec = Recorder::new(cfg);
        rec.record(&Push {
            node: node(2),
            delta: DVec3::X,
            severity: 0.75,
        })
        .unwrap();
        rec.record(&push(1, DVec3::X)).unwrap();
        let actions = rec.finish().unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Move { node, .. } if node.node == 1));
        assert_eq!(actions[1], Action::Remove { node: NodeKey::new(0, 2) });
    }

    #[test]
    fn small_moves_are_lifted_to_minimum_perturbation() {
        let cfg = RecorderConfig {
            minimum_perturbation: 0.25,
            cull_if_surrounded: false,
            ..RecorderConfig::default()
        };
        let mut rec = Recorder::new(cfg);
        rec.record(&push(1, DVec3::new(0.01, 0.0, 0.0))).unwrap();
        rec.record(&push(2, DVec3::X)).unwrap();
        rec.record(&push(2, -DVec3::X)).unwrap();

        let actions = rec.finish().unwrap();
        assert_eq!(actions.len(), 2);
        let d1 = match actions[0] {
            Action::Move { delta, .. } => delta,
            _ => unreachable!(),
        };
        assert!(d1.abs_diff_eq(DVec3::new(0.25, 0.0, 0.0), 1e-12));
        let d2 = match actions[1] {
            Action::Move { delta, .. } => delta,
            _ => unreachable!(),
        };
        assert!((d2.length() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn correction_override_replaces_resolve() {
        let mut rec = Recorder::new(RecorderConfig::default())
            .with_correction(|v: &Push, _| Resolution::Cull(v.node));
        rec.record(&push(5, DVec3::X)).unwrap();
        assert_eq!(rec.finish().unwrap(), vec![Action::Remove { node: NodeKey::new(0, 5) }]);
    }

    #[test]
    fn actions_are_sorted_moves_then_removals() {
        let mut rec = Recorder::new(RecorderConfig::default());
        for id in [9, 2, 7] {
            rec.record(&push(id, DVec3::Y)).unwrap();
        }
        rec.record(&push(7, -DVec3::Y)).unwrap();
        let nodes: Vec<usize> = rec.finish().unwrap().iter().map(|a| a.node().node).collect();
        assert_eq!(nodes, vec![2, 9, 7]);
    }

    #[test]
    fn reset_clears_the_pass() {
        let mut rec = Recorder::new(RecorderConfig::default());
        rec.record(&push(1, DVec3::X)).unwrap();
        rec.add_degenerate(2);
        rec.reset();
        assert_eq!(rec.stats(), PassStats::default());
        assert!(rec.finish().unwrap().is_empty());
    }
}
