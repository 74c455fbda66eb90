//! The detect / resolve / apply loop.
//!
//! One pass of an [`Enforcer`] looks like:
//! 1. [`Enforcer::detect`]: every detector runs against every network in
//!    parallel, and the violations found are fed to the [`Recorder`].
//! 2. [`Recorder::finish`]: accumulated requests become [`Action`]s.
//! 3. [`Enforcer::apply`]: the actions are handed to the networks, which
//!    move or prune nodes and recompute derived geometry.
//!
//! Passes repeat until no violation remains or the pass budget runs out.
//! Running out of passes is reported through [`Outcome::converged`], not as
//! an error.

use std::{
    marker::PhantomData,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    action::{Action, PassStats},
    config::EnforcerConfig,
    error::EnforceResult,
    recorder::Recorder,
    tree::{Network, NetworkMut},
    types::{NetworkId, NodeKey},
    violation::Violation,
};

/// Output of one detection job.
#[derive(Debug)]
pub struct Detection<V> {
    pub violations: Vec<V>,
    /// Predicate evaluations skipped because of degenerate geometry.
    pub degenerate: usize,
}

impl<V> Default for Detection<V> {
    fn default() -> Self {
        Self {
            violations: Vec::new(),
            degenerate: 0,
        }
    }
}

/// Finds violations of one constraint in one network.
///
/// Detectors only read geometry, so the enforcer may run many
/// (detector, network) jobs at once.
pub trait Detector<N: Network>: Send + Sync {
    type Violation: Violation;

    /// Detects violations involving `networks[index]`.
    ///
    /// Detectors comparing networks against each other should only look at
    /// networks after `index`, so that each pair is visited once.
    fn detect(&self, networks: &[N], index: NetworkId) -> Detection<Self::Violation>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnforcerState {
    #[default]
    Idle,
    Detecting,
    Resolving,
    Applying,
}

/// Summary of a call to [`Enforcer::advance`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outcome {
    /// Passes that applied actions.
    pub passes: usize,
    /// The final detection found nothing to fix.
    pub converged: bool,
    /// Violations found by the final detection.
    pub remaining: usize,
    /// Stopped early by the cancellation flag.
    pub cancelled: bool,
    /// Statistics of every detection, in order.
    pub history: Vec<PassStats>,
}

pub struct Enforcer<N: Network, D: Detector<N>> {
    detectors: Vec<D>,
    recorder: Recorder<D::Violation>,
    config: EnforcerConfig,
    state: EnforcerState,
    cancel: Option<Arc<AtomicBool>>,
    _network: PhantomData<fn(&N)>,
}

impl<N: Network, D: Detector<N>> Enforcer<N, D> {
    pub fn new(detectors: Vec<D>, recorder: Recorder<D::Violation>, config: EnforcerConfig) -> Self {
        Self {
            detectors,
            recorder,
            config,
            state: EnforcerState::Idle,
            cancel: None,
            _network: PhantomData,
        }
    }

    /// Checked before every pass; setting it stops the loop at the next
    /// pass boundary.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> EnforcerState {
        self.state
    }

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Recorder<D::Violation> {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder<D::Violation> {
        &mut self.recorder
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Runs every detector against every network and records the results.
    ///
    /// The recorder is reset first, so afterwards it holds exactly this
    /// pass's requests. With `ordered_aggregation`, job results are
    /// recorded in job order once all jobs finish; otherwise each job
    /// records as soon as it is done, behind a lock.
    ///
    /// ### Returns
    /// The statistics accumulated so far, or [`crate::error::EnforceError::RootCulled`]
    /// if a violation could only be resolved by culling a root.
    pub fn detect(&mut self, networks: &[N]) -> EnforceResult<PassStats> {
        self.state = EnforcerState::Detecting;
        self.recorder.reset();

        let jobs: Vec<(usize, NetworkId)> = (0..self.detectors.len())
            .flat_map(|d| (0..networks.len()).map(move |n| (d, n)))
            .collect();
        let detectors = &self.detectors;
        let run = |&(d, n): &(usize, NetworkId)| {
            let found = detectors[d].detect(networks, n);
            debug!(
                detector = d,
                network = n,
                violations = found.violations.len(),
                degenerate = found.degenerate,
                "detection job finished"
            );
            found
        };

        if self.config.ordered_aggregation {
            let results: Vec<Detection<D::Violation>> = jobs.par_iter().map(run).collect();
            self.state = EnforcerState::Resolving;
            for found in &results {
                self.recorder.add_degenerate(found.degenerate);
                self.recorder.record_all(&found.violations)?;
            }
        } else {
            let recorder = Mutex::new(&mut self.recorder);
            jobs.par_iter().try_for_each(|job| {
                let found = run(job);
                let mut rec = recorder.lock().unwrap_or_else(|e| e.into_inner());
                rec.add_degenerate(found.degenerate);
                rec.record_all(&found.violations)
            })?;
            self.state = EnforcerState::Resolving;
        }
        Ok(self.recorder.stats())
    }

    /// Hands `actions` to the networks.
    ///
    /// Actions are applied in order, and only to nodes that are still alive.
    /// With `cull_matched`, the partners of every removed terminal are
    /// removed afterwards. Every network touched is recomputed once at the
    /// end.
    ///
    /// ### Parameters
    /// - `networks` - The networks the actions refer to, indexed by
    ///   [`crate::types::NodeKey::network`].
    /// - `actions` - Output of [`Recorder::finish`].
    pub fn apply(&mut self, networks: &mut [N], actions: &[Action])
    where
        N: NetworkMut,
    {
        self.state = EnforcerState::Applying;
        let mut touched = vec![false; networks.len()];
        let mut matched: Vec<NodeKey> = Vec::new();

        for action in actions {
            let key = action.node();
            let Some(net) = networks.get_mut(key.network) else {
                continue;
            };
            if !net.contains(key.node) {
                continue;
            }
            match *action {
                Action::Move { from, delta, .. } if self.config.change_geometry => {
                    net.set_position(key.node, from + delta);
                    touched[key.network] = true;
                }
                Action::Remove { .. } if self.config.culling_permitted => {
                    if self.config.cull_matched {
                        for t in net.downstream_terminals(key.node) {
                            matched.extend(net.partners(t).iter().filter(|p| **p != key));
                        }
                    }
                    net.remove_subtree(key.node);
                    touched[key.network] = true;
                }
                _ => {}
            }
        }

        for partner in matched {
            let Some(net) = networks.get_mut(partner.network) else {
                continue;
            };
            if net.contains(partner.node) {
                debug!(
                    network = partner.network,
                    node = partner.node,
                    "culling matched terminal"
                );
                net.remove_subtree(partner.node);
                touched[partner.network] = true;
            }
        }

        for (net, _) in networks.iter_mut().zip(touched).filter(|(_, t)| *t) {
            net.recompute();
        }
    }

    /// Runs up to `passes` passes.
    ///
    /// Detection always runs once more after the last pass so that the
    /// outcome reflects the final geometry.
    pub fn advance(&mut self, networks: &mut [N], passes: usize) -> EnforceResult<Outcome>
    where
        N: NetworkMut,
    {
        let result = self.run_passes(networks, passes);
        self.state = EnforcerState::Idle;
        result
    }

    /// Runs until clean or the configured pass budget is spent.
    pub fn resolve(&mut self, networks: &mut [N]) -> EnforceResult<Outcome>
    where
        N: NetworkMut,
    {
        self.advance(networks, self.config.max_passes)
    }

    fn run_passes(&mut self, networks: &mut [N], passes: usize) -> EnforceResult<Outcome>
    where
        N: NetworkMut,
    {
        let mut outcome = Outcome::default();
        for pass in 0..=passes {
            if self.is_cancelled() {
                info!(pass, "enforcement cancelled");
                outcome.cancelled = true;
                break;
            }

            let found = self.detect(networks)?;
            outcome.remaining = found.violations;
            if found.violations == 0 {
                outcome.converged = true;
                outcome.history.push(found);
                info!(passes = pass, immune = found.immune, "constraints satisfied");
                break;
            }
            if pass == passes {
                outcome.history.push(found);
                warn!(passes, remaining = found.violations, "pass budget exhausted");
                break;
            }

            let actions = self.recorder.finish()?;
            let stats = self.recorder.stats();
            self.apply(networks, &actions);
            info!(
                pass,
                violations = stats.violations,
                immune = stats.immune,
                corrections = stats.corrections,
                culls = stats.culls,
                unsupported = stats.unsupported,
                degenerate = stats.degenerate,
                "enforcement pass"
            );
            outcome.history.push(stats);
            outcome.passes += 1;
        }
        Ok(outcome)
    }
}

/// Object-safe view of an [`Enforcer`], so enforcers with different
/// detectors can be driven together.
pub trait Enforce<N> {
    fn advance(&mut self, networks: &mut [N], passes: usize) -> EnforceResult<Outcome>;
}

impl<N: NetworkMut, D: Detector<N>> Enforce<N> for Enforcer<N, D> {
    fn advance(&mut self, networks: &mut [N], passes: usize) -> EnforceResult<Outcome> {
        Enforcer::advance(self, networks, passes)
    }
}

/// Cycles through `enforcers`, giving each up to `steps` passes, until a
/// full round finds nothing to fix.
///
/// Fixing one constraint can break another (pushing vessels apart may
/// push them out of the domain), hence the repetition.
///
/// ### Returns
/// `true` once every enforcer reports clean geometry without applying a
/// single pass, `false` if `max_rounds` runs out or one of them is
/// cancelled.
pub fn iterate_to_end<N>(
    enforcers: &mut [&mut dyn Enforce<N>],
    networks: &mut [N],
    steps: usize,
    max_rounds: usize,
) -> EnforceResult<bool> {
    for round in 0..max_rounds {
        let mut clean = true;
        for enforcer in enforcers.iter_mut() {
            let outcome = enforcer.advance(networks, steps)?;
            if outcome.cancelled {
                return Ok(false);
            }
            clean &= outcome.converged && outcome.passes == 0;
        }
        if clean {
            debug!(rounds = round + 1, "all enforcers clean");
            return Ok(true);
        }
    }
    warn!(max_rounds, "enforcers did not settle");
    Ok(false)
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::{
        config::RecorderConfig,
        tree::Tree,
        types::{NodeKey, NodeRef},
        violation::{Correction, Resolution},
    };

    /// Flags every live non-root node above `z = limit` and asks for it to
    /// be moved down to the limit.
    struct Ceiling {
        limit: f64,
    }

    struct Above {
        node: NodeRef,
        excess: f64,
    }

    impl Violation for Above {
        fn severity(&self) -> f64 {
            self.excess
        }

        fn cull_target(&self) -> NodeRef {
            self.node
        }

        fn resolve(&self, _: &RecorderConfig) -> Resolution {
            Resolution::Correct(vec![Correction {
                node: self.node,
                delta: DVec3::new(0.0, 0.0, -self.excess),
            }])
        }
    }

    impl Detector<Tree> for Ceiling {
        type Violation = Above;

        fn detect(&self, networks: &[Tree], index: NetworkId) -> Detection<Above> {
            let net = &networks[index];
            let violations = net
                .node_ids()
                .into_iter()
                .filter(|&id| id != net.root())
                .map(|id| net.node_ref(index, id))
                .filter(|n| n.position.z > self.limit)
                .map(|node| Above {
                    node,
                    excess: node.position.z - self.limit,
                })
                .collect();
            Detection {
                violations,
                degenerate: 0,
            }
        }
    }

    fn column() -> Tree {
        let mut t = Tree::new(DVec3::ZERO, 0.1);
        let a = t.add_child(0, DVec3::new(0.0, 0.0, 1.0), 0.1);
        t.add_child(a, DVec3::new(0.0, 0.0, 3.0), 0.1);
        t
    }

    fn enforcer(config: EnforcerConfig) -> Enforcer<Tree, Ceiling> {
        Enforcer::new(
            vec![Ceiling { limit: 2.0 }],
            Recorder::new(RecorderConfig::default()),
            config,
        )
    }

    #[test]
    fn single_pass_fixes_and_reports_convergence() {
        let mut nets = vec![column(), column()];
        let mut e = enforcer(EnforcerConfig::default());
        let outcome = e.resolve(&mut nets).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[0].violations, 2);
        assert_eq!(outcome.history[0].corrections, 2);
        assert_eq!(nets[1].position(2), DVec3::new(0.0, 0.0, 2.0));
        assert_eq!(e.state(), EnforcerState::Idle);
    }

    #[test]
    fn unordered_aggregation_gives_same_result() {
        let mut nets = vec![column(), column(), column()];
        let mut e = enforcer(EnforcerConfig {
            ordered_aggregation: false,
            ..EnforcerConfig::default()
        });
        let outcome = e.resolve(&mut nets).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.history[0].violations, 3);
    }

    #[test]
    fn zero_pass_budget_only_detects() {
        let mut nets = vec![column()];
        let mut e = enforcer(EnforcerConfig::default());
        let outcome = e.advance(&mut nets, 0).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.passes, 0);
        assert_eq!(outcome.remaining, 1);
        assert_eq!(nets[0].position(2).z, 3.0);
    }

    #[test]
    fn disabled_geometry_changes_never_converge() {
        let mut nets = vec![column()];
        let mut e = enforcer(EnforcerConfig {
            change_geometry: false,
            ..EnforcerConfig::default()
        });
        let outcome = e.advance(&mut nets, 3).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.passes, 3);
        assert_eq!(nets[0].position(2).z, 3.0);
    }

    #[test]
    fn removals_respect_culling_switch() {
        let actions = [Action::Remove {
            node: NodeKey::new(0, 1),
        }];
        let mut nets = vec![column()];
        let mut e = enforcer(EnforcerConfig {
            culling_permitted: false,
            ..EnforcerConfig::default()
        });
        e.apply(&mut nets, &actions);
        assert_eq!(nets[0].live_count(), 3);

        let mut e = enforcer(EnforcerConfig::default());
        e.apply(&mut nets, &actions);
        assert_eq!(nets[0].node_ids(), vec![0]);
    }

    fn matched_columns() -> Vec<Tree> {
        let mut nets = vec![column(), column()];
        nets[0].add_partner(2, NodeKey::new(1, 2));
        nets[1].add_partner(2, NodeKey::new(0, 2));
        nets
    }

    #[test]
    fn removing_a_matched_terminal_removes_its_partner() {
        let actions = [Action::Remove {
            node: NodeKey::new(0, 1),
        }];
        let mut nets = matched_columns();
        enforcer(EnforcerConfig::default()).apply(&mut nets, &actions);
        assert_eq!(nets[0].node_ids(), vec![0]);
        assert_eq!(nets[1].node_ids(), vec![0, 1]);

        let mut nets = matched_columns();
        let mut e = enforcer(EnforcerConfig {
            cull_matched: false,
            ..EnforcerConfig::default()
        });
        e.apply(&mut nets, &actions);
        assert_eq!(nets[0].node_ids(), vec![0]);
        assert_eq!(nets[1].live_count(), 3);
    }

    #[test]
    fn moves_on_removed_nodes_are_skipped() {
        let mut nets = vec![column()];
        nets[0].remove_subtree(2);
        let mut e = enforcer(EnforcerConfig::default());
        e.apply(
            &mut nets,
            &[Action::Move {
                node: NodeKey::new(0, 2),
                from: DVec3::ZERO,
                delta: DVec3::X,
            }],
        );
        assert_eq!(nets[0].position(2), DVec3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn cancellation_stops_before_the_first_pass() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut nets = vec![column()];
        let mut e = enforcer(EnforcerConfig::default()).with_cancel_flag(flag.clone());
        let outcome = e.resolve(&mut nets).unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.history.is_empty());

        flag.store(false, Ordering::Relaxed);
        assert!(e.resolve(&mut nets).unwrap().converged);
    }

    #[test]
    fn iterate_to_end_settles_competing_constraints() {
        let mut nets = vec![column()];
        let mut high = enforcer(EnforcerConfig::default());
        let mut low = Enforcer::new(
            vec![Ceiling { limit: 1.5 }],
            Recorder::new(RecorderConfig::default()),
            EnforcerConfig::default(),
        );
        let mut enforcers: [&mut dyn Enforce<Tree>; 2] = [&mut high, &mut low];
        let settled = iterate_to_end(&mut enforcers, &mut nets, 4, 8).unwrap();
        assert!(settled);
        assert_eq!(nets[0].position(2).z, 1.5);
    }
}
