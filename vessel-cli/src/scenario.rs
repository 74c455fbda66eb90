//! A reproducible enforcement run over randomly grown trees.

use std::path::Path;

use anyhow::Context;
use glam::DVec3;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::info;
use vessel_core::{
    collision::{CollisionDetector, CollisionMode, expected_contact},
    config::EngineConfig,
    enforcer::{Enforce, Enforcer, iterate_to_end},
    field::SphereField,
    implicit::ImplicitDetector,
    recorder::Recorder,
    tree::Tree,
};

/// How the random trees are grown.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub seed: u64,
    pub networks: usize,
    pub nodes_per_network: usize,
    /// Distance between a new node and its parent.
    pub step: f64,
    pub radius: f64,
    /// Radius of the spherical domain the trees must stay inside.
    pub domain_radius: f64,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            networks: 3,
            nodes_per_network: 200,
            step: 1.0,
            radius: 0.2,
            domain_radius: 10.0,
        }
    }
}

/// Top-level CLI configuration file.
///
/// ```toml
/// [fixture]
/// seed = 42
/// networks = 4
///
/// [engine.recorder]
/// aggression_factor = 1.5
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub fixture: FixtureConfig,
    /// Passes each enforcer gets per round.
    pub steps: usize,
    pub max_rounds: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            fixture: FixtureConfig::default(),
            steps: 8,
            max_rounds: 16,
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&source).context("failed to parse config")?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// Summary of a finished run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Report {
    pub settled: bool,
    pub live_nodes: usize,
    pub grown_nodes: usize,
}

/// Holds the networks and the settings used to grow and constrain them.
///
/// ### Fields
/// - `networks` - The trees being enforced, one root each.
/// - `config` - Engine and fixture settings.
pub struct Scenario {
    networks: Vec<Tree>,
    config: CliConfig,
}

impl Scenario {
    /// Grows `fixture.networks` trees with roots spaced evenly on a circle
    /// of half the domain radius.
    ///
    /// The same seed always grows the same trees.
    pub fn new(config: CliConfig) -> Self {
        let f = config.fixture;
        let mut rng = StdRng::seed_from_u64(f.seed);
        let networks = (0..f.networks)
            .map(|i| {
                let angle = std::f64::consts::TAU * i as f64 / f.networks.max(1) as f64;
                let root = DVec3::new(angle.cos(), angle.sin(), 0.0) * (0.5 * f.domain_radius);
                Tree::random_growth(
                    root,
                    f.radius,
                    f.nodes_per_network,
                    f.step,
                    0.5 * f.domain_radius,
                    &mut rng,
                )
            })
            .collect();
        Self { networks, config }
    }

    pub fn networks(&self) -> &[Tree] {
        &self.networks
    }

    fn live_nodes(&self) -> usize {
        self.networks.iter().map(Tree::live_count).sum()
    }

    /// Alternates collision and domain enforcement until both are clean.
    ///
    /// ### Returns
    /// A [`Report`] on success, or an error if a root had to be culled.
    pub fn run(&mut self) -> anyhow::Result<Report> {
        let engine = self.config.engine;
        let grown_nodes = self.live_nodes();
        info!(
            networks = self.networks.len(),
            nodes = grown_nodes,
            seed = self.config.fixture.seed,
            "starting enforcement"
        );

        let mut collisions: Enforcer<Tree, CollisionDetector> = Enforcer::new(
            vec![CollisionDetector::new(CollisionMode::All, engine.tolerances)],
            Recorder::new(engine.recorder).with_immunity(expected_contact),
            engine.enforcer,
        );
        let mut domain: Enforcer<Tree, ImplicitDetector> = Enforcer::new(
            vec![ImplicitDetector::new(
                SphereField::new(DVec3::ZERO, self.config.fixture.domain_radius),
                &engine.implicit,
            )],
            Recorder::new(engine.recorder),
            engine.enforcer,
        );

        let mut enforcers: [&mut dyn Enforce<Tree>; 2] = [&mut collisions, &mut domain];
        let settled = iterate_to_end(
            &mut enforcers,
            &mut self.networks,
            self.config.steps,
            self.config.max_rounds,
        )
        .context("enforcement aborted")?;

        let report = Report {
            settled,
            live_nodes: self.live_nodes(),
            grown_nodes,
        };
        info!(
            settled,
            live = report.live_nodes,
            culled = grown_nodes - report.live_nodes,
            "enforcement finished"
        );
        Ok(report)
    }
}
