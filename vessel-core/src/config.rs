use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default values shared by [`Default`] impls and the TOML loader.
pub mod defaults {
    pub const PARALLEL_SIN2: f64 = 1.0e-8;
    pub const COAXIAL_DISTANCE2: f64 = 1.0e-12;
    pub const NORMAL_TOL2: f64 = 1.0e-10;

    pub const IMMEDIATE_CULL: f64 = f64::INFINITY;
    pub const AGGRESSION_FACTOR: f64 = 1.25;
    pub const RADIAL_CAPTURE_FRACTION: f64 = 1.25;
    pub const MINIMUM_PERTURBATION: f64 = 0.0;

    pub const MAX_PASSES: usize = 32;
}

/// Thresholds used by the geometric predicates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Below this value of sin²θ two segments are treated as parallel.
    pub parallel_sin2: f64,
    /// Below this squared separation parallel segments are treated as coaxial.
    pub coaxial_distance2: f64,
    /// Minimum squared length of a generated normal before it is rejected.
    pub normal_tol2: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            parallel_sin2: defaults::PARALLEL_SIN2,
            coaxial_distance2: defaults::COAXIAL_DISTANCE2,
            normal_tol2: defaults::NORMAL_TOL2,
        }
    }
}

/// How the recorder turns violations into actions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Violations whose severity reaches this value are culled without
    /// attempting a correction.
    pub immediate_cull: f64,
    /// Cull a node when a new request opposes its pending mean correction.
    pub cull_if_surrounded: bool,
    /// Corrections shorter than this are lifted to this length. Zero disables.
    pub minimum_perturbation: f64,
    /// Move further than the measured overlap, in case vessels expand.
    pub aggression_factor: f64,
    /// Number of radii from a segment end within which a contact moves that end.
    pub radial_capture_fraction: f64,
    /// Give the whole push to one side when the other side cannot move.
    pub reset_stationary_fractions: bool,
    /// Always cull segments that leave a bounding surface instead of moving them back.
    pub cull_outward: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            immediate_cull: defaults::IMMEDIATE_CULL,
            cull_if_surrounded: true,
            minimum_perturbation: defaults::MINIMUM_PERTURBATION,
            aggression_factor: defaults::AGGRESSION_FACTOR,
            radial_capture_fraction: defaults::RADIAL_CAPTURE_FRACTION,
            reset_stationary_fractions: true,
            cull_outward: false,
        }
    }
}

/// Loop-level switches for an [`crate::enforcer::Enforcer`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    /// Pass budget used by [`crate::enforcer::Enforcer::resolve`].
    pub max_passes: usize,
    /// Apply move actions.
    pub change_geometry: bool,
    /// Apply remove actions.
    pub culling_permitted: bool,
    /// When a subtree is removed, also remove the terminals its terminals
    /// are matched with.
    pub cull_matched: bool,
    /// Feed detector output to the recorder in job order rather than
    /// as each parallel job finishes.
    pub ordered_aggregation: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            max_passes: defaults::MAX_PASSES,
            change_geometry: true,
            culling_permitted: true,
            cull_matched: true,
            ordered_aggregation: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitConfig {
    /// If true, f(x) = threshold is not a violation.
    pub allow_marginal: bool,
}

/// Complete engine configuration, usually loaded from TOML.
///
/// ```toml
/// [recorder]
/// aggression_factor = 1.5
/// minimum_perturbation = 0.01
///
/// [enforcer]
/// max_passes = 64
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tolerances: ToleranceConfig,
    pub recorder: RecorderConfig,
    pub enforcer: EnforcerConfig,
    pub implicit: ImplicitConfig,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tolerances;
        positive("tolerances.parallel_sin2", t.parallel_sin2)?;
        positive("tolerances.coaxial_distance2", t.coaxial_distance2)?;
        positive("tolerances.normal_tol2", t.normal_tol2)?;

        let r = &self.recorder;
        if r.immediate_cull.is_nan() || r.immediate_cull < 0.0 {
            return Err(invalid("recorder.immediate_cull", "must be non-negative"));
        }
        if !(r.minimum_perturbation.is_finite() && r.minimum_perturbation >= 0.0) {
            return Err(invalid(
                "recorder.minimum_perturbation",
                "must be finite and non-negative",
            ));
        }
        if !(r.aggression_factor.is_finite() && r.aggression_factor >= 1.0) {
            return Err(invalid("recorder.aggression_factor", "must be at least 1"));
        }
        if !(r.radial_capture_fraction.is_finite() && r.radial_capture_fraction >= 1.0) {
            return Err(invalid(
                "recorder.radial_capture_fraction",
                "must be at least 1",
            ));
        }

        if self.enforcer.max_passes == 0 {
            return Err(invalid("enforcer.max_passes", "must be at least 1"));
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, "must be finite and positive"))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}
