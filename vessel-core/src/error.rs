use std::path::PathBuf;

use crate::types::{NetworkId, NodeId};

/// Errors raised by predicates and by the resolution loop.
///
/// Only [`EnforceError::RootCulled`] aborts a run. Degenerate geometry is
/// reported per predicate evaluation and the pass carries on without it.
#[derive(Debug, thiserror::Error)]
pub enum EnforceError {
    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry { reason: &'static str },

    #[error("root node {node} of network {network} was requested for culling")]
    RootCulled { network: NetworkId, node: NodeId },
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type EnforceResult<T> = Result<T, EnforceError>;
