use glam::DVec3;
use serde::Serialize;

use crate::types::NodeKey;

/// A change the recorder asks the tree to make.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    /// Move `node` from `from` to `from + delta`.
    Move {
        node: NodeKey,
        from: DVec3,
        delta: DVec3,
    },
    /// Remove `node` and everything downstream of it.
    Remove { node: NodeKey },
}

impl Action {
    pub fn node(&self) -> NodeKey {
        match *self {
            Action::Move { node, .. } | Action::Remove { node } => node,
        }
    }
}

/// Counters for one pass of one enforcer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    /// Violations found, excluding immune ones.
    pub violations: usize,
    pub immune: usize,
    /// Move actions emitted.
    pub corrections: usize,
    /// Remove actions emitted.
    pub culls: usize,
    /// Nodes culled because they cannot be moved.
    pub unsupported: usize,
    /// Predicate evaluations that failed on degenerate geometry.
    pub degenerate: usize,
}
