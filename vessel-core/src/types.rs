use glam::DVec3;

/// Identifier for a node in a [`crate::tree::Network`].
///
/// This is an index into the network's node storage, and is only
/// meaningful within the lifetime of a given network instance.
pub type NodeId = usize;

/// Position of a network within the slice handed to detectors and enforcers.
pub type NetworkId = usize;

/// Stable identity of a node across all networks of one run.
///
/// Positions change while corrections are applied, so accumulators are
/// keyed by this rather than by coordinates. Ordering is by network, then
/// node, which fixes the order actions are emitted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub network: NetworkId,
    pub node: NodeId,
}

impl NodeKey {
    pub const fn new(network: NetworkId, node: NodeId) -> Self {
        Self { network, node }
    }
}

/// Read-only snapshot of a node taken during detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRef {
    pub key: NodeKey,
    pub position: DVec3,
    pub radius: f64,
    /// Whether the node exposes the movable-position capability.
    pub movable: bool,
    /// Root/source nodes can never be culled.
    pub root: bool,
}
