use std::collections::BTreeMap;

use glam::DVec3;

use crate::types::NodeKey;

/// Accumulated correction for one node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrectionRequest {
    /// Position of the node when the first request arrived.
    pub position: DVec3,
    /// Sum of all requested displacements.
    pub sum: DVec3,
    /// Number of requests added.
    pub count: u32,
}

impl CorrectionRequest {
    /// Mean requested displacement.
    #[inline]
    pub fn mean(&self) -> DVec3 {
        if self.count == 0 {
            DVec3::ZERO
        } else {
            self.sum / f64::from(self.count)
        }
    }
}

/// A per-pass buffer that accumulates correction displacements per node.
///
/// For each [`NodeKey`], this buffer stores:
///
/// - The sum of all requested displacements.
/// - The number of requests that were added.
///
/// so that several violations touching the same node combine into their
/// **mean** displacement. Entries are kept in key order, which makes
/// iteration (and therefore the emitted actions) deterministic.
#[derive(Debug, Default, Clone)]
pub struct CorrectionBuffer {
    entries: BTreeMap<NodeKey, CorrectionRequest>,
}

impl CorrectionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all accumulated requests.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Adds one displacement request for the given node.
    ///
    /// `position` is only recorded for the first request; later requests
    /// in the same pass see the same snapshot.
    ///
    /// ### Parameters
    /// - `key` - Node to accumulate the request for.
    /// - `position` - Node position at detection time.
    /// - `delta` - Requested displacement.
    #[inline]
    pub fn add(&mut self, key: NodeKey, position: DVec3, delta: DVec3) {
        let entry = self.entries.entry(key).or_insert(CorrectionRequest {
            position,
            sum: DVec3::ZERO,
            count: 0,
        });
        entry.sum += delta;
        entry.count += 1;
    }

    /// Returns the mean requested displacement for a node.
    ///
    /// ### Returns
    /// The mean displacement, or `DVec3::ZERO` if the node has no requests.
    #[inline]
    pub fn mean(&self, key: &NodeKey) -> DVec3 {
        self.entries.get(key).map_or(DVec3::ZERO, CorrectionRequest::mean)
    }

    #[inline]
    pub fn is_requested(&self, key: &NodeKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Drops a node's requests, e.g. because it is being culled instead.
    pub fn remove(&mut self, key: &NodeKey) -> Option<CorrectionRequest> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeKey, &CorrectionRequest)> {
        self.entries.iter()
    }
}
