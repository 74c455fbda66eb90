//! The tree collaborator.
//!
//! The engine only needs to read node geometry, move nodes and prune
//! subtrees; [`Network`] and [`NetworkMut`] capture exactly that. [`Tree`]
//! is a small index-addressed implementation used by the tests and the CLI.

use glam::DVec3;
use rand::Rng;

use crate::{
    segment::Segment,
    types::{NetworkId, NodeId, NodeKey, NodeRef},
};

/// Read access to one vascular network.
pub trait Network: Sync {
    fn root(&self) -> NodeId;

    /// Live nodes in ascending order.
    fn node_ids(&self) -> Vec<NodeId>;

    fn contains(&self, id: NodeId) -> bool;

    fn position(&self, id: NodeId) -> DVec3;

    fn radius(&self, id: NodeId) -> f64;

    fn parent(&self, id: NodeId) -> Option<NodeId>;

    fn children(&self, id: NodeId) -> &[NodeId];

    /// Whether the node can be repositioned. Non-movable nodes are culled
    /// when a violation would move them.
    fn is_movable(&self, id: NodeId) -> bool;

    fn is_terminal(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    /// Terminals in other networks that this terminal is matched with.
    fn partners(&self, _id: NodeId) -> &[NodeKey] {
        &[]
    }

    /// Terminals at or below `id`.
    fn downstream_terminals(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let children = self.children(n);
            if children.is_empty() {
                out.push(n);
            }
            stack.extend_from_slice(children);
        }
        out
    }

    fn node_ref(&self, network: NetworkId, id: NodeId) -> NodeRef {
        NodeRef {
            key: NodeKey::new(network, id),
            position: self.position(id),
            radius: self.radius(id),
            movable: self.is_movable(id),
            root: id == self.root(),
        }
    }

    /// One segment per live non-root node, running from its parent to it.
    fn segments(&self, network: NetworkId) -> Vec<Segment> {
        self.node_ids()
            .into_iter()
            .filter_map(|id| {
                let parent = self.parent(id)?;
                Some(Segment::new(
                    self.node_ref(network, parent),
                    self.node_ref(network, id),
                    self.radius(id),
                ))
            })
            .collect()
    }

    /// Walks up from `node` looking for `ancestor`.
    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.parent(node) {
                Some(p) => node = p,
                None => return false,
            }
        }
    }
}

/// Mutation hooks used when applying actions.
pub trait NetworkMut: Network {
    fn set_position(&mut self, id: NodeId, position: DVec3);

    /// Refreshes derived geometry after a batch of moves.
    fn recompute(&mut self) {}

    /// Removes `id` and every node downstream of it.
    fn remove_subtree(&mut self, id: NodeId);
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub pos: DVec3,
    pub radius: f64,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub movable: bool,
    pub alive: bool,
    pub partners: Vec<NodeKey>,
}

impl TreeNode {
    pub fn new_root(pos: DVec3, radius: f64) -> Self {
        Self {
            pos,
            radius,
            parent: None,
            children: Vec::with_capacity(4),
            movable: false,
            alive: true,
            partners: Vec::new(),
        }
    }

    pub fn new_child(pos: DVec3, radius: f64, parent: NodeId) -> Self {
        Self {
            pos,
            radius,
            parent: Some(parent),
            children: Vec::with_capacity(4),
            movable: true,
            alive: true,
            partners: Vec::new(),
        }
    }
}

/// Index-addressed tree. Removed nodes stay in storage marked dead so
/// indices remain stable.
#[derive(Debug, Clone)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn new(root_pos: DVec3, root_radius: f64) -> Self {
        Self {
            nodes: vec![TreeNode::new_root(root_pos, root_radius)],
        }
    }

    pub fn add_child(&mut self, parent: NodeId, pos: DVec3, radius: f64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TreeNode::new_child(pos, radius, parent));
        self.nodes[parent].children.push(id);
        id
    }

    pub fn set_movable(&mut self, id: NodeId, movable: bool) {
        self.nodes[id].movable = movable;
    }

    /// Records that terminal `id` is matched with `partner`.
    pub fn add_partner(&mut self, id: NodeId, partner: NodeKey) {
        let partners = &mut self.nodes[id].partners;
        if !partners.contains(&partner) {
            partners.push(partner);
        }
    }

    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.alive).count()
    }

    pub fn find_nearest_node(&self, pos: DVec3) -> Option<(NodeId, f64)> {
        let mut best = None;
        let mut best_d2 = f64::MAX;
        for (id, n) in self.nodes.iter().enumerate().filter(|(_, n)| n.alive) {
            let d2 = (n.pos - pos).length_squared();
            if d2 < best_d2 {
                best_d2 = d2;
                best = Some(id);
            }
        }
        best.map(|id| (id, best_d2))
    }

    /// Grows `count` nodes by repeatedly sampling a target inside a ball of
    /// `domain_radius` around the root and stepping `step` towards it from
    /// the nearest live node.
    ///
    /// Nothing prevents the result from self-intersecting; that is what the
    /// enforcers are for.
    pub fn random_growth(
        root_pos: DVec3,
        radius: f64,
        count: usize,
        step: f64,
        domain_radius: f64,
        rng: &mut impl Rng,
    ) -> Self {
        let mut tree = Self::new(root_pos, radius);
        let mut attempts = 0;
        while tree.nodes.len() <= count && attempts < count * 16 {
            attempts += 1;
            let target = root_pos
                + DVec3::new(
                    rng.random_range(-domain_radius..=domain_radius),
                    rng.random_range(-domain_radius..=domain_radius),
                    rng.random_range(-domain_radius..=domain_radius),
                );
            let Some((near, d2)) = tree.find_nearest_node(target) else {
                break;
            };
            if d2 <= step * step {
                continue;
            }
            let dir = (target - tree.nodes[near].pos).normalize_or_zero();
            tree.add_child(near, tree.nodes[near].pos + dir * step, radius);
        }
        tree
    }
}

impl Network for Tree {
    fn root(&self) -> NodeId {
        0
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, n)| n.alive.then_some(id))
            .collect()
    }

    fn contains(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.alive)
    }

    fn position(&self, id: NodeId) -> DVec3 {
        self.nodes[id].pos
    }

    fn radius(&self, id: NodeId) -> f64 {
        self.nodes[id].radius
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    fn is_movable(&self, id: NodeId) -> bool {
        self.nodes[id].movable
    }

    fn partners(&self, id: NodeId) -> &[NodeKey] {
        &self.nodes[id].partners
    }
}

impl NetworkMut for Tree {
    fn set_position(&mut self, id: NodeId, position: DVec3) {
        self.nodes[id].pos = position;
    }

    fn remove_subtree(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent {
            self.nodes[parent].children.retain(|&c| c != id);
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let node = &mut self.nodes[n];
            node.alive = false;
            stack.append(&mut node.children);
        }
    }
}
