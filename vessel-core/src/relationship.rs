/// Topological relation between the branches owning two segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BranchRelationship {
    /// No relationship set. Distinct from [`BranchRelationship::Disjoint`].
    #[default]
    None,
    /// Same network, but not comparable.
    Internal,
    /// The first segment lies upstream of the second.
    Upstream,
    /// The first segment lies downstream of the second.
    Downstream,
    /// Upstream, and the first segment ends where the second starts.
    Parent,
    /// Downstream, and the first segment starts where the second ends.
    Child,
    /// Not comparable, but both segments start at the same node.
    Sibling,
    /// Confirmed to have no relation (different networks).
    Disjoint,
    /// Crossover point from one network to a partnered one.
    Matched,
}

impl BranchRelationship {
    /// Relations whose segments touch by construction, so contact between
    /// them is not a violation.
    pub fn is_expected_contact(self) -> bool {
        matches!(
            self,
            BranchRelationship::Parent
                | BranchRelationship::Child
                | BranchRelationship::Sibling
                | BranchRelationship::Matched
        )
    }
}
