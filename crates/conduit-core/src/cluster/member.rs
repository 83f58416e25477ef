/// A participant in a cluster namespace, as reported by a view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterMember {
    id: String,
    leader: bool,
    local: bool,
}

impl ClusterMember {
    /// Create a member descriptor.
    pub fn new(id: impl Into<String>, leader: bool, local: bool) -> Self {
        Self {
            id: id.into(),
            leader,
            local,
        }
    }

    /// Descriptor for this process' participation in a namespace.
    pub fn local(id: impl Into<String>, leader: bool) -> Self {
        Self::new(id, leader, true)
    }

    /// Descriptor for a member living in another process.
    pub fn remote(id: impl Into<String>, leader: bool) -> Self {
        Self::new(id, leader, false)
    }

    /// Member identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this member currently leads the namespace.
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Whether this member is the local process.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Copy of this descriptor with the leader flag replaced.
    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }
}

impl std::fmt::Display for ClusterMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_member() {
        let member = ClusterMember::local("node-1", false);
        assert_eq!(member.id(), "node-1");
        assert!(member.is_local());
        assert!(!member.is_leader());
    }

    #[test]
    fn test_with_leader() {
        let member = ClusterMember::remote("node-2", false).with_leader(true);
        assert!(member.is_leader());
        assert!(!member.is_local());
        assert_eq!(member.to_string(), "node-2");
    }
}
