use std::sync::Arc;

use super::member::ClusterMember;
use super::view::ClusterView;

/// Receives leadership changes of a view.
pub trait LeadershipListener: Send + Sync {
    /// Called with the new leader, or `None` when the namespace has no known leader.
    fn leadership_changed(&self, view: &ClusterView, leader: Option<&ClusterMember>);
}

impl<F> LeadershipListener for F
where
    F: Fn(&ClusterView, Option<&ClusterMember>) + Send + Sync,
{
    fn leadership_changed(&self, view: &ClusterView, leader: Option<&ClusterMember>) {
        self(view, leader)
    }
}

/// Receives membership changes of a view.
pub trait MembershipListener: Send + Sync {
    fn member_added(&self, _view: &ClusterView, _member: &ClusterMember) {}

    fn member_removed(&self, _view: &ClusterView, _member: &ClusterMember) {}
}

/// A listener registered on a view, tagged by the events it accepts.
#[derive(Clone)]
pub enum ClusterEventListener {
    Leadership(Arc<dyn LeadershipListener>),
    Membership(Arc<dyn MembershipListener>),
}

impl ClusterEventListener {
    /// Wrap a leadership listener (closures included).
    pub fn leadership<L: LeadershipListener + 'static>(listener: L) -> Self {
        Self::Leadership(Arc::new(listener))
    }

    /// Wrap a membership listener.
    pub fn membership<L: MembershipListener + 'static>(listener: L) -> Self {
        Self::Membership(Arc::new(listener))
    }

    /// Identity comparison: true when both wrap the same listener allocation.
    pub fn same_as(&self, other: &ClusterEventListener) -> bool {
        match (self, other) {
            (Self::Leadership(a), Self::Leadership(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Self::Membership(a), Self::Membership(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Leadership(_) => "leadership",
            Self::Membership(_) => "membership",
        }
    }
}

impl std::fmt::Debug for ClusterEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClusterEventListener")
            .field(&self.kind())
            .finish()
    }
}

/// An event delivered to the listeners of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    LeadershipChanged(Option<ClusterMember>),
    MemberAdded(ClusterMember),
    MemberRemoved(ClusterMember),
}

impl ClusterEvent {
    /// Deliver this event to `listener` if it has the matching capability.
    pub(crate) fn dispatch(&self, view: &ClusterView, listener: &ClusterEventListener) {
        match (self, listener) {
            (Self::LeadershipChanged(leader), ClusterEventListener::Leadership(l)) => {
                l.leadership_changed(view, leader.as_ref())
            }
            (Self::MemberAdded(member), ClusterEventListener::Membership(l)) => {
                l.member_added(view, member)
            }
            (Self::MemberRemoved(member), ClusterEventListener::Membership(l)) => {
                l.member_removed(view, member)
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl MembershipListener for Noop {}

    #[test]
    fn test_same_as_compares_identity() {
        let a = ClusterEventListener::leadership(|_: &ClusterView, _: Option<&ClusterMember>| {});
        let b = ClusterEventListener::leadership(|_: &ClusterView, _: Option<&ClusterMember>| {});
        let a2 = a.clone();

        assert!(a.same_as(&a2));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_capabilities_never_match_each_other() {
        let leadership =
            ClusterEventListener::leadership(|_: &ClusterView, _: Option<&ClusterMember>| {});
        let membership = ClusterEventListener::membership(Noop);

        assert!(!leadership.same_as(&membership));
        assert_eq!(leadership.kind(), "leadership");
        assert_eq!(membership.kind(), "membership");
    }
}
