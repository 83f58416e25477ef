//! Scriptable in-memory cluster binding.
//!
//! Records how often views are created, started and stopped per namespace,
//! lets tests inject start/stop failures, and drives leadership by hand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cluster::{ClusterMember, ClusterServiceBinding, ClusterViewBinding, ViewNotifier};
use crate::error::{ConduitError, Result};

#[derive(Default)]
struct MockViewState {
    local_id: RwLock<String>,
    namespace: String,
    leader: RwLock<Option<String>>,
    remotes: RwLock<Vec<String>>,
    created: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_next_start: AtomicBool,
    fail_next_stop: AtomicBool,
    notifier: Mutex<Option<ViewNotifier>>,
}

/// Mock view binding. Clones share state.
#[derive(Clone, Default)]
pub struct MockViewBinding {
    state: Arc<MockViewState>,
}

impl MockViewBinding {
    pub fn new(local_id: &str, namespace: &str) -> Self {
        Self {
            state: Arc::new(MockViewState {
                local_id: RwLock::new(local_id.to_string()),
                namespace: namespace.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn start_count(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn fail_next_start(&self) {
        self.state.fail_next_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_stop(&self) {
        self.state.fail_next_stop.store(true, Ordering::SeqCst);
    }

    /// Change the leader and notify the view if it has been started.
    pub fn set_leader(&self, leader: Option<&str>) {
        *self.state.leader.write() = leader.map(str::to_string);
        let notifier = self.state.notifier.lock().clone();
        if let Some(notifier) = notifier {
            notifier.fire_leadership_changed(self.leader());
        }
    }

    /// Add a remote member and notify the view if it has been started.
    pub fn add_remote(&self, id: &str) {
        self.state.remotes.write().push(id.to_string());
        let notifier = self.state.notifier.lock().clone();
        if let Some(notifier) = notifier {
            notifier.fire_member_added(ClusterMember::remote(id, false));
        }
    }

    fn member(&self, id: &str) -> ClusterMember {
        let leader = self.state.leader.read().as_deref() == Some(id);
        let local = *self.state.local_id.read() == id;
        ClusterMember::new(id, leader, local)
    }
}

impl ClusterViewBinding for MockViewBinding {
    fn leader(&self) -> Option<ClusterMember> {
        let leader = self.state.leader.read().clone();
        leader.map(|id| self.member(&id))
    }

    fn local_member(&self) -> ClusterMember {
        let id = self.state.local_id.read().clone();
        self.member(&id)
    }

    fn members(&self) -> Vec<ClusterMember> {
        let mut members = vec![self.local_member()];
        let remotes = self.state.remotes.read().clone();
        members.extend(remotes.iter().map(|id| self.member(id)));
        members
    }

    fn do_start(&self, notifier: ViewNotifier) -> Result<()> {
        if self.state.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(ConduitError::Binding(format!(
                "injected start failure for {}",
                self.state.namespace
            )));
        }
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        *self.state.notifier.lock() = Some(notifier);
        Ok(())
    }

    fn do_stop(&self) -> Result<()> {
        if self.state.fail_next_stop.swap(false, Ordering::SeqCst) {
            return Err(ConduitError::Binding(format!(
                "injected stop failure for {}",
                self.state.namespace
            )));
        }
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct MockServiceState {
    views: Mutex<HashMap<String, MockViewBinding>>,
    fail_service_start: AtomicBool,
    service_starts: AtomicUsize,
    service_stops: AtomicUsize,
}

/// Mock cluster service binding. Clones share state, so a test can keep one
/// clone while the other is owned by a `ClusterService`.
///
/// # Example
///
/// ```ignore
/// let mock = MockClusterService::new();
/// let service = ClusterService::new("svc", mock.clone());
/// service.start()?;
/// let view = service.get_view("ns")?;
/// mock.set_leader("ns", Some("svc"));
/// assert_eq!(mock.starts("ns"), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockClusterService {
    state: Arc<MockServiceState>,
}

impl MockClusterService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding for `namespace`, created on demand so tests can script it
    /// before the view exists.
    pub fn view(&self, namespace: &str) -> MockViewBinding {
        self.state
            .views
            .lock()
            .entry(namespace.to_string())
            .or_insert_with(|| MockViewBinding::new("", namespace))
            .clone()
    }

    /// How many times `create_view` ran for `namespace`.
    pub fn created(&self, namespace: &str) -> usize {
        self.view(namespace).state.created.load(Ordering::SeqCst)
    }

    pub fn starts(&self, namespace: &str) -> usize {
        self.view(namespace).start_count()
    }

    pub fn stops(&self, namespace: &str) -> usize {
        self.view(namespace).stop_count()
    }

    pub fn fail_next_start(&self, namespace: &str) {
        self.view(namespace).fail_next_start();
    }

    pub fn fail_next_stop(&self, namespace: &str) {
        self.view(namespace).fail_next_stop();
    }

    pub fn set_leader(&self, namespace: &str, leader: Option<&str>) {
        self.view(namespace).set_leader(leader);
    }

    pub fn fail_service_start(&self) {
        self.state.fail_service_start.store(true, Ordering::SeqCst);
    }

    pub fn service_starts(&self) -> usize {
        self.state.service_starts.load(Ordering::SeqCst)
    }

    pub fn service_stops(&self) -> usize {
        self.state.service_stops.load(Ordering::SeqCst)
    }
}

impl ClusterServiceBinding for MockClusterService {
    fn kind(&self) -> &'static str {
        "mock"
    }

    fn create_view(
        &self,
        service_id: &str,
        namespace: &str,
    ) -> Result<Box<dyn ClusterViewBinding>> {
        let view = self.view(namespace);
        *view.state.local_id.write() = service_id.to_string();
        view.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(view))
    }

    fn do_start(&self) -> Result<()> {
        if self.state.fail_service_start.swap(false, Ordering::SeqCst) {
            return Err(ConduitError::Binding("injected service start failure".into()));
        }
        self.state.service_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn do_stop(&self) -> Result<()> {
        self.state.service_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_leader_before_view_exists() {
        let mock = MockClusterService::new();
        mock.set_leader("ns1", Some("svc"));

        let binding = mock.create_view("svc", "ns1").unwrap();
        assert!(binding.local_member().is_leader());
        assert_eq!(binding.leader().map(|m| m.id().to_string()), Some("svc".into()));
        assert_eq!(mock.created("ns1"), 1);
    }

    #[test]
    fn test_remote_members_are_listed() {
        let view = MockViewBinding::new("me", "ns1");
        view.add_remote("other");
        view.set_leader(Some("other"));

        let members = view.members();
        assert_eq!(members.len(), 2);
        assert!(members[0].is_local());
        assert!(members[1].is_leader());
        assert!(!view.local_member().is_leader());
    }
}
