use std::sync::atomic::{AtomicBool, Ordering};

use conduit_core::cluster::{ClusterMember, ClusterServiceBinding, ClusterViewBinding, ViewNotifier};
use conduit_core::Result;
use parking_lot::Mutex;

/// Cluster binding for a single process.
///
/// There are no other members: the local member leads a namespace for as
/// long as its view is started.
#[derive(Debug, Clone, Default)]
pub struct LocalClusterService {
    member_id: Option<String>,
}

impl LocalClusterService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identify this process by `member_id` instead of the service id.
    pub fn with_member_id(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }
}

impl ClusterServiceBinding for LocalClusterService {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn create_view(&self, service_id: &str, namespace: &str) -> Result<Box<dyn ClusterViewBinding>> {
        Ok(Box::new(LocalClusterView {
            member_id: self.member_id.as_deref().unwrap_or(service_id).to_string(),
            namespace: namespace.to_string(),
            leader: AtomicBool::new(false),
            notifier: Mutex::new(None),
        }))
    }
}

struct LocalClusterView {
    member_id: String,
    namespace: String,
    leader: AtomicBool,
    notifier: Mutex<Option<ViewNotifier>>,
}

impl ClusterViewBinding for LocalClusterView {
    fn leader(&self) -> Option<ClusterMember> {
        if self.leader.load(Ordering::SeqCst) {
            Some(self.local_member())
        } else {
            None
        }
    }

    fn local_member(&self) -> ClusterMember {
        ClusterMember::local(&self.member_id, self.leader.load(Ordering::SeqCst))
    }

    fn members(&self) -> Vec<ClusterMember> {
        vec![self.local_member()]
    }

    fn do_start(&self, notifier: ViewNotifier) -> Result<()> {
        self.leader.store(true, Ordering::SeqCst);
        tracing::info!(namespace = %self.namespace, member = %self.member_id, "Became leader");
        notifier.fire_leadership_changed(Some(self.local_member()));
        *self.notifier.lock() = Some(notifier);
        Ok(())
    }

    fn do_stop(&self) -> Result<()> {
        self.leader.store(false, Ordering::SeqCst);
        tracing::info!(namespace = %self.namespace, member = %self.member_id, "Released leadership");
        let notifier = self.notifier.lock().take();
        if let Some(notifier) = notifier {
            notifier.fire_leadership_changed(None);
        }
        Ok(())
    }
}
