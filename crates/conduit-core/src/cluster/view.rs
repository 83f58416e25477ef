use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::event::{ClusterEvent, ClusterEventListener};
use super::member::ClusterMember;
use super::service::{ClusterService, ServiceInner};
use super::status::ServiceStatus;
use crate::error::{ConduitError, Result};

/// Technology-specific half of a view.
///
/// A cluster binding implements this to decide what leadership and membership
/// mean for one namespace. The hooks are never invoked concurrently for the
/// same view, and `do_start`/`do_stop` only run on an actual transition.
pub trait ClusterViewBinding: Send + Sync + 'static {
    /// Current leader, if known. Must not block.
    fn leader(&self) -> Option<ClusterMember>;

    /// This process' participation in the namespace.
    fn local_member(&self) -> ClusterMember;

    /// Every known member of the namespace.
    fn members(&self) -> Vec<ClusterMember>;

    /// Begin participating in the namespace. The notifier stays valid until
    /// the view is dropped and is how the binding reports changes.
    ///
    /// The view is marked running only after this returns `Ok`, so events
    /// fired from inside `do_start` reach listeners while
    /// [`ClusterView::is_running`] is still `false`.
    fn do_start(&self, notifier: ViewNotifier) -> Result<()>;

    /// Stop participating in the namespace.
    fn do_stop(&self) -> Result<()>;
}

/// Handle a binding uses to fire events on the view it backs.
#[derive(Clone)]
pub struct ViewNotifier {
    view: Weak<ViewInner>,
}

impl ViewNotifier {
    pub fn fire_leadership_changed(&self, leader: Option<ClusterMember>) {
        self.fire(ClusterEvent::LeadershipChanged(leader));
    }

    pub fn fire_member_added(&self, member: ClusterMember) {
        self.fire(ClusterEvent::MemberAdded(member));
    }

    pub fn fire_member_removed(&self, member: ClusterMember) {
        self.fire(ClusterEvent::MemberRemoved(member));
    }

    /// Deliver an event. A no-op once the view has been dropped.
    pub fn fire(&self, event: ClusterEvent) {
        if let Some(inner) = self.view.upgrade() {
            ClusterView { inner }.fire_event(&event);
        }
    }
}

impl std::fmt::Debug for ViewNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewNotifier")
            .field("attached", &(self.view.strong_count() > 0))
            .finish()
    }
}

pub(crate) struct ViewInner {
    namespace: String,
    service_id: String,
    service: Weak<ServiceInner>,
    binding: Box<dyn ClusterViewBinding>,
    /// Serializes every transition; holds the administratively pinned state.
    transition: Mutex<Option<bool>>,
    running: AtomicBool,
    refs: AtomicUsize,
    listeners: RwLock<Vec<ClusterEventListener>>,
}

/// A reference-counted, namespace-scoped handle onto a cluster service.
///
/// Handles are cheap to clone and all clones share state. Two handles are
/// equal when they belong to the same service id and namespace.
#[derive(Clone)]
pub struct ClusterView {
    inner: Arc<ViewInner>,
}

impl ClusterView {
    pub(crate) fn new(
        service: Weak<ServiceInner>,
        service_id: &str,
        namespace: &str,
        binding: Box<dyn ClusterViewBinding>,
    ) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                namespace: namespace.to_string(),
                service_id: service_id.to_string(),
                service,
                binding,
                transition: Mutex::new(None),
                running: AtomicBool::new(false),
                refs: AtomicUsize::new(0),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Id of the owning service.
    pub fn service_id(&self) -> &str {
        &self.inner.service_id
    }

    /// The owning service, or `None` once it has been dropped.
    pub fn cluster_service(&self) -> Option<ClusterService> {
        self.inner.service.upgrade().map(ClusterService::from_inner)
    }

    pub fn leader(&self) -> Option<ClusterMember> {
        self.inner.binding.leader()
    }

    pub fn local_member(&self) -> ClusterMember {
        self.inner.binding.local_member()
    }

    pub fn members(&self) -> Vec<ClusterMember> {
        self.inner.binding.members()
    }

    pub fn status(&self) -> ServiceStatus {
        if self.inner.running.load(Ordering::SeqCst) {
            ServiceStatus::Started
        } else {
            ServiceStatus::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of outstanding acquisitions.
    pub fn ref_count(&self) -> usize {
        self.inner.refs.load(Ordering::SeqCst)
    }

    /// Notifier bound to this view.
    pub fn notifier(&self) -> ViewNotifier {
        ViewNotifier {
            view: Arc::downgrade(&self.inner),
        }
    }

    pub fn add_event_listener(&self, listener: ClusterEventListener) {
        self.inner.listeners.write().push(listener);
    }

    /// Remove a previously added listener. No-op when it is not registered.
    pub fn remove_event_listener(&self, listener: &ClusterEventListener) {
        self.inner.listeners.write().retain(|l| !l.same_as(listener));
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    pub fn fire_leadership_changed(&self, leader: Option<ClusterMember>) {
        self.fire_event(&ClusterEvent::LeadershipChanged(leader));
    }

    fn fire_event(&self, event: &ClusterEvent) {
        // Snapshot so listeners can (un)register while an event is in flight.
        let listeners = self.inner.listeners.read().clone();
        tracing::trace!(
            namespace = %self.inner.namespace,
            listeners = listeners.len(),
            "Firing {:?}",
            event
        );
        for listener in &listeners {
            event.dispatch(self, listener);
        }
    }

    /// Acquire a reference; the first one starts the view when `run_allowed`.
    pub(crate) fn retain(&self, run_allowed: impl Fn() -> bool) -> Result<()> {
        let mut pinned = self.inner.transition.lock();
        let previous = self.inner.refs.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            namespace = %self.inner.namespace,
            refs = previous + 1,
            "Acquired view"
        );

        if previous == 0 {
            *pinned = None;
            if run_allowed() {
                if let Err(e) = self.start_locked() {
                    self.inner.refs.fetch_sub(1, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Drop a reference; the last one stops the view. Stop failures are
    /// logged, never returned.
    pub(crate) fn release(&self) {
        let mut pinned = self.inner.transition.lock();
        let current = self.inner.refs.load(Ordering::SeqCst);
        if current == 0 {
            tracing::warn!(
                namespace = %self.inner.namespace,
                "Released view more times than it was acquired"
            );
            return;
        }

        self.inner.refs.store(current - 1, Ordering::SeqCst);
        tracing::debug!(
            namespace = %self.inner.namespace,
            refs = current - 1,
            "Released view"
        );

        if current == 1 {
            *pinned = None;
            if let Err(e) = self.stop_locked() {
                tracing::warn!(
                    namespace = %self.inner.namespace,
                    "Failed to stop released view: {}",
                    e
                );
            }
        }
    }

    /// Administrative start; pins the view as started. `run_allowed` is
    /// evaluated under the transition lock.
    pub(crate) fn start_pinned(&self, run_allowed: impl Fn() -> bool) -> Result<()> {
        let mut pinned = self.inner.transition.lock();
        *pinned = Some(true);
        if run_allowed() {
            self.start_locked()
        } else {
            tracing::debug!(
                namespace = %self.inner.namespace,
                "Service not started, view will start with it"
            );
            Ok(())
        }
    }

    /// Administrative stop; pins the view as stopped.
    pub(crate) fn stop_pinned(&self) -> Result<()> {
        let mut pinned = self.inner.transition.lock();
        *pinned = Some(false);
        self.stop_locked()
    }

    /// Start as part of the owning service starting.
    pub(crate) fn start_with_service(&self) -> Result<()> {
        let pinned = self.inner.transition.lock();
        let wanted = pinned.unwrap_or(self.inner.refs.load(Ordering::SeqCst) > 0);
        if wanted {
            self.start_locked()
        } else {
            Ok(())
        }
    }

    /// Stop as part of the owning service stopping.
    pub(crate) fn stop_with_service(&self) -> Result<()> {
        let _pinned = self.inner.transition.lock();
        self.stop_locked()
    }

    /// Caller must hold the transition lock.
    fn start_locked(&self) -> Result<()> {
        if self.inner.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(
            service = %self.inner.service_id,
            namespace = %self.inner.namespace,
            "Starting view"
        );
        self.inner
            .binding
            .do_start(self.notifier())
            .map_err(|e| ConduitError::view_start(&self.inner.namespace, e))?;
        self.inner.running.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Caller must hold the transition lock.
    fn stop_locked(&self) -> Result<()> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(
            service = %self.inner.service_id,
            namespace = %self.inner.namespace,
            "Stopping view"
        );
        self.inner
            .binding
            .do_stop()
            .map_err(|e| ConduitError::view_stop(&self.inner.namespace, e))?;
        self.inner.running.store(false, Ordering::SeqCst);

        Ok(())
    }
}

impl PartialEq for ClusterView {
    fn eq(&self, other: &Self) -> bool {
        self.inner.service_id == other.inner.service_id
            && self.inner.namespace == other.inner.namespace
    }
}

impl Eq for ClusterView {}

impl std::hash::Hash for ClusterView {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.service_id.hash(state);
        self.inner.namespace.hash(state);
    }
}

impl std::fmt::Debug for ClusterView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterView")
            .field("service_id", &self.inner.service_id)
            .field("namespace", &self.inner.namespace)
            .field("status", &self.status())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::event::MembershipListener;
    use crate::testing::MockViewBinding;

    fn detached_view(namespace: &str) -> (ClusterView, MockViewBinding) {
        let binding = MockViewBinding::new("svc", namespace);
        let view = ClusterView::new(Weak::new(), "svc", namespace, Box::new(binding.clone()));
        (view, binding)
    }

    #[test]
    fn test_views_compare_by_service_and_namespace() {
        let (a, _) = detached_view("ns1");
        let (b, _) = detached_view("ns1");
        let (c, _) = detached_view("ns2");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let (view, binding) = detached_view("ns1");

        view.start_pinned(|| true).unwrap();
        view.start_pinned(|| true).unwrap();
        assert!(view.is_running());
        assert_eq!(binding.start_count(), 1);

        view.stop_pinned().unwrap();
        view.stop_pinned().unwrap();
        assert!(!view.is_running());
        assert_eq!(binding.stop_count(), 1);
    }

    #[test]
    fn test_failed_start_leaves_view_stopped() {
        let (view, binding) = detached_view("ns1");
        binding.fail_next_start();

        let err = view.start_pinned(|| true).unwrap_err();
        assert!(matches!(err, ConduitError::ViewStart { .. }));
        assert!(!view.is_running());

        view.start_pinned(|| true).unwrap();
        assert!(view.is_running());
    }

    #[test]
    fn test_failed_stop_leaves_view_started() {
        let (view, binding) = detached_view("ns1");
        view.start_pinned(|| true).unwrap();
        binding.fail_next_stop();

        let err = view.stop_pinned().unwrap_err();
        assert!(matches!(err, ConduitError::ViewStop { .. }));
        assert!(view.is_running());
    }

    #[test]
    fn test_release_swallows_stop_failure() {
        let (view, binding) = detached_view("ns1");
        view.retain(|| true).unwrap();
        binding.fail_next_stop();

        view.release();
        assert_eq!(view.ref_count(), 0);
        assert!(view.is_running());
    }

    #[test]
    fn test_over_release_keeps_count_at_zero() {
        let (view, _) = detached_view("ns1");
        view.retain(|| false).unwrap();
        view.release();
        view.release();

        assert_eq!(view.ref_count(), 0);
    }

    #[test]
    fn test_leadership_only_reaches_leadership_listeners() {
        struct Counting(Arc<AtomicUsize>);

        impl MembershipListener for Counting {
            fn member_added(&self, _view: &ClusterView, _member: &ClusterMember) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (view, _) = detached_view("ns1");
        let leadership_calls = Arc::new(AtomicUsize::new(0));
        let membership_calls = Arc::new(AtomicUsize::new(0));

        let counter = leadership_calls.clone();
        view.add_event_listener(ClusterEventListener::leadership(
            move |_: &ClusterView, leader: Option<&ClusterMember>| {
                assert_eq!(leader.map(|m| m.id()), Some("svc"));
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));
        view.add_event_listener(ClusterEventListener::membership(Counting(
            membership_calls.clone(),
        )));

        view.fire_leadership_changed(Some(ClusterMember::local("svc", true)));
        assert_eq!(leadership_calls.load(Ordering::SeqCst), 1);
        assert_eq!(membership_calls.load(Ordering::SeqCst), 0);

        view.notifier()
            .fire_member_added(ClusterMember::remote("other", false));
        assert_eq!(leadership_calls.load(Ordering::SeqCst), 1);
        assert_eq!(membership_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removed_listener_is_not_notified() {
        let (view, _) = detached_view("ns1");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = ClusterEventListener::leadership(
            move |_: &ClusterView, _: Option<&ClusterMember>| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        view.add_event_listener(listener.clone());
        view.remove_event_listener(&listener);
        view.remove_event_listener(&listener);
        view.fire_leadership_changed(None);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(view.listener_count(), 0);
    }

    #[test]
    fn test_listeners_change_registrations_during_fire() {
        let (view, _) = detached_view("ns1");
        let late_calls = Arc::new(AtomicUsize::new(0));
        let once_calls = Arc::new(AtomicUsize::new(0));

        // Registers a late listener on the first event only.
        let registered = Arc::new(AtomicBool::new(false));
        let late = late_calls.clone();
        view.add_event_listener(ClusterEventListener::leadership(
            move |view: &ClusterView, _: Option<&ClusterMember>| {
                if !registered.swap(true, Ordering::SeqCst) {
                    let late = late.clone();
                    view.add_event_listener(ClusterEventListener::leadership(
                        move |_: &ClusterView, _: Option<&ClusterMember>| {
                            late.fetch_add(1, Ordering::SeqCst);
                        },
                    ));
                }
            },
        ));

        // Removes itself from inside its own callback.
        let slot: Arc<Mutex<Option<ClusterEventListener>>> = Arc::new(Mutex::new(None));
        let own = slot.clone();
        let once = once_calls.clone();
        let self_removing = ClusterEventListener::leadership(
            move |view: &ClusterView, _: Option<&ClusterMember>| {
                once.fetch_add(1, Ordering::SeqCst);
                if let Some(listener) = own.lock().take() {
                    view.remove_event_listener(&listener);
                }
            },
        );
        *slot.lock() = Some(self_removing.clone());
        view.add_event_listener(self_removing);

        view.fire_leadership_changed(Some(ClusterMember::local("svc", true)));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(once_calls.load(Ordering::SeqCst), 1);
        assert_eq!(view.listener_count(), 2);

        view.fire_leadership_changed(None);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
        assert_eq!(once_calls.load(Ordering::SeqCst), 1);

        view.fire_leadership_changed(None);
        assert_eq!(late_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notifier_is_inert_after_view_dropped() {
        let (view, _) = detached_view("ns1");
        let notifier = view.notifier();
        drop(view);

        notifier.fire_leadership_changed(None);
    }

    #[test]
    fn test_detached_view_has_no_service() {
        let (view, _) = detached_view("ns1");
        assert!(view.cluster_service().is_none());
        assert_eq!(view.status(), ServiceStatus::Stopped);
    }
}
