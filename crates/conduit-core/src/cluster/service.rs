use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::status::ServiceStatus;
use super::view::{ClusterView, ClusterViewBinding};
use crate::error::{ConduitError, Result};

/// Order given to services that do not configure one (lowest priority).
pub const DEFAULT_ORDER: i32 = i32::MAX;

/// Technology-specific half of a cluster service.
pub trait ClusterServiceBinding: Send + Sync + 'static {
    /// Short implementation name used in logs, e.g. `"file"`.
    fn kind(&self) -> &'static str;

    /// Build the view binding for `namespace`. Called at most once per
    /// namespace for the lifetime of the owning service.
    fn create_view(&self, service_id: &str, namespace: &str)
        -> Result<Box<dyn ClusterViewBinding>>;

    /// Acquire service-wide resources. Runs before any view is started.
    fn do_start(&self) -> Result<()> {
        Ok(())
    }

    /// Release service-wide resources. Runs after every view was stopped.
    fn do_stop(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct ServiceInner {
    id: String,
    order: AtomicI32,
    attributes: RwLock<BTreeMap<String, String>>,
    status: RwLock<ServiceStatus>,
    /// Serializes service start and stop.
    lifecycle: Mutex<()>,
    views: Mutex<HashMap<String, ClusterView>>,
    binding: Arc<dyn ClusterServiceBinding>,
    binding_any: Arc<dyn Any + Send + Sync>,
    binding_type: TypeId,
}

/// A provider of leadership and membership information for namespaces.
///
/// Owns one view per namespace, starts a view when it is first acquired
/// while the service runs, and stops it when the last reference is released.
/// Cloning yields another handle onto the same service.
#[derive(Clone)]
pub struct ClusterService {
    inner: Arc<ServiceInner>,
}

impl ClusterService {
    /// Create a stopped service around a binding.
    pub fn new<B: ClusterServiceBinding>(id: impl Into<String>, binding: B) -> Self {
        let binding = Arc::new(binding);
        let binding_any: Arc<dyn Any + Send + Sync> = binding.clone();

        Self {
            inner: Arc::new(ServiceInner {
                id: id.into(),
                order: AtomicI32::new(DEFAULT_ORDER),
                attributes: RwLock::new(BTreeMap::new()),
                status: RwLock::new(ServiceStatus::Stopped),
                lifecycle: Mutex::new(()),
                views: Mutex::new(HashMap::new()),
                binding,
                binding_any,
                binding_type: TypeId::of::<B>(),
            }),
        }
    }

    /// Create a service with a random id.
    pub fn with_generated_id<B: ClusterServiceBinding>(binding: B) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), binding)
    }

    pub(crate) fn from_inner(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }

    /// Builder-style order setter.
    pub fn with_order(self, order: i32) -> Self {
        self.set_order(order);
        self
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> &'static str {
        self.inner.binding.kind()
    }

    pub fn order(&self) -> i32 {
        self.inner.order.load(Ordering::SeqCst)
    }

    pub fn set_order(&self, order: i32) {
        self.inner.order.store(order, Ordering::SeqCst);
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.inner.attributes.read().get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.attributes.write().insert(key.into(), value.into());
    }

    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.inner.attributes.read().clone()
    }

    pub fn status(&self) -> ServiceStatus {
        *self.inner.status.read()
    }

    fn is_run_allowed(&self) -> bool {
        self.status().is_run_allowed()
    }

    /// Downcast to the concrete binding.
    pub fn binding<T: ClusterServiceBinding>(&self) -> Option<Arc<T>> {
        self.inner.binding_any.clone().downcast::<T>().ok()
    }

    pub fn is_binding<T: ClusterServiceBinding>(&self) -> bool {
        self.inner.binding_type == TypeId::of::<T>()
    }

    pub(crate) fn binding_type_id(&self) -> TypeId {
        self.inner.binding_type
    }

    /// Acquire the view for `namespace`, creating it on first use.
    ///
    /// The first acquisition starts the view when the service is running.
    /// Every successful call must be paired with [`release_view`](Self::release_view).
    pub fn get_view(&self, namespace: &str) -> Result<ClusterView> {
        if namespace.is_empty() {
            return Err(ConduitError::InvalidArgument(
                "namespace must not be empty".to_string(),
            ));
        }

        let view = {
            let mut views = self.inner.views.lock();
            match views.get(namespace) {
                Some(view) => view.clone(),
                None => {
                    let binding = self.inner.binding.create_view(&self.inner.id, namespace)?;
                    let view = ClusterView::new(
                        Arc::downgrade(&self.inner),
                        &self.inner.id,
                        namespace,
                        binding,
                    );
                    tracing::debug!(
                        service = %self.inner.id,
                        namespace,
                        "Created view"
                    );
                    views.insert(namespace.to_string(), view.clone());
                    view
                }
            }
        };

        view.retain(|| self.is_run_allowed())?;
        Ok(view)
    }

    /// Give back a view obtained from [`get_view`](Self::get_view).
    ///
    /// Releasing the last reference stops the view; a failure to stop is
    /// logged rather than returned. Views of other services are ignored.
    pub fn release_view(&self, view: &ClusterView) {
        if view.service_id() != self.inner.id {
            tracing::warn!(
                service = %self.inner.id,
                owner = %view.service_id(),
                namespace = %view.namespace(),
                "Ignoring release of a view owned by another service"
            );
            return;
        }

        let tracked = self.inner.views.lock().get(view.namespace()).cloned();
        match tracked {
            Some(tracked) => tracked.release(),
            None => tracing::debug!(
                service = %self.inner.id,
                namespace = %view.namespace(),
                "Ignoring release of an untracked view"
            ),
        }
    }

    /// Start the view for `namespace` regardless of its reference count.
    ///
    /// The view only starts when the service itself runs; otherwise the
    /// request is remembered and honoured by the next service start.
    pub fn start_view(&self, namespace: &str) -> Result<()> {
        match self.tracked_view(namespace) {
            Some(view) => view.start_pinned(|| self.is_run_allowed()),
            None => Ok(()),
        }
    }

    /// Stop the view for `namespace` regardless of service status.
    pub fn stop_view(&self, namespace: &str) -> Result<()> {
        match self.tracked_view(namespace) {
            Some(view) => view.stop_pinned(),
            None => Ok(()),
        }
    }

    fn tracked_view(&self, namespace: &str) -> Option<ClusterView> {
        let view = self.inner.views.lock().get(namespace).cloned();
        if view.is_none() {
            tracing::debug!(
                service = %self.inner.id,
                namespace,
                "No view tracked for namespace"
            );
        }
        view
    }

    fn tracked_views(&self) -> Vec<ClusterView> {
        self.inner.views.lock().values().cloned().collect()
    }

    /// Namespaces with a tracked view.
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.inner.views.lock().keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// Whether the local member leads `namespace`.
    pub fn is_leader(&self, namespace: &str) -> Result<bool> {
        let view = self.get_view(namespace)?;
        let leader = view.local_member().is_leader();
        self.release_view(&view);
        Ok(leader)
    }

    /// Start the service and every view that has references or was pinned
    /// as started. No-op when already started.
    pub fn start(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock();
        if self.status() == ServiceStatus::Started {
            return Ok(());
        }

        tracing::info!(
            service = %self.inner.id,
            kind = self.kind(),
            "Starting cluster service"
        );
        self.inner.binding.do_start()?;
        self.set_status(ServiceStatus::Starting);

        for view in self.tracked_views() {
            if let Err(e) = view.start_with_service() {
                tracing::warn!(
                    service = %self.inner.id,
                    namespace = %view.namespace(),
                    "Aborting service start: {}",
                    e
                );
                self.abort_start();
                return Err(e);
            }
        }

        self.set_status(ServiceStatus::Started);
        Ok(())
    }

    fn abort_start(&self) {
        self.set_status(ServiceStatus::Stopping);
        for view in self.tracked_views() {
            if let Err(e) = view.stop_with_service() {
                tracing::warn!(
                    service = %self.inner.id,
                    namespace = %view.namespace(),
                    "Failed to stop view: {}",
                    e
                );
            }
        }
        if let Err(e) = self.inner.binding.do_stop() {
            tracing::warn!(service = %self.inner.id, "Failed to stop cluster service: {}", e);
        }
        self.set_status(ServiceStatus::Stopped);
    }

    /// Stop every view, then the service. Views stay tracked with their
    /// reference counts. Every view is attempted; the first failure is
    /// returned.
    pub fn stop(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock();
        if self.status() == ServiceStatus::Stopped {
            return Ok(());
        }

        tracing::info!(service = %self.inner.id, "Stopping cluster service");
        self.set_status(ServiceStatus::Stopping);

        let mut first_error = None;
        for view in self.tracked_views() {
            if let Err(e) = view.stop_with_service() {
                tracing::warn!(
                    service = %self.inner.id,
                    namespace = %view.namespace(),
                    "Failed to stop view: {}",
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.inner.binding.do_stop() {
            first_error.get_or_insert(e);
        }

        self.set_status(ServiceStatus::Stopped);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn set_status(&self, status: ServiceStatus) {
        *self.inner.status.write() = status;
    }
}

impl std::fmt::Debug for ClusterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterService")
            .field("id", &self.inner.id)
            .field("kind", &self.kind())
            .field("order", &self.order())
            .field("status", &self.status())
            .finish()
    }
}

impl std::fmt::Display for ClusterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.inner.id, self.kind())
    }
}
