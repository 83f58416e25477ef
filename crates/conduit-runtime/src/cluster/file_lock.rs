use std::cell::RefCell;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use conduit_core::cluster::{ClusterMember, ClusterServiceBinding, ClusterViewBinding, ViewNotifier};
use conduit_core::config::ServiceConfig;
use conduit_core::{ConduitError, Result};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lease file configuration.
#[derive(Debug, Clone)]
pub struct FileLockConfig {
    /// Directory holding one lease file per namespace.
    pub root: PathBuf,
    /// Delay before the first acquisition attempt after a view starts.
    pub acquire_lock_delay: Duration,
    /// How often the lease is refreshed or checked.
    pub acquire_lock_interval: Duration,
    /// Lease duration (the holder must refresh before expiry).
    pub lease_duration: Duration,
}

impl FileLockConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            acquire_lock_delay: Duration::from_secs(1),
            acquire_lock_interval: Duration::from_secs(10),
            lease_duration: Duration::from_secs(30),
        }
    }

    /// Build from a `kind = "file"` service entry.
    pub fn from_service_config(config: &ServiceConfig) -> Result<Self> {
        let root = config.root.clone().ok_or_else(|| {
            ConduitError::Config("file cluster service requires 'root'".to_string())
        })?;

        Ok(Self {
            root,
            acquire_lock_delay: config.acquire_lock_delay(),
            acquire_lock_interval: config.acquire_lock_interval(),
            lease_duration: config.lease_duration(),
        })
    }

    /// Path of the lease file for `namespace`.
    pub fn lease_path(&self, namespace: &str) -> PathBuf {
        let file_name: String = namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{}.lock", file_name))
    }
}

/// Contents of a lease file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub member_id: String,
    pub acquired_at: DateTime<Utc>,
    pub lease_until: DateTime<Utc>,
}

impl Lease {
    fn new(member_id: &str, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            member_id: member_id.to_string(),
            acquired_at: now,
            lease_until: now + to_chrono(duration),
        }
    }

    fn renewed(&self, duration: Duration) -> Self {
        Self {
            member_id: self.member_id.clone(),
            acquired_at: self.acquired_at,
            lease_until: Utc::now() + to_chrono(duration),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.lease_until > now
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis() as i64)
}

/// What a read of the lease file found.
enum LeaseFile {
    Vacant,
    Unreadable,
    Held(Lease),
}

/// Cluster binding backed by lease files in a shared directory.
///
/// Every member pointing at the same `root` competes for
/// `<root>/<namespace>.lock`. The holder refreshes the lease on each
/// interval; standbys take it over once it is absent or expired.
pub struct FileLockClusterService {
    config: FileLockConfig,
    runtime: Handle,
    member_id: Option<String>,
}

impl FileLockClusterService {
    /// Create the binding on the current tokio runtime.
    pub fn new(config: FileLockConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            ConduitError::Config(
                "file cluster service must be created inside a tokio runtime".to_string(),
            )
        })?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Create the binding on an explicit runtime.
    pub fn with_runtime(config: FileLockConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            member_id: None,
        }
    }

    /// Identify this process by `member_id` instead of the service id.
    pub fn with_member_id(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    pub fn config(&self) -> &FileLockConfig {
        &self.config
    }

    /// Read the current lease for `namespace`, if any.
    pub fn read_lease(&self, namespace: &str) -> Result<Option<Lease>> {
        match std::fs::read(self.config.lease_path(namespace)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ConduitError::Serialization(e.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ClusterServiceBinding for FileLockClusterService {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn create_view(&self, service_id: &str, namespace: &str) -> Result<Box<dyn ClusterViewBinding>> {
        Ok(Box::new(FileLockView {
            state: Arc::new(LeaseState {
                member_id: self.member_id.as_deref().unwrap_or(service_id).to_string(),
                namespace: namespace.to_string(),
                path: self.config.lease_path(namespace),
                config: self.config.clone(),
                leader: RwLock::new(None),
                generation: AtomicU64::new(0),
                events: ReentrantMutex::new(RefCell::new(None)),
            }),
            runtime: self.runtime.clone(),
            task: Mutex::new(None),
        }))
    }

    fn do_start(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.root)?;
        tracing::debug!(root = %self.config.root.display(), "Lease directory ready");
        Ok(())
    }
}

struct LeaseTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct FileLockView {
    state: Arc<LeaseState>,
    runtime: Handle,
    task: Mutex<Option<LeaseTask>>,
}

struct LeaseState {
    member_id: String,
    namespace: String,
    path: PathBuf,
    config: FileLockConfig,
    /// Last observed holder.
    leader: RwLock<Option<String>>,
    /// Bumped on every start and stop; stale pollers drop their results.
    generation: AtomicU64,
    /// Notifier of the running view. Held while events are delivered so a
    /// stop cannot interleave with delivery; reentrant so a listener may stop
    /// the view from its callback.
    events: ReentrantMutex<RefCell<Option<ViewNotifier>>>,
}

impl LeaseState {
    fn member(&self, id: &str) -> ClusterMember {
        ClusterMember::new(id, true, id == self.member_id)
    }

    fn is_local_leader(&self) -> bool {
        self.leader.read().as_deref() == Some(self.member_id.as_str())
    }

    async fn read(&self) -> Result<LeaseFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(lease) => Ok(LeaseFile::Held(lease)),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "Unreadable lease file: {}", e);
                    Ok(LeaseFile::Unreadable)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LeaseFile::Vacant),
            Err(e) => Err(e.into()),
        }
    }

    /// Holder of a valid lease, if any.
    async fn current_holder(&self) -> Result<Option<String>> {
        match self.read().await? {
            LeaseFile::Held(lease) if lease.is_valid_at(Utc::now()) => Ok(Some(lease.member_id)),
            _ => Ok(None),
        }
    }

    fn temp_path(&self) -> PathBuf {
        self.path
            .with_extension(format!("lock.{}.tmp", uuid::Uuid::new_v4().simple()))
    }

    async fn write_temp(&self, lease: &Lease) -> Result<PathBuf> {
        let bytes =
            serde_json::to_vec(lease).map_err(|e| ConduitError::Serialization(e.to_string()))?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes).await?;
        Ok(temp)
    }

    /// Replace the lease file atomically.
    async fn write_lease(&self, lease: &Lease) -> Result<()> {
        let temp = self.write_temp(lease).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Create the lease file only if none exists. Returns false if another
    /// member got there first.
    async fn create_lease(&self, lease: &Lease) -> Result<bool> {
        let temp = self.write_temp(lease).await?;
        let linked = tokio::fs::hard_link(&temp, &self.path).await;
        let _ = tokio::fs::remove_file(&temp).await;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// One poll: refresh our lease or try to take a free one, then report
    /// who holds it.
    async fn check(&self) -> Result<Option<String>> {
        let lease_duration = self.config.lease_duration;

        match self.read().await? {
            LeaseFile::Held(lease) if lease.member_id == self.member_id => {
                self.write_lease(&lease.renewed(lease_duration)).await?;
            }
            LeaseFile::Held(lease) if lease.is_valid_at(Utc::now()) => {
                return Ok(Some(lease.member_id));
            }
            LeaseFile::Held(lease) => {
                tracing::debug!(
                    namespace = %self.namespace,
                    previous = %lease.member_id,
                    "Taking over expired lease"
                );
                self.write_lease(&Lease::new(&self.member_id, lease_duration))
                    .await?;
            }
            LeaseFile::Unreadable => {
                self.write_lease(&Lease::new(&self.member_id, lease_duration))
                    .await?;
            }
            LeaseFile::Vacant => {
                self.create_lease(&Lease::new(&self.member_id, lease_duration))
                    .await?;
            }
        }

        // Whoever wrote last owns the lease.
        self.current_holder().await
    }

    /// Record the poll result and fire events if it changed.
    fn observe(&self, generation: u64, observed: Option<String>) {
        let events = self.events.lock();
        let is_current = || self.generation.load(Ordering::SeqCst) == generation;

        let previous = {
            let mut leader = self.leader.write();
            if !is_current() || *leader == observed {
                return;
            }
            std::mem::replace(&mut *leader, observed.clone())
        };

        match (&previous, &observed) {
            (_, Some(id)) if *id == self.member_id => {
                tracing::info!(namespace = %self.namespace, member = %id, "Became leader");
            }
            (Some(id), _) if *id == self.member_id => {
                tracing::info!(namespace = %self.namespace, member = %id, "Lost leadership");
            }
            _ => {
                tracing::debug!(
                    namespace = %self.namespace,
                    leader = ?observed,
                    "Observed leader change"
                );
            }
        }

        let Some(notifier) = events.borrow().clone() else {
            return;
        };
        // A listener may stop the view between two deliveries.
        if let Some(id) = previous.filter(|id| *id != self.member_id) {
            if !is_current() {
                return;
            }
            notifier.fire_member_removed(ClusterMember::remote(id, false));
        }
        if let Some(id) = observed.as_deref().filter(|id| *id != self.member_id) {
            if !is_current() {
                return;
            }
            notifier.fire_member_added(ClusterMember::remote(id, true));
        }
        if is_current() {
            notifier.fire_leadership_changed(observed.as_deref().map(|id| self.member(id)));
        }
    }

    /// Delete the lease file if this member holds it.
    fn release(&self) -> Result<()> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Lease>(&bytes) {
            Ok(lease) if lease.member_id == self.member_id => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            _ => Ok(()),
        }
    }

    async fn run(self: Arc<Self>, generation: u64, mut shutdown_rx: watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.acquire_lock_delay) => {}
            _ = shutdown_rx.changed() => return,
        }

        loop {
            match self.check().await {
                Ok(observed) => self.observe(generation, observed),
                Err(e) => {
                    tracing::warn!(namespace = %self.namespace, "Failed to check lease: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.acquire_lock_interval) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        tracing::debug!(namespace = %self.namespace, "Lease poller shutting down");
    }
}

impl ClusterViewBinding for FileLockView {
    fn leader(&self) -> Option<ClusterMember> {
        self.state
            .leader
            .read()
            .as_deref()
            .map(|id| self.state.member(id))
    }

    fn local_member(&self) -> ClusterMember {
        ClusterMember::local(&self.state.member_id, self.state.is_local_leader())
    }

    fn members(&self) -> Vec<ClusterMember> {
        let mut members = vec![self.local_member()];
        if let Some(leader) = self.leader().filter(|m| !m.is_local()) {
            members.push(leader);
        }
        members
    }

    fn do_start(&self, notifier: ViewNotifier) -> Result<()> {
        let generation = {
            let events = self.state.events.lock();
            *events.borrow_mut() = Some(notifier);
            self.state.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = self
            .runtime
            .spawn(self.state.clone().run(generation, shutdown_rx));
        *self.task.lock() = Some(LeaseTask {
            shutdown_tx,
            handle,
        });

        tracing::debug!(
            namespace = %self.state.namespace,
            path = %self.state.path.display(),
            "Lease poller started"
        );
        Ok(())
    }

    fn do_stop(&self) -> Result<()> {
        // Waits for an in-flight delivery; pollers that finish later see the
        // new generation and drop their result.
        let (was_leader, notifier) = {
            let events = self.state.events.lock();
            self.state.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(task) = self.task.lock().take() {
                let _ = task.shutdown_tx.send(true);
                task.handle.abort();
            }

            let mut leader = self.state.leader.write();
            let was_leader = leader.as_deref() == Some(self.state.member_id.as_str());
            *leader = None;
            let notifier = events.borrow_mut().take();
            (was_leader, notifier)
        };

        // The poller is gone either way; an undeleted lease expires on its own.
        if let Err(e) = self.state.release() {
            tracing::warn!(
                namespace = %self.state.namespace,
                path = %self.state.path.display(),
                "Failed to delete lease file, it expires after the lease duration: {}",
                e
            );
        }

        if was_leader {
            tracing::info!(
                namespace = %self.state.namespace,
                member = %self.state.member_id,
                "Released leadership"
            );
            if let Some(notifier) = notifier {
                notifier.fire_leadership_changed(None);
            }
        }

        Ok(())
    }
}
