//! Conduit runtime
//!
//! Builds the configured cluster services, selects one of them and keeps a
//! view of every watched namespace acquired until shutdown. Leadership and
//! membership changes are logged as they arrive.

use tokio::sync::broadcast;

use conduit_core::cluster::{
    mandatory_lookup_service_with, ClusterEventListener, ClusterMember, ClusterService,
    ClusterServiceRegistry, ClusterView, MembershipListener,
};
use conduit_core::config::{ConduitConfig, ServiceConfig};
use conduit_core::error::{ConduitError, Result};
use conduit_runtime::cluster::{build_registry, build_service};

/// Prelude module for common imports.
pub mod prelude {
    pub use conduit_core::cluster::{
        lookup_service, lookup_service_with, mandatory_lookup_service,
        mandatory_lookup_service_with, ClusterEventListener, ClusterMember, ClusterService,
        ClusterServiceBinding, ClusterServiceRegistry, ClusterView, ClusterViewBinding,
        LeadershipListener, MembershipListener, Selector, ServiceStatus,
    };
    pub use conduit_core::config::ConduitConfig;
    pub use conduit_core::error::{ConduitError, Result};
    pub use conduit_runtime::cluster::{FileLockClusterService, LocalClusterService};

    pub use super::{Conduit, ConduitBuilder};
}

/// Name of the service registered when the configuration lists none.
const FALLBACK_SERVICE: &str = "local";

/// The Conduit runtime.
pub struct Conduit {
    config: ConduitConfig,
    member_id: String,
    namespaces: Vec<String>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Conduit {
    /// Create a builder.
    pub fn builder() -> ConduitBuilder {
        ConduitBuilder::new()
    }

    pub fn config(&self) -> &ConduitConfig {
        &self.config
    }

    /// Id of this process inside every namespace.
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Namespaces followed by [`run`](Self::run).
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Build every configured service, or a single local service when none
    /// is configured.
    pub fn build_registry(&self) -> Result<ClusterServiceRegistry> {
        if !self.config.cluster.services.is_empty() {
            return build_registry(&self.config.cluster, Some(&self.member_id));
        }

        tracing::info!("No cluster services configured, falling back to a local service");
        let mut fallback = ServiceConfig::local();
        fallback.id = Some(FALLBACK_SERVICE.to_string());

        let registry = ClusterServiceRegistry::new();
        registry.register(
            FALLBACK_SERVICE,
            build_service(&fallback, Some(&self.member_id))?,
        )?;
        Ok(registry)
    }

    /// Pick the service to follow with the configured selector.
    pub fn select_service(&self, registry: &ClusterServiceRegistry) -> Result<ClusterService> {
        let selector = self.config.cluster.selector.to_selector()?;
        mandatory_lookup_service_with(registry, &selector)
    }

    /// A sender that stops [`run`](Self::run) when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Follow leadership of the configured namespaces until Ctrl-C or a
    /// shutdown request.
    pub async fn run(mut self) -> Result<()> {
        if self.namespaces.is_empty() {
            return Err(ConduitError::Config("no namespaces to watch".to_string()));
        }

        tracing::info!(member = %self.member_id, "Conduit starting");

        let registry = self.build_registry()?;
        let service = self.select_service(&registry)?;
        tracing::info!(
            "Following cluster service {} ({})",
            service.id(),
            service.kind()
        );

        // Views are acquired before the services start so the listeners see
        // the first leadership event.
        let mut views = Vec::with_capacity(self.namespaces.len());
        for namespace in &self.namespaces {
            match service.get_view(namespace) {
                Ok(view) => {
                    view.add_event_listener(leadership_logger());
                    view.add_event_listener(ClusterEventListener::membership(MembershipLogger));
                    views.push(view);
                }
                Err(e) => {
                    release_all(&service, &views);
                    return Err(e);
                }
            }
        }

        if let Err(e) = registry.start_all() {
            release_all(&service, &views);
            if let Err(stop_error) = registry.stop_all() {
                tracing::warn!("Failed to stop cluster services: {}", stop_error);
            }
            return Err(e);
        }

        tracing::info!("Conduit started");
        tracing::info!("  Member: {}", self.member_id);
        tracing::info!("  Namespaces: {:?}", self.namespaces);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
            }
            _ = self.shutdown_rx.recv() => {
                tracing::info!("Received shutdown notification");
            }
        }

        tracing::info!("Starting graceful shutdown...");
        release_all(&service, &views);
        registry.stop_all()?;

        tracing::info!("Conduit stopped");
        Ok(())
    }
}

fn release_all(service: &ClusterService, views: &[ClusterView]) {
    for view in views {
        service.release_view(view);
    }
}

fn leadership_logger() -> ClusterEventListener {
    ClusterEventListener::leadership(|view: &ClusterView, leader: Option<&ClusterMember>| {
        match leader {
            Some(member) if member.is_local() => {
                tracing::info!(namespace = %view.namespace(), "Leadership taken by this member");
            }
            Some(member) => {
                tracing::info!(namespace = %view.namespace(), leader = %member.id(), "Following leader");
            }
            None => {
                tracing::info!(namespace = %view.namespace(), "No leader");
            }
        }
    })
}

struct MembershipLogger;

impl MembershipListener for MembershipLogger {
    fn member_added(&self, view: &ClusterView, member: &ClusterMember) {
        tracing::debug!(namespace = %view.namespace(), member = %member.id(), "Member joined");
    }

    fn member_removed(&self, view: &ClusterView, member: &ClusterMember) {
        tracing::debug!(namespace = %view.namespace(), member = %member.id(), "Member left");
    }
}

/// Builder for configuring the Conduit runtime.
pub struct ConduitBuilder {
    config: Option<ConduitConfig>,
    member_id: Option<String>,
    namespaces: Vec<String>,
}

impl ConduitBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            member_id: None,
            namespaces: Vec::new(),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: ConduitConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the member id from `[node] id`.
    pub fn member_id(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    /// Watch `namespace` in addition to the configured ones.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    /// Build the Conduit runtime.
    pub fn build(self) -> Result<Conduit> {
        let config = self
            .config
            .ok_or_else(|| ConduitError::Config("Configuration is required".to_string()))?;

        let member_id = self
            .member_id
            .or_else(|| config.node.id.clone())
            .unwrap_or_else(local_hostname);

        let mut namespaces = config.cluster.namespaces.clone();
        for namespace in self.namespaces {
            if !namespaces.contains(&namespace) {
                namespaces.push(namespace);
            }
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Ok(Conduit {
            config,
            member_id,
            namespaces,
            shutdown_tx,
            shutdown_rx,
        })
    }
}

impl Default for ConduitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use conduit_core::cluster::Selector;
    use conduit_core::config::SelectorPolicy;

    use super::*;

    fn local_entry(id: &str, order: i32) -> ServiceConfig {
        let mut entry = ServiceConfig::local();
        entry.id = Some(id.to_string());
        entry.order = order;
        entry
    }

    #[test]
    fn test_builder_requires_config() {
        assert!(matches!(
            Conduit::builder().build(),
            Err(ConduitError::Config(_))
        ));
    }

    #[test]
    fn test_member_id_precedence() {
        let mut config = ConduitConfig::default();
        config.node.id = Some("from-config".to_string());

        let conduit = Conduit::builder().config(config.clone()).build().unwrap();
        assert_eq!(conduit.member_id(), "from-config");

        let conduit = Conduit::builder()
            .config(config)
            .member_id("from-cli")
            .build()
            .unwrap();
        assert_eq!(conduit.member_id(), "from-cli");

        let conduit = Conduit::builder()
            .config(ConduitConfig::default())
            .build()
            .unwrap();
        assert!(!conduit.member_id().is_empty());
    }

    #[test]
    fn test_namespaces_merged_without_duplicates() {
        let mut config = ConduitConfig::default();
        config.cluster.namespaces = vec!["orders".to_string()];

        let conduit = Conduit::builder()
            .config(config)
            .namespace("orders")
            .namespace("billing")
            .build()
            .unwrap();
        assert_eq!(conduit.namespaces(), ["orders", "billing"]);
    }

    #[test]
    fn test_fallback_local_service() {
        let conduit = Conduit::builder()
            .config(ConduitConfig::default())
            .build()
            .unwrap();

        let registry = conduit.build_registry().unwrap();
        assert_eq!(registry.len(), 1);

        let service = conduit.select_service(&registry).unwrap();
        assert_eq!(service.id(), FALLBACK_SERVICE);
        assert_eq!(service.kind(), "local");
    }

    #[test]
    fn test_select_by_configured_policy() {
        let mut config = ConduitConfig::default();
        config.cluster.services = vec![local_entry("a", 5), local_entry("b", 1)];
        config.cluster.selector.policy = SelectorPolicy::Order;

        let conduit = Conduit::builder().config(config).build().unwrap();
        let registry = conduit.build_registry().unwrap();
        assert_eq!(conduit.select_service(&registry).unwrap().id(), "b");
        assert_eq!(
            conduit.config().cluster.selector.to_selector().unwrap(),
            Selector::Order
        );
    }

    #[test]
    fn test_single_policy_rejects_ambiguity() {
        let mut config = ConduitConfig::default();
        config.cluster.services = vec![local_entry("a", 0), local_entry("b", 0)];

        let conduit = Conduit::builder().config(config).build().unwrap();
        let registry = conduit.build_registry().unwrap();
        assert!(matches!(
            conduit.select_service(&registry),
            Err(ConduitError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_run_without_namespaces_fails() {
        let conduit = Conduit::builder()
            .config(ConduitConfig::default())
            .build()
            .unwrap();
        assert!(matches!(conduit.run().await, Err(ConduitError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let conduit = Conduit::builder()
            .config(ConduitConfig::default())
            .namespace("orders")
            .build()
            .unwrap();

        conduit.shutdown();
        conduit.run().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_with_file_service() {
        let dir = tempfile::tempdir().unwrap();
        let mut entry = ServiceConfig::file(dir.path());
        entry.id = Some("shared".to_string());
        entry.acquire_lock_delay_ms = 0;
        entry.acquire_lock_interval_ms = 20;
        entry.lease_duration_ms = 200;

        let mut config = ConduitConfig::default();
        config.cluster.services = vec![entry];

        let conduit = Conduit::builder()
            .config(config)
            .member_id("node-a")
            .namespace("orders")
            .build()
            .unwrap();
        let shutdown = conduit.shutdown_handle();
        let lease = dir.path().join("orders.lock");

        let running = tokio::spawn(conduit.run());
        let appeared = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !lease.exists() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(appeared.is_ok());

        shutdown.send(()).unwrap();
        running.await.unwrap().unwrap();
        assert!(!lease.exists());
    }
}
