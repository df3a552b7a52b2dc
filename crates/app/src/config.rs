use std::net::SocketAddr;
use std::time::Duration;

use acr_controller::DeliveryPolicy;
use acr_service::LockScope;
use anyhow::{bail, Result};
use clap::{ArgAction, Parser, ValueEnum};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Delivery {
    Block,
    Drop,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Locking {
    Global,
    PerApp,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "acr-controller", version, about = "Records change revisions on Argo CD application syncs")]
pub struct Config {
    /// Namespace to watch (default: all namespaces)
    #[arg(long = "namespace", env = "ACR_NAMESPACE")]
    pub namespace: Option<String>,

    /// Also mirror revisions into mrp-controller.argoproj.io/* annotations
    #[arg(long = "use-annotations", env = "ACR_USE_ANNOTATIONS", action = ArgAction::SetTrue)]
    pub use_annotations: bool,

    /// Argo CD API server base URL
    #[arg(long = "argocd-server", env = "ACR_ARGOCD_SERVER", default_value = "http://argocd-server.argocd.svc.cluster.local")]
    pub argocd_server: String,

    /// Bearer token for the Argo CD API server
    #[arg(long = "argocd-token", env = "ACR_ARGOCD_TOKEN", hide_env_values = true)]
    pub argocd_token: Option<String>,

    /// Per-request timeout for the change-revision endpoint, in seconds
    #[arg(long = "request-timeout-secs", env = "ACR_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Upper bound for one reconciliation, in seconds
    #[arg(long = "reconcile-timeout-secs", env = "ACR_RECONCILE_TIMEOUT_SECS", default_value_t = 120)]
    pub reconcile_timeout_secs: u64,

    /// Capacity of the controller's event queue
    #[arg(long = "queue-capacity", env = "ACR_QUEUE_CAPACITY", default_value_t = 1000)]
    pub queue_capacity: usize,

    /// What to do when a subscriber queue is full
    #[arg(long = "delivery", env = "ACR_DELIVERY", value_enum, default_value_t = Delivery::Block)]
    pub delivery: Delivery,

    /// Serialize all resolutions, or only those of the same application
    #[arg(long = "lock-scope", env = "ACR_LOCK_SCOPE", value_enum, default_value_t = Locking::Global)]
    pub lock_scope: Locking,

    /// Prometheus exporter listen address (host:port); disabled when unset
    #[arg(long = "metrics-addr", env = "ACR_METRICS_ADDR")]
    pub metrics_addr: Option<String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.argocd_server.trim().is_empty() {
            bail!("argocd server URL must not be empty");
        }
        if self.queue_capacity == 0 {
            bail!("queue capacity must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be greater than zero");
        }
        if self.reconcile_timeout_secs == 0 {
            bail!("reconcile timeout must be greater than zero");
        }
        if let Some(addr) = &self.metrics_addr {
            if addr.parse::<SocketAddr>().is_err() {
                bail!("invalid metrics address {:?}; expected host:port", addr);
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        match self.delivery {
            Delivery::Block => DeliveryPolicy::Block,
            Delivery::Drop => DeliveryPolicy::DropNewest,
        }
    }

    pub fn lock_scope(&self) -> LockScope {
        match self.lock_scope {
            Locking::Global => LockScope::Global,
            Locking::PerApp => LockScope::PerApplication,
        }
    }

    /// Watch namespace; an empty value means all namespaces.
    pub fn watch_namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}
