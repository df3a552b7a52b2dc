use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use acr_controller::{Broadcaster, Controller};
use acr_kubehub::{application_api, get_kube_client, run_event_source, KubeApplicationStore};
use acr_service::{AcrService, HttpRevisionComputer};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;

use config::Config;

fn init_tracing() {
    let env = std::env::var("ACR_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(addr: Option<&str>) {
    let Some(addr) = addr else { return };
    match addr.parse::<std::net::SocketAddr>() {
        Ok(sock) => {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        }
        Err(_) => warn!(addr = %addr, "invalid metrics address; expected host:port"),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = Config::parse();
    cfg.validate()?;
    init_metrics(cfg.metrics_addr.as_deref());
    info!(
        namespace = cfg.watch_namespace().unwrap_or("*"),
        use_annotations = cfg.use_annotations,
        server = %cfg.argocd_server,
        delivery = ?cfg.delivery,
        lock_scope = ?cfg.lock_scope,
        "starting change revision controller"
    );

    let client = get_kube_client().await?;
    let store = Arc::new(KubeApplicationStore::new(client.clone()));
    let computer = Arc::new(
        HttpRevisionComputer::new(&cfg.argocd_server, cfg.argocd_token.clone(), cfg.request_timeout())
            .context("building revision computer")?,
    );
    let service = Arc::new(AcrService::new(store, computer).with_lock_scope(cfg.lock_scope()));

    let broadcaster = Arc::new(Broadcaster::new(cfg.delivery_policy()));
    let controller = Controller::new(broadcaster.clone(), service, cfg.use_annotations)
        .with_timeout(cfg.reconcile_timeout())
        .with_queue_capacity(cfg.queue_capacity);

    // Subscribe before the watcher starts so its initial list reaches the controller.
    let sub = controller.subscribe();
    let cancel = CancellationToken::new();
    let run = {
        let token = cancel.clone();
        tokio::spawn(async move { controller.run(sub, token).await })
    };

    // The controller stays up if the watch task dies; it just sees no events.
    let source = {
        let api = application_api(client, cfg.watch_namespace());
        let sink = broadcaster.clone();
        let token = cancel.clone();
        tokio::spawn(async move { run_event_source(api, sink, token).await })
    };
    tokio::spawn(async move {
        if let Err(e) = source.await {
            error!(error = %e, "application event source failed; controller running without events");
        }
    });

    signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    cancel.cancel();
    match tokio::time::timeout(Duration::from_secs(5), run).await {
        Ok(Ok(stats)) => info!(?stats, "controller exited"),
        Ok(Err(e)) => error!(error = %e, "controller task failed"),
        Err(_) => warn!("controller did not stop within 5s"),
    }
    Ok(())
}
