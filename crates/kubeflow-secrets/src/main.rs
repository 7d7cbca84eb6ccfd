//! Kubeflow secrets gateway

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use kubeflow_secrets::config::Config;
use kubeflow_secrets::identity::IdentityExtractor;
use kubeflow_secrets::impersonation::KubeImpersonationFactory;
use kubeflow_secrets::resolver::{KubeProfileRegistry, ProfileNamespaceResolver};
use kubeflow_secrets::scope::RequestScoper;
use kubeflow_secrets::secret::SecretTypePolicy;
use kubeflow_secrets::server::{start_server, AppState, ServerConfig};
use kubeflow_secrets::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let config = Config::parse();
    init_tracing(config.log_format)?;

    let mut kube_config = kube::Config::infer()
        .await
        .context("failed to load Kubernetes configuration")?;
    kube_config.connect_timeout = Some(config.kube_connect_timeout());
    kube_config.read_timeout = Some(config.kube_read_timeout());

    // Profiles are cluster-scoped and read with the gateway's own identity.
    let admin = kube::Client::try_from(kube_config.clone())
        .context("failed to create Kubernetes client")?;

    let resolver = ProfileNamespaceResolver::new(Arc::new(KubeProfileRegistry::new(admin)));
    let scoper = RequestScoper::new(
        IdentityExtractor::new(config.user_header.clone(), config.groups_header.clone()),
        Arc::new(resolver),
        Arc::new(KubeImpersonationFactory::new(kube_config)),
    );

    let state = AppState {
        scoper: Arc::new(scoper),
        policy: Arc::new(SecretTypePolicy::default()),
    };

    info!(
        user_header = %config.user_header,
        groups_header = %config.groups_header,
        max_payload_bytes = config.max_payload_bytes,
        "Configuration loaded"
    );

    start_server(
        ServerConfig {
            addr: config.listen_addr,
            max_payload_bytes: config.max_payload_bytes,
        },
        state,
    )
    .await
}
