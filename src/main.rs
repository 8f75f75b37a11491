//! registry-admission - Admission control for container registry manifest pulls
//!
//! This is the main entry point for the registry-admission application.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use registry_admission::config::{Config, PolicySource};
use registry_admission::database::{Database, SqliteDatabase};
use registry_admission::otel::{init_tracing, Metrics, OtelProvider};
use registry_admission::policy::{
    ChainSettings, PolicyChain, PolicyProvider, StaticPolicyProvider, StorePolicyProvider,
};
use registry_admission::proxy::{AdmissionService, UpstreamClient};
use registry_admission::server::{shutdown_signal, AppState, Server};
use registry_admission::trust::NotaryClient;

/// registry-admission - Admission control for container registry manifest pulls
#[derive(Parser, Debug)]
#[command(name = "registry-admission")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "REGISTRY_ADMISSION_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting registry-admission"
    );

    let database = Arc::new(SqliteDatabase::new(&config.database.path).await?);
    info!(path = %config.database.path, "Database initialized");

    let provider = build_policy_provider(&config, &database).await;
    info!(provider = provider.name(), "Policy provider selected");

    let mut chain = PolicyChain::new(
        provider,
        Arc::clone(&database),
        ChainSettings::from_config(&config),
    );

    if config.trust.enabled {
        let notary = NotaryClient::new(config.trust.clone())?;
        info!(
            endpoint = %config.trust.endpoint,
            principal = %config.trust.principal,
            "Content trust enabled"
        );
        chain = chain.with_trust_client(Arc::new(notary));
    } else {
        info!("Content trust disabled");
    }
    info!(enabled = config.scan.enabled, "Vulnerability enforcement");

    let metrics = Arc::new(Metrics::new(&otel_provider.meter()));
    let upstream = UpstreamClient::new(&config.upstream)?;
    info!(upstream = %upstream.base_url(), "Registry backend configured");

    let admission = AdmissionService::new(upstream, chain, &config.server.path_prefix)
        .with_metrics(metrics);

    let server = Server::new(config.server.clone(), AppState::new(admission));

    info!(
        host = %config.server.host,
        port = %config.server.port,
        path_prefix = %config.server.path_prefix,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("registry-admission shutdown complete");

    result.map_err(Into::into)
}

/// Pick the policy provider once for the lifetime of the process
async fn build_policy_provider(
    config: &Config,
    database: &Arc<SqliteDatabase>,
) -> Arc<dyn PolicyProvider> {
    match config.policy.provider {
        PolicySource::Static => Arc::new(StaticPolicyProvider::from_config(&config.policy.fixed)),
        PolicySource::Environment => Arc::new(StaticPolicyProvider::from_env()),
        PolicySource::Store => {
            match database.list_project_policies().await {
                Ok(projects) => info!(projects = projects.len(), "Tenant store loaded"),
                Err(e) => warn!(error = %e, "Tenant store not readable, lookups will fail closed"),
            }
            Arc::new(StorePolicyProvider::new(Arc::clone(database)))
        }
    }
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}
