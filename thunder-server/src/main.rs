use std::sync::Arc;
use std::time::Duration;

use thunder_core::config::ThunderConfig;
use thunder_executors::{
    AssertionDefaults, AttributeCollector, AuthAssertExecutor, BasicAuthExecutor,
    ExecutorRegistry, IdentifyingExecutor, PermissionValidator, ProvisioningExecutor,
    SmsOtpExecutor, UserTypeResolver,
};
use thunder_flow::{spawn_sweeper, FlowEngine, InstanceStore};
use thunder_graph::GraphCache;
use thunder_http::AppState;
use thunder_store::{open_store, FlowService};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod providers;
mod token;

use providers::{
    DemoApplications, DemoAssignments, DemoDirectory, DemoMetadata, DemoOrgUnits, DemoUserTypes,
    LoggingOtpService,
};
use token::JwtIssuer;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn build_registry(config: &ThunderConfig) -> ExecutorRegistry {
    let directory = Arc::new(DemoDirectory::seeded());
    let otp = Arc::new(LoggingOtpService::default());
    let org_units = Arc::new(DemoOrgUnits);
    let user_types = Arc::new(DemoUserTypes);
    let assignments = Arc::new(DemoAssignments);
    let issuer = Arc::new(JwtIssuer::new(config.jwt.secret.as_bytes()));

    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(IdentifyingExecutor::new(directory.clone())));
    registry.register(Arc::new(BasicAuthExecutor::new(
        directory.clone(),
        directory.clone(),
    )));
    registry.register(Arc::new(SmsOtpExecutor::new(directory.clone(), otp)));
    registry.register(Arc::new(ProvisioningExecutor::new(
        directory.clone(),
        assignments.clone(),
        assignments,
    )));
    registry.register(Arc::new(UserTypeResolver::new(user_types)));
    registry.register(Arc::new(AttributeCollector::new(directory.clone())));
    registry.register(Arc::new(AuthAssertExecutor::new(
        directory,
        org_units,
        issuer,
        AssertionDefaults {
            issuer: config.jwt.issuer.clone(),
            validity_secs: config.jwt.validity_period_secs,
        },
    )));
    registry.register(Arc::new(PermissionValidator::new()));
    registry
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path =
        std::env::var("THUNDER_CONFIG").unwrap_or_else(|_| "thunder.yaml".to_string());
    let config = ThunderConfig::load(&config_path)?;
    info!(
        config = %config_path,
        identifier = %config.server.identifier,
        "Starting Thunder"
    );

    let store = open_store(&config).await?;
    let flows = Arc::new(FlowService::new(store, config.max_page_size));

    let registry = Arc::new(build_registry(&config));
    info!(executors = registry.len(), "Executor registry ready");

    let instances = Arc::new(InstanceStore::new(Duration::from_secs(
        config.flow_execution.instance_ttl_secs,
    )));
    let engine = Arc::new(FlowEngine::new(
        registry,
        Arc::new(GraphCache::new(config.graph_cache.capacity)),
        instances.clone(),
        config.flow_execution.clone(),
    ));

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        instances,
        Duration::from_secs(config.flow_execution.sweep_interval_secs),
        shutdown.clone(),
    );

    let state = AppState {
        flows,
        engine,
        applications: Arc::new(DemoApplications),
        metadata: Arc::new(DemoMetadata),
        default_flows: config.default_flows.clone(),
    };
    let app = thunder_http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    info!(listen = %config.server.listen, "Thunder listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    Ok(())
}
