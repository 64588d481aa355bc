use dotenvy::dotenv;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use denmother::{
    config::Settings,
    models::{App, Host},
    persistence::memory::{
        ContainerMemoryPersistence, DeploymentMemoryPersistence,
        EnvironmentVariableMemoryPersistence, ImageMemoryPersistence, MemoryPersistence,
    },
    reconcilation::{DependencyResolver, HttpHealthProbe, ReconciliationEngine},
    registry::HttpRegistryClient,
    runtime::{DockerRuntimeClientFactory, TlsMaterial},
    services::{AppService, ContainerService, DeploymentService, HostService, ImageService},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .expect("Failed to register tracer with registry");

    tracing::info!("reconciler: starting");

    let settings = Settings::from_env()?;

    let container_service = Arc::new(ContainerService {
        persistence: Box::<ContainerMemoryPersistence>::default(),
    });

    let image_service = Arc::new(ImageService {
        persistence: Box::<ImageMemoryPersistence>::default(),
        container_service: Arc::clone(&container_service),
    });

    let deployment_service = Arc::new(DeploymentService {
        persistence: Box::<DeploymentMemoryPersistence>::default(),
        environment_variables: Box::<EnvironmentVariableMemoryPersistence>::default(),
        container_service: Arc::clone(&container_service),
    });

    let host_service = Arc::new(HostService {
        persistence: Box::<MemoryPersistence<Host>>::default(),
        container_service: Arc::clone(&container_service),
    });

    let app_service = Arc::new(AppService {
        persistence: Box::<MemoryPersistence<App>>::default(),
        deployment_service: Arc::clone(&deployment_service),
        image_service: Arc::clone(&image_service),
    });

    let registry_client = Arc::new(HttpRegistryClient::new(&settings)?);

    let tls = TlsMaterial::from_files(
        &settings.docker_client_cert,
        &settings.docker_client_key,
        &settings.docker_ca_cert,
    )?;

    let runtime_clients = Arc::new(DockerRuntimeClientFactory {
        tls,
        retry: settings.retry,
        connect_timeout: settings.connect_timeout,
    });

    let dependency_resolver = DependencyResolver {
        deployment_service: Arc::clone(&deployment_service),
        image_service: Arc::clone(&image_service),
        registry_user: settings.registry_user.clone(),
    };

    let engine = ReconciliationEngine {
        app_service,
        container_service,
        deployment_service,
        host_service,
        image_service,

        registry_client,
        runtime_clients,
        health_probe: Arc::new(HttpHealthProbe::new(settings.connect_timeout)?),
        dependency_resolver,

        registry_user: settings.registry_user.clone(),

        pass_guard: tokio::sync::Mutex::new(()),
    };

    tracing::info!(
        interval_seconds = settings.reconcile_interval.as_secs(),
        "reconciler: starting pass loop"
    );

    let mut interval = tokio::time::interval(settings.reconcile_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if let Err(error) = engine.run_pass().await {
            tracing::error!("reconciliation pass failed: {:#}", error);
        }
    }
}
