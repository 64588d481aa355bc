use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

use crate::{
    models::{App, Container, ContainerState, ContainerStatus, Deployment, Host, HostStatus, Image},
    persistence::Persistence,
    registry::RegistryClient,
    runtime::{ContainerRecord, RuntimeClientFactory},
    services::{AppService, ContainerService, DeploymentService, HostService, ImageService},
};

use super::{DependencyResolver, HealthProbe};

/// Outcome of one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PassSummary {
    /// True when the pass was skipped because another was running.
    pub skipped: bool,
    pub apps: usize,
    pub hosts: usize,
    pub failed_units: usize,
}

/// Writes one unit of work wants to make, buffered so the unit can
/// commit them together or not at all.
#[derive(Debug, Default)]
struct StagedWrites {
    hosts: Vec<Host>,
    images: Vec<Image>,
    containers: Vec<Container>,
}

/// Row image captured just before an applied write, kept so the unit
/// can be restored when a later write fails.
enum AppliedWrite {
    Host(String, Option<Host>),
    Image(String, Option<Image>),
    Container(String, Option<Container>),
}

/// Runs reconciliation passes: refresh images from the registry, sync
/// containers from each host's runtime, link containers to
/// deployments, probe application health. Each app refresh and each
/// deployment sync is its own unit of work: its writes commit together
/// or roll back together, a failure is logged and the pass moves on.
pub struct ReconciliationEngine {
    pub app_service: Arc<AppService>,
    pub container_service: Arc<ContainerService>,
    pub deployment_service: Arc<DeploymentService>,
    pub host_service: Arc<HostService>,
    pub image_service: Arc<ImageService>,

    pub registry_client: Arc<dyn RegistryClient>,
    pub runtime_clients: Arc<dyn RuntimeClientFactory>,
    pub health_probe: Arc<dyn HealthProbe>,
    pub dependency_resolver: DependencyResolver,

    pub registry_user: String,

    /// Passes must not overlap; `run_pass` skips when held.
    pub pass_guard: tokio::sync::Mutex<()>,
}

impl ReconciliationEngine {
    pub async fn run_pass(&self) -> anyhow::Result<PassSummary> {
        let _guard = match self.pass_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("previous reconciliation pass still running, skipping");
                return Ok(PassSummary {
                    skipped: true,
                    ..Default::default()
                });
            }
        };

        let pass_id = Uuid::new_v4();
        tracing::info!(%pass_id, "reconciliation pass starting");

        let mut summary = PassSummary::default();

        let apps = self.app_service.list().await?;
        for app in apps.iter() {
            summary.apps += 1;

            if let Err(error) = self.update_app_images(app).await {
                tracing::error!(app = %app.name, %pass_id, "image refresh failed: {:#}", error);
                summary.failed_units += 1;
            }

            let deployments = self.deployment_service.get_by_app_name(&app.name).await?;
            for deployment in deployments.iter() {
                if let Err(error) = self.update_deployment_containers(deployment).await {
                    tracing::error!(
                        deployment_id = %deployment.id,
                        %pass_id,
                        "container sync failed: {:#}",
                        error
                    );
                    summary.failed_units += 1;
                    continue;
                }

                if let Err(error) = self.probe_deployment(deployment).await {
                    tracing::error!(
                        deployment_id = %deployment.id,
                        %pass_id,
                        "health probe failed: {:#}",
                        error
                    );
                    summary.failed_units += 1;
                }
            }
        }

        // Sweep every known host, not only those referenced by a
        // deployment, so containers unlinked to any app are captured.
        let hosts = self.host_service.list().await?;
        for host in hosts.iter() {
            summary.hosts += 1;

            if let Err(error) = self.update_host_containers(host).await {
                tracing::error!(host = %host.hostname, %pass_id, "host sweep failed: {:#}", error);
                summary.failed_units += 1;
            }
        }

        tracing::info!(%pass_id, ?summary, "reconciliation pass finished");

        Ok(summary)
    }

    /// Fetch the app's tags from the registry, upsert an image per tag
    /// and adopt any known container whose reference matches. One unit
    /// of work: nothing persists if any of its writes fail.
    #[tracing::instrument(name = "engine::update_app_images", skip(self, app), fields(app = %app.name))]
    pub async fn update_app_images(&self, app: &App) -> anyhow::Result<()> {
        let registry_images = self.registry_client.list_images(&app.name).await?;

        let mut staged = StagedWrites::default();

        for registry_image in registry_images.into_iter() {
            let image = match self.image_service.get_by_id(&registry_image.layer).await? {
                Some(mut image) => {
                    image.tag = registry_image.name;
                    image
                }
                None => Image {
                    id: registry_image.layer,
                    tag: registry_image.name,
                    app_name: app.name.clone(),
                },
            };

            let image_ref = image.registry_ref(&self.registry_user);
            for container in self.container_service.get_by_image_ref(&image_ref).await? {
                if container.image_id.as_deref() != Some(image.id.as_str()) {
                    let mut container = container;
                    container.image_id = Some(image.id.clone());
                    staged.containers.push(container);
                }
            }

            staged.images.push(image);
        }

        self.commit(staged).await
    }

    /// Snapshot one host's runtime and upsert a container per record.
    /// An unreachable host is marked down and skipped for the pass; it
    /// is not a unit failure.
    #[tracing::instrument(name = "engine::update_host_containers", skip(self, host), fields(host = %host.hostname))]
    pub async fn update_host_containers(&self, host: &Host) -> anyhow::Result<()> {
        let mut staged = StagedWrites::default();

        self.stage_host_sync(host, &mut staged).await?;

        self.commit(staged).await
    }

    async fn stage_host_sync(&self, host: &Host, staged: &mut StagedWrites) -> anyhow::Result<()> {
        let client = self.runtime_clients.client(host)?;

        let records = match client.snapshot().await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(host = %host.hostname, "host unreachable: {:#}", error);
                self.stage_host_status(host, HostStatus::Down, staged);
                return Ok(());
            }
        };

        self.stage_host_status(host, HostStatus::Up, staged);

        for record in records.iter() {
            self.stage_container(host, record, staged).await?;
        }

        Ok(())
    }

    fn stage_host_status(&self, host: &Host, status: HostStatus, staged: &mut StagedWrites) {
        if host.status != status {
            let mut host = host.clone();
            host.status = status;
            staged.hosts.push(host);
        }
    }

    async fn stage_container(
        &self,
        host: &Host,
        record: &ContainerRecord,
        staged: &mut StagedWrites,
    ) -> anyhow::Result<()> {
        match self.container_service.get_by_id(&record.id).await? {
            Some(mut container) => {
                if container.state != record.state || container.finished_at != record.finished_at {
                    container.state = record.state;
                    container.finished_at = record.finished_at;
                    staged.containers.push(container);
                }
            }
            None => {
                // The runtime reports the full image hash; image records
                // carry the registry's short (8 char) layer hash.
                let layer = record.image_id.get(..8).unwrap_or(&record.image_id);
                let image = self.image_service.get_by_id(layer).await?;

                staged.containers.push(Container {
                    id: record.id.clone(),
                    command: record.command.clone(),
                    image_ref: record.image_ref.clone(),
                    state: record.state,
                    status: ContainerStatus::Down,
                    started_at: record.started_at,
                    finished_at: record.finished_at,

                    host_id: Some(host.hostname.clone()),
                    image_id: image.map(|image| image.id),
                    deployment_id: None,
                });
            }
        }

        Ok(())
    }

    /// Sync containers on each of the deployment's hosts, then attach
    /// every container whose reference matches the deployment's
    /// computed image reference. One unit of work.
    #[tracing::instrument(name = "engine::update_deployment_containers", skip(self, deployment), fields(deployment_id = %deployment.id))]
    pub async fn update_deployment_containers(
        &self,
        deployment: &Deployment,
    ) -> anyhow::Result<()> {
        let image_ref = deployment.image_ref(&self.registry_user);

        let mut staged = StagedWrites::default();

        for hostname in deployment.hosts.iter() {
            let host = match self.host_service.get_by_id(hostname).await? {
                Some(host) => host,
                None => {
                    tracing::warn!(hostname, "declared host not found, skipping");
                    continue;
                }
            };

            self.stage_host_sync(&host, &mut staged).await?;
        }

        let staged_ids: HashSet<String> = staged
            .containers
            .iter()
            .map(|container| container.id.clone())
            .collect();

        for container in staged.containers.iter_mut() {
            if container.image_ref == image_ref
                && container.deployment_id.as_deref() != Some(deployment.id.as_str())
            {
                container.deployment_id = Some(deployment.id.clone());
            }
        }

        for hostname in deployment.hosts.iter() {
            for container in self.container_service.get_by_host_id(hostname).await? {
                if container.image_ref == image_ref
                    && container.deployment_id.as_deref() != Some(deployment.id.as_str())
                    && !staged_ids.contains(&container.id)
                {
                    let mut container = container;
                    container.deployment_id = Some(deployment.id.clone());
                    staged.containers.push(container);
                }
            }
        }

        self.commit(staged).await
    }

    /// Probe application health for each of the deployment's running
    /// containers; containers not in running state are down without a
    /// network call.
    #[tracing::instrument(name = "engine::probe_deployment", skip(self, deployment), fields(deployment_id = %deployment.id))]
    pub async fn probe_deployment(&self, deployment: &Deployment) -> anyhow::Result<()> {
        let containers = self
            .container_service
            .get_by_deployment_id(&deployment.id)
            .await?;

        let mut staged = StagedWrites::default();

        for container in containers.into_iter() {
            let status = self.probe_container(&container, deployment).await;

            if container.status != status {
                let mut container = container;
                container.status = status;
                staged.containers.push(container);
            }
        }

        self.commit(staged).await
    }

    async fn probe_container(
        &self,
        container: &Container,
        deployment: &Deployment,
    ) -> ContainerStatus {
        if container.state != ContainerState::Running {
            return ContainerStatus::Down;
        }

        let host = match &container.host_id {
            Some(host) => host,
            None => return ContainerStatus::Down,
        };

        let url = format!(
            "http://{}:{}/{}",
            host,
            deployment.status_port,
            deployment.status_endpoint.trim_start_matches('/')
        );

        match self.health_probe.check(&url).await {
            Ok(true) => ContainerStatus::Up,
            Ok(false) => ContainerStatus::Down,
            Err(error) => {
                tracing::warn!(container_id = %container.id, %url, "health probe failed: {:#}", error);
                ContainerStatus::Down
            }
        }
    }

    /// Apply a unit's buffered writes; if one fails, the rows already
    /// written are restored so the unit commits or rolls back as a
    /// whole.
    async fn commit(&self, staged: StagedWrites) -> anyhow::Result<()> {
        let mut applied = Vec::new();

        if let Err(error) = self.apply(&staged, &mut applied).await {
            tracing::warn!(
                writes = applied.len(),
                "unit failed, rolling back applied writes"
            );
            self.rollback(applied).await;
            return Err(error);
        }

        Ok(())
    }

    async fn apply(
        &self,
        staged: &StagedWrites,
        applied: &mut Vec<AppliedWrite>,
    ) -> anyhow::Result<()> {
        for host in staged.hosts.iter() {
            let prior = self.host_service.get_by_id(&host.hostname).await?;
            self.host_service.upsert(host).await?;
            applied.push(AppliedWrite::Host(host.hostname.clone(), prior));
        }

        for image in staged.images.iter() {
            let prior = self.image_service.get_by_id(&image.id).await?;
            self.image_service.upsert(image).await?;
            applied.push(AppliedWrite::Image(image.id.clone(), prior));
        }

        for container in staged.containers.iter() {
            let prior = self.container_service.get_by_id(&container.id).await?;
            self.container_service.upsert(container).await?;
            applied.push(AppliedWrite::Container(container.id.clone(), prior));
        }

        Ok(())
    }

    /// Best-effort restore of prior row images, newest write first.
    /// Goes straight through the persistence layer: a service-level
    /// delete would cascade into rows the unit never wrote.
    async fn rollback(&self, applied: Vec<AppliedWrite>) {
        for write in applied.into_iter().rev() {
            let restored = match write {
                AppliedWrite::Host(_, Some(prior)) => {
                    self.host_service.persistence.upsert(&prior).await
                }
                AppliedWrite::Host(hostname, None) => {
                    self.host_service.persistence.delete(&hostname).await
                }
                AppliedWrite::Image(_, Some(prior)) => {
                    self.image_service.persistence.upsert(&prior).await
                }
                AppliedWrite::Image(image_id, None) => {
                    self.image_service.persistence.delete(&image_id).await
                }
                AppliedWrite::Container(_, Some(prior)) => {
                    self.container_service.persistence.upsert(&prior).await
                }
                AppliedWrite::Container(container_id, None) => {
                    self.container_service.persistence.delete(&container_id).await
                }
            };

            if let Err(error) = restored {
                tracing::error!("rollback write failed: {:#}", error);
            }
        }
    }

    /// Deploy the deployment and its dependency tree on each of its
    /// hosts, dependencies strictly before dependents.
    #[tracing::instrument(name = "engine::run_deployment", skip(self, deployment), fields(deployment_id = %deployment.id))]
    pub async fn run_deployment(&self, deployment: &Deployment) -> anyhow::Result<()> {
        let tree = self.dependency_resolver.resolve(deployment).await?;

        for hostname in deployment.hosts.iter() {
            let host = match self.host_service.get_by_id(hostname).await? {
                Some(host) => host,
                None => {
                    tracing::warn!(hostname, "declared host not found, skipping deploy");
                    continue;
                }
            };

            let client = self.runtime_clients.client(&host)?;
            client.deploy_with_dependencies(&tree).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicU32, Ordering},
            Mutex,
        },
    };

    use crate::{
        persistence::{
            memory::{
                ContainerMemoryPersistence, DeploymentMemoryPersistence,
                EnvironmentVariableMemoryPersistence, ImageMemoryPersistence, MemoryPersistence,
            },
            ImagePersistence, ImageQuery,
        },
        registry::RegistryImage,
        runtime::{LogOptions, RunSpec, RuntimeClient},
        test::{
            get_app_fixture, get_container_fixture, get_deployment_fixture, get_host_fixture,
            CONTAINER_ID_FIXTURE,
        },
    };

    #[derive(Default)]
    struct MockRuntimeClient {
        records: Mutex<Vec<ContainerRecord>>,
        unreachable: bool,
        deployed: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RuntimeClient for MockRuntimeClient {
        async fn snapshot(&self) -> anyhow::Result<Vec<ContainerRecord>> {
            if self.unreachable {
                return Err(anyhow::anyhow!("connection refused"));
            }

            Ok(self.records.lock().unwrap().clone())
        }

        async fn pull(&self, _image_ref: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self, _container_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn remove(&self, _container_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn create_container(&self, spec: &RunSpec) -> anyhow::Result<String> {
            Ok(format!("{}-container", spec.name))
        }

        async fn start_container(&self, _container_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn logs(&self, _container_id: &str, _options: &LogOptions) -> anyhow::Result<String> {
            Ok(String::new())
        }

        async fn deploy(&self, spec: &RunSpec) -> anyhow::Result<String> {
            self.deployed.lock().unwrap().push(spec.name.clone());
            Ok(format!("{}-container", spec.name))
        }
    }

    #[derive(Default)]
    struct MockRuntimeClientFactory {
        clients: HashMap<String, Arc<MockRuntimeClient>>,
    }

    impl RuntimeClientFactory for MockRuntimeClientFactory {
        fn client(&self, host: &Host) -> anyhow::Result<Arc<dyn RuntimeClient>> {
            match self.clients.get(&host.hostname) {
                Some(client) => Ok(Arc::clone(client) as Arc<dyn RuntimeClient>),
                None => Err(anyhow::anyhow!("no client for host {}", host.hostname)),
            }
        }
    }

    #[derive(Default)]
    struct MockRegistryClient {
        images: HashMap<String, Vec<RegistryImage>>,
        fail: bool,
    }

    #[async_trait]
    impl RegistryClient for MockRegistryClient {
        async fn list_images(&self, app_name: &str) -> anyhow::Result<Vec<RegistryImage>> {
            if self.fail {
                return Err(anyhow::anyhow!("registry unavailable"));
            }

            Ok(self.images.get(app_name).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct MockHealthProbe {
        healthy: bool,
        transport_error: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HealthProbe for MockHealthProbe {
        async fn check(&self, _url: &str) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.transport_error {
                return Err(anyhow::anyhow!("connection refused"));
            }

            Ok(self.healthy)
        }
    }

    /// Image store that fails its nth upsert, for exercising unit
    /// rollback.
    struct FailingImagePersistence {
        inner: ImageMemoryPersistence,
        upserts: AtomicU32,
        fail_on_upsert: u32,
    }

    #[async_trait]
    impl Persistence<Image> for FailingImagePersistence {
        async fn upsert(&self, image: &Image) -> anyhow::Result<u64> {
            let attempt = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;

            if attempt == self.fail_on_upsert {
                return Err(anyhow::anyhow!("store unavailable"));
            }

            self.inner.upsert(image).await
        }

        async fn delete(&self, image_id: &str) -> anyhow::Result<u64> {
            self.inner.delete(image_id).await
        }

        async fn get_by_id(&self, image_id: &str) -> anyhow::Result<Option<Image>> {
            self.inner.get_by_id(image_id).await
        }

        async fn list(&self) -> anyhow::Result<Vec<Image>> {
            self.inner.list().await
        }
    }

    #[async_trait]
    impl ImagePersistence for FailingImagePersistence {
        async fn get_by_app_name(&self, app_name: &str) -> anyhow::Result<Vec<Image>> {
            self.inner.get_by_app_name(app_name).await
        }

        async fn query(&self, query: &ImageQuery) -> anyhow::Result<Vec<Image>> {
            self.inner.query(query).await
        }

        async fn count(&self, query: &ImageQuery) -> anyhow::Result<u64> {
            self.inner.count(query).await
        }
    }

    fn running_record() -> ContainerRecord {
        ContainerRecord {
            id: CONTAINER_ID_FIXTURE.to_owned(),
            image_id: "abcd1234ffff0000aaaa1111bbbb2222cccc3333dddd4444eeee5555ffff6666"
                .to_owned(),
            image_ref: "registrybear/sagebear:1".to_owned(),
            command: "./run.sh".to_owned(),
            state: ContainerState::Running,
            started_at: Some(Utc.with_ymd_and_hms(2016, 3, 1, 12, 0, 0).unwrap()),
            finished_at: None,
        }
    }

    fn engine_fixture_with_images(
        image_persistence: Box<dyn ImagePersistence>,
        runtime_clients: MockRuntimeClientFactory,
        registry_client: MockRegistryClient,
        health_probe: Arc<MockHealthProbe>,
    ) -> ReconciliationEngine {
        let container_service = Arc::new(ContainerService {
            persistence: Box::<ContainerMemoryPersistence>::default(),
        });

        let image_service = Arc::new(ImageService {
            persistence: image_persistence,
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

        let dependency_resolver = DependencyResolver {
            deployment_service: Arc::clone(&deployment_service),
            image_service: Arc::clone(&image_service),
            registry_user: "registrybear".to_owned(),
        };

        ReconciliationEngine {
            app_service,
            container_service,
            deployment_service,
            host_service,
            image_service,
            registry_client: Arc::new(registry_client),
            runtime_clients: Arc::new(runtime_clients),
            health_probe,
            dependency_resolver,
            registry_user: "registrybear".to_owned(),
            pass_guard: tokio::sync::Mutex::new(()),
        }
    }

    fn engine_fixture(
        runtime_clients: MockRuntimeClientFactory,
        registry_client: MockRegistryClient,
        health_probe: Arc<MockHealthProbe>,
    ) -> ReconciliationEngine {
        engine_fixture_with_images(
            Box::<ImageMemoryPersistence>::default(),
            runtime_clients,
            registry_client,
            health_probe,
        )
    }

    async fn seed_sagebear(engine: &ReconciliationEngine) {
        engine
            .app_service
            .create(&get_app_fixture(None))
            .await
            .unwrap();
        engine
            .host_service
            .create(&get_host_fixture(None))
            .await
            .unwrap();
        engine
            .deployment_service
            .create(&get_deployment_fixture(None))
            .await
            .unwrap();
    }

    fn sagebear_registry() -> MockRegistryClient {
        MockRegistryClient {
            images: HashMap::from([(
                "sagebear".to_owned(),
                vec![RegistryImage {
                    layer: "abcd1234".to_owned(),
                    name: "1".to_owned(),
                }],
            )]),
            fail: false,
        }
    }

    fn factory_with(records: Vec<ContainerRecord>) -> MockRuntimeClientFactory {
        let client = Arc::new(MockRuntimeClient {
            records: Mutex::new(records),
            ..Default::default()
        });

        MockRuntimeClientFactory {
            clients: HashMap::from([("10.0.0.1".to_owned(), client)]),
        }
    }

    #[tokio::test]
    async fn test_pass_links_and_probes_running_container() {
        let probe = Arc::new(MockHealthProbe {
            healthy: true,
            ..Default::default()
        });

        let engine = engine_fixture(
            factory_with(vec![running_record()]),
            sagebear_registry(),
            Arc::clone(&probe),
        );
        seed_sagebear(&engine).await;

        let summary = engine.run_pass().await.unwrap();
        assert_eq!(summary.failed_units, 0);
        assert_eq!(summary.apps, 1);
        assert_eq!(summary.hosts, 1);

        let container = engine
            .container_service
            .get_by_id(CONTAINER_ID_FIXTURE)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(container.state, ContainerState::Running);
        assert_eq!(container.status, ContainerStatus::Up);
        assert_eq!(container.host_id.as_deref(), Some("10.0.0.1"));
        assert_eq!(container.image_id.as_deref(), Some("abcd1234"));
        assert_eq!(container.deployment_id.as_deref(), Some("sagebear:1:prod"));
    }

    #[tokio::test]
    async fn test_probe_transport_error_marks_down() {
        let probe = Arc::new(MockHealthProbe {
            transport_error: true,
            ..Default::default()
        });

        let engine = engine_fixture(
            factory_with(vec![running_record()]),
            sagebear_registry(),
            Arc::clone(&probe),
        );
        seed_sagebear(&engine).await;

        engine.run_pass().await.unwrap();

        let container = engine
            .container_service
            .get_by_id(CONTAINER_ID_FIXTURE)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(container.status, ContainerStatus::Down);
    }

    #[tokio::test]
    async fn test_non_running_container_down_without_probe() {
        let probe = Arc::new(MockHealthProbe {
            healthy: true,
            ..Default::default()
        });

        let mut record = running_record();
        record.state = ContainerState::Stopped;
        record.finished_at = Some(Utc.with_ymd_and_hms(2016, 3, 1, 13, 0, 0).unwrap());

        let engine = engine_fixture(
            factory_with(vec![record]),
            sagebear_registry(),
            Arc::clone(&probe),
        );
        seed_sagebear(&engine).await;

        engine.run_pass().await.unwrap();

        let container = engine
            .container_service
            .get_by_id(CONTAINER_ID_FIXTURE)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(container.state, ContainerState::Stopped);
        assert_eq!(container.status, ContainerStatus::Down);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pass_is_idempotent() {
        let probe = Arc::new(MockHealthProbe {
            healthy: true,
            ..Default::default()
        });

        let engine = engine_fixture(
            factory_with(vec![running_record()]),
            sagebear_registry(),
            Arc::clone(&probe),
        );
        seed_sagebear(&engine).await;

        engine.run_pass().await.unwrap();
        let containers_after_first = engine.container_service.list().await.unwrap();

        engine.run_pass().await.unwrap();
        let containers_after_second = engine.container_service.list().await.unwrap();

        assert_eq!(containers_after_first.len(), 1);
        assert_eq!(containers_after_first, containers_after_second);
    }

    #[tokio::test]
    async fn test_unreachable_host_marked_down_and_pass_continues() {
        let probe = Arc::new(MockHealthProbe::default());

        let client = Arc::new(MockRuntimeClient {
            unreachable: true,
            ..Default::default()
        });
        let factory = MockRuntimeClientFactory {
            clients: HashMap::from([("10.0.0.1".to_owned(), client)]),
        };

        let engine = engine_fixture(factory, sagebear_registry(), probe);
        seed_sagebear(&engine).await;

        let summary = engine.run_pass().await.unwrap();
        assert_eq!(summary.failed_units, 0);

        let host = engine
            .host_service
            .get_by_id("10.0.0.1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(host.status, HostStatus::Down);

        let containers = engine.container_service.list().await.unwrap();
        assert!(containers.is_empty());
    }

    #[tokio::test]
    async fn test_registry_failure_leaves_prior_images_untouched() {
        let probe = Arc::new(MockHealthProbe::default());

        let registry = MockRegistryClient {
            fail: true,
            ..Default::default()
        };

        let engine = engine_fixture(factory_with(vec![running_record()]), registry, probe);
        seed_sagebear(&engine).await;

        let prior_image = Image {
            id: "abcd1234".to_owned(),
            tag: "1".to_owned(),
            app_name: "sagebear".to_owned(),
        };
        engine.image_service.upsert(&prior_image).await.unwrap();

        let summary = engine.run_pass().await.unwrap();
        assert_eq!(summary.failed_units, 1);

        let image = engine
            .image_service
            .get_by_id("abcd1234")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(image, prior_image);

        // the failed refresh didn't stop the deployment sync
        let container = engine
            .container_service
            .get_by_id(CONTAINER_ID_FIXTURE)
            .await
            .unwrap();
        assert!(container.is_some());
    }

    #[tokio::test]
    async fn test_failed_image_refresh_rolls_back_unit() {
        let registry = MockRegistryClient {
            images: HashMap::from([(
                "sagebear".to_owned(),
                vec![
                    RegistryImage {
                        layer: "aaaa1111".to_owned(),
                        name: "1".to_owned(),
                    },
                    RegistryImage {
                        layer: "bbbb2222".to_owned(),
                        name: "2".to_owned(),
                    },
                ],
            )]),
            fail: false,
        };

        // the second tag's write fails; the first must not survive
        let engine = engine_fixture_with_images(
            Box::new(FailingImagePersistence {
                inner: ImageMemoryPersistence::default(),
                upserts: AtomicU32::new(0),
                fail_on_upsert: 2,
            }),
            MockRuntimeClientFactory::default(),
            registry,
            Arc::new(MockHealthProbe::default()),
        );

        let result = engine.update_app_images(&get_app_fixture(None)).await;
        assert!(result.is_err());

        let first_image = engine.image_service.get_by_id("aaaa1111").await.unwrap();
        assert!(first_image.is_none());

        let images = engine.image_service.list().await.unwrap();
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn test_image_refresh_adopts_orphaned_container() {
        let probe = Arc::new(MockHealthProbe::default());

        let registry = MockRegistryClient {
            images: HashMap::from([(
                "carebear".to_owned(),
                vec![RegistryImage {
                    layer: "ffff9999".to_owned(),
                    name: "3".to_owned(),
                }],
            )]),
            fail: false,
        };

        let engine = engine_fixture(MockRuntimeClientFactory::default(), registry, probe);

        let mut orphan = get_container_fixture(None);
        orphan.image_ref = "registrybear/carebear:3".to_owned();
        orphan.image_id = None;
        engine.container_service.upsert(&orphan).await.unwrap();

        engine
            .update_app_images(&App {
                name: "carebear".to_owned(),
            })
            .await
            .unwrap();

        let adopted = engine
            .container_service
            .get_by_id(&orphan.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(adopted.image_id.as_deref(), Some("ffff9999"));
    }

    #[tokio::test]
    async fn test_sweep_captures_containers_on_unreferenced_host() {
        let probe = Arc::new(MockHealthProbe {
            healthy: true,
            ..Default::default()
        });

        // no deployment declares 10.0.0.2; the sweep must still
        // capture its containers
        let stray = ContainerRecord {
            id: "9f8e7d6c5b4a39281706f5e4d3c2b1a09f8e7d6c5b4a39281706f5e4d3c2b1a0".to_owned(),
            image_id: "ffffeeee0000111122223333444455556666777788889999aaaabbbbccccdddd"
                .to_owned(),
            image_ref: "registrybear/carebear:3".to_owned(),
            command: "./run.sh".to_owned(),
            state: ContainerState::Running,
            started_at: Some(Utc.with_ymd_and_hms(2016, 3, 1, 12, 0, 0).unwrap()),
            finished_at: None,
        };

        let sagebear_client = Arc::new(MockRuntimeClient {
            records: Mutex::new(vec![running_record()]),
            ..Default::default()
        });
        let stray_client = Arc::new(MockRuntimeClient {
            records: Mutex::new(vec![stray.clone()]),
            ..Default::default()
        });
        let factory = MockRuntimeClientFactory {
            clients: HashMap::from([
                ("10.0.0.1".to_owned(), sagebear_client),
                ("10.0.0.2".to_owned(), stray_client),
            ]),
        };

        let engine = engine_fixture(factory, sagebear_registry(), probe);
        seed_sagebear(&engine).await;
        engine
            .host_service
            .create(&get_host_fixture(Some("10.0.0.2")))
            .await
            .unwrap();

        let summary = engine.run_pass().await.unwrap();
        assert_eq!(summary.hosts, 2);
        assert_eq!(summary.failed_units, 0);

        let captured = engine
            .container_service
            .get_by_id(&stray.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(captured.host_id.as_deref(), Some("10.0.0.2"));
        assert_eq!(captured.deployment_id, None);
    }

    #[tokio::test]
    async fn test_run_deployment_deploys_dependencies_first() {
        let probe = Arc::new(MockHealthProbe::default());

        let deployed = Arc::new(Mutex::new(Vec::new()));
        let client = Arc::new(MockRuntimeClient {
            deployed: Arc::clone(&deployed),
            ..Default::default()
        });
        let factory = MockRuntimeClientFactory {
            clients: HashMap::from([("10.0.0.1".to_owned(), client)]),
        };

        let engine = engine_fixture(factory, sagebear_registry(), probe);
        seed_sagebear(&engine).await;

        // carebear is linked by sagebear through its image
        let carebear_image = Image {
            id: "cccc1111".to_owned(),
            tag: "1".to_owned(),
            app_name: "carebear".to_owned(),
        };
        engine.image_service.upsert(&carebear_image).await.unwrap();

        let mut carebear = get_deployment_fixture(None);
        carebear.app_name = "carebear".to_owned();
        carebear.id = Deployment::make_id("carebear", "1", "prod");
        engine.deployment_service.upsert(&carebear).await.unwrap();

        let mut sagebear = get_deployment_fixture(None);
        sagebear.links = vec!["cccc1111".to_owned()];
        engine.deployment_service.upsert(&sagebear).await.unwrap();

        engine.run_deployment(&sagebear).await.unwrap();

        let deployed = deployed.lock().unwrap().clone();
        assert_eq!(deployed, vec!["carebear", "sagebear"]);
    }

    #[tokio::test]
    async fn test_overlapping_pass_skipped() {
        let probe = Arc::new(MockHealthProbe::default());
        let engine = engine_fixture(
            MockRuntimeClientFactory::default(),
            MockRegistryClient::default(),
            probe,
        );

        let _held = engine.pass_guard.lock().await;

        let summary = engine.run_pass().await.unwrap();
        assert!(summary.skipped);
    }
}
