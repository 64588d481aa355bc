use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{fmt, sync::Arc};

use crate::models::{ContainerState, Host};

pub mod docker;
pub mod retry;

pub use docker::{DockerRuntimeClient, DockerRuntimeClientFactory, TlsMaterial};
pub use retry::{with_retry, with_retry_if, RetryPolicy};

/// Normalized view of one container as reported by a host's runtime,
/// combining the listing and the per-container inspection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContainerRecord {
    pub id: String,
    pub image_id: String,
    pub image_ref: String,
    pub command: String,
    pub state: ContainerState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Everything the runtime needs to create and start one container for
/// a deployment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSpec {
    /// Container name; the app name, so a redeploy can find the
    /// previous container.
    pub name: String,
    pub image_ref: String,
    /// `hostPort:containerPort` pairs.
    pub mapped_ports: Vec<String>,
    /// `hostPath:containerPath` pairs.
    pub mapped_volumes: Vec<String>,
    /// Ordered key/value pairs.
    pub environment: Vec<(String, String)>,
    /// Container names to link.
    pub links: Vec<String>,
    /// Container names to mount volumes from.
    pub volumes_from: Vec<String>,
}

/// A deployment and the deployments it depends on through links and
/// volumes. Dependencies must be live before the dependent starts.
#[derive(Clone, Debug)]
pub struct DeploymentTree {
    pub deployment_id: String,
    pub spec: RunSpec,
    pub dependencies: Vec<DeploymentTree>,
}

impl DeploymentTree {
    /// Depth-first order for deploy/run actions: every dependency
    /// subtree strictly before its dependent. Shared dependencies are
    /// visited once per path.
    pub fn deploy_order(&self) -> Vec<&RunSpec> {
        let mut order = Vec::new();
        self.collect(&mut order);
        order
    }

    fn collect<'a>(&'a self, order: &mut Vec<&'a RunSpec>) {
        for dependency in self.dependencies.iter() {
            dependency.collect(order);
        }

        order.push(&self.spec);
    }
}

#[derive(Clone, Debug)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub tail: u32,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            tail: 10,
        }
    }
}

/// Creation failed because the image is not present on the host. The
/// default `run` reacts by pulling once and retrying creation once.
#[derive(Debug)]
pub struct ImageNotPresent {
    pub image_ref: String,
}

impl fmt::Display for ImageNotPresent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image {} not present on host", self.image_ref)
    }
}

impl std::error::Error for ImageNotPresent {}

/// Container-lifecycle operations against one host's runtime.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<Vec<ContainerRecord>>;
    async fn pull(&self, image_ref: &str) -> anyhow::Result<()>;
    async fn stop(&self, container_id: &str) -> anyhow::Result<()>;
    async fn remove(&self, container_id: &str) -> anyhow::Result<()>;
    async fn create_container(&self, spec: &RunSpec) -> anyhow::Result<String>;
    async fn start_container(&self, container_id: &str) -> anyhow::Result<()>;
    async fn logs(&self, container_id: &str, options: &LogOptions) -> anyhow::Result<String>;

    /// Create and start a container for the spec. If the image is not
    /// present locally, pull it once and retry creation exactly once.
    async fn run(&self, spec: &RunSpec) -> anyhow::Result<String> {
        let container_id = match self.create_container(spec).await {
            Ok(container_id) => container_id,
            Err(error) if error.is::<ImageNotPresent>() => {
                tracing::info!(image_ref = %spec.image_ref, "image missing, pulling");
                self.pull(&spec.image_ref).await?;
                self.create_container(spec).await?
            }
            Err(error) => return Err(error),
        };

        self.start_container(&container_id).await?;

        Ok(container_id)
    }

    /// Best-effort stop and remove of any container named for the app,
    /// then `run`. "Not found" failures are swallowed.
    async fn deploy(&self, spec: &RunSpec) -> anyhow::Result<String> {
        if let Err(error) = self.stop(&spec.name).await {
            tracing::debug!(name = %spec.name, "stop before deploy failed: {:#}", error);
        }

        if let Err(error) = self.remove(&spec.name).await {
            tracing::debug!(name = %spec.name, "remove before deploy failed: {:#}", error);
        }

        self.run(spec).await
    }

    async fn run_with_dependencies(&self, tree: &DeploymentTree) -> anyhow::Result<()> {
        for spec in tree.deploy_order() {
            self.run(spec).await?;
        }

        Ok(())
    }

    async fn deploy_with_dependencies(&self, tree: &DeploymentTree) -> anyhow::Result<()> {
        for spec in tree.deploy_order() {
            self.deploy(spec).await?;
        }

        Ok(())
    }
}

/// Yields a runtime client bound to one host.
pub trait RuntimeClientFactory: Send + Sync {
    fn client(&self, host: &Host) -> anyhow::Result<Arc<dyn RuntimeClient>>;
}
