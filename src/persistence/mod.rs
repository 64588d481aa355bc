use async_trait::async_trait;

use crate::models::{Container, Deployment, EnvironmentVariable, Image};

pub mod memory;

pub trait Persistable<Model>: Clone + Send + Sync {
    fn get_id(&self) -> String;
}

/// Repository surface consumed by the services. Every mutation is
/// expected to be atomic per call.
#[async_trait]
pub trait Persistence<Model>: Send + Sync {
    async fn upsert(&self, model: &Model) -> anyhow::Result<u64>;
    async fn delete(&self, model_id: &str) -> anyhow::Result<u64>;
    async fn get_by_id(&self, model_id: &str) -> anyhow::Result<Option<Model>>;
    async fn list(&self) -> anyhow::Result<Vec<Model>>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Substring filters plus pagination for deployment listings.
#[derive(Clone, Debug)]
pub struct DeploymentQuery {
    pub app_name: Option<String>,
    pub image_tag: Option<String>,
    pub environment: Option<String>,
    pub sort_field: String,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for DeploymentQuery {
    fn default() -> Self {
        Self {
            app_name: None,
            image_tag: None,
            environment: None,
            sort_field: "app_name".to_owned(),
            order: SortOrder::Ascending,
            limit: 10,
            offset: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageQuery {
    pub app_name: Option<String>,
    pub image_tag: Option<String>,
    pub sort_field: String,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ImageQuery {
    fn default() -> Self {
        Self {
            app_name: None,
            image_tag: None,
            sort_field: "app_name".to_owned(),
            order: SortOrder::Ascending,
            limit: 10,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait ImagePersistence: Send + Sync + Persistence<Image> {
    async fn get_by_app_name(&self, app_name: &str) -> anyhow::Result<Vec<Image>>;
    async fn query(&self, query: &ImageQuery) -> anyhow::Result<Vec<Image>>;
    async fn count(&self, query: &ImageQuery) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait DeploymentPersistence: Send + Sync + Persistence<Deployment> {
    async fn get_by_app_name(&self, app_name: &str) -> anyhow::Result<Vec<Deployment>>;
    async fn get_by_app_and_environment(
        &self,
        app_name: &str,
        environment: &str,
    ) -> anyhow::Result<Vec<Deployment>>;
    async fn query(&self, query: &DeploymentQuery) -> anyhow::Result<Vec<Deployment>>;
    async fn count(&self, query: &DeploymentQuery) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait ContainerPersistence: Send + Sync + Persistence<Container> {
    async fn get_by_host_id(&self, host_id: &str) -> anyhow::Result<Vec<Container>>;
    async fn get_by_image_id(&self, image_id: &str) -> anyhow::Result<Vec<Container>>;
    async fn get_by_image_ref(&self, image_ref: &str) -> anyhow::Result<Vec<Container>>;
    async fn get_by_deployment_id(&self, deployment_id: &str) -> anyhow::Result<Vec<Container>>;
}

#[async_trait]
pub trait EnvironmentVariablePersistence:
    Send + Sync + Persistence<EnvironmentVariable>
{
    async fn get_by_deployment_id(
        &self,
        deployment_id: &str,
    ) -> anyhow::Result<Vec<EnvironmentVariable>>;
    async fn delete_by_deployment_id(&self, deployment_id: &str) -> anyhow::Result<u64>;
}
