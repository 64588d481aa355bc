use std::sync::Arc;

use crate::{
    models::{Deployment, DeploymentUpdate, EnvironmentVariable},
    persistence::{DeploymentPersistence, DeploymentQuery, EnvironmentVariablePersistence},
};

use super::ContainerService;

pub struct DeploymentService {
    pub persistence: Box<dyn DeploymentPersistence>,
    pub environment_variables: Box<dyn EnvironmentVariablePersistence>,

    pub container_service: Arc<ContainerService>,
}

impl DeploymentService {
    #[tracing::instrument(name = "service::deployment::create", skip(self, deployment))]
    pub async fn create(&self, deployment: &Deployment) -> anyhow::Result<()> {
        let expected_deployment_id = Deployment::make_id(
            &deployment.app_name,
            &deployment.image_tag,
            &deployment.environment,
        );

        if deployment.id != expected_deployment_id {
            let message = format!(
                "deployment id {} doesn't match expected id {}",
                deployment.id, expected_deployment_id
            );

            tracing::error!(message);
            return Err(anyhow::anyhow!(message));
        }

        if self.get_by_id(&deployment.id).await?.is_some() {
            return Err(anyhow::anyhow!(
                "deployment ({}:{},{}) already exists",
                deployment.app_name,
                deployment.image_tag,
                deployment.environment
            ));
        }

        self.persistence.upsert(deployment).await?;

        tracing::info!(deployment_id = %deployment.id, "deployment created");

        Ok(())
    }

    pub async fn upsert(&self, deployment: &Deployment) -> anyhow::Result<u64> {
        self.persistence.upsert(deployment).await
    }

    /// Apply a partial update. Fields left `None` keep their current
    /// value; a present collection replaces the prior one wholesale.
    #[tracing::instrument(name = "service::deployment::update", skip(self, update))]
    pub async fn update(
        &self,
        deployment_id: &str,
        update: &DeploymentUpdate,
    ) -> anyhow::Result<Deployment> {
        let mut deployment = match self.get_by_id(deployment_id).await? {
            Some(deployment) => deployment,
            None => {
                return Err(anyhow::anyhow!(
                    "deployment id {deployment_id} not found"
                ))
            }
        };

        if let Some(status_endpoint) = &update.status_endpoint {
            deployment.status_endpoint = status_endpoint.clone();
        }
        if let Some(status_port) = update.status_port {
            deployment.status_port = status_port;
        }
        if let Some(mapped_ports) = &update.mapped_ports {
            deployment.mapped_ports = mapped_ports.clone();
        }
        if let Some(mapped_volumes) = &update.mapped_volumes {
            deployment.mapped_volumes = mapped_volumes.clone();
        }
        if let Some(hosts) = &update.hosts {
            deployment.hosts = hosts.clone();
        }
        if let Some(links) = &update.links {
            deployment.links = links.clone();
        }
        if let Some(volumes) = &update.volumes {
            deployment.volumes = volumes.clone();
        }

        self.persistence.upsert(&deployment).await?;

        if let Some(environment_variables) = &update.environment_variables {
            self.set_environment_variables(deployment_id, environment_variables)
                .await?;
        }

        Ok(deployment)
    }

    /// Replace the deployment's environment variables with the given
    /// ordered key/value pairs.
    pub async fn set_environment_variables(
        &self,
        deployment_id: &str,
        variables: &[(String, String)],
    ) -> anyhow::Result<()> {
        self.environment_variables
            .delete_by_deployment_id(deployment_id)
            .await?;

        for (position, (key, value)) in variables.iter().enumerate() {
            let variable = EnvironmentVariable {
                id: EnvironmentVariable::make_id(deployment_id, key),
                deployment_id: deployment_id.to_owned(),
                property_key: key.clone(),
                property_value: value.clone(),
                position: position as u32,
            };

            self.environment_variables.upsert(&variable).await?;
        }

        Ok(())
    }

    pub async fn get_environment_variables(
        &self,
        deployment_id: &str,
    ) -> anyhow::Result<Vec<EnvironmentVariable>> {
        self.environment_variables
            .get_by_deployment_id(deployment_id)
            .await
    }

    pub async fn get_by_id(&self, deployment_id: &str) -> anyhow::Result<Option<Deployment>> {
        self.persistence.get_by_id(deployment_id).await
    }

    pub async fn get_by_app_name(&self, app_name: &str) -> anyhow::Result<Vec<Deployment>> {
        self.persistence.get_by_app_name(app_name).await
    }

    pub async fn get_by_app_and_environment(
        &self,
        app_name: &str,
        environment: &str,
    ) -> anyhow::Result<Vec<Deployment>> {
        self.persistence
            .get_by_app_and_environment(app_name, environment)
            .await
    }

    pub async fn query(&self, query: &DeploymentQuery) -> anyhow::Result<Vec<Deployment>> {
        self.persistence.query(query).await
    }

    pub async fn count(&self, query: &DeploymentQuery) -> anyhow::Result<u64> {
        self.persistence.count(query).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Deployment>> {
        self.persistence.list().await
    }

    /// Deleting a deployment removes its environment variables and
    /// detaches (but keeps) its containers, which still belong to
    /// their hosts.
    #[tracing::instrument(name = "service::deployment::delete", skip(self))]
    pub async fn delete(&self, deployment_id: &str) -> anyhow::Result<u64> {
        if self.get_by_id(deployment_id).await?.is_none() {
            return Err(anyhow::anyhow!(
                "deployment id {deployment_id} not found"
            ));
        }

        self.environment_variables
            .delete_by_deployment_id(deployment_id)
            .await?;

        self.container_service
            .detach_from_deployment(deployment_id)
            .await?;

        let deleted_count = self.persistence.delete(deployment_id).await?;

        tracing::info!(deployment_id, "deployment deleted");

        Ok(deleted_count)
    }
}
