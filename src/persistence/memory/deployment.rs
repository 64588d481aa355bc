use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    models::Deployment,
    persistence::{
        DeploymentPersistence, DeploymentQuery, Persistable, Persistence, SortOrder,
    },
};

#[derive(Debug, Default)]
pub struct DeploymentMemoryPersistence {
    models: Arc<Mutex<HashMap<String, Deployment>>>,
}

#[async_trait]
impl Persistence<Deployment> for DeploymentMemoryPersistence {
    async fn upsert(&self, deployment: &Deployment) -> anyhow::Result<u64> {
        let mut locked_deployments = self.get_models_locked()?;

        locked_deployments.insert(deployment.get_id(), deployment.clone());

        Ok(1)
    }

    async fn delete(&self, deployment_id: &str) -> anyhow::Result<u64> {
        let mut locked_deployments = self.get_models_locked()?;

        match locked_deployments.remove(deployment_id) {
            Some(_) => Ok(1),
            None => Ok(0),
        }
    }

    async fn get_by_id(&self, deployment_id: &str) -> anyhow::Result<Option<Deployment>> {
        let locked_deployments = self.get_models_locked()?;

        Ok(locked_deployments.get(deployment_id).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<Deployment>> {
        let locked_deployments = self.get_models_locked()?;

        Ok(locked_deployments.values().cloned().collect())
    }
}

#[async_trait]
impl DeploymentPersistence for DeploymentMemoryPersistence {
    async fn get_by_app_name(&self, app_name: &str) -> anyhow::Result<Vec<Deployment>> {
        let locked_deployments = self.get_models_locked()?;

        let deployments = locked_deployments
            .values()
            .filter(|deployment| deployment.app_name == app_name)
            .cloned()
            .collect();

        Ok(deployments)
    }

    async fn get_by_app_and_environment(
        &self,
        app_name: &str,
        environment: &str,
    ) -> anyhow::Result<Vec<Deployment>> {
        let locked_deployments = self.get_models_locked()?;

        let deployments = locked_deployments
            .values()
            .filter(|deployment| {
                deployment.app_name == app_name && deployment.environment == environment
            })
            .cloned()
            .collect();

        Ok(deployments)
    }

    async fn query(&self, query: &DeploymentQuery) -> anyhow::Result<Vec<Deployment>> {
        let mut deployments = self.filtered(query)?;

        deployments.sort_by_key(|deployment| sort_key(deployment, &query.sort_field));
        if query.order == SortOrder::Descending {
            deployments.reverse();
        }

        Ok(deployments
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count(&self, query: &DeploymentQuery) -> anyhow::Result<u64> {
        Ok(self.filtered(query)?.len() as u64)
    }
}

impl DeploymentMemoryPersistence {
    fn filtered(&self, query: &DeploymentQuery) -> anyhow::Result<Vec<Deployment>> {
        let locked_deployments = self.get_models_locked()?;

        let deployments = locked_deployments
            .values()
            .filter(|deployment| {
                matches_substring(&deployment.app_name, &query.app_name)
                    && matches_substring(&deployment.image_tag, &query.image_tag)
                    && matches_substring(&deployment.environment, &query.environment)
            })
            .cloned()
            .collect();

        Ok(deployments)
    }

    fn get_models_locked(&self) -> anyhow::Result<MutexGuard<HashMap<String, Deployment>>> {
        match self.models.lock() {
            Ok(locked_deployments) => Ok(locked_deployments),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }
}

fn matches_substring(value: &str, filter: &Option<String>) -> bool {
    match filter {
        Some(filter) => value.contains(filter.as_str()),
        None => true,
    }
}

fn sort_key(deployment: &Deployment, field: &str) -> String {
    match field {
        "image_tag" => deployment.image_tag.clone(),
        "environment" => deployment.environment.clone(),
        _ => deployment.app_name.clone(),
    }
}
