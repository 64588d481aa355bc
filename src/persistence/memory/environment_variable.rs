use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    models::EnvironmentVariable,
    persistence::{EnvironmentVariablePersistence, Persistable, Persistence},
};

#[derive(Debug, Default)]
pub struct EnvironmentVariableMemoryPersistence {
    models: Arc<Mutex<HashMap<String, EnvironmentVariable>>>,
}

#[async_trait]
impl Persistence<EnvironmentVariable> for EnvironmentVariableMemoryPersistence {
    async fn upsert(&self, variable: &EnvironmentVariable) -> anyhow::Result<u64> {
        let mut locked_variables = self.get_models_locked()?;

        locked_variables.insert(variable.get_id(), variable.clone());

        Ok(1)
    }

    async fn delete(&self, variable_id: &str) -> anyhow::Result<u64> {
        let mut locked_variables = self.get_models_locked()?;

        match locked_variables.remove(variable_id) {
            Some(_) => Ok(1),
            None => Ok(0),
        }
    }

    async fn get_by_id(&self, variable_id: &str) -> anyhow::Result<Option<EnvironmentVariable>> {
        let locked_variables = self.get_models_locked()?;

        Ok(locked_variables.get(variable_id).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<EnvironmentVariable>> {
        let locked_variables = self.get_models_locked()?;

        Ok(locked_variables.values().cloned().collect())
    }
}

#[async_trait]
impl EnvironmentVariablePersistence for EnvironmentVariableMemoryPersistence {
    async fn get_by_deployment_id(
        &self,
        deployment_id: &str,
    ) -> anyhow::Result<Vec<EnvironmentVariable>> {
        let locked_variables = self.get_models_locked()?;

        let mut variables: Vec<EnvironmentVariable> = locked_variables
            .values()
            .filter(|variable| variable.deployment_id == deployment_id)
            .cloned()
            .collect();

        variables.sort_by_key(|variable| variable.position);

        Ok(variables)
    }

    async fn delete_by_deployment_id(&self, deployment_id: &str) -> anyhow::Result<u64> {
        let mut locked_variables = self.get_models_locked()?;

        let variable_ids: Vec<String> = locked_variables
            .values()
            .filter(|variable| variable.deployment_id == deployment_id)
            .map(|variable| variable.id.clone())
            .collect();

        for variable_id in variable_ids.iter() {
            locked_variables.remove(variable_id);
        }

        Ok(variable_ids.len() as u64)
    }
}

impl EnvironmentVariableMemoryPersistence {
    fn get_models_locked(
        &self,
    ) -> anyhow::Result<MutexGuard<HashMap<String, EnvironmentVariable>>> {
        match self.models.lock() {
            Ok(locked_variables) => Ok(locked_variables),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }
}
