use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    models::Container,
    persistence::{ContainerPersistence, Persistable, Persistence},
};

#[derive(Debug, Default)]
pub struct ContainerMemoryPersistence {
    models: Arc<Mutex<HashMap<String, Container>>>,
}

#[async_trait]
impl Persistence<Container> for ContainerMemoryPersistence {
    async fn upsert(&self, container: &Container) -> anyhow::Result<u64> {
        let mut locked_containers = self.get_models_locked()?;

        locked_containers.insert(container.get_id(), container.clone());

        Ok(1)
    }

    async fn delete(&self, container_id: &str) -> anyhow::Result<u64> {
        let mut locked_containers = self.get_models_locked()?;

        match locked_containers.remove(container_id) {
            Some(_) => Ok(1),
            None => Ok(0),
        }
    }

    async fn get_by_id(&self, container_id: &str) -> anyhow::Result<Option<Container>> {
        let locked_containers = self.get_models_locked()?;

        Ok(locked_containers.get(container_id).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<Container>> {
        let locked_containers = self.get_models_locked()?;

        Ok(locked_containers.values().cloned().collect())
    }
}

#[async_trait]
impl ContainerPersistence for ContainerMemoryPersistence {
    async fn get_by_host_id(&self, host_id: &str) -> anyhow::Result<Vec<Container>> {
        self.filter(|container| container.host_id.as_deref() == Some(host_id))
    }

    async fn get_by_image_id(&self, image_id: &str) -> anyhow::Result<Vec<Container>> {
        self.filter(|container| container.image_id.as_deref() == Some(image_id))
    }

    async fn get_by_image_ref(&self, image_ref: &str) -> anyhow::Result<Vec<Container>> {
        self.filter(|container| container.image_ref == image_ref)
    }

    async fn get_by_deployment_id(&self, deployment_id: &str) -> anyhow::Result<Vec<Container>> {
        self.filter(|container| container.deployment_id.as_deref() == Some(deployment_id))
    }
}

impl ContainerMemoryPersistence {
    fn filter(
        &self,
        predicate: impl Fn(&Container) -> bool,
    ) -> anyhow::Result<Vec<Container>> {
        let locked_containers = self.get_models_locked()?;

        let containers = locked_containers
            .values()
            .filter(|container| predicate(container))
            .cloned()
            .collect();

        Ok(containers)
    }

    fn get_models_locked(&self) -> anyhow::Result<MutexGuard<HashMap<String, Container>>> {
        match self.models.lock() {
            Ok(locked_containers) => Ok(locked_containers),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }
}
