use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::persistence::{Persistable, Persistence};

/// Hash map backed persistence for models that only need the generic
/// operations (hosts, apps).
#[derive(Debug)]
pub struct MemoryPersistence<Model>
where
    Model: Persistable<Model>,
{
    models: Arc<Mutex<HashMap<String, Model>>>,
}

#[async_trait]
impl<Model> Persistence<Model> for MemoryPersistence<Model>
where
    Model: Persistable<Model>,
{
    async fn upsert(&self, model: &Model) -> anyhow::Result<u64> {
        let mut locked_models = self.get_models_locked()?;

        locked_models.insert(model.get_id(), model.clone());

        Ok(1)
    }

    async fn delete(&self, model_id: &str) -> anyhow::Result<u64> {
        let mut locked_models = self.get_models_locked()?;

        match locked_models.remove(model_id) {
            Some(_) => Ok(1),
            None => Ok(0),
        }
    }

    async fn get_by_id(&self, model_id: &str) -> anyhow::Result<Option<Model>> {
        let locked_models = self.get_models_locked()?;

        match locked_models.get(model_id) {
            Some(fetched_model) => Ok(Some(fetched_model.clone())),
            None => Ok(None),
        }
    }

    async fn list(&self) -> anyhow::Result<Vec<Model>> {
        let locked_models = self.get_models_locked()?;

        let models = locked_models.values().cloned().collect();

        Ok(models)
    }
}

impl<Model> Default for MemoryPersistence<Model>
where
    Model: Persistable<Model>,
{
    fn default() -> Self {
        Self {
            models: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<Model> MemoryPersistence<Model>
where
    Model: Persistable<Model>,
{
    fn get_models_locked(&self) -> anyhow::Result<MutexGuard<HashMap<String, Model>>> {
        match self.models.lock() {
            Ok(locked_models) => Ok(locked_models),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::Host;
    use crate::test::get_host_fixture;

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let host_persistence = MemoryPersistence::<Host>::default();
        let host = get_host_fixture(None);

        host_persistence.upsert(&host).await.unwrap();

        let fetched_host = host_persistence
            .get_by_id(&host.hostname)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fetched_host.hostname, host.hostname);
        assert_eq!(fetched_host.port, host.port);

        let deleted_hosts = host_persistence.delete(&host.hostname).await.unwrap();
        assert_eq!(deleted_hosts, 1);

        let deleted_hosts = host_persistence.delete(&host.hostname).await.unwrap();
        assert_eq!(deleted_hosts, 0);
    }
}
