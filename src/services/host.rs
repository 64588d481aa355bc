use std::sync::Arc;

use crate::{models::Host, persistence::Persistence};

use super::ContainerService;

pub struct HostService {
    pub persistence: Box<dyn Persistence<Host>>,

    pub container_service: Arc<ContainerService>,
}

impl HostService {
    #[tracing::instrument(name = "service::host::create", skip(self, host))]
    pub async fn create(&self, host: &Host) -> anyhow::Result<()> {
        if self.get_by_id(&host.hostname).await?.is_some() {
            return Err(anyhow::anyhow!(
                "host with name {} already exists",
                host.hostname
            ));
        }

        self.persistence.upsert(host).await?;

        tracing::info!(hostname = %host.hostname, "host created");

        Ok(())
    }

    pub async fn upsert(&self, host: &Host) -> anyhow::Result<u64> {
        self.persistence.upsert(host).await
    }

    pub async fn get_by_id(&self, hostname: &str) -> anyhow::Result<Option<Host>> {
        self.persistence.get_by_id(hostname).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Host>> {
        self.persistence.list().await
    }

    /// Deleting a host cascades deletion of its containers.
    #[tracing::instrument(name = "service::host::delete", skip(self))]
    pub async fn delete(&self, hostname: &str) -> anyhow::Result<u64> {
        let host = match self.get_by_id(hostname).await? {
            Some(host) => host,
            None => return Err(anyhow::anyhow!("host with name {hostname} not found")),
        };

        self.container_service
            .delete_by_host_id(&host.hostname)
            .await?;

        let deleted_count = self.persistence.delete(hostname).await?;

        tracing::info!(hostname, "host deleted");

        Ok(deleted_count)
    }
}
