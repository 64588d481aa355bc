use crate::{models::Container, persistence::ContainerPersistence};

pub struct ContainerService {
    pub persistence: Box<dyn ContainerPersistence>,
}

impl ContainerService {
    #[tracing::instrument(name = "service::container::upsert", skip(self, container))]
    pub async fn upsert(&self, container: &Container) -> anyhow::Result<u64> {
        self.persistence.upsert(container).await
    }

    pub async fn get_by_id(&self, container_id: &str) -> anyhow::Result<Option<Container>> {
        self.persistence.get_by_id(container_id).await
    }

    pub async fn get_by_host_id(&self, host_id: &str) -> anyhow::Result<Vec<Container>> {
        self.persistence.get_by_host_id(host_id).await
    }

    pub async fn get_by_image_id(&self, image_id: &str) -> anyhow::Result<Vec<Container>> {
        self.persistence.get_by_image_id(image_id).await
    }

    pub async fn get_by_image_ref(&self, image_ref: &str) -> anyhow::Result<Vec<Container>> {
        self.persistence.get_by_image_ref(image_ref).await
    }

    pub async fn get_by_deployment_id(
        &self,
        deployment_id: &str,
    ) -> anyhow::Result<Vec<Container>> {
        self.persistence.get_by_deployment_id(deployment_id).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Container>> {
        self.persistence.list().await
    }

    #[tracing::instrument(name = "service::container::delete", skip(self))]
    pub async fn delete(&self, container_id: &str) -> anyhow::Result<u64> {
        self.persistence.delete(container_id).await
    }

    /// Cascade helper: delete every container owned by a host.
    pub async fn delete_by_host_id(&self, host_id: &str) -> anyhow::Result<u64> {
        let containers = self.get_by_host_id(host_id).await?;

        let mut deleted_count = 0;
        for container in containers.iter() {
            deleted_count += self.persistence.delete(&container.id).await?;
        }

        Ok(deleted_count)
    }

    /// Cascade helper: delete every container owned by an image.
    pub async fn delete_by_image_id(&self, image_id: &str) -> anyhow::Result<u64> {
        let containers = self.get_by_image_id(image_id).await?;

        let mut deleted_count = 0;
        for container in containers.iter() {
            deleted_count += self.persistence.delete(&container.id).await?;
        }

        Ok(deleted_count)
    }

    /// Detach helper: clear the deployment reference of every container
    /// attached to a deployment, leaving the containers themselves in
    /// place.
    pub async fn detach_from_deployment(&self, deployment_id: &str) -> anyhow::Result<u64> {
        let containers = self.get_by_deployment_id(deployment_id).await?;

        let mut detached_count = 0;
        for container in containers.into_iter() {
            let mut container = container;
            container.deployment_id = None;
            detached_count += self.persistence.upsert(&container).await?;
        }

        Ok(detached_count)
    }
}
