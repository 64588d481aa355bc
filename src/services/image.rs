use std::sync::Arc;

use crate::{
    models::Image,
    persistence::{ImagePersistence, ImageQuery},
};

use super::ContainerService;

pub struct ImageService {
    pub persistence: Box<dyn ImagePersistence>,

    pub container_service: Arc<ContainerService>,
}

impl ImageService {
    pub async fn upsert(&self, image: &Image) -> anyhow::Result<u64> {
        self.persistence.upsert(image).await
    }

    pub async fn get_by_id(&self, image_id: &str) -> anyhow::Result<Option<Image>> {
        self.persistence.get_by_id(image_id).await
    }

    pub async fn get_by_app_name(&self, app_name: &str) -> anyhow::Result<Vec<Image>> {
        self.persistence.get_by_app_name(app_name).await
    }

    pub async fn query(&self, query: &ImageQuery) -> anyhow::Result<Vec<Image>> {
        self.persistence.query(query).await
    }

    pub async fn count(&self, query: &ImageQuery) -> anyhow::Result<u64> {
        self.persistence.count(query).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Image>> {
        self.persistence.list().await
    }

    /// Deleting an image cascades deletion of its containers.
    #[tracing::instrument(name = "service::image::delete", skip(self))]
    pub async fn delete(&self, image_id: &str) -> anyhow::Result<u64> {
        self.container_service.delete_by_image_id(image_id).await?;

        self.persistence.delete(image_id).await
    }
}
