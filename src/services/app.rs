use std::sync::Arc;

use crate::{models::App, persistence::Persistence};

use super::{DeploymentService, ImageService};

pub struct AppService {
    pub persistence: Box<dyn Persistence<App>>,

    pub deployment_service: Arc<DeploymentService>,
    pub image_service: Arc<ImageService>,
}

impl AppService {
    #[tracing::instrument(name = "service::app::create", skip(self, app))]
    pub async fn create(&self, app: &App) -> anyhow::Result<()> {
        if self.get_by_name(&app.name).await?.is_some() {
            return Err(anyhow::anyhow!(
                "app with name {} already exists",
                app.name
            ));
        }

        self.persistence.upsert(app).await?;

        tracing::info!(app = %app.name, "app created");

        Ok(())
    }

    pub async fn get_by_name(&self, name: &str) -> anyhow::Result<Option<App>> {
        self.persistence.get_by_id(name).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<App>> {
        self.persistence.list().await
    }

    /// Substring filtered listing for the management API.
    pub async fn list_by_name(&self, name: &str) -> anyhow::Result<Vec<App>> {
        let apps = self.persistence.list().await?;

        Ok(apps
            .into_iter()
            .filter(|app| app.name.contains(name))
            .collect())
    }

    /// Deleting an app cascades its images (and through them their
    /// containers) and its deployments.
    #[tracing::instrument(name = "service::app::delete", skip(self))]
    pub async fn delete(&self, name: &str) -> anyhow::Result<u64> {
        if self.get_by_name(name).await?.is_none() {
            return Err(anyhow::anyhow!("app with name {name} not found"));
        }

        for image in self.image_service.get_by_app_name(name).await? {
            self.image_service.delete(&image.id).await?;
        }

        for deployment in self.deployment_service.get_by_app_name(name).await? {
            self.deployment_service.delete(&deployment.id).await?;
        }

        let deleted_count = self.persistence.delete(name).await?;

        tracing::info!(app = name, "app deleted");

        Ok(deleted_count)
    }
}
