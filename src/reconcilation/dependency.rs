use std::{future::Future, pin::Pin, sync::Arc};

use crate::{
    models::Deployment,
    runtime::{DeploymentTree, RunSpec},
    services::{DeploymentService, ImageService},
};

/// Resolves a deployment's link/volume image references into a tree of
/// deployments that must be brought up first.
///
/// Links and volumes reference images, so each reference is resolved
/// opportunistically to a deployment of the image's app in the same
/// environment; references that don't resolve are logged and skipped.
pub struct DependencyResolver {
    pub deployment_service: Arc<DeploymentService>,
    pub image_service: Arc<ImageService>,

    pub registry_user: String,
}

impl DependencyResolver {
    pub async fn resolve(&self, deployment: &Deployment) -> anyhow::Result<DeploymentTree> {
        let mut path = Vec::new();

        self.resolve_node(deployment.clone(), &mut path).await
    }

    fn resolve_node<'a>(
        &'a self,
        deployment: Deployment,
        path: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<DeploymentTree>> + Send + 'a>> {
        Box::pin(async move {
            if path.contains(&deployment.id) {
                return Err(anyhow::anyhow!(
                    "dependency cycle detected involving deployment {}",
                    deployment.id
                ));
            }

            path.push(deployment.id.clone());

            let mut dependencies = Vec::new();
            let mut links = Vec::new();
            let mut volumes_from = Vec::new();

            for image_id in deployment.links.iter() {
                if let Some(dependency) = self
                    .resolve_reference(image_id, &deployment.environment)
                    .await?
                {
                    links.push(dependency.app_name.clone());
                    dependencies.push(self.resolve_node(dependency, path).await?);
                }
            }

            for image_id in deployment.volumes.iter() {
                if let Some(dependency) = self
                    .resolve_reference(image_id, &deployment.environment)
                    .await?
                {
                    volumes_from.push(dependency.app_name.clone());
                    dependencies.push(self.resolve_node(dependency, path).await?);
                }
            }

            path.pop();

            let environment = self
                .deployment_service
                .get_environment_variables(&deployment.id)
                .await?
                .into_iter()
                .map(|variable| (variable.property_key, variable.property_value))
                .collect();

            let spec = RunSpec {
                name: deployment.app_name.clone(),
                image_ref: deployment.image_ref(&self.registry_user),
                mapped_ports: deployment.mapped_ports.clone(),
                mapped_volumes: deployment.mapped_volumes.clone(),
                environment,
                links,
                volumes_from,
            };

            Ok(DeploymentTree {
                deployment_id: deployment.id,
                spec,
                dependencies,
            })
        })
    }

    /// A link/volume entry names an image; the deployment to act on is
    /// the one of the same app in the same environment. Prefer the
    /// deployment matching the image's tag when several exist.
    async fn resolve_reference(
        &self,
        image_id: &str,
        environment: &str,
    ) -> anyhow::Result<Option<Deployment>> {
        let image = match self.image_service.get_by_id(image_id).await? {
            Some(image) => image,
            None => {
                tracing::warn!(image_id, "linked image not found, skipping dependency");
                return Ok(None);
            }
        };

        let mut candidates = self
            .deployment_service
            .get_by_app_and_environment(&image.app_name, environment)
            .await?;

        if candidates.is_empty() {
            tracing::warn!(
                image_id,
                app_name = %image.app_name,
                environment,
                "no deployment for linked image, skipping dependency"
            );
            return Ok(None);
        }

        let matching_tag = candidates
            .iter()
            .position(|candidate| candidate.image_tag == image.tag);

        Ok(Some(match matching_tag {
            Some(index) => candidates.swap_remove(index),
            None => candidates.swap_remove(0),
        }))
    }
}
