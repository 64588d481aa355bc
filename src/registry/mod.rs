use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    config::Settings,
    runtime::{with_retry, RetryPolicy},
};

/// One available tag for an app, as reported by the registry: the
/// short layer content hash and the tag name.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct RegistryImage {
    pub layer: String,
    pub name: String,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn list_images(&self, app_name: &str) -> anyhow::Result<Vec<RegistryImage>>;
}

/// Queries the configured registry over HTTP, with optional basic auth.
pub struct HttpRegistryClient {
    registry_url: String,
    registry_user: String,
    registry_password: Option<String>,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpRegistryClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            registry_url: settings.registry_url.trim_end_matches('/').to_owned(),
            registry_user: settings.registry_user.clone(),
            registry_password: settings.registry_password.clone(),
            http,
            retry: settings.retry,
        })
    }

    async fn list_images_once(&self, app_name: &str) -> anyhow::Result<Vec<RegistryImage>> {
        let url = format!(
            "{}/repositories/{}/{}/tags",
            self.registry_url, self.registry_user, app_name
        );

        tracing::debug!(%url, "fetching registry tags");

        let mut request = self.http.get(&url);
        if let Some(password) = &self.registry_password {
            request = request.basic_auth(&self.registry_user, Some(password));
        }

        let response = request.send().await?.error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn list_images(&self, app_name: &str) -> anyhow::Result<Vec<RegistryImage>> {
        with_retry(self.retry, || self.list_images_once(app_name)).await
    }
}
