use async_trait::async_trait;
use std::time::Duration;

/// Application-level health check, distinct from runtime state.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(true)` for a 2xx response; `Ok(false)` for any other status.
    /// Transport failures surface as errors and count as down.
    async fn check(&self, url: &str) -> anyhow::Result<bool>;
}

pub struct HttpHealthProbe {
    http: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self { http })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, url: &str) -> anyhow::Result<bool> {
        let response = self.http.get(url).send().await?;

        Ok(response.status().is_success())
    }
}
