use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path, sync::Arc, time::Duration};

use crate::models::{ContainerState, Host};

use super::{
    with_retry, with_retry_if, ContainerRecord, ImageNotPresent, LogOptions, RetryPolicy, RunSpec,
    RuntimeClient, RuntimeClientFactory,
};

/// Container listing entry as returned by `GET /containers/json`.
#[derive(Clone, Debug, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Image", default)]
    pub image: String,
}

/// Container detail as returned by `GET /containers/{id}/json`.
#[derive(Clone, Debug, Deserialize)]
pub struct ContainerDetail {
    #[serde(rename = "Id")]
    pub id: String,
    /// Image content hash, usually prefixed with `sha256:`.
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "Config", default)]
    pub config: ContainerConfig,
    #[serde(rename = "State", default)]
    pub state: ContainerStateDetail,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContainerConfig {
    /// Registry-qualified image reference the container was created from.
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "Cmd", default)]
    pub cmd: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContainerStateDetail {
    #[serde(rename = "Running", default)]
    pub running: bool,
    #[serde(rename = "Paused", default)]
    pub paused: bool,
    #[serde(rename = "Restarting", default)]
    pub restarting: bool,
    #[serde(rename = "Dead", default)]
    pub dead: bool,
    #[serde(rename = "StartedAt", default)]
    pub started_at: Option<String>,
    #[serde(rename = "FinishedAt", default)]
    pub finished_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateContainerRequest {
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "Env")]
    env: Vec<String>,
    #[serde(rename = "ExposedPorts")]
    exposed_ports: BTreeMap<String, EmptyObject>,
    #[serde(rename = "HostConfig")]
    host_config: HostConfig,
}

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Serialize)]
struct HostConfig {
    #[serde(rename = "PortBindings")]
    port_bindings: BTreeMap<String, Vec<PortBinding>>,
    #[serde(rename = "Binds")]
    binds: Vec<String>,
    #[serde(rename = "Links")]
    links: Vec<String>,
    #[serde(rename = "VolumesFrom")]
    volumes_from: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PortBinding {
    #[serde(rename = "HostPort")]
    host_port: String,
}

#[derive(Debug, Deserialize)]
struct CreateContainerResponse {
    #[serde(rename = "Id")]
    id: String,
}

/// Client certificate, key and CA bundle for the runtime's mutually
/// authenticated TLS endpoint.
#[derive(Clone, Debug)]
pub struct TlsMaterial {
    /// Client certificate and private key, PEM, concatenated.
    pub identity_pem: Vec<u8>,
    pub ca_pem: Vec<u8>,
}

impl TlsMaterial {
    pub fn from_files(
        client_cert: &Path,
        client_key: &Path,
        ca_cert: &Path,
    ) -> anyhow::Result<Self> {
        let mut identity_pem = fs::read(client_cert)
            .with_context(|| format!("failed to read client cert {}", client_cert.display()))?;
        let mut key_pem = fs::read(client_key)
            .with_context(|| format!("failed to read client key {}", client_key.display()))?;
        identity_pem.append(&mut key_pem);

        let ca_pem = fs::read(ca_cert)
            .with_context(|| format!("failed to read ca cert {}", ca_cert.display()))?;

        Ok(Self {
            identity_pem,
            ca_pem,
        })
    }
}

/// Docker Engine API client for one host.
#[derive(Debug)]
pub struct DockerRuntimeClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl DockerRuntimeClient {
    pub fn new(
        host: &Host,
        tls: &TlsMaterial,
        retry: RetryPolicy,
        connect_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let identity = reqwest::Identity::from_pem(&tls.identity_pem)?;
        let ca = reqwest::Certificate::from_pem(&tls.ca_pem)?;

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .add_root_certificate(ca)
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: format!("https://{}:{}", host.hostname, host.port),
            http,
            retry,
        })
    }

    pub async fn list(&self) -> anyhow::Result<Vec<ContainerSummary>> {
        with_retry(self.retry, || self.list_once()).await
    }

    pub async fn inspect(&self, container_id: &str) -> anyhow::Result<ContainerDetail> {
        with_retry(self.retry, || self.inspect_once(container_id)).await
    }

    async fn list_once(&self) -> anyhow::Result<Vec<ContainerSummary>> {
        let response = self
            .http
            .get(format!("{}/containers/json?all=true", self.base_url))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn inspect_once(&self, container_id: &str) -> anyhow::Result<ContainerDetail> {
        let response = self
            .http
            .get(format!("{}/containers/{}/json", self.base_url, container_id))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn pull_once(&self, image_ref: &str) -> anyhow::Result<()> {
        let response = self
            .http
            .post(format!("{}/images/create", self.base_url))
            .query(&[("fromImage", image_ref)])
            .send()
            .await?
            .error_for_status()?;

        // The engine streams pull progress; drain it so the pull completes.
        response.text().await?;

        Ok(())
    }

    async fn stop_once(&self, container_id: &str) -> anyhow::Result<()> {
        self.http
            .post(format!("{}/containers/{}/stop", self.base_url, container_id))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn remove_once(&self, container_id: &str) -> anyhow::Result<()> {
        self.http
            .delete(format!("{}/containers/{}", self.base_url, container_id))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn create_once(&self, spec: &RunSpec) -> anyhow::Result<String> {
        let request = build_create_request(spec)?;

        let response = self
            .http
            .post(format!("{}/containers/create", self.base_url))
            .query(&[("name", spec.name.as_str())])
            .json(&request)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow::Error::new(ImageNotPresent {
                image_ref: spec.image_ref.clone(),
            }));
        }

        let response = response.error_for_status()?;
        let created: CreateContainerResponse = response.json().await?;

        Ok(created.id)
    }

    async fn start_once(&self, container_id: &str) -> anyhow::Result<()> {
        self.http
            .post(format!(
                "{}/containers/{}/start",
                self.base_url, container_id
            ))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn logs_once(&self, container_id: &str, options: &LogOptions) -> anyhow::Result<String> {
        let response = self
            .http
            .get(format!("{}/containers/{}/logs", self.base_url, container_id))
            .query(&[
                ("stdout", options.stdout.to_string()),
                ("stderr", options.stderr.to_string()),
                ("tail", options.tail.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait::async_trait]
impl RuntimeClient for DockerRuntimeClient {
    async fn snapshot(&self) -> anyhow::Result<Vec<ContainerRecord>> {
        let summaries = self.list().await?;

        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries.iter() {
            let detail = self.inspect(&summary.id).await?;
            records.push(record_from_detail(&detail));
        }

        Ok(records)
    }

    async fn pull(&self, image_ref: &str) -> anyhow::Result<()> {
        with_retry(self.retry, || self.pull_once(image_ref)).await
    }

    async fn stop(&self, container_id: &str) -> anyhow::Result<()> {
        with_retry(self.retry, || self.stop_once(container_id)).await
    }

    async fn remove(&self, container_id: &str) -> anyhow::Result<()> {
        with_retry(self.retry, || self.remove_once(container_id)).await
    }

    async fn create_container(&self, spec: &RunSpec) -> anyhow::Result<String> {
        // A missing image won't appear by waiting; surface it so `run`
        // can pull instead.
        with_retry_if(
            self.retry,
            |error| !error.is::<ImageNotPresent>(),
            || self.create_once(spec),
        )
        .await
    }

    async fn start_container(&self, container_id: &str) -> anyhow::Result<()> {
        with_retry(self.retry, || self.start_once(container_id)).await
    }

    async fn logs(&self, container_id: &str, options: &LogOptions) -> anyhow::Result<String> {
        with_retry(self.retry, || self.logs_once(container_id, options)).await
    }
}

pub struct DockerRuntimeClientFactory {
    pub tls: TlsMaterial,
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
}

impl RuntimeClientFactory for DockerRuntimeClientFactory {
    fn client(&self, host: &Host) -> anyhow::Result<Arc<dyn RuntimeClient>> {
        let client = DockerRuntimeClient::new(host, &self.tls, self.retry, self.connect_timeout)?;

        Ok(Arc::new(client))
    }
}

fn build_create_request(spec: &RunSpec) -> anyhow::Result<CreateContainerRequest> {
    let mut exposed_ports = BTreeMap::new();
    let mut port_bindings = BTreeMap::new();

    for mapping in spec.mapped_ports.iter() {
        let (host_port, container_port) = mapping
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid port mapping {mapping}"))?;

        let container_port = format!("{}/tcp", container_port);

        exposed_ports.insert(container_port.clone(), EmptyObject {});
        port_bindings.insert(
            container_port,
            vec![PortBinding {
                host_port: host_port.to_owned(),
            }],
        );
    }

    let env = spec
        .environment
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();

    let links = spec
        .links
        .iter()
        .map(|name| format!("{}:{}", name, name))
        .collect();

    Ok(CreateContainerRequest {
        image: spec.image_ref.clone(),
        env,
        exposed_ports,
        host_config: HostConfig {
            port_bindings,
            binds: spec.mapped_volumes.clone(),
            links,
            volumes_from: spec.volumes_from.clone(),
        },
    })
}

fn record_from_detail(detail: &ContainerDetail) -> ContainerRecord {
    ContainerRecord {
        id: detail.id.clone(),
        image_id: detail
            .image
            .trim_start_matches("sha256:")
            .to_owned(),
        image_ref: detail.config.image.clone(),
        command: detail
            .config
            .cmd
            .as_ref()
            .map(|cmd| cmd.join(" "))
            .unwrap_or_default(),
        state: runtime_state(&detail.state),
        started_at: parse_runtime_timestamp(detail.state.started_at.as_deref()),
        finished_at: parse_runtime_timestamp(detail.state.finished_at.as_deref()),
    }
}

/// State precedence: dead > paused > restarting > running, else stopped.
fn runtime_state(state: &ContainerStateDetail) -> ContainerState {
    if state.dead {
        ContainerState::Dead
    } else if state.paused {
        ContainerState::Paused
    } else if state.restarting {
        ContainerState::Restarting
    } else if state.running {
        ContainerState::Running
    } else {
        ContainerState::Stopped
    }
}

/// The engine reports `0001-01-01T00:00:00Z` for timestamps that were
/// never set; those map to `None`.
fn parse_runtime_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;

    if value.is_empty() || value.starts_with("0001-01-01") {
        return None;
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}
