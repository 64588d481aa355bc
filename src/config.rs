use std::{path::PathBuf, time::Duration};

use crate::runtime::RetryPolicy;

const DEFAULT_RECONCILE_INTERVAL_SECONDS: u64 = 300;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECONDS: u64 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone, Debug)]
pub struct Settings {
    pub registry_url: String,
    pub registry_user: String,
    pub registry_password: Option<String>,

    pub docker_client_cert: PathBuf,
    pub docker_client_key: PathBuf,
    pub docker_ca_cert: PathBuf,

    pub reconcile_interval: Duration,
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let registry_url = required_var("REGISTRY_URL")?;
        let registry_user = required_var("REGISTRY_USER")?;
        let registry_password = dotenvy::var("REGISTRY_PASSWORD").ok();

        let docker_client_cert = PathBuf::from(required_var("DOCKER_CLIENT_CERT")?);
        let docker_client_key = PathBuf::from(required_var("DOCKER_CLIENT_KEY")?);
        let docker_ca_cert = PathBuf::from(required_var("DOCKER_CA_CERT")?);

        let reconcile_interval = Duration::from_secs(numeric_var(
            "RECONCILE_INTERVAL_SECONDS",
            DEFAULT_RECONCILE_INTERVAL_SECONDS,
        )?);

        let retry = RetryPolicy {
            attempts: numeric_var("RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?,
            delay: Duration::from_secs(numeric_var(
                "RETRY_DELAY_SECONDS",
                DEFAULT_RETRY_DELAY_SECONDS,
            )?),
        };

        let connect_timeout = Duration::from_secs(numeric_var(
            "CONNECT_TIMEOUT_SECONDS",
            DEFAULT_CONNECT_TIMEOUT_SECONDS,
        )?);

        Ok(Self {
            registry_url,
            registry_user,
            registry_password,
            docker_client_cert,
            docker_client_key,
            docker_ca_cert,
            reconcile_interval,
            retry,
            connect_timeout,
        })
    }
}

fn required_var(name: &str) -> anyhow::Result<String> {
    dotenvy::var(name).map_err(|_| anyhow::anyhow!("{name} must be set"))
}

fn numeric_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match dotenvy::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} must be numeric, got {value}")),
        Err(_) => Ok(default),
    }
}
