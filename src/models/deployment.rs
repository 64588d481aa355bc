use crate::persistence::Persistable;

/// A declared (app, image tag, environment) configuration: which hosts
/// run it, how its ports and volumes are mapped, and which other
/// deployments it depends on through image links / volumes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deployment {
    pub id: String,
    pub app_name: String,
    pub image_tag: String,
    pub environment: String,

    pub status_endpoint: String,
    pub status_port: u16,
    pub mapped_ports: Vec<String>,
    pub mapped_volumes: Vec<String>,

    pub hosts: Vec<String>,
    pub links: Vec<String>,
    pub volumes: Vec<String>,
    pub parent_id: Option<String>,
}

impl Deployment {
    pub fn make_id(app_name: &str, image_tag: &str, environment: &str) -> String {
        format!("{}:{}:{}", app_name, image_tag, environment)
    }

    /// The registry-qualified reference a container must report to be
    /// linked to this deployment.
    pub fn image_ref(&self, registry_user: &str) -> String {
        format!("{}/{}:{}", registry_user, self.app_name, self.image_tag)
    }
}

impl Persistable<Deployment> for Deployment {
    fn get_id(&self) -> String {
        self.id.clone()
    }
}

/// Partial update for a deployment. A field left as `None` keeps the
/// existing value; a present collection fully replaces the prior one,
/// so `hosts: Some(vec![])` clears the host set.
#[derive(Clone, Debug, Default)]
pub struct DeploymentUpdate {
    pub status_endpoint: Option<String>,
    pub status_port: Option<u16>,
    pub mapped_ports: Option<Vec<String>>,
    pub mapped_volumes: Option<Vec<String>>,
    pub hosts: Option<Vec<String>>,
    pub links: Option<Vec<String>>,
    pub volumes: Option<Vec<String>>,
    pub environment_variables: Option<Vec<(String, String)>>,
}
