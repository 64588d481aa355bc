use chrono::{DateTime, Utc};

use crate::persistence::Persistable;

/// Lifecycle phase as reported by the container runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerState {
    Running,
    Stopped,
    Paused,
    Restarting,
    Dead,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Dead => "dead",
        }
    }
}

/// Application health as derived from the HTTP status probe. Distinct
/// from the runtime state: a running container can still be down.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ContainerStatus {
    Up,
    #[default]
    Down,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Container {
    /// Runtime-assigned id (64 char content hash).
    pub id: String,

    pub command: String,
    pub image_ref: String,
    pub state: ContainerState,
    pub status: ContainerStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    pub host_id: Option<String>,
    pub image_id: Option<String>,
    pub deployment_id: Option<String>,
}

impl Persistable<Container> for Container {
    fn get_id(&self) -> String {
        self.id.clone()
    }
}
