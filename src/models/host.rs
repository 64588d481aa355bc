use crate::persistence::Persistable;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HostStatus {
    Up,
    #[default]
    Down,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Up => "up",
            HostStatus::Down => "down",
        }
    }
}

/// A host running a container runtime. The hostname doubles as the
/// record id since it is required to be unique.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Host {
    pub hostname: String,
    pub port: u16,

    pub alias: Option<String>,
    pub status: HostStatus,
    pub scaling_group: Option<String>,
}

impl Persistable<Host> for Host {
    fn get_id(&self) -> String {
        self.hostname.clone()
    }
}
