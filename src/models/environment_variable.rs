use crate::persistence::Persistable;

/// One environment variable of a deployment. Keys are unique per
/// deployment; `position` preserves declaration order for the runtime
/// container-creation request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvironmentVariable {
    pub id: String,
    pub deployment_id: String,
    pub property_key: String,
    pub property_value: String,
    pub position: u32,
}

impl EnvironmentVariable {
    pub fn make_id(deployment_id: &str, property_key: &str) -> String {
        format!("{}/{}", deployment_id, property_key)
    }
}

impl Persistable<EnvironmentVariable> for EnvironmentVariable {
    fn get_id(&self) -> String {
        self.id.clone()
    }
}
