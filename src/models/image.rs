use crate::persistence::Persistable;

/// An image tag fetched from the registry. The id is the short (8 char)
/// layer hash the registry reports for the tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    pub id: String,
    pub tag: String,
    pub app_name: String,
}

impl Image {
    /// The registry-qualified reference containers report for this image.
    pub fn registry_ref(&self, registry_user: &str) -> String {
        format!("{}/{}:{}", registry_user, self.app_name, self.tag)
    }
}

impl Persistable<Image> for Image {
    fn get_id(&self) -> String {
        self.id.clone()
    }
}
