use crate::persistence::Persistable;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct App {
    pub name: String,
}

impl Persistable<App> for App {
    fn get_id(&self) -> String {
        self.name.clone()
    }
}
