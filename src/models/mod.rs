mod app;
mod container;
mod deployment;
mod environment_variable;
mod host;
mod image;

pub use app::App;
pub use container::{Container, ContainerState, ContainerStatus};
pub use deployment::{Deployment, DeploymentUpdate};
pub use environment_variable::EnvironmentVariable;
pub use host::{Host, HostStatus};
pub use image::Image;
