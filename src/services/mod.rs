mod app;
mod container;
mod deployment;
mod host;
mod image;

pub use app::AppService;
pub use container::ContainerService;
pub use deployment::DeploymentService;
pub use host::HostService;
pub use image::ImageService;
