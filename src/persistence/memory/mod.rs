mod container;
mod deployment;
mod environment_variable;
mod generic;
mod image;

pub use container::ContainerMemoryPersistence;
pub use deployment::DeploymentMemoryPersistence;
pub use environment_variable::EnvironmentVariableMemoryPersistence;
pub use generic::MemoryPersistence;
pub use image::ImageMemoryPersistence;
