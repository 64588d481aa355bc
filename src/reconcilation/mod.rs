mod dependency;
mod engine;
mod probe;

pub use dependency::DependencyResolver;
pub use engine::{PassSummary, ReconciliationEngine};
pub use probe::{HealthProbe, HttpHealthProbe};
