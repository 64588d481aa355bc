pub mod config;
pub mod models;
pub mod persistence;
pub mod reconcilation;
pub mod registry;
pub mod runtime;
pub mod services;
