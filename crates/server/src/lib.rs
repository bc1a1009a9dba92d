pub mod api;
pub mod config;
pub mod error;
pub mod report;
pub mod services;
pub mod store_factory;
pub mod telemetry;
