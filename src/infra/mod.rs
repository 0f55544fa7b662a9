pub mod cloud;
pub mod config;
pub mod shared;
pub mod telemetry;
