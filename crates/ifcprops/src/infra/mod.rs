//! Infrastructure adapters for configuration, logging, models, and the remote service.

pub mod config;
pub mod json_model;
pub mod logging;
pub mod remote;
