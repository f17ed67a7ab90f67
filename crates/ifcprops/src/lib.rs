pub mod app;
pub mod cli;
pub mod domain;
pub mod infra;

/// Install logging according to the loaded configuration.
pub fn init(config: &infra::config::Config) {
    infra::logging::init(&config.logging);
}
