//! Application layer orchestrating the selection pipeline and its consumers.

pub mod export;
pub mod forward;
pub mod relations;
pub mod resolve;
pub mod selection;
pub mod session;
pub mod store;
