//! Domain types, errors, and the capabilities the pipeline consumes.

pub mod capabilities;
pub mod errors;
pub mod model;
