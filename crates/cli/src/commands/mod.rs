//! CLI command implementations

pub mod apps;
pub mod deploy;
