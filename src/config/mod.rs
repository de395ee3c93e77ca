//! Start-up manifest parsing.

pub mod runtime_config;

pub use runtime_config::{RuntimeConfig, CONFIG_SUFFIX};
