//! Install-root discovery: explicit root, registered location, OS defaults.

pub mod locations;

pub use locations::{discover_roots, DiscoveryOptions, ENV_MULTILEVEL_LOOKUP, ENV_ROOT};
