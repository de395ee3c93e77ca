//! Managed-runtime host resolver and single-file bundle loader.
//!
//! Given a start-up request, determines which installed execution-engine
//! version to load and builds the assembly/native search lists the engine
//! should see. For single-file deployments it also locates and extracts
//! payload embedded in the host executable itself.

pub mod bundle;
pub mod config;
pub mod deps;
pub mod discovery;
pub mod error;
pub mod framework;
pub mod host;
pub mod platform;
pub mod version;

pub use error::{HostError, HostResult};
