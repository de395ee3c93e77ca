//! Dependency manifest parsing and RID-aware asset reconciliation.

pub mod manifest;
pub mod resolver;
pub mod rid;

pub use manifest::{Asset, AssetType, DependencyManifest, Library, DEPS_SUFFIX};
pub use resolver::{resolve_assets, DepsLayer, PinnedAssets, ResolvedAssets};
pub use rid::{host_rid, portable_host_rid, ENV_RUNTIME_ID};
