//! Installed-framework scanning and roll-forward resolution.

pub mod reference;
pub mod resolver;

pub use reference::{FrameworkReference, InstalledComponent};
pub use resolver::{list_installed, resolve_reference, resolve_references, scan_framework_versions};
