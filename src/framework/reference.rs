use std::path::{Path, PathBuf};

use crate::version::{HostVersion, RollForward};

/// A framework requested by the application's runtime configuration.
///
/// The `resolved_*` fields start empty and are written exactly once, by the
/// resolver; the reference is scoped to a single resolution attempt.
#[derive(Debug, Clone)]
pub struct FrameworkReference {
    pub name: String,
    pub requested_version: HostVersion,
    pub roll_forward: RollForward,
    pub apply_patches: bool,
    pub resolved_path: Option<PathBuf>,
    pub resolved_version: Option<HostVersion>,
}

impl FrameworkReference {
    pub fn new(name: impl Into<String>, requested_version: HostVersion) -> Self {
        Self {
            name: name.into(),
            requested_version,
            roll_forward: RollForward::default(),
            apply_patches: true,
            resolved_path: None,
            resolved_version: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_version.is_some()
    }

    /// Directory of the selected framework version, once resolved.
    pub fn resolved_dir(&self) -> Option<&Path> {
        self.resolved_path.as_deref()
    }
}

/// An installed framework version found by directory scan. Ephemeral;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledComponent {
    pub path: PathBuf,
    pub version: HostVersion,
}
