use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::platform;

/// Explicit install root, generic form. The architecture-qualified form
/// (`COREHOST_ROOT_X64` etc.) wins over this one.
pub const ENV_ROOT: &str = "COREHOST_ROOT";
/// Set to `0` to skip the global install locations entirely.
pub const ENV_MULTILEVEL_LOOKUP: &str = "COREHOST_MULTILEVEL_LOOKUP";

const INSTALL_LOCATION_FILE: &str = "install_location";

/// Caller-supplied knobs for a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Overrides the env-declared root when set.
    pub explicit_root: Option<PathBuf>,
    pub disable_multilevel_lookup: bool,
}

/// Produce the ordered, de-duplicated list of existing install roots:
/// explicit root first, then the registered install location, then the
/// fixed per-OS defaults. An empty result is not an error; it simply
/// means no frameworks will be found.
pub fn discover_roots(options: &DiscoveryOptions) -> Vec<PathBuf> {
    let explicit = options
        .explicit_root
        .clone()
        .or_else(explicit_root_from_env);

    let mut candidates = Vec::new();
    if let Some(root) = explicit {
        candidates.push(root);
    }
    if !options.disable_multilevel_lookup && !multilevel_disabled_by_env() {
        candidates.extend(global_root_candidates());
    }

    let roots = retain_existing_unique(&candidates);
    debug!(count = roots.len(), "install roots discovered");
    roots
}

fn explicit_root_from_env() -> Option<PathBuf> {
    let qualified = format!("{}_{}", ENV_ROOT, platform::arch_env_suffix());
    env::var(qualified)
        .or_else(|_| env::var(ENV_ROOT))
        .ok()
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn multilevel_disabled_by_env() -> bool {
    env::var(ENV_MULTILEVEL_LOOKUP).map(|v| v == "0").unwrap_or(false)
}

/// Global phase: registered install location (if any) before the fixed
/// OS defaults, then the per-user root as a last resort.
fn global_root_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(registered) = registered_install_location() {
        candidates.push(registered);
    }
    candidates.extend(default_install_roots());
    if let Some(user) = user_install_root() {
        candidates.push(user);
    }
    candidates
}

/// Per-user install root under the platform data directory.
fn user_install_root() -> Option<PathBuf> {
    dirs::data_dir().map(|base| base.join("corehost"))
}

/// Read the registered install root from the install-location file. The
/// architecture-qualified file is consulted first, then the generic one.
/// Unreadable or empty files are skipped silently.
fn registered_install_location() -> Option<PathBuf> {
    let dir = install_location_dir()?;
    let qualified = dir.join(format!(
        "{}_{}",
        INSTALL_LOCATION_FILE,
        platform::platform_arch()
    ));
    read_location_file(&qualified).or_else(|| read_location_file(&dir.join(INSTALL_LOCATION_FILE)))
}

fn read_location_file(path: &Path) -> Option<PathBuf> {
    let contents = fs::read_to_string(path).ok()?;
    let first_line = contents.lines().next()?.trim();
    if first_line.is_empty() {
        None
    } else {
        Some(PathBuf::from(first_line))
    }
}

#[cfg(windows)]
fn install_location_dir() -> Option<PathBuf> {
    env::var("ProgramData")
        .ok()
        .map(|base| PathBuf::from(base).join("corehost"))
}

#[cfg(not(windows))]
fn install_location_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/etc/corehost"))
}

#[cfg(windows)]
fn default_install_roots() -> Vec<PathBuf> {
    env::var("ProgramFiles")
        .ok()
        .map(|base| vec![PathBuf::from(base).join("corehost")])
        .unwrap_or_default()
}

#[cfg(target_os = "macos")]
fn default_install_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/usr/local/share/corehost")]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn default_install_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/share/corehost"),
        PathBuf::from("/usr/lib/corehost"),
    ]
}

/// Keep candidates that exist on disk, canonicalized, first occurrence
/// wins. Comparison is case-insensitive on Windows.
fn retain_existing_unique(candidates: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut roots = Vec::new();

    for candidate in candidates {
        if !candidate.is_dir() {
            debug!(path = %candidate.display(), "install root candidate missing, skipped");
            continue;
        }
        let canonical = fs::canonicalize(candidate).unwrap_or_else(|_| candidate.clone());
        let key = if cfg!(windows) {
            canonical.to_string_lossy().to_lowercase()
        } else {
            canonical.to_string_lossy().to_string()
        };
        if seen.insert(key) {
            roots.push(canonical);
        }
    }
    roots
}
