//! OS and architecture identity helpers shared by location discovery and
//! RID fallback computation.

/// Short architecture tag as used in RIDs and env var suffixes.
pub fn platform_arch() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "x64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "x86") {
        "x86"
    } else if cfg!(target_arch = "arm") {
        "arm"
    } else {
        "unknown"
    }
}

/// Short OS tag as used in RIDs.
pub fn platform_os() -> &'static str {
    if cfg!(target_os = "windows") {
        "win"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unix"
    }
}

/// Uppercase suffix for architecture-qualified env vars (`COREHOST_ROOT_X64`).
pub fn arch_env_suffix() -> String {
    platform_arch().to_ascii_uppercase()
}
