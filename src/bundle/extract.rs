// ─── Bundle Extraction ───
// Materializes the entries that must live on disk (native binaries, or
// everything under the legacy header flag) into a content-addressed cache
// directory keyed by executable name and bundle id. Extraction is
// idempotent: a file of the expected size at the target is taken as done;
// otherwise content is staged to a unique temporary sibling and atomically
// renamed into place, so a cross-process race loser simply replaces the
// winner's identical file and partial writes are never observable.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{HostError, HostResult};

use super::{Bundle, BundleFileEntry};

/// Overrides the default per-OS temp location for extracted files.
pub const ENV_EXTRACT_DIR: &str = "COREHOST_BUNDLE_EXTRACT_DIR";

/// Free space below which extraction logs a warning. Advisory only.
const MIN_FREE_DISK_BYTES: u64 = 64 * 1024 * 1024;

/// Base directory under which per-bundle extraction directories live.
pub fn extraction_root() -> PathBuf {
    env::var(ENV_EXTRACT_DIR)
        .ok()
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("corehost"))
}

/// `<root>/<exec_name>_<bundle_id>` — distinct bundles never share a
/// directory, re-runs of the same bundle always hit the same one.
pub fn extraction_dir(bundle: &Bundle) -> PathBuf {
    extraction_root().join(format!(
        "{}_{}",
        bundle.host_name(),
        bundle.manifest.header.bundle_id
    ))
}

/// Extract every entry the policy requires; returns the extraction
/// directory (created even when nothing needed extraction, so callers can
/// treat it as the virtual root).
#[instrument(skip_all, fields(host = %bundle.host_name()))]
pub fn extract_required(bundle: &Bundle) -> HostResult<PathBuf> {
    extract_filtered(bundle, bundle.manifest.header.extract_all())
}

/// Force-extract every entry regardless of type (the CLI `extract` path).
pub fn extract_all(bundle: &Bundle) -> HostResult<PathBuf> {
    extract_filtered(bundle, true)
}

fn extract_filtered(bundle: &Bundle, everything: bool) -> HostResult<PathBuf> {
    let dir = extraction_dir(bundle);
    fs::create_dir_all(&dir).map_err(|source| HostError::ExtractionIo {
        path: dir.clone(),
        source,
    })?;
    warn_if_low_disk(&dir);

    let mut extracted = 0usize;
    for entry in &bundle.manifest.entries {
        if entry.needs_extraction(everything) && extract_entry(bundle, entry, &dir)? {
            extracted += 1;
        }
    }
    debug!(dir = %dir.display(), extracted, "bundle extraction pass complete");
    Ok(dir)
}

/// Extract one entry into `dir`. Returns `false` when the size fast-path
/// found the file already in place.
pub fn extract_entry(bundle: &Bundle, entry: &BundleFileEntry, dir: &Path) -> HostResult<bool> {
    let target = dir.join(&entry.relative_path);
    if already_extracted(&target, entry.size) {
        return Ok(false);
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| HostError::ExtractionIo {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let staging = target.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    let result = write_staged(bundle, entry, &staging, &target);
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result?;

    debug!(entry = %entry.relative_path, target = %target.display(), "extracted");
    Ok(true)
}

fn write_staged(
    bundle: &Bundle,
    entry: &BundleFileEntry,
    staging: &Path,
    target: &Path,
) -> HostResult<()> {
    let content = bundle.entry_bytes(entry)?;
    let mut file = fs::File::create(staging).map_err(|source| HostError::ExtractionIo {
        path: staging.to_path_buf(),
        source,
    })?;
    file.write_all(&content)
        .and_then(|_| file.sync_all())
        .map_err(|source| HostError::ExtractionIo {
            path: staging.to_path_buf(),
            source,
        })?;
    drop(file);

    #[cfg(unix)]
    if entry.file_type == super::FileType::NativeBinary {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(staging, fs::Permissions::from_mode(0o755));
    }

    finalize_staged(staging, target, entry.size)
}

/// Move the staged file into place. On some platforms rename fails when
/// the target already exists; if a racing extractor got there first and
/// the target has the expected size, the staged copy is redundant.
fn finalize_staged(staging: &Path, target: &Path, expected_size: i64) -> HostResult<()> {
    match fs::rename(staging, target) {
        Ok(()) => Ok(()),
        Err(_) if already_extracted(target, expected_size) => {
            let _ = fs::remove_file(staging);
            Ok(())
        }
        Err(source) => Err(HostError::ExtractionIo {
            path: target.to_path_buf(),
            source,
        }),
    }
}

fn already_extracted(target: &Path, expected_size: i64) -> bool {
    match fs::metadata(target) {
        Ok(meta) => meta.is_file() && meta.len() == expected_size as u64,
        Err(_) => false,
    }
}

/// Advisory: warn when the volume holding `path` is nearly full. Never
/// fails the pipeline; wrong-filesystem answers are harmless.
fn warn_if_low_disk(path: &Path) {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    if let Some(bytes) = available {
        if bytes < MIN_FREE_DISK_BYTES {
            warn!(
                available = bytes,
                dir = %path.display(),
                "low disk space for bundle extraction"
            );
        }
    }
}
