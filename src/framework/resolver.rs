use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::error::{HostError, HostResult};
use crate::version::{best_match, HostVersion};

use super::reference::{FrameworkReference, InstalledComponent};

/// Frameworks live under `<root>/shared/<name>/<version>/`.
const SHARED_SUBDIR: &str = "shared";

/// Enumerate installed versions of one framework beneath one root.
/// Subdirectories whose names do not parse as versions are skipped.
pub fn scan_framework_versions(root: &Path, name: &str) -> Vec<InstalledComponent> {
    let framework_dir = root.join(SHARED_SUBDIR).join(name);
    let entries = match fs::read_dir(&framework_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let dir_name = entry.file_name();
        match HostVersion::parse(&dir_name.to_string_lossy()) {
            Ok(version) => found.push(InstalledComponent { path, version }),
            Err(_) => {
                debug!(dir = %path.display(), "skipping non-version directory");
            }
        }
    }
    found.sort_by(|a, b| a.version.cmp(&b.version));
    found
}

/// Enumerate every framework under every root, for diagnostics output.
/// Pairs are sorted by framework name, then version; duplicates across
/// roots are kept (each points at its own directory).
pub fn list_installed(roots: &[PathBuf]) -> Vec<(String, InstalledComponent)> {
    let mut listed = Vec::new();
    for root in roots {
        let shared = root.join(SHARED_SUBDIR);
        let entries = match fs::read_dir(&shared) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            for component in scan_framework_versions(root, &name) {
                listed.push((name.clone(), component));
            }
        }
    }
    listed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.version.cmp(&b.1.version)));
    listed
}

/// Resolve one reference against the discovery roots. Candidates from all
/// roots are merged before policy selection; when the chosen version exists
/// under several roots, the earliest root wins.
pub fn resolve_reference(
    reference: &mut FrameworkReference,
    roots: &[PathBuf],
) -> HostResult<()> {
    let mut candidates: Vec<InstalledComponent> = Vec::new();
    for root in roots {
        candidates.extend(scan_framework_versions(root, &reference.name));
    }

    let versions: Vec<HostVersion> = candidates.iter().map(|c| c.version.clone()).collect();
    let chosen = best_match(
        reference.roll_forward,
        reference.apply_patches,
        &reference.requested_version,
        &versions,
    )
    .ok_or_else(|| {
        warn!(
            name = %reference.name,
            requested = %reference.requested_version,
            policy = %reference.roll_forward,
            available = versions.len(),
            "no installed version satisfies the reference"
        );
        HostError::FrameworkMissing {
            name: reference.name.clone(),
            requested: reference.requested_version.to_string(),
        }
    })?;

    let component = candidates
        .iter()
        .find(|c| c.version == chosen)
        .ok_or_else(|| HostError::FrameworkMissing {
            name: reference.name.clone(),
            requested: reference.requested_version.to_string(),
        })?;

    debug!(
        name = %reference.name,
        resolved = %chosen,
        dir = %component.path.display(),
        "framework resolved"
    );
    reference.resolved_version = Some(chosen);
    reference.resolved_path = Some(component.path.clone());
    Ok(())
}

/// Resolve every reference independently; any failure fails the whole set.
#[instrument(skip_all, fields(references = references.len(), roots = roots.len()))]
pub fn resolve_references(
    references: &mut [FrameworkReference],
    roots: &[PathBuf],
) -> HostResult<()> {
    for reference in references.iter_mut() {
        resolve_reference(reference, roots)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::RollForward;

    fn scratch_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("corehost-fx-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn install(root: &Path, name: &str, versions: &[&str]) {
        for version in versions {
            fs::create_dir_all(root.join(SHARED_SUBDIR).join(name).join(version)).unwrap();
        }
    }

    fn reference(name: &str, requested: &str, policy: RollForward) -> FrameworkReference {
        let mut r = FrameworkReference::new(name, HostVersion::parse(requested).unwrap());
        r.roll_forward = policy;
        r
    }

    #[test]
    fn scan_skips_non_version_directories() {
        let root = scratch_root("scan");
        install(&root, "App.Runtime", &["6.0.0", "6.0.5", "not-a-version"]);

        let found = scan_framework_versions(&root, "App.Runtime");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.path.is_dir()));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn minor_policy_selects_patched_build() {
        let root = scratch_root("minor");
        install(&root, "App.Runtime", &["6.0.0", "6.0.5", "6.1.0"]);

        let mut r = reference("App.Runtime", "6.0.0", RollForward::Minor);
        resolve_reference(&mut r, &[root.clone()]).unwrap();
        assert_eq!(r.resolved_version.as_ref().unwrap().to_string(), "6.0.5");

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn latest_minor_policy_selects_highest() {
        let root = scratch_root("latest-minor");
        install(&root, "App.Runtime", &["6.0.0", "6.0.5", "6.1.0"]);

        let mut r = reference("App.Runtime", "6.0.0", RollForward::LatestMinor);
        resolve_reference(&mut r, &[root.clone()]).unwrap();
        assert_eq!(r.resolved_version.as_ref().unwrap().to_string(), "6.1.0");

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_framework_reports_missing() {
        let root = scratch_root("missing");
        install(&root, "Other.Runtime", &["6.0.0"]);

        let mut r = reference("App.Runtime", "6.0.0", RollForward::Minor);
        let err = resolve_reference(&mut r, &[root.clone()]).unwrap_err();
        assert!(matches!(err, HostError::FrameworkMissing { .. }));
        assert!(!r.is_resolved());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn candidates_merge_across_roots() {
        let first = scratch_root("merge-a");
        let second = scratch_root("merge-b");
        install(&first, "App.Runtime", &["6.0.0"]);
        install(&second, "App.Runtime", &["6.0.5"]);

        let mut r = reference("App.Runtime", "6.0.0", RollForward::Minor);
        resolve_reference(&mut r, &[first.clone(), second.clone()]).unwrap();
        assert_eq!(r.resolved_version.as_ref().unwrap().to_string(), "6.0.5");
        assert!(r.resolved_path.as_ref().unwrap().starts_with(&second));

        let _ = fs::remove_dir_all(&first);
        let _ = fs::remove_dir_all(&second);
    }

    #[test]
    fn duplicate_version_prefers_earlier_root() {
        let first = scratch_root("dup-a");
        let second = scratch_root("dup-b");
        install(&first, "App.Runtime", &["6.0.0"]);
        install(&second, "App.Runtime", &["6.0.0"]);

        let mut r = reference("App.Runtime", "6.0.0", RollForward::Disable);
        resolve_reference(&mut r, &[first.clone(), second.clone()]).unwrap();
        assert!(r.resolved_path.as_ref().unwrap().starts_with(&first));

        let _ = fs::remove_dir_all(&first);
        let _ = fs::remove_dir_all(&second);
    }

    #[test]
    fn one_failing_reference_fails_the_set() {
        let root = scratch_root("set");
        install(&root, "App.Runtime", &["6.0.0"]);

        let mut refs = vec![
            reference("App.Runtime", "6.0.0", RollForward::Minor),
            reference("App.Absent", "1.0.0", RollForward::Minor),
        ];
        assert!(resolve_references(&mut refs, &[root.clone()]).is_err());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn list_installed_is_sorted() {
        let root = scratch_root("list");
        install(&root, "Zeta.Runtime", &["1.0.0"]);
        install(&root, "App.Runtime", &["6.0.5", "6.0.0"]);

        let listed = list_installed(&[root.clone()]);
        let names: Vec<&str> = listed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["App.Runtime", "App.Runtime", "Zeta.Runtime"]);
        assert_eq!(listed[0].1.version.to_string(), "6.0.0");

        let _ = fs::remove_dir_all(&root);
    }
}
