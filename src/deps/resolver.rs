// ─── Dependency Reconciliation ───
// Flattens the manifest layers (app first, then each resolved framework)
// into per-type asset path lists for the engine, reconciled against the
// host RID.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::{HostError, HostResult};

use super::manifest::{Asset, AssetType, DependencyManifest, Library};
use super::rid;

const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Pre-located assets for a layer whose files are not individually on disk
/// (single-file bundles): manifest-relative path → servable absolute path.
/// Consulted before any disk probing, matched by relative path first, then
/// by bare file name.
#[derive(Debug, Clone, Default)]
pub struct PinnedAssets {
    by_path: BTreeMap<String, PathBuf>,
    by_name: BTreeMap<String, PathBuf>,
}

impl PinnedAssets {
    pub fn insert(&mut self, relative_path: &str, location: PathBuf) {
        let name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path)
            .to_string();
        self.by_name.entry(name).or_insert_with(|| location.clone());
        self.by_path.insert(relative_path.to_string(), location);
    }

    pub fn locate(&self, asset: &Asset) -> Option<PathBuf> {
        self.by_path
            .get(&asset.relative_path)
            .or_else(|| self.by_name.get(asset.file_name()))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// One manifest plus the directory its relative asset paths resolve against.
#[derive(Debug, Clone)]
pub struct DepsLayer {
    pub manifest: DependencyManifest,
    pub base_dir: PathBuf,
    /// Bundle-backed layers pin their assets here; empty for disk layers.
    pub pinned: PinnedAssets,
}

impl DepsLayer {
    pub fn new(manifest: DependencyManifest, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            base_dir: base_dir.into(),
            pinned: PinnedAssets::default(),
        }
    }

    pub fn pinned(manifest: DependencyManifest, base_dir: impl Into<PathBuf>, pinned: PinnedAssets) -> Self {
        Self {
            manifest,
            base_dir: base_dir.into(),
            pinned,
        }
    }
}

/// Final artifact of reconciliation: per asset type, ordered absolute
/// paths, deduplicated by file name with first-writer-wins semantics.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAssets {
    pub runtime: Vec<PathBuf>,
    pub native: Vec<PathBuf>,
    pub resources: Vec<PathBuf>,
}

impl ResolvedAssets {
    pub fn list(&self, asset_type: AssetType) -> &[PathBuf] {
        match asset_type {
            AssetType::Runtime => &self.runtime,
            AssetType::Native => &self.native,
            AssetType::Resource => &self.resources,
        }
    }

    fn list_mut(&mut self, asset_type: AssetType) -> &mut Vec<PathBuf> {
        match asset_type {
            AssetType::Runtime => &mut self.runtime,
            AssetType::Native => &mut self.native,
            AssetType::Resource => &mut self.resources,
        }
    }

    /// The trusted assembly list in engine-property form: runtime asset
    /// paths joined with the platform path-list separator.
    pub fn tpa_list(&self) -> String {
        join_paths(&self.runtime)
    }

    /// Directories containing native assets, deduplicated, order kept.
    pub fn native_search_dirs(&self) -> Vec<PathBuf> {
        parent_dirs(&self.native, 1)
    }

    /// Roots above the per-locale resource directories.
    pub fn resource_roots(&self) -> Vec<PathBuf> {
        parent_dirs(&self.resources, 2)
    }
}

/// Join paths with the platform path-list separator, engine-property form.
pub fn join_path_list(paths: &[PathBuf]) -> String {
    join_paths(paths)
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(&PATH_LIST_SEPARATOR.to_string())
}

fn parent_dirs(paths: &[PathBuf], levels: usize) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut dirs = Vec::new();
    for path in paths {
        let mut dir: &Path = match path.parent() {
            Some(parent) => parent,
            None => continue,
        };
        for _ in 1..levels {
            dir = match dir.parent() {
                Some(parent) => parent,
                None => break,
            };
        }
        let owned = dir.to_path_buf();
        if seen.insert(owned.clone()) {
            dirs.push(owned);
        }
    }
    dirs
}

/// Reconcile every layer against the host RID and locate each selected
/// asset on disk. Any asset that probes to nothing fails the whole attempt.
#[instrument(skip_all, fields(layers = layers.len(), rid = %host_rid))]
pub fn resolve_assets(
    layers: &[DepsLayer],
    probing_paths: &[PathBuf],
    host_rid: &str,
) -> HostResult<ResolvedAssets> {
    let graph = merged_fallback_graph(layers);
    let graph = if graph.is_empty() { None } else { Some(&graph) };

    let mut resolved = ResolvedAssets::default();
    let mut seen: BTreeMap<AssetType, HashSet<String>> = BTreeMap::new();

    for layer in layers {
        for library in &layer.manifest.libraries {
            for asset_type in AssetType::ALL {
                for asset in select_assets(library, asset_type, host_rid, graph) {
                    let located = locate_asset(layer, library, asset, probing_paths)
                        .ok_or_else(|| HostError::AssetMissing {
                            library: library.key(),
                            asset: asset.relative_path.clone(),
                        })?;
                    let key = dedup_key(asset.file_name());
                    if seen.entry(asset_type).or_default().insert(key) {
                        resolved.list_mut(asset_type).push(located);
                    }
                }
            }
        }
    }

    debug!(
        runtime = resolved.runtime.len(),
        native = resolved.native.len(),
        resources = resolved.resources.len(),
        "dependency reconciliation complete"
    );
    Ok(resolved)
}

/// The fallback graph in effect: graphs from every layer merged, earlier
/// layers winning per RID key.
fn merged_fallback_graph(layers: &[DepsLayer]) -> BTreeMap<String, Vec<String>> {
    let mut merged = BTreeMap::new();
    for layer in layers {
        for (rid, chain) in &layer.manifest.rid_fallback_graph {
            merged.entry(rid.clone()).or_insert_with(|| chain.clone());
        }
    }
    merged
}

/// RID-specific groups win over the flat list for the same library/type.
fn select_assets<'a>(
    library: &'a Library,
    asset_type: AssetType,
    host_rid: &str,
    graph: Option<&BTreeMap<String, Vec<String>>>,
) -> &'a [Asset] {
    if let Some(groups) = library.rid_groups(asset_type) {
        let populated = |rid: &str| groups.get(rid).map(|g| !g.is_empty()).unwrap_or(false);
        if let Some(chosen) = rid::select_rid(host_rid, graph, populated) {
            debug!(library = %library.key(), %asset_type, rid = %chosen, "rid group selected");
            return groups.get(&chosen).map(Vec::as_slice).unwrap_or(&[]);
        }
    }
    library.flat_assets(asset_type)
}

/// Probe order: the owning manifest's directory (as-written layout, then
/// the flattened publish layout), then each probing path (explicit library
/// path before the derived store layout).
fn locate_asset(
    layer: &DepsLayer,
    library: &Library,
    asset: &Asset,
    probing_paths: &[PathBuf],
) -> Option<PathBuf> {
    if let Some(pinned) = layer.pinned.locate(asset) {
        return Some(pinned);
    }
    let local = layer.base_dir.join(&asset.relative_path);
    if local.is_file() {
        return Some(local);
    }
    let flattened = layer.base_dir.join(asset.file_name());
    if flattened.is_file() {
        return Some(flattened);
    }

    for probe in probing_paths {
        if let Some(explicit) = &library.path {
            let candidate = probe.join(explicit).join(&asset.relative_path);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        let derived = probe.join(library.derived_path()).join(&asset.relative_path);
        if derived.is_file() {
            return Some(derived);
        }
    }
    None
}

fn dedup_key(file_name: &str) -> String {
    if cfg!(windows) {
        file_name.to_lowercase()
    } else {
        file_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("corehost-deps-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn manifest(value: serde_json::Value) -> DependencyManifest {
        DependencyManifest::parse(&value.to_string(), Path::new("test.deps.json")).unwrap()
    }

    fn app_manifest(assets: serde_json::Value) -> DependencyManifest {
        manifest(serde_json::json!({
            "runtimeTarget": "T/linux-x64",
            "targets": { "T/linux-x64": { "demo/1.0.0": assets } },
            "libraries": { "demo/1.0.0": { "type": "project", "serviceable": false } },
            "runtimes": { "linux-x64": ["linux", "unix", "any"] }
        }))
    }

    #[test]
    fn local_assets_resolve_against_layer_dir() {
        let dir = scratch("local");
        touch(&dir.join("demo.dll"));

        let layer = DepsLayer::new(
            app_manifest(serde_json::json!({ "runtime": { "demo.dll": {} } })),
            dir.clone(),
        );
        let resolved = resolve_assets(&[layer], &[], "linux-x64").unwrap();
        assert_eq!(resolved.runtime, vec![dir.join("demo.dll")]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn flattened_publish_layout_is_probed() {
        let dir = scratch("flat");
        touch(&dir.join("demo.dll"));

        let layer = DepsLayer::new(
            app_manifest(serde_json::json!({ "runtime": { "lib/net6.0/demo.dll": {} } })),
            dir.clone(),
        );
        let resolved = resolve_assets(&[layer], &[], "linux-x64").unwrap();
        assert_eq!(resolved.runtime, vec![dir.join("demo.dll")]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn first_writer_wins_across_layers() {
        let app_dir = scratch("fww-app");
        let fx_dir = scratch("fww-fx");
        touch(&app_dir.join("Shared.dll"));
        touch(&fx_dir.join("Shared.dll"));

        let app = DepsLayer::new(
            app_manifest(serde_json::json!({ "runtime": { "Shared.dll": {} } })),
            app_dir.clone(),
        );
        let fx = DepsLayer::new(
            manifest(serde_json::json!({
                "runtimeTarget": "T",
                "targets": { "T": { "fx/6.0.0": { "runtime": { "Shared.dll": {} } } } },
                "libraries": { "fx/6.0.0": { "type": "package" } }
            })),
            fx_dir.clone(),
        );

        let resolved = resolve_assets(&[app, fx], &[], "linux-x64").unwrap();
        assert_eq!(resolved.runtime, vec![app_dir.join("Shared.dll")]);

        let _ = fs::remove_dir_all(&app_dir);
        let _ = fs::remove_dir_all(&fx_dir);
    }

    #[test]
    fn rid_group_replaces_flat_assets() {
        let dir = scratch("rid");
        touch(&dir.join("runtimes/linux/native/libzip.so"));

        let layer = DepsLayer::new(
            app_manifest(serde_json::json!({
                "native": { "native/libzip-portable.so": {} },
                "runtimeTargets": {
                    "runtimes/linux/native/libzip.so": { "rid": "linux", "assetType": "native" }
                }
            })),
            dir.clone(),
        );
        // Host linux-x64 has no exact group; the graph falls back to linux.
        let resolved = resolve_assets(&[layer], &[], "linux-x64").unwrap();
        assert_eq!(resolved.native, vec![dir.join("runtimes/linux/native/libzip.so")]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unmatched_rid_groups_fall_back_to_flat() {
        let dir = scratch("rid-flat");
        touch(&dir.join("native/libzip-portable.so"));

        let layer = DepsLayer::new(
            app_manifest(serde_json::json!({
                "native": { "native/libzip-portable.so": {} },
                "runtimeTargets": {
                    "runtimes/solaris/native/libzip.so": { "rid": "solaris", "assetType": "native" }
                }
            })),
            dir.clone(),
        );
        let resolved = resolve_assets(&[layer], &[], "linux-x64").unwrap();
        assert_eq!(resolved.native, vec![dir.join("native/libzip-portable.so")]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn probing_paths_use_explicit_then_derived_layout() {
        let app_dir = scratch("probe-app");
        let store = scratch("probe-store");
        touch(&store.join("newton.json/13.0.1/lib/net6.0/Newton.Json.dll"));

        let layer = DepsLayer::new(
            manifest(serde_json::json!({
                "runtimeTarget": "T",
                "targets": {
                    "T": {
                        "Newton.Json/13.0.1": { "runtime": { "lib/net6.0/Newton.Json.dll": {} } }
                    }
                },
                "libraries": {
                    "Newton.Json/13.0.1": { "type": "package", "path": "newton.json/13.0.1" }
                }
            })),
            app_dir.clone(),
        );
        let resolved = resolve_assets(&[layer], &[store.clone()], "linux-x64").unwrap();
        assert_eq!(
            resolved.runtime,
            vec![store.join("newton.json/13.0.1/lib/net6.0/Newton.Json.dll")]
        );

        let _ = fs::remove_dir_all(&app_dir);
        let _ = fs::remove_dir_all(&store);
    }

    #[test]
    fn derived_store_layout_is_probed_without_explicit_path() {
        let app_dir = scratch("derived-app");
        let store = scratch("derived-store");
        touch(&store.join("newton.json/13.0.1/lib/net6.0/Newton.Json.dll"));

        let layer = DepsLayer::new(
            manifest(serde_json::json!({
                "runtimeTarget": "T",
                "targets": {
                    "T": {
                        "Newton.Json/13.0.1": { "runtime": { "lib/net6.0/Newton.Json.dll": {} } }
                    }
                },
                "libraries": { "Newton.Json/13.0.1": { "type": "package" } }
            })),
            app_dir.clone(),
        );
        let resolved = resolve_assets(&[layer], &[store.clone()], "linux-x64").unwrap();
        assert_eq!(resolved.runtime.len(), 1);
        assert!(resolved.runtime[0].starts_with(&store));

        let _ = fs::remove_dir_all(&app_dir);
        let _ = fs::remove_dir_all(&store);
    }

    #[test]
    fn unlocatable_asset_fails_the_attempt() {
        let dir = scratch("missing");

        let layer = DepsLayer::new(
            app_manifest(serde_json::json!({ "runtime": { "ghost.dll": {} } })),
            dir.clone(),
        );
        let err = resolve_assets(&[layer], &[], "linux-x64").unwrap_err();
        assert!(matches!(err, HostError::AssetMissing { .. }));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn tpa_list_uses_platform_separator() {
        let resolved = ResolvedAssets {
            runtime: vec![PathBuf::from("/a/x.dll"), PathBuf::from("/b/y.dll")],
            ..ResolvedAssets::default()
        };
        let tpa = resolved.tpa_list();
        let separator = if cfg!(windows) { ';' } else { ':' };
        assert_eq!(tpa.matches(separator).count(), 1);
        assert!(tpa.contains("x.dll"));
    }

    #[test]
    fn native_dirs_and_resource_roots_deduplicate() {
        let resolved = ResolvedAssets {
            native: vec![
                PathBuf::from("/fx/native/a.so"),
                PathBuf::from("/fx/native/b.so"),
            ],
            resources: vec![
                PathBuf::from("/app/de/App.resources.dll"),
                PathBuf::from("/app/fr/App.resources.dll"),
            ],
            ..ResolvedAssets::default()
        };
        assert_eq!(resolved.native_search_dirs(), vec![PathBuf::from("/fx/native")]);
        assert_eq!(resolved.resource_roots(), vec![PathBuf::from("/app")]);
    }

    #[test]
    fn pinned_assets_bypass_disk_probing() {
        let mut pinned = PinnedAssets::default();
        pinned.insert("demo.dll", PathBuf::from("/virtual/root/demo.dll"));

        let layer = DepsLayer::pinned(
            app_manifest(serde_json::json!({ "runtime": { "demo.dll": {} } })),
            "/nonexistent",
            pinned,
        );
        let resolved = resolve_assets(&[layer], &[], "linux-x64").unwrap();
        assert_eq!(resolved.runtime, vec![PathBuf::from("/virtual/root/demo.dll")]);
    }

    #[test]
    fn pinned_lookup_falls_back_to_file_name() {
        let mut pinned = PinnedAssets::default();
        pinned.insert("lib/net6.0/demo.dll", PathBuf::from("/virtual/demo.dll"));

        let asset = Asset {
            name: "demo".to_string(),
            relative_path: "demo.dll".to_string(),
            assembly_version: None,
            file_version: None,
        };
        assert_eq!(pinned.locate(&asset), Some(PathBuf::from("/virtual/demo.dll")));
    }
}
