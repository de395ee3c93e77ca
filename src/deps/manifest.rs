// ─── Dependency Manifest ───
// Parses the dependency-graph document into per-library asset groups plus
// the RID fallback graph. The document shape is dynamic (library keys and
// asset paths are JSON object keys), so parsing walks `serde_json::Value`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HostError, HostResult};

pub const DEPS_SUFFIX: &str = ".deps.json";

/// Asset classes a library can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetType {
    Runtime,
    Native,
    Resource,
}

impl AssetType {
    pub const ALL: [AssetType; 3] = [AssetType::Runtime, AssetType::Native, AssetType::Resource];

    /// JSON key of the flat asset group for this type.
    pub fn key(self) -> &'static str {
        match self {
            AssetType::Runtime => "runtime",
            AssetType::Native => "native",
            AssetType::Resource => "resources",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "runtime" => Some(AssetType::Runtime),
            "native" => Some(AssetType::Native),
            "resources" => Some(AssetType::Resource),
            _ => None,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One file a library contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Canonical asset name: file stem with any `.ni` native-image suffix
    /// stripped.
    pub name: String,
    /// Forward-slash relative path as listed in the manifest.
    pub relative_path: String,
    pub assembly_version: Option<String>,
    pub file_version: Option<String>,
}

impl Asset {
    fn from_entry(relative_path: &str, detail: &Value) -> Self {
        let normalized = relative_path.replace('\\', "/");
        Self {
            name: asset_stem(&normalized),
            relative_path: normalized,
            assembly_version: str_field(detail, "assemblyVersion"),
            file_version: str_field(detail, "fileVersion"),
        }
    }

    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

fn asset_stem(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);
    stem.strip_suffix(".ni").unwrap_or(stem).to_string()
}

/// One library of the dependency graph.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub name: String,
    pub version: String,
    pub lib_type: String,
    pub serviceable: bool,
    /// Explicit package-store path; probed before the derived layout.
    pub path: Option<String>,
    pub hash_path: Option<String>,
    pub sha512: Option<String>,
    pub runtime_store_manifest_name: Option<String>,
    /// `"name/version"` keys of direct dependencies.
    pub dependencies: Vec<String>,
    assets: BTreeMap<AssetType, Vec<Asset>>,
    rid_assets: BTreeMap<AssetType, BTreeMap<String, Vec<Asset>>>,
}

impl Library {
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// Derived package-store relative directory: `name-lowercased/version`.
    pub fn derived_path(&self) -> String {
        format!("{}/{}", self.name.to_lowercase(), self.version)
    }

    pub fn flat_assets(&self, asset_type: AssetType) -> &[Asset] {
        self.assets.get(&asset_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// RID-partitioned groups for one asset type, if any exist.
    pub fn rid_groups(&self, asset_type: AssetType) -> Option<&BTreeMap<String, Vec<Asset>>> {
        self.rid_assets.get(&asset_type).filter(|m| !m.is_empty())
    }
}

/// A fully parsed dependency manifest. Parsing either succeeds as a whole
/// or fails as a whole; retries build a fresh object.
#[derive(Debug, Clone, Default)]
pub struct DependencyManifest {
    pub path: PathBuf,
    pub target_name: String,
    pub libraries: Vec<Library>,
    pub rid_fallback_graph: BTreeMap<String, Vec<String>>,
}

impl DependencyManifest {
    /// Conventional manifest path for an application binary:
    /// `<dir>/<stem>.deps.json`.
    pub fn path_for_app(app_path: &Path) -> PathBuf {
        let stem = app_path.file_stem().unwrap_or_default().to_string_lossy();
        app_path.with_file_name(format!("{stem}{DEPS_SUFFIX}"))
    }

    /// Load a manifest from disk. A missing file is a valid, empty manifest:
    /// such apps simply contribute no assets.
    pub fn load(path: &Path) -> HostResult<Self> {
        if !path.is_file() {
            debug!(manifest = %path.display(), "no deps manifest, treating as empty");
            return Ok(Self {
                path: path.to_path_buf(),
                ..Self::default()
            });
        }
        let raw = fs::read_to_string(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Parse manifest text. `origin` is used in error messages only.
    pub fn parse(raw: &str, origin: &Path) -> HostResult<Self> {
        let root: Value = serde_json::from_str(raw).map_err(|e| invalid(origin, e.to_string()))?;
        let root = root
            .as_object()
            .ok_or_else(|| invalid(origin, "root is not an object".to_string()))?;

        let targets = root
            .get("targets")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(origin, "missing 'targets' object".to_string()))?;

        let target_name = runtime_target_name(root.get("runtimeTarget"), targets, origin)?;
        let target = targets
            .get(&target_name)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                invalid(origin, format!("target '{target_name}' not present in 'targets'"))
            })?;

        let library_meta = root
            .get("libraries")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(origin, "missing 'libraries' object".to_string()))?;

        let mut libraries = Vec::new();
        for (key, entry) in target {
            let (name, version) = key.split_once('/').ok_or_else(|| {
                invalid(origin, format!("library key '{key}' is not 'name/version'"))
            })?;
            let meta = library_meta.get(key).ok_or_else(|| {
                invalid(origin, format!("library '{key}' has no metadata entry"))
            })?;

            libraries.push(parse_library(name, version, entry, meta));
        }

        let mut rid_fallback_graph = BTreeMap::new();
        if let Some(runtimes) = root.get("runtimes").and_then(Value::as_object) {
            for (rid, fallbacks) in runtimes {
                let chain: Vec<String> = fallbacks
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                rid_fallback_graph.insert(rid.clone(), chain);
            }
        }

        debug!(
            manifest = %origin.display(),
            target = %target_name,
            libraries = libraries.len(),
            "deps manifest parsed"
        );
        Ok(Self {
            path: origin.to_path_buf(),
            target_name,
            libraries,
            rid_fallback_graph,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

fn runtime_target_name(
    field: Option<&Value>,
    targets: &serde_json::Map<String, Value>,
    origin: &Path,
) -> HostResult<String> {
    let declared = match field {
        Some(Value::String(name)) => Some(name.clone()),
        Some(Value::Object(obj)) => obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    if let Some(name) = declared.filter(|n| !n.is_empty()) {
        return Ok(name);
    }
    // No declared target: unambiguous only when a single target exists.
    if targets.len() == 1 {
        return Ok(targets.keys().next().cloned().unwrap_or_default());
    }
    Err(invalid(
        origin,
        "missing 'runtimeTarget' with multiple targets present".to_string(),
    ))
}

fn parse_library(name: &str, version: &str, entry: &Value, meta: &Value) -> Library {
    let mut library = Library {
        name: name.to_string(),
        version: version.to_string(),
        lib_type: str_field(meta, "type").unwrap_or_else(|| "package".to_string()),
        serviceable: meta
            .get("serviceable")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        path: str_field(meta, "path"),
        hash_path: str_field(meta, "hashPath"),
        sha512: str_field(meta, "sha512"),
        runtime_store_manifest_name: str_field(meta, "runtimeStoreManifestName"),
        ..Library::default()
    };

    if let Some(deps) = entry.get("dependencies").and_then(Value::as_object) {
        library.dependencies = deps
            .iter()
            .filter_map(|(dep_name, dep_version)| {
                dep_version
                    .as_str()
                    .map(|v| format!("{dep_name}/{v}"))
            })
            .collect();
    }

    for asset_type in AssetType::ALL {
        if let Some(group) = entry.get(asset_type.key()).and_then(Value::as_object) {
            let assets: Vec<Asset> = group
                .iter()
                .map(|(rel, detail)| Asset::from_entry(rel, detail))
                .collect();
            if !assets.is_empty() {
                library.assets.insert(asset_type, assets);
            }
        }
    }

    if let Some(rid_targets) = entry.get("runtimeTargets").and_then(Value::as_object) {
        for (rel, detail) in rid_targets {
            let rid = match str_field(detail, "rid") {
                Some(rid) if !rid.is_empty() => rid,
                _ => continue,
            };
            let asset_type = match str_field(detail, "assetType")
                .as_deref()
                .and_then(AssetType::from_key)
            {
                Some(t) => t,
                None => {
                    warn!(library = name, asset = rel, "unknown runtimeTargets assetType, skipped");
                    continue;
                }
            };
            library
                .rid_assets
                .entry(asset_type)
                .or_default()
                .entry(rid)
                .or_default()
                .push(Asset::from_entry(rel, detail));
        }
    }

    library
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn invalid(origin: &Path, reason: String) -> HostError {
    HostError::ConfigInvalid {
        path: origin.to_path_buf(),
        reason,
    }
}
