// ─── Runtime Configuration ───
// Parses the application's start-up manifest and turns it into framework
// references plus free-form configuration properties.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{HostError, HostResult};
use crate::framework::FrameworkReference;
use crate::version::{HostVersion, RollForward};

pub const CONFIG_SUFFIX: &str = ".runtimeconfig.json";

/// Parsed start-up manifest.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub tfm: Option<String>,
    /// Frameworks to resolve with roll-forward.
    pub frameworks: Vec<FrameworkReference>,
    /// Frameworks carried by the app itself; validated, never rolled forward.
    pub included_frameworks: Vec<FrameworkReference>,
    /// Free-form key/value properties, scalars stringified.
    pub properties: BTreeMap<String, String>,
    pub probing_paths: Vec<PathBuf>,
    /// Manifest origin, for error messages.
    pub path: PathBuf,
}

// ─── Wire format ───

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeConfigJson {
    #[serde(default)]
    runtime_options: Option<RuntimeOptionsJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeOptionsJson {
    #[serde(default)]
    tfm: Option<String>,
    #[serde(default)]
    roll_forward: Option<String>,
    #[serde(default)]
    apply_patches: Option<bool>,
    #[serde(default)]
    framework: Option<FrameworkJson>,
    #[serde(default)]
    frameworks: Vec<FrameworkJson>,
    #[serde(default)]
    included_frameworks: Vec<FrameworkJson>,
    #[serde(default)]
    config_properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    additional_probing_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameworkJson {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    roll_forward: Option<String>,
    #[serde(default)]
    apply_patches: Option<bool>,
}

impl RuntimeConfig {
    /// Conventional manifest path for an application binary:
    /// `<dir>/<stem>.runtimeconfig.json`.
    pub fn path_for_app(app_path: &Path) -> PathBuf {
        let stem = app_path.file_stem().unwrap_or_default().to_string_lossy();
        app_path.with_file_name(format!("{stem}{CONFIG_SUFFIX}"))
    }

    /// Load and parse the manifest file. A missing file is `ConfigInvalid`:
    /// without a manifest there is nothing to resolve against.
    pub fn load(path: &Path) -> HostResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| HostError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })?;
        Self::parse(&raw, path)
    }

    /// Parse manifest text. `origin` is only used in error messages; bundle
    /// callers pass the embedded entry's pseudo-path.
    pub fn parse(raw: &str, origin: &Path) -> HostResult<Self> {
        let wire: RuntimeConfigJson =
            serde_json::from_str(raw).map_err(|e| HostError::ConfigInvalid {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;

        // A manifest without runtimeOptions is valid and empty.
        let options = wire.runtime_options.unwrap_or_default();

        let default_policy = parse_policy(options.roll_forward.as_deref(), origin)?;
        let default_apply = options.apply_patches;

        let mut frameworks = Vec::new();
        if let Some(single) = &options.framework {
            frameworks.push(build_reference(single, default_policy, default_apply, origin)?);
        }
        for entry in &options.frameworks {
            frameworks.push(build_reference(entry, default_policy, default_apply, origin)?);
        }

        let mut included = Vec::new();
        for entry in &options.included_frameworks {
            included.push(build_reference(entry, default_policy, default_apply, origin)?);
        }

        check_duplicates(&frameworks, &included, origin)?;

        let mut properties = BTreeMap::new();
        for (key, value) in &options.config_properties {
            properties.insert(key.clone(), stringify_property(key, value, origin)?);
        }

        let config = Self {
            tfm: options.tfm,
            frameworks,
            included_frameworks: included,
            properties,
            probing_paths: options
                .additional_probing_paths
                .iter()
                .map(PathBuf::from)
                .collect(),
            path: origin.to_path_buf(),
        };
        debug!(
            manifest = %origin.display(),
            frameworks = config.frameworks.len(),
            properties = config.properties.len(),
            "runtime configuration parsed"
        );
        Ok(config)
    }
}

fn parse_policy(raw: Option<&str>, origin: &Path) -> HostResult<Option<RollForward>> {
    match raw {
        None => Ok(None),
        Some(text) => RollForward::parse(text)
            .map(Some)
            .ok_or_else(|| HostError::ConfigInvalid {
                path: origin.to_path_buf(),
                reason: format!("unknown rollForward value '{text}'"),
            }),
    }
}

fn build_reference(
    entry: &FrameworkJson,
    default_policy: Option<RollForward>,
    default_apply: Option<bool>,
    origin: &Path,
) -> HostResult<FrameworkReference> {
    let name = entry
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| HostError::ConfigInvalid {
            path: origin.to_path_buf(),
            reason: "framework reference is missing a name".to_string(),
        })?;
    let version_text = entry
        .version
        .as_deref()
        .ok_or_else(|| HostError::ConfigInvalid {
            path: origin.to_path_buf(),
            reason: format!("framework '{name}' is missing a version"),
        })?;
    let requested =
        HostVersion::parse(version_text).map_err(|_| HostError::ConfigInvalid {
            path: origin.to_path_buf(),
            reason: format!("framework '{name}' has a malformed version '{version_text}'"),
        })?;

    let mut reference = FrameworkReference::new(name, requested);
    // The per-framework setting wins over the manifest-wide default.
    if let Some(policy) = parse_policy(entry.roll_forward.as_deref(), origin)?.or(default_policy) {
        reference.roll_forward = policy;
    }
    reference.apply_patches = entry.apply_patches.or(default_apply).unwrap_or(true);
    Ok(reference)
}

fn check_duplicates(
    frameworks: &[FrameworkReference],
    included: &[FrameworkReference],
    origin: &Path,
) -> HostResult<()> {
    let mut seen: HashSet<String> = HashSet::new();
    for reference in frameworks.iter().chain(included) {
        if !seen.insert(reference.name.to_lowercase()) {
            return Err(HostError::ConfigInvalid {
                path: origin.to_path_buf(),
                reason: format!("framework '{}' is referenced more than once", reference.name),
            });
        }
    }
    Ok(())
}

/// Scalars are stringified the way the engine expects properties: strings
/// pass through, booleans lowercase, numbers verbatim.
fn stringify_property(
    key: &str,
    value: &serde_json::Value,
    origin: &Path,
) -> HostResult<String> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(HostError::ConfigInvalid {
            path: origin.to_path_buf(),
            reason: format!("configProperties['{key}'] must be a scalar"),
        }),
    }
}
