// ─── Startup Pipeline ───
// Glues the stages together: runtime configuration → framework
// roll-forward → dependency reconciliation → engine properties. The
// bundle variant runs the reader/extractor first and feeds the same
// pipeline off the materialized virtual root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::bundle::{extract, Bundle};
use crate::config::RuntimeConfig;
use crate::deps::resolver::join_path_list;
use crate::deps::{self, DependencyManifest, DepsLayer, PinnedAssets};
use crate::discovery::{discover_roots, DiscoveryOptions};
use crate::error::{HostError, HostResult};
use crate::framework;

use super::context::{HostContext, ResolutionPlan};
use super::engine::EngineLoader;

/// Well-known engine property names.
pub const PROP_TPA: &str = "TRUSTED_PLATFORM_ASSEMBLIES";
pub const PROP_APP_BASE: &str = "APP_CONTEXT_BASE_DIRECTORY";
pub const PROP_NATIVE_DIRS: &str = "NATIVE_DLL_SEARCH_DIRECTORIES";
pub const PROP_RESOURCE_ROOTS: &str = "PLATFORM_RESOURCE_ROOTS";
pub const PROP_RID: &str = "RUNTIME_IDENTIFIER";
pub const PROP_BUNDLE_DIR: &str = "BUNDLE_EXTRACTION_PATH";

/// Resolve `path` as either a bundled host executable or a plain
/// application assembly; bundles are probed first, offset 0 or a missing
/// marker falls through to on-disk resolution.
pub fn initialize(path: &Path, options: &DiscoveryOptions) -> HostResult<HostContext> {
    match Bundle::open(path)? {
        Some(bundle) => initialize_for_bundle(&bundle, options),
        None => initialize_for_app(path, options),
    }
}

/// On-disk application flow: sibling `.runtimeconfig.json` and
/// `.deps.json` manifests next to the app assembly.
#[instrument(skip_all, fields(app = %app_path.display()))]
pub fn initialize_for_app(
    app_path: &Path,
    options: &DiscoveryOptions,
) -> HostResult<HostContext> {
    let config = RuntimeConfig::load(&RuntimeConfig::path_for_app(app_path))?;
    let app_dir = app_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let app_deps = DependencyManifest::load(&DependencyManifest::path_for_app(app_path))?;
    let app_layer = DepsLayer::new(app_deps, app_dir.clone());

    build_context(app_path.to_path_buf(), app_dir, config, app_layer, None, options)
}

/// Single-file flow: extract what must live on disk, then resolve against
/// the embedded manifests with in-bundle assets pinned in place.
#[instrument(skip_all, fields(host = %bundle.host_path.display()))]
pub fn initialize_for_bundle(
    bundle: &Bundle,
    options: &DiscoveryOptions,
) -> HostResult<HostContext> {
    let extraction_dir = extract::extract_required(bundle)?;
    let host_dir = bundle
        .host_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = match bundle.manifest.runtime_config_entry() {
        Some(entry) => {
            let text = bundle.entry_text(entry)?;
            RuntimeConfig::parse(&text, Path::new(&entry.relative_path))?
        }
        None => RuntimeConfig::default(),
    };
    let app_deps = match bundle.manifest.deps_json_entry() {
        Some(entry) => {
            let text = bundle.entry_text(entry)?;
            DependencyManifest::parse(&text, Path::new(&entry.relative_path))?
        }
        None => DependencyManifest::default(),
    };

    let extract_all = bundle.manifest.header.extract_all();
    let mut pinned = PinnedAssets::default();
    for entry in &bundle.manifest.entries {
        let location = if entry.needs_extraction(extract_all) {
            extraction_dir.join(&entry.relative_path)
        } else {
            // Served straight out of the mapped image; the recorded path
            // is its address for the engine's bundle probe.
            host_dir.join(&entry.relative_path)
        };
        pinned.insert(&entry.relative_path, location);
    }

    let app_assembly = format!("{}.dll", bundle.host_name());
    let app_path = bundle
        .manifest
        .find(&app_assembly)
        .map(|entry| {
            if entry.needs_extraction(extract_all) {
                extraction_dir.join(&entry.relative_path)
            } else {
                host_dir.join(&entry.relative_path)
            }
        })
        .unwrap_or_else(|| bundle.host_path.clone());

    let app_layer = DepsLayer::pinned(app_deps, host_dir, pinned);
    build_context(
        app_path,
        extraction_dir.clone(),
        config,
        app_layer,
        Some(extraction_dir),
        options,
    )
}

fn build_context(
    app_path: PathBuf,
    app_dir: PathBuf,
    config: RuntimeConfig,
    app_layer: DepsLayer,
    bundle_dir: Option<PathBuf>,
    options: &DiscoveryOptions,
) -> HostResult<HostContext> {
    let roots = discover_roots(options);

    let mut frameworks = config.frameworks.clone();
    framework::resolve_references(&mut frameworks, &roots)?;

    let mut layers = vec![app_layer];
    for reference in &frameworks {
        let dir = reference
            .resolved_dir()
            .ok_or_else(|| HostError::FrameworkMissing {
                name: reference.name.clone(),
                requested: reference.requested_version.to_string(),
            })?;
        let fx_deps =
            DependencyManifest::load(&dir.join(format!("{}{}", reference.name, deps::DEPS_SUFFIX)))?;
        layers.push(DepsLayer::new(fx_deps, dir.to_path_buf()));
    }

    // Relative probing paths resolve against the app directory.
    let probing: Vec<PathBuf> = config
        .probing_paths
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { app_dir.join(p) })
        .collect();

    let host_rid = deps::host_rid();
    let assets = deps::resolve_assets(&layers, &probing, &host_rid)?;

    let mut properties = config.properties.clone();
    properties.insert(PROP_TPA.to_string(), assets.tpa_list());
    properties.insert(PROP_APP_BASE.to_string(), app_dir.to_string_lossy().into_owned());
    properties.insert(
        PROP_NATIVE_DIRS.to_string(),
        join_path_list(&assets.native_search_dirs()),
    );
    properties.insert(
        PROP_RESOURCE_ROOTS.to_string(),
        join_path_list(&assets.resource_roots()),
    );
    properties.insert(PROP_RID.to_string(), host_rid.clone());
    if let Some(dir) = &bundle_dir {
        properties.insert(PROP_BUNDLE_DIR.to_string(), dir.to_string_lossy().into_owned());
    }

    info!(
        app = %app_path.display(),
        frameworks = frameworks.len(),
        assemblies = assets.runtime.len(),
        "resolution complete"
    );
    let plan = ResolutionPlan {
        app_path,
        app_dir,
        host_rid,
        roots,
        frameworks,
        assets,
    };
    Ok(HostContext::new(plan, properties))
}

/// Load the engine from a context and run the application assembly.
/// The property bag freezes at initialization.
pub fn run_app(
    context: &HostContext,
    engine: &dyn EngineLoader,
    args: &[String],
) -> HostResult<i32> {
    let domain = context
        .plan
        .app_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let properties = context.properties();
    context.mark_loaded();

    let handle = engine.initialize(&context.plan.app_path, &domain, &properties)?;
    debug!(domain = %domain, "engine initialized");
    let exit_code = engine.execute_assembly(handle, args, &context.plan.app_path)?;
    engine.shutdown(handle)?;
    Ok(exit_code)
}
