// ─── Host Context ───

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::deps::ResolvedAssets;
use crate::error::{HostError, HostResult};
use crate::framework::FrameworkReference;

/// Everything one resolution attempt produced: immutable once built.
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan {
    pub app_path: PathBuf,
    /// Directory asset paths were resolved against (extraction dir for
    /// bundles, the app's own directory otherwise).
    pub app_dir: PathBuf,
    pub host_rid: String,
    pub roots: Vec<PathBuf>,
    pub frameworks: Vec<FrameworkReference>,
    pub assets: ResolvedAssets,
}

/// One hosting context: a resolution plan plus the property bag handed to
/// the engine. The bag is mutable until `mark_loaded`, afterwards every
/// write is rejected; the flag is checked before each mutation so no lock
/// is held across the load itself.
#[derive(Debug)]
pub struct HostContext {
    pub plan: ResolutionPlan,
    properties: Mutex<BTreeMap<String, String>>,
    loaded: AtomicBool,
}

impl HostContext {
    pub fn new(plan: ResolutionPlan, properties: BTreeMap<String, String>) -> Self {
        Self {
            plan,
            properties: Mutex::new(properties),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Freeze the property bag; called when the engine is initialized
    /// from this context.
    pub fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    pub fn set_property(&self, key: &str, value: &str) -> HostResult<()> {
        if self.is_loaded() {
            return Err(HostError::InvalidArgument(format!(
                "property '{key}' cannot change after the engine is loaded"
            )));
        }
        self.properties
            .lock()
            .expect("property bag poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn get_property(&self, key: &str) -> Option<String> {
        self.properties
            .lock()
            .expect("property bag poisoned")
            .get(key)
            .cloned()
    }

    /// Snapshot of the bag, in insertion-independent sorted order.
    pub fn properties(&self) -> BTreeMap<String, String> {
        self.properties.lock().expect("property bag poisoned").clone()
    }
}
