// ─── Engine Loader Boundary ───
// The execution engine is an external collaborator; this crate only
// speaks its four-call contract. Real engines live out of tree behind a
// dynamic library; the in-tree implementation is a recording double used
// by the pipeline tests and the CLI dry run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{HostError, HostResult};

/// Opaque engine-side handle returned by `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineHandle(pub u64);

/// The collaborator contract: initialize, run, reflect, shut down.
pub trait EngineLoader: Send + Sync {
    fn initialize(
        &self,
        exe_path: &Path,
        domain_name: &str,
        properties: &BTreeMap<String, String>,
    ) -> HostResult<EngineHandle>;

    fn execute_assembly(
        &self,
        handle: EngineHandle,
        args: &[String],
        assembly_path: &Path,
    ) -> HostResult<i32>;

    fn create_delegate(
        &self,
        handle: EngineHandle,
        assembly: &str,
        type_name: &str,
        method: &str,
    ) -> HostResult<usize>;

    fn shutdown(&self, handle: EngineHandle) -> HostResult<i32>;
}

/// Recording test double. `initialize` snapshots the property bag so
/// tests can assert what the engine would have seen.
#[derive(Debug, Default)]
pub struct StubEngine {
    next_handle: AtomicU64,
    pub initialized: Mutex<Vec<BTreeMap<String, String>>>,
    pub executed: Mutex<Vec<String>>,
    pub exit_code: i32,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineLoader for StubEngine {
    fn initialize(
        &self,
        _exe_path: &Path,
        domain_name: &str,
        properties: &BTreeMap<String, String>,
    ) -> HostResult<EngineHandle> {
        if domain_name.is_empty() {
            return Err(HostError::EngineLoad("empty domain name".to_string()));
        }
        self.initialized
            .lock()
            .expect("stub state poisoned")
            .push(properties.clone());
        Ok(EngineHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn execute_assembly(
        &self,
        _handle: EngineHandle,
        _args: &[String],
        assembly_path: &Path,
    ) -> HostResult<i32> {
        self.executed
            .lock()
            .expect("stub state poisoned")
            .push(assembly_path.to_string_lossy().into_owned());
        Ok(self.exit_code)
    }

    fn create_delegate(
        &self,
        _handle: EngineHandle,
        assembly: &str,
        type_name: &str,
        method: &str,
    ) -> HostResult<usize> {
        if assembly.is_empty() || type_name.is_empty() || method.is_empty() {
            return Err(HostError::EngineLoad("delegate target is incomplete".to_string()));
        }
        Ok(1)
    }

    fn shutdown(&self, _handle: EngineHandle) -> HostResult<i32> {
        Ok(self.exit_code)
    }
}
