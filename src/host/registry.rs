// ─── Context Registry ───
// Process-wide arena of hosting contexts behind opaque integer handles.
// Handles are allocated monotonically and never reused; a context lives
// until explicitly closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::error::{HostError, HostResult};

use super::context::HostContext;

/// Opaque handle to a registered context. 0 is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub u64);

#[derive(Debug)]
pub struct ContextRegistry {
    contexts: DashMap<u64, Arc<HostContext>>,
    next_handle: AtomicU64,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ContextRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    pub fn insert(&self, context: HostContext) -> ContextHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.contexts.insert(handle, Arc::new(context));
        ContextHandle(handle)
    }

    pub fn get(&self, handle: ContextHandle) -> HostResult<Arc<HostContext>> {
        self.contexts
            .get(&handle.0)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HostError::InvalidArgument(format!("unknown context handle {}", handle.0)))
    }

    /// Remove the context; outstanding `Arc` clones keep it alive until
    /// their holders drop them.
    pub fn close(&self, handle: ContextHandle) -> HostResult<()> {
        self.contexts
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| HostError::InvalidArgument(format!("unknown context handle {}", handle.0)))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
