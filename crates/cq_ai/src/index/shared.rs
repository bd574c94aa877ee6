use std::sync::{Arc, RwLock};

use super::VectorIndex;

/// Serving handle for the current index.
///
/// Readers take a frozen `Arc` and keep it for the whole query; a rebuild installs a
/// new index by swapping the reference, so a query never sees a half-built index.
#[derive(Debug)]
pub struct SharedIndex {
    current: RwLock<Arc<VectorIndex>>,
}

impl SharedIndex {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    pub fn empty() -> Self {
        Self::new(VectorIndex::empty())
    }

    pub fn current(&self) -> Arc<VectorIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Installs `index` and returns the one it replaced.
    pub fn install(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let next = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        tracing::info!(entries = next.len(), "index installed");
        std::mem::replace(&mut *guard, next)
    }
}

impl Default for SharedIndex {
    fn default() -> Self {
        Self::empty()
    }
}
