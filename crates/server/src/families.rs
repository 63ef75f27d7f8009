//! The family router: family name to filesystem backend.

use hoard_storage::BackendHandle;
use std::collections::BTreeMap;

/// Maps an optional family name to its filesystem backend.
///
/// Construction requires the generic (null-family) backend up front; lookups
/// for unregistered families fall back to it. The router is built once at
/// startup by the composition root and shared read-only from then on.
pub struct FamilyRouter {
    generic: BackendHandle,
    families: BTreeMap<String, BackendHandle>,
}

impl FamilyRouter {
    pub fn new(generic: BackendHandle) -> Self {
        Self { generic, families: BTreeMap::new() }
    }

    /// Register a named family with its own backend.
    pub fn register(&mut self, family: impl Into<String>, backend: BackendHandle) {
        self.families.insert(family.into(), backend);
    }

    /// The backend serving a family; generic references and unregistered
    /// families route to the null entry.
    pub fn backend(&self, family: Option<&str>) -> &BackendHandle {
        family.and_then(|name| self.families.get(name)).unwrap_or(&self.generic)
    }

    /// Registered family names, sorted. The null entry is not a name.
    pub fn families(&self) -> Vec<String> {
        self.families.keys().cloned().collect()
    }
}
