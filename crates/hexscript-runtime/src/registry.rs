//! Persistent Load Registry
//!
//! Owns the contexts created by LOAD, keyed by script path. A context stays
//! loaded until its entry is removed or the registry is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::context::{ContextId, IsolationContext};

#[derive(Debug, Default)]
pub struct PersistentLoadRegistry {
    contexts: HashMap<PathBuf, IsolationContext>,
    by_id: HashMap<ContextId, PathBuf>,
}

impl PersistentLoadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.contexts.contains_key(path)
    }

    /// Register a loaded context, returning the one it replaces.
    pub fn insert(&mut self, path: PathBuf, context: IsolationContext) -> Option<IsolationContext> {
        self.by_id.insert(context.id(), path.clone());
        let previous = self.contexts.insert(path, context);
        if let Some(previous) = &previous {
            self.by_id.remove(&previous.id());
        }
        previous
    }

    pub fn remove(&mut self, path: &Path) -> Option<IsolationContext> {
        let context = self.contexts.remove(path)?;
        self.by_id.remove(&context.id());
        Some(context)
    }

    pub fn get(&self, id: ContextId) -> Option<&IsolationContext> {
        self.by_id.get(&id).and_then(|path| self.contexts.get(path))
    }

    pub fn get_by_path(&self, path: &Path) -> Option<&IsolationContext> {
        self.contexts.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.contexts.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::context::ContextKind;
    use crate::host::NullHost;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open(primary: &Path) -> IsolationContext {
        IsolationContext::open(
            primary,
            ContextKind::Persistent,
            &LoaderConfig::default(),
            Arc::new(NullHost),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("Main.js");
        fs::write(&primary, "").unwrap();

        let mut registry = PersistentLoadRegistry::new();
        assert!(!registry.contains(&primary));

        let context = open(&primary);
        let id = context.id();
        assert!(registry.insert(primary.clone(), context).is_none());

        assert!(registry.contains(&primary));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).map(|c| c.id()), Some(id));
    }

    #[test]
    fn test_replace_and_remove() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("Main.js");
        fs::write(&primary, "").unwrap();

        let mut registry = PersistentLoadRegistry::new();
        let first = open(&primary);
        let first_id = first.id();
        registry.insert(primary.clone(), first);

        let second = open(&primary);
        let second_id = second.id();
        let replaced = registry.insert(primary.clone(), second).unwrap();
        assert_eq!(replaced.id(), first_id);
        assert!(registry.get(first_id).is_none());
        assert!(registry.get(second_id).is_some());

        let removed = registry.remove(&primary).unwrap();
        assert_eq!(removed.id(), second_id);
        assert!(registry.is_empty());
        assert!(registry.get(second_id).is_none());
    }
}
