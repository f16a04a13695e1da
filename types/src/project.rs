//! File → project root index.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared `fileURI → ProjectRoot` cache.
///
/// Cloning yields another handle to the same map. Entries are only written
/// once a file has at least one capable server, so unmatched files are
/// looked up again on their next request.
#[derive(Debug, Clone, Default)]
pub struct FileProjectIndex {
    entries: Arc<RwLock<HashMap<String, PathBuf>>>,
}

impl FileProjectIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<PathBuf> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }

    pub fn insert(&self, uri: impl Into<String>, root: impl Into<PathBuf>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.into(), root.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let index = FileProjectIndex::new();
        let other = index.clone();
        index.insert("file:///proj/a.ts", "/proj");
        assert_eq!(other.get("file:///proj/a.ts"), Some(PathBuf::from("/proj")));
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn unknown_uri_is_absent() {
        let index = FileProjectIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.get("file:///nowhere.ts"), None);
    }
}
