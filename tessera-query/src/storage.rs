//! The in-memory storage manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tessera_error::{tessera_bail, TesseraResult};

use crate::FragmentMetadata;

/// Holds the committed fragments of an array and hands out fragment
/// URIs. Shared read-only across queries; a query never mutates storage
/// except by committing a fragment on finalize.
#[derive(Debug, Default)]
pub struct StorageManager {
    fragments: RwLock<Vec<Arc<FragmentMetadata>>>,
    next_fragment_id: AtomicU64,
}

impl StorageManager {
    /// Create an empty storage manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next fragment URI.
    pub(crate) fn generate_fragment_uri(&self) -> String {
        let id = self.next_fragment_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("__fragment_{id:06}")
    }

    /// Commit a fragment, making it visible to subsequent readers.
    pub fn commit_fragment(
        &self,
        fragment: FragmentMetadata,
    ) -> TesseraResult<Arc<FragmentMetadata>> {
        let mut fragments = self
            .fragments
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if fragments.iter().any(|f| f.uri() == fragment.uri()) {
            tessera_bail!("fragment '{}' is already committed", fragment.uri());
        }
        let fragment = Arc::new(fragment);
        fragments.push(Arc::clone(&fragment));
        Ok(fragment)
    }

    /// All committed fragments, in commit order.
    pub fn fragments(&self) -> Vec<Arc<FragmentMetadata>> {
        self.fragments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up a committed fragment by URI.
    pub fn fragment(&self, uri: &str) -> Option<Arc<FragmentMetadata>> {
        self.fragments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|f| f.uri() == uri)
            .cloned()
    }

    /// The number of committed fragments.
    pub fn fragment_num(&self) -> usize {
        self.fragments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_uris_are_unique() {
        let storage = StorageManager::new();
        let first = storage.generate_fragment_uri();
        let second = storage.generate_fragment_uri();
        assert_ne!(first, second);
        assert!(first.starts_with("__fragment_"));
    }

    #[test]
    fn commit_and_lookup() {
        let storage = StorageManager::new();
        let uri = storage.generate_fragment_uri();
        storage
            .commit_fragment(FragmentMetadata::new(uri.clone()))
            .unwrap();

        assert_eq!(storage.fragment_num(), 1);
        assert_eq!(storage.fragment(&uri).unwrap().uri(), uri);
        assert!(storage.fragment("missing").is_none());
    }

    #[test]
    fn duplicate_commits_are_rejected() {
        let storage = StorageManager::new();
        storage
            .commit_fragment(FragmentMetadata::new("f"))
            .unwrap();
        assert!(storage.commit_fragment(FragmentMetadata::new("f")).is_err());
        assert_eq!(storage.fragment_num(), 1);
    }
}
