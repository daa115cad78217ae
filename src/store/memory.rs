use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use super::{validate_key, ArtifactStore};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Store that keeps every object in memory.
///
/// Counts `put` calls so callers can check that a re-run wrote nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RefCell<BTreeMap<String, StoredObject>>,
    puts: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls since creation.
    pub fn put_count(&self) -> usize {
        self.puts.get()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.borrow().get(key).cloned()
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.objects.borrow().contains_key(key))
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.objects.borrow_mut().insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        self.puts.set(self.puts.get() + 1);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects
            .borrow()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .borrow()
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_exists_and_get() {
        let store = MemoryStore::new();
        assert!(!store.exists("a.wav").unwrap());

        store.put("a.wav", b"RIFF", "audio/wav").unwrap();
        assert!(store.exists("a.wav").unwrap());
        assert_eq!(store.get("a.wav").unwrap(), b"RIFF");
        assert_eq!(store.object("a.wav").unwrap().content_type, "audio/wav");
        assert_eq!(store.put_count(), 1);
    }

    #[test]
    fn list_filters_by_prefix_in_key_order() {
        let store = MemoryStore::new();
        for key in ["run/b.wav", "other/c.wav", "run/a.wav"] {
            store.put(key, b"", "audio/wav").unwrap();
        }
        assert_eq!(store.list("run/").unwrap(), vec!["run/a.wav", "run/b.wav"]);
        assert_eq!(store.list("").unwrap().len(), 3);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("nope.wav"), Err(StoreError::NotFound(_))));
    }
}
