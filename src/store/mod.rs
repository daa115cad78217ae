//! Artifact stores.
//!
//! Clips and reports are addressed by flat string keys within one bucket.
//! `/` in a key is only a naming convention, used for prefixes.
//!
//! # Available Backends
//!
//! - [`MemoryStore`] - in-process, used for dry runs and tests
//! - [`LocalStore`] - a directory on disk
//! - `HttpStore` - S3-compatible REST endpoint (feature `http`, on by default)

pub mod local;
pub mod memory;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
mod sigv4;

pub use local::LocalStore;
pub use memory::MemoryStore;

#[cfg(feature = "http")]
pub use http::HttpStore;

use crate::config::RunnerConfig;
use crate::error::{ConfigError, StoreError};

/// Blob storage the batch runner writes clips into.
pub trait ArtifactStore {
    /// Whether an object exists. A missing object is `Ok(false)`, not an error.
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError>;

    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Short human-readable location, for log lines.
    fn describe(&self) -> String;
}

/// Build the store selected by the configuration.
///
/// `store_dir` wins over `bucket`; with neither set there is nowhere to write.
pub fn open(config: &RunnerConfig) -> Result<Box<dyn ArtifactStore>, ConfigError> {
    if let Some(dir) = &config.store_dir {
        return Ok(Box::new(LocalStore::new(dir)));
    }

    match &config.bucket {
        #[cfg(feature = "http")]
        Some(_) => Ok(Box::new(HttpStore::from_config(config)?)),
        #[cfg(not(feature = "http"))]
        Some(_) => Err(ConfigError::Invalid {
            field: "bucket",
            reason: "built without the `http` feature; use store_dir instead".to_string(),
        }),
        None => Err(ConfigError::Missing("bucket or store_dir")),
    }
}

/// Reject keys that could escape a bucket-like namespace.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.starts_with('/') {
        "key must be relative"
    } else if key.ends_with('/') {
        "key must name an object, not a prefix"
    } else if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        "key contains an empty, '.' or '..' segment"
    } else if key.contains('\\') {
        "key contains a backslash"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfigBuilder;

    #[test]
    fn accepts_flat_and_prefixed_keys() {
        assert!(validate_key("demo_c0d2ecf9.wav").is_ok());
        assert!(validate_key("run_20260101/demo_c0d2ecf9.wav").is_ok());
    }

    #[test]
    fn rejects_escaping_keys() {
        for key in ["", "/abs.wav", "../up.wav", "a//b.wav", "dir/", "a\\b.wav", "./x.wav"] {
            assert!(
                matches!(validate_key(key), Err(StoreError::InvalidKey { .. })),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn open_requires_a_destination() {
        let config = RunnerConfig::default();
        assert!(matches!(
            open(&config).err(),
            Some(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn open_prefers_store_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RunnerConfigBuilder::default()
            .bucket("clips-bucket")
            .store_dir(dir.path())
            .build()
            .expect("config");
        let store = open(&config).expect("store");
        assert!(store.describe().contains(&dir.path().display().to_string()));
    }
}
