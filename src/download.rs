//! Bulk download of everything under a store prefix.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::store::ArtifactStore;

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub key: String,
    pub local_path: PathBuf,
    pub error: Option<String>,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Download every object under `prefix` into `destination/<prefix>/`.
///
/// `destination` must already exist. Individual download failures are
/// recorded and do not stop the remaining files; failing to list the prefix
/// or to create the target directory is fatal.
pub fn download_prefix(
    store: &dyn ArtifactStore,
    prefix: &str,
    destination: &Path,
) -> Result<Vec<DownloadResult>, Error> {
    if !destination.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("destination directory {} does not exist", destination.display()),
        )));
    }

    let directory = prefix.trim_end_matches('/');
    let list_prefix = if directory.is_empty() {
        String::new()
    } else {
        format!("{directory}/")
    };
    let target = if directory.is_empty() {
        destination.to_path_buf()
    } else {
        directory
            .split('/')
            .fold(destination.to_path_buf(), |p, part| p.join(part))
    };
    std::fs::create_dir_all(&target)?;

    let keys = store.list(&list_prefix)?;
    if keys.is_empty() {
        log::warn!("No files found under '{list_prefix}' in {}", store.describe());
        return Ok(Vec::new());
    }
    log::info!("Downloading {} files to {}", keys.len(), target.display());

    let results: Vec<DownloadResult> = keys
        .into_iter()
        .map(|key| {
            let file_name = key.rsplit('/').next().unwrap_or(&key).to_string();
            let local_path = target.join(file_name);
            let error = fetch(store, &key, &local_path).err().map(|e| {
                log::error!("Failed to download {key}: {e}");
                e.to_string()
            });
            if error.is_none() {
                log::info!("Downloaded: {key} -> {}", local_path.display());
            }
            DownloadResult {
                key,
                local_path,
                error,
            }
        })
        .collect();

    let failed = results.iter().filter(|r| !r.is_success()).count();
    log::info!(
        "Download complete: {} successful, {failed} failed",
        results.len() - failed
    );
    Ok(results)
}

fn fetch(store: &dyn ArtifactStore, key: &str, local_path: &Path) -> Result<(), Error> {
    let bytes = store.get(key)?;
    std::fs::write(local_path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use std::cell::Cell;

    /// Memory store whose `get` always fails for one key.
    struct PatchyStore {
        inner: MemoryStore,
        broken: &'static str,
        hits: Cell<usize>,
    }

    impl ArtifactStore for PatchyStore {
        fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.exists(key)
        }

        fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
            self.inner.put(key, bytes, content_type)
        }

        fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list(prefix)
        }

        fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            self.hits.set(self.hits.get() + 1);
            if key == self.broken {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.get(key)
        }

        fn describe(&self) -> String {
            "patchy://".to_string()
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.put("run_1/a.wav", b"aaa", "audio/wav").unwrap();
        store.put("run_1/b.wav", b"bbb", "audio/wav").unwrap();
        store.put("run_10/c.wav", b"ccc", "audio/wav").unwrap();
        store.put("top.wav", b"top", "audio/wav").unwrap();
        store
    }

    #[test]
    fn downloads_prefix_into_named_subdirectory() {
        let dest = tempfile::tempdir().unwrap();
        let store = seeded();

        let results = download_prefix(&store, "run_1", dest.path()).unwrap();

        assert_eq!(results.len(), 2, "run_10 must not match run_1/");
        assert!(results.iter().all(DownloadResult::is_success));
        let a = dest.path().join("run_1").join("a.wav");
        assert_eq!(std::fs::read(a).unwrap(), b"aaa");
    }

    #[test]
    fn one_failed_file_does_not_stop_the_rest() {
        let dest = tempfile::tempdir().unwrap();
        let store = PatchyStore {
            inner: seeded(),
            broken: "run_1/a.wav",
            hits: Cell::new(0),
        };

        let results = download_prefix(&store, "run_1/", dest.path()).unwrap();

        assert_eq!(store.hits.get(), 2);
        assert!(!results[0].is_success());
        assert!(results[1].is_success());
        assert!(dest.path().join("run_1").join("b.wav").is_file());
    }

    #[test]
    fn missing_destination_is_fatal() {
        let dest = tempfile::tempdir().unwrap();
        let missing = dest.path().join("nope");
        let err = download_prefix(&seeded(), "run_1", &missing).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn empty_prefix_yields_no_results() {
        let dest = tempfile::tempdir().unwrap();
        let results = download_prefix(&seeded(), "nothing-here", dest.path()).unwrap();
        assert!(results.is_empty());
    }
}
