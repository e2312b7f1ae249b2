//! Persistence / Cold-Warm-Hot Start (§4.9): save and restore the
//! driver's opaque internal state blob across restarts, addressed by
//! URI. `file://` resolves to a local, zstd-compressed blob (grounded
//! in the teacher's `fleet/client.rs` use of `zstd::encode_all`); any
//! other scheme is treated as a generic remote object store and
//! triggers a `largeFileObjectAvailable` event, grounded in
//! `original_source/.../lfa_client.py` and `s3_utils.py`.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("URI has no scheme: {0}")]
    MissingScheme(String),
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUri {
    pub scheme: String,
    pub path: String,
}

pub fn parse_uri(uri: &str) -> Result<ParsedUri, PersistenceError> {
    match uri.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() => Ok(ParsedUri {
            scheme: scheme.to_string(),
            path: rest.to_string(),
        }),
        _ => Err(PersistenceError::MissingScheme(uri.to_string())),
    }
}

/// Pluggable storage backend for driver-state blobs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn scheme(&self) -> &'static str;
    async fn put(&self, path: &str, blob: &[u8]) -> Result<(), PersistenceError>;
    async fn get(&self, path: &str) -> Result<Vec<u8>, PersistenceError>;
}

/// Local-filesystem object store. Blobs are zstd-compressed at rest.
pub struct LocalFileStore {
    root: std::path::PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> std::path::PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for LocalFileStore {
    fn scheme(&self) -> &'static str {
        "file"
    }

    async fn put(&self, path: &str, blob: &[u8]) -> Result<(), PersistenceError> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::Io(e.to_string()))?;
        }
        let compressed =
            zstd::encode_all(blob, 3).map_err(|e| PersistenceError::Compression(e.to_string()))?;
        std::fs::write(&full_path, compressed).map_err(|e| PersistenceError::Io(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, PersistenceError> {
        let full_path = self.resolve(path);
        let compressed = std::fs::read(&full_path)
            .map_err(|_| PersistenceError::NotFound(full_path.display().to_string()))?;
        zstd::decode_all(compressed.as_slice())
            .map_err(|e| PersistenceError::Compression(e.to_string()))
    }
}

/// Generic remote object store stand-in (out of scope per `spec.md`
/// §1: "the large-file object store" is a collaborator). Kept
/// in-memory here so the crate is runnable without real cloud
/// credentials; a production deployment swaps this for an S3-backed
/// `ObjectStore`.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    blobs: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryRemoteStore {
    fn scheme(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, path: &str, blob: &[u8]) -> Result<(), PersistenceError> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), blob.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, PersistenceError> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(path.to_string()))
    }
}

/// Dispatches a save/load to the correct backend by URI scheme.
pub struct PersistenceRouter {
    stores: Vec<Box<dyn ObjectStore>>,
}

impl PersistenceRouter {
    pub fn new(stores: Vec<Box<dyn ObjectStore>>) -> Self {
        Self { stores }
    }

    fn store_for(&self, scheme: &str) -> Result<&dyn ObjectStore, PersistenceError> {
        self.stores
            .iter()
            .find(|s| s.scheme() == scheme)
            .map(|s| s.as_ref())
            .ok_or_else(|| PersistenceError::UnsupportedScheme(scheme.to_string()))
    }

    /// Save `blob` to `uri`. Returns `Some(uri)` when the backend is a
    /// non-local (remote) scheme, signalling the caller should publish
    /// a `largeFileObjectAvailable` event.
    pub async fn save(&self, uri: &str, blob: &[u8]) -> Result<Option<String>, PersistenceError> {
        let parsed = parse_uri(uri)?;
        let store = self.store_for(&parsed.scheme)?;
        store.put(&parsed.path, blob).await?;
        Ok(if parsed.scheme == "file" {
            None
        } else {
            Some(uri.to_string())
        })
    }

    pub async fn load(&self, uri: &str) -> Result<Vec<u8>, PersistenceError> {
        let parsed = parse_uri(uri)?;
        let store = self.store_for(&parsed.scheme)?;
        store.get(&parsed.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_uri_without_scheme() {
        assert!(matches!(
            parse_uri("not-a-uri"),
            Err(PersistenceError::MissingScheme(_))
        ));
    }

    #[tokio::test]
    async fn local_file_round_trips_through_compression() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        store.put("driver.bin", b"hello world").await.unwrap();
        let restored = store.get("driver.bin").await.unwrap();
        assert_eq!(restored, b"hello world");
    }

    #[tokio::test]
    async fn router_flags_remote_saves_for_large_file_event() {
        let dir = tempfile::tempdir().unwrap();
        let router = PersistenceRouter::new(vec![
            Box::new(LocalFileStore::new(dir.path())),
            Box::new(InMemoryRemoteStore::new()),
        ]);

        let local_result = router.save("file:///driver.bin", b"abc").await.unwrap();
        assert_eq!(local_result, None);

        let remote_result = router.save("s3://bucket/driver.bin", b"abc").await.unwrap();
        assert_eq!(remote_result, Some("s3://bucket/driver.bin".to_string()));
    }

    #[tokio::test]
    async fn unsupported_scheme_errors() {
        let router = PersistenceRouter::new(vec![]);
        let err = router.save("ftp://host/path", b"x").await.unwrap_err();
        assert!(matches!(err, PersistenceError::UnsupportedScheme(_)));
    }
}
