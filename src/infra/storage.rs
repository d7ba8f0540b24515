//! Durable object storage.
//!
//! `ObjectStore` is the bucket/key blob store deployed templates live in.
//! `FsObjectStore` keeps objects on the local filesystem, one directory per
//! bucket, with metadata in a sidecar tree; `MemoryObjectStore` backs tests.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

const METADATA_DIR: &str = ".meta";

/// User metadata attached to an object.
pub type ObjectMetadata = BTreeMap<String, String>;

/// Errors that can occur while interacting with the object storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid bucket name `{bucket}`")]
    InvalidBucket { bucket: String },
    #[error("invalid object key `{key}`")]
    InvalidKey { key: String },
    #[error("object `{bucket}/{key}` does not exist")]
    NotFound { bucket: String, key: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("object metadata could not be encoded: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// An object as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub metadata: ObjectMetadata,
    /// Hex SHA-256 of the body.
    pub etag: String,
}

impl StoredObject {
    fn new(body: Bytes, content_type: &str, metadata: ObjectMetadata) -> Self {
        let etag = etag(&body);
        Self {
            body,
            content_type: content_type.to_string(),
            metadata,
            etag,
        }
    }
}

/// Blob store collaborator. Deleting a missing object is not an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>, StorageError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Copy an object within a bucket. `metadata` replaces the source
    /// metadata when given.
    async fn copy(
        &self,
        bucket: &str,
        source_key: &str,
        dest_key: &str,
        metadata: Option<ObjectMetadata>,
    ) -> Result<(), StorageError>;
}

fn etag(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body).as_slice())
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let valid = !bucket.is_empty()
        && !bucket.starts_with('.')
        && !bucket.contains(['/', '\\'])
        && bucket != METADATA_DIR;
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidBucket {
            bucket: bucket.to_string(),
        })
    }
}

/// Reject keys that could leave the bucket directory.
fn validate_key(key: &str) -> Result<&Path, StorageError> {
    let relative = Path::new(key);
    let escapes = relative.is_absolute()
        || relative.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::Prefix(_) | Component::CurDir
            )
        });
    if key.is_empty() || key.ends_with('/') || escapes {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(relative)
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    metadata: ObjectMetadata,
    etag: String,
}

/// Filesystem-backed object storage.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an object body.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket).join(validate_key(key)?))
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_bucket(bucket)?;
        let mut path = self
            .root
            .join(METADATA_DIR)
            .join(bucket)
            .join(validate_key(key)?)
            .into_os_string();
        path.push(".json");
        Ok(PathBuf::from(path))
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut staging = path.as_os_str().to_owned();
        staging.push(format!(".{}.tmp", Uuid::new_v4()));
        let staging = PathBuf::from(staging);

        let mut file = fs::File::create(&staging).await?;
        if let Err(err) = file.write_all(data).await {
            drop(file);
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        file.flush().await?;
        drop(file);

        fs::rename(&staging, path).await?;
        Ok(())
    }

    async fn remove_if_present(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        let object_path = self.object_path(bucket, key)?;
        let sidecar_path = self.sidecar_path(bucket, key)?;

        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            metadata,
            etag: etag(&body),
        };
        let encoded = serde_json::to_vec(&sidecar)?;

        Self::write_atomic(&object_path, &body).await?;
        Self::write_atomic(&sidecar_path, &encoded).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>, StorageError> {
        let object_path = self.object_path(bucket, key)?;
        let body = match fs::read(&object_path).await {
            Ok(body) => Bytes::from(body),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let sidecar = match fs::read(self.sidecar_path(bucket, key)?).await {
            Ok(raw) => serde_json::from_slice::<Sidecar>(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Sidecar {
                content_type: mime_guess::from_path(&object_path)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
                metadata: ObjectMetadata::new(),
                etag: etag(&body),
            },
            Err(err) => return Err(err.into()),
        };

        Ok(Some(StoredObject {
            body,
            content_type: sidecar.content_type,
            metadata: sidecar.metadata,
            etag: sidecar.etag,
        }))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        Self::remove_if_present(&self.object_path(bucket, key)?).await?;
        Self::remove_if_present(&self.sidecar_path(bucket, key)?).await
    }

    async fn copy(
        &self,
        bucket: &str,
        source_key: &str,
        dest_key: &str,
        metadata: Option<ObjectMetadata>,
    ) -> Result<(), StorageError> {
        let source = self
            .get(bucket, source_key)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: source_key.to_string(),
            })?;

        self.put(
            bucket,
            dest_key,
            source.body,
            &source.content_type,
            metadata.unwrap_or(source.metadata),
        )
        .await
    }
}

/// In-memory object storage.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<(String, String), StoredObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys stored in a bucket, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject::new(body, content_type, metadata),
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>, StorageError> {
        Ok(self
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn copy(
        &self,
        bucket: &str,
        source_key: &str,
        dest_key: &str,
        metadata: Option<ObjectMetadata>,
    ) -> Result<(), StorageError> {
        validate_key(dest_key)?;
        let source = self
            .get(bucket, source_key)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: source_key.to_string(),
            })?;
        let metadata = metadata.unwrap_or(source.metadata);
        self.objects.insert(
            (bucket.to_string(), dest_key.to_string()),
            StoredObject::new(source.body, &source.content_type, metadata),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn metadata(store_id: &str) -> ObjectMetadata {
        ObjectMetadata::from([("store-id".to_string(), store_id.to_string())])
    }

    #[tokio::test]
    async fn fs_put_get_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let store = FsObjectStore::new(temp.path().join("objects")).expect("storage");

        store
            .put(
                "templates-dev",
                "templates/s1/layout/theme.liquid",
                Bytes::from_static(b"<html>{{ content_for_layout }}</html>"),
                "text/html",
                metadata("s1"),
            )
            .await
            .expect("put");

        let object = store
            .get("templates-dev", "templates/s1/layout/theme.liquid")
            .await
            .expect("get")
            .expect("object exists");
        assert_eq!(object.content_type, "text/html");
        assert_eq!(object.metadata.get("store-id").map(String::as_str), Some("s1"));
        assert_eq!(object.etag, etag(b"<html>{{ content_for_layout }}</html>"));
    }

    #[tokio::test]
    async fn fs_rejects_escaping_keys() {
        let temp = tempdir().expect("tempdir");
        let store = FsObjectStore::new(temp.path().to_path_buf()).expect("storage");

        for key in ["../outside", "/etc/passwd", "./templates/x", "", "dir/"] {
            let err = store
                .put("b", key, Bytes::new(), "text/plain", ObjectMetadata::new())
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey { .. }), "{key}");
        }

        let err = store.get("../b", "k").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidBucket { .. }));
    }

    #[tokio::test]
    async fn fs_delete_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let store = FsObjectStore::new(temp.path().to_path_buf()).expect("storage");

        store
            .put("b", "a/b.css", Bytes::from("x"), "text/css", ObjectMetadata::new())
            .await
            .unwrap();
        store.delete("b", "a/b.css").await.unwrap();
        store.delete("b", "a/b.css").await.unwrap();
        assert!(store.get("b", "a/b.css").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_copy_replaces_metadata_when_given() {
        let temp = tempdir().expect("tempdir");
        let store = FsObjectStore::new(temp.path().to_path_buf()).expect("storage");
        store
            .put("b", "src.json", Bytes::from("{}"), "application/json", metadata("s1"))
            .await
            .unwrap();

        store
            .copy("b", "src.json", "dst.json", Some(metadata("s2")))
            .await
            .unwrap();
        let copied = store.get("b", "dst.json").await.unwrap().unwrap();
        assert_eq!(copied.body, Bytes::from("{}"));
        assert_eq!(copied.metadata, metadata("s2"));

        let err = store.copy("b", "missing", "x", None).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn memory_store_tracks_keys_per_bucket() {
        let store = MemoryObjectStore::new();
        store
            .put("one", "b.txt", Bytes::from("b"), "text/plain", ObjectMetadata::new())
            .await
            .unwrap();
        store
            .put("one", "a.txt", Bytes::from("a"), "text/plain", ObjectMetadata::new())
            .await
            .unwrap();
        store
            .put("two", "c.txt", Bytes::from("c"), "text/plain", ObjectMetadata::new())
            .await
            .unwrap();

        assert_eq!(store.keys("one"), vec!["a.txt", "b.txt"]);
        store.delete("one", "a.txt").await.unwrap();
        store.delete("one", "a.txt").await.unwrap();
        assert_eq!(store.len(), 2);
    }
}
