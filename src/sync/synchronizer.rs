//! Template dev synchronizer.
//!
//! Mirrors a developer's local theme directory into object storage while it
//! is being edited, and invalidates the cache for every mirrored file.
//! Events are handled strictly one at a time: the upload of a file always
//! completes before its invalidation, and the recent-changes buffer follows
//! the same order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::assets::{AssetProcessor, is_processable_asset};
use super::changes::{FileChange, FileEvent, RecentChanges};
use super::config::SyncConfig;
use super::content::{content_type, is_binary_content_type};
use super::error::SyncError;
use super::paths::{is_global_template, is_safe_path, relative_path, resolve, storage_key};
use super::watcher::{DirectoryWatcher, WatchEvent, walk_files};
use crate::cache::{CacheInvalidationService, CacheManager, ChangeType, rw_read, rw_write};
use crate::infra::storage::{ObjectMetadata, ObjectStore};

const SOURCE: &str = "sync::synchronizer";

pub(crate) const METRIC_SYNC_EVENTS: &str = "vitrina_sync_events_total";
pub(crate) const METRIC_SYNC_EVENT_MS: &str = "vitrina_sync_event_ms";

const TEMPLATE_TYPE: &str = "store-template";

/// Callback invoked with the whole recent-changes buffer after every
/// processed event.
pub type ChangeObserver = Arc<dyn Fn(&[FileChange]) + Send + Sync>;

/// What to synchronize.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub local_dir: PathBuf,
    pub store_id: String,
    /// Overrides the configured bucket.
    pub bucket_name: Option<String>,
    /// Overrides the configured region.
    pub region: Option<String>,
}

impl SyncOptions {
    pub fn new(local_dir: impl Into<PathBuf>, store_id: impl Into<String>) -> Self {
        Self {
            local_dir: local_dir.into(),
            store_id: store_id.into(),
            bucket_name: None,
            region: None,
        }
    }

    pub fn with_bucket(mut self, bucket_name: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket_name.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// The directory currently being mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTarget {
    /// As requested, lexically resolved.
    pub local_dir: PathBuf,
    /// Canonical form of `local_dir`; watched, walked and checked against.
    pub root: PathBuf,
    pub store_id: String,
    pub bucket: String,
    pub region: String,
}

impl ActiveTarget {
    /// Path of `candidate` relative to the mirrored directory, `None` unless
    /// it lies strictly inside it.
    pub fn relative_path(&self, candidate: &Path) -> Option<String> {
        [&self.root, &self.local_dir]
            .into_iter()
            .filter(|base| is_safe_path(candidate, base))
            .find_map(|base| relative_path(candidate, base))
    }
}

struct Session {
    watcher: DirectoryWatcher,
    worker: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

struct Inner {
    config: SyncConfig,
    storage: Arc<dyn ObjectStore>,
    cache: Arc<CacheManager>,
    invalidation: Arc<CacheInvalidationService>,
    processor: Arc<dyn AssetProcessor>,
    recent: RecentChanges,
    observer: RwLock<Option<ChangeObserver>>,
    target: RwLock<Option<Arc<ActiveTarget>>>,
    processing: Mutex<()>,
}

pub struct TemplateDevSynchronizer {
    inner: Arc<Inner>,
    session: Mutex<Option<Session>>,
}

impl TemplateDevSynchronizer {
    pub fn new(
        config: SyncConfig,
        storage: Arc<dyn ObjectStore>,
        cache: Arc<CacheManager>,
        invalidation: Arc<CacheInvalidationService>,
        processor: Arc<dyn AssetProcessor>,
    ) -> Self {
        let recent = RecentChanges::new(config.recent_changes_limit);
        Self {
            inner: Arc::new(Inner {
                config,
                storage,
                cache,
                invalidation,
                processor,
                recent,
                observer: RwLock::new(None),
                target: RwLock::new(None),
                processing: Mutex::new(()),
            }),
            session: Mutex::new(None),
        }
    }

    /// Start mirroring `options.local_dir`.
    ///
    /// Returns once the watcher has finished its initial scan. A running
    /// session is stopped first.
    #[instrument(skip_all, fields(store_id = %options.store_id, dir = %options.local_dir.display()))]
    pub async fn start(&self, options: SyncOptions) -> Result<(), SyncError> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            info!("Restarting template synchronizer");
            self.shutdown(previous).await;
        }

        let target = Arc::new(self.inner.prepare(options)?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = DirectoryWatcher::start(
            target.root.clone(),
            self.inner.config.watch,
            events_tx,
            shutdown_rx.clone(),
        )
        .await?;

        // Active only once the initial scan is done; queued events wait for the worker.
        *rw_write(&self.inner.target, SOURCE, "start") = Some(Arc::clone(&target));
        let worker = tokio::spawn(Arc::clone(&self.inner).process_events(events_rx, shutdown_rx));

        *session = Some(Session {
            watcher,
            worker,
            shutdown: shutdown_tx,
        });
        info!(
            root = %target.root.display(),
            bucket = %target.bucket,
            region = %target.region,
            "Template synchronizer started"
        );
        Ok(())
    }

    /// Stop mirroring. Safe to call at any time.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        if let Some(current) = session.take() {
            self.shutdown(current).await;
            info!("Template synchronizer stopped");
        }
    }

    /// Replace the change observer.
    pub fn on_changes<F>(&self, observer: F)
    where
        F: Fn(&[FileChange]) + Send + Sync + 'static,
    {
        *rw_write(&self.inner.observer, SOURCE, "on_changes") = Some(Arc::new(observer));
    }

    /// Mirror every file under the active directory as an `add`. Returns the
    /// number of files visited, which falls short when the synchronizer is
    /// stopped or restarted mid-way.
    #[instrument(skip_all)]
    pub async fn sync_all(&self) -> Result<usize, SyncError> {
        let target = self.inner.current_target().ok_or(SyncError::NotActive)?;

        let root = target.root.clone();
        let files = tokio::task::spawn_blocking(move || walk_files(&root))
            .await
            .map_err(|err| std::io::Error::other(format!("directory walk failed: {err}")))?;

        info!(files = files.len(), store_id = %target.store_id, "Full resync");
        for (visited, file) in files.iter().enumerate() {
            if !self.inner.is_current(&target) {
                info!(visited, "Synchronizer stopped; full resync abandoned");
                return Ok(visited);
            }
            self.inner
                .handle_file_change(&target, file, FileEvent::Add)
                .await;
        }
        Ok(files.len())
    }

    /// Process one file event against the active directory. Failures are
    /// logged and the event is dropped.
    pub async fn handle_file_change(&self, path: &Path, event: FileEvent) {
        match self.inner.current_target() {
            Some(target) => self.inner.handle_file_change(&target, path, event).await,
            None => debug!(path = %path.display(), %event, "Synchronizer inactive; event dropped"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.current_target().is_some()
    }

    pub fn active_target(&self) -> Option<ActiveTarget> {
        self.inner.current_target().map(|target| (*target).clone())
    }

    pub fn recent_changes(&self) -> Vec<FileChange> {
        self.inner.recent.snapshot()
    }

    async fn shutdown(&self, session: Session) {
        let Session {
            watcher,
            worker,
            shutdown,
        } = session;

        *rw_write(&self.inner.target, SOURCE, "stop") = None;
        let _ = shutdown.send(true);
        watcher.stop().await;
        if let Err(err) = worker.await {
            warn!(error = %err, "Sync worker ended abnormally");
        }
    }
}

impl Inner {
    fn current_target(&self) -> Option<Arc<ActiveTarget>> {
        rw_read(&self.target, SOURCE, "current_target").clone()
    }

    fn is_current(&self, target: &Arc<ActiveTarget>) -> bool {
        self.current_target()
            .is_some_and(|current| Arc::ptr_eq(&current, target))
    }

    fn prepare(&self, options: SyncOptions) -> Result<ActiveTarget, SyncError> {
        let SyncOptions {
            local_dir,
            store_id,
            bucket_name,
            region,
        } = options;

        let sandbox = resolve(&self.config.sandbox_root)?;
        let local_dir = resolve(&local_dir)?;
        if !is_safe_path(&local_dir, &sandbox) {
            warn!(dir = %local_dir.display(), sandbox = %sandbox.display(), "Rejected directory outside sandbox");
            return Err(SyncError::IllegalDirectory {
                dir: local_dir,
                root: sandbox,
            });
        }
        if !local_dir.is_dir() {
            return Err(SyncError::DirectoryNotFound(local_dir));
        }
        if store_id.trim().is_empty() {
            return Err(SyncError::configuration("store id must not be empty"));
        }

        let bucket = bucket_name
            .or_else(|| self.config.bucket_name.clone())
            .filter(|bucket| !bucket.trim().is_empty())
            .ok_or_else(|| {
                SyncError::configuration(
                    "no storage bucket configured; pass --bucket or set sync.bucket_name",
                )
            })?;

        // Symlinks may point the directory somewhere else entirely.
        let canonical_sandbox = std::fs::canonicalize(&sandbox)?;
        let root = std::fs::canonicalize(&local_dir)?;
        if !root.starts_with(&canonical_sandbox) {
            warn!(dir = %local_dir.display(), resolved = %root.display(), "Rejected directory resolving outside sandbox");
            return Err(SyncError::IllegalDirectory {
                dir: local_dir,
                root: sandbox,
            });
        }

        Ok(ActiveTarget {
            local_dir,
            root,
            store_id,
            bucket,
            region: region.unwrap_or_else(|| self.config.region.clone()),
        })
    }

    async fn process_events(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = events.recv() => match received {
                    Some(WatchEvent { path, event }) => {
                        let Some(target) = self.current_target() else {
                            break;
                        };
                        self.handle_file_change(&target, &path, event).await;
                    }
                    None => break,
                },
            }
        }
        debug!("Sync worker exited");
    }

    async fn handle_file_change(&self, target: &ActiveTarget, path: &Path, event: FileEvent) {
        let _serial = self.processing.lock().await;
        let started_at = Instant::now();

        let outcome = match self.mirror(target, path, event).await {
            Ok(change) => {
                info!(path = %change.path, %event, store_id = %target.store_id, "Template synchronized");
                "ok"
            }
            Err(SyncError::UnsafePath(candidate)) => {
                warn!(path = %candidate.display(), %event, "Dropped event for path outside synchronized directory");
                "rejected"
            }
            Err(err) => {
                error!(path = %path.display(), %event, error = %err, "Template synchronization failed");
                "error"
            }
        };

        counter!(METRIC_SYNC_EVENTS, "event" => event.as_str(), "outcome" => outcome).increment(1);
        histogram!(METRIC_SYNC_EVENT_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
    }

    async fn mirror(
        &self,
        target: &ActiveTarget,
        path: &Path,
        event: FileEvent,
    ) -> Result<FileChange, SyncError> {
        let candidate = resolve(path)?;
        let Some(relative) = target.relative_path(&candidate) else {
            return Err(SyncError::UnsafePath(candidate));
        };
        let key = storage_key(&target.store_id, &relative);

        match event {
            FileEvent::Add | FileEvent::Change => {
                self.upload(target, &candidate, &relative, &key).await?;
            }
            FileEvent::Unlink => {
                self.storage.delete(&target.bucket, &key).await?;
                debug!(%key, "Deleted mirrored object");
            }
        }

        let store_id = target.store_id.as_str();
        self.cache.invalidate_template_cache(store_id, &relative).await;
        if is_global_template(&relative) {
            self.cache.invalidate_store_cache(store_id).await;
        }
        self.invalidation
            .invalidate_cache(ChangeType::TemplateStoreUpdated, store_id, None, Some(&relative))
            .await;

        let change = FileChange::new(relative, event);
        let snapshot = self.recent.push(change.clone());
        let observer = rw_read(&self.observer, SOURCE, "notify").clone();
        if let Some(observer) = observer {
            observer(&snapshot);
        }
        Ok(change)
    }

    async fn upload(
        &self,
        target: &ActiveTarget,
        candidate: &Path,
        relative: &str,
        key: &str,
    ) -> Result<(), SyncError> {
        let canonical = tokio::fs::canonicalize(candidate).await?;
        if !canonical.starts_with(&target.root) {
            return Err(SyncError::UnsafePath(candidate.to_path_buf()));
        }

        let raw = tokio::fs::read(&canonical).await?;
        let content_type = content_type(relative);
        let body = if is_binary_content_type(&content_type) {
            Bytes::from(raw)
        } else {
            match String::from_utf8(raw) {
                Ok(text) => Bytes::from(self.process_text(text, relative)),
                Err(err) => {
                    debug!(path = relative, "Text file is not valid UTF-8; uploading raw bytes");
                    Bytes::from(err.into_bytes())
                }
            }
        };

        let size = body.len();
        self.storage
            .put(&target.bucket, key, body, &content_type, upload_metadata(&target.store_id))
            .await?;
        debug!(%key, content_type, size, "Uploaded template");
        Ok(())
    }

    fn process_text(&self, text: String, relative: &str) -> String {
        if !is_processable_asset(relative) {
            return text;
        }
        match self.processor.process_asset(&text, relative) {
            Ok(processed) => processed.content,
            Err(err) => {
                warn!(path = relative, error = %err, "Asset processing failed; uploading original content");
                text
            }
        }
    }
}

fn upload_metadata(store_id: &str) -> ObjectMetadata {
    let now = OffsetDateTime::now_utc();
    let upload_time = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());

    ObjectMetadata::from([
        ("store-id".to_string(), store_id.to_string()),
        ("template-type".to_string(), TEMPLATE_TYPE.to_string()),
        ("upload-time".to_string(), upload_time),
    ])
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::cache::{CacheConfig, MemoryCacheStore};
    use crate::infra::storage::MemoryObjectStore;
    use crate::sync::assets::StandardAssetProcessor;

    const BUCKET: &str = "themes";

    struct Fixture {
        sandbox: TempDir,
        storage: Arc<MemoryObjectStore>,
        cache: Arc<CacheManager>,
        synchronizer: TemplateDevSynchronizer,
    }

    fn fixture() -> Fixture {
        let sandbox = tempdir().expect("tempdir");
        let storage = Arc::new(MemoryObjectStore::new());
        let cache = Arc::new(CacheManager::new(
            &CacheConfig::default(),
            Arc::new(MemoryCacheStore::default()),
        ));
        let invalidation = Arc::new(CacheInvalidationService::new(Arc::clone(&cache)));
        let mut config = SyncConfig::new(sandbox.path()).with_bucket(BUCKET);
        config.watch.ignore_initial = true;

        let synchronizer = TemplateDevSynchronizer::new(
            config,
            storage.clone(),
            Arc::clone(&cache),
            invalidation,
            Arc::new(StandardAssetProcessor),
        );
        Fixture {
            sandbox,
            storage,
            cache,
            synchronizer,
        }
    }

    #[tokio::test]
    async fn inactive_synchronizer_rejects_sync_all() {
        let fixture = fixture();
        assert!(matches!(
            fixture.synchronizer.sync_all().await,
            Err(SyncError::NotActive)
        ));
        assert!(!fixture.synchronizer.is_running());
    }

    #[tokio::test]
    async fn missing_directory_is_reported() {
        let fixture = fixture();
        let missing = fixture.sandbox.path().join("nope");
        let err = fixture
            .synchronizer
            .start(SyncOptions::new(&missing, "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DirectoryNotFound(dir) if dir.ends_with("nope")));
    }

    #[tokio::test]
    async fn missing_bucket_is_a_configuration_error() {
        let sandbox = tempdir().expect("tempdir");
        let cache = Arc::new(CacheManager::new(
            &CacheConfig::default(),
            Arc::new(MemoryCacheStore::default()),
        ));
        let synchronizer = TemplateDevSynchronizer::new(
            SyncConfig::new(sandbox.path()),
            Arc::new(MemoryObjectStore::new()),
            Arc::clone(&cache),
            Arc::new(CacheInvalidationService::new(cache)),
            Arc::new(StandardAssetProcessor),
        );

        let err = synchronizer
            .start(SyncOptions::new(sandbox.path(), "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration { .. }));
        assert!(!synchronizer.is_running());
    }

    #[tokio::test]
    async fn upload_carries_metadata_and_processed_content() {
        let fixture = fixture();
        let root = fixture.sandbox.path();
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(root.join("assets/theme.css"), "/* c */a { }   \n").unwrap();

        fixture
            .synchronizer
            .start(SyncOptions::new(root, "s1"))
            .await
            .expect("start");
        fixture
            .synchronizer
            .handle_file_change(&root.join("assets/theme.css"), FileEvent::Add)
            .await;

        let object = fixture
            .storage
            .get(BUCKET, "templates/s1/assets/theme.css")
            .await
            .unwrap()
            .expect("uploaded");
        assert_eq!(object.body, Bytes::from_static(b"a { }\n"));
        assert_eq!(object.content_type, "text/css");
        assert_eq!(object.metadata["store-id"], "s1");
        assert_eq!(object.metadata["template-type"], "store-template");
        assert!(OffsetDateTime::parse(&object.metadata["upload-time"], &Rfc3339).is_ok());

        fixture.synchronizer.stop().await;
    }

    #[tokio::test]
    async fn paths_outside_the_directory_are_dropped() {
        let fixture = fixture();
        let root = fixture.sandbox.path();
        fs::create_dir_all(root.join("theme")).unwrap();
        fs::write(root.join("stray.liquid"), "x").unwrap();

        fixture
            .synchronizer
            .start(SyncOptions::new(root.join("theme"), "s1"))
            .await
            .expect("start");
        fixture
            .synchronizer
            .handle_file_change(&root.join("theme/../stray.liquid"), FileEvent::Add)
            .await;

        assert!(fixture.storage.is_empty());
        assert!(fixture.synchronizer.recent_changes().is_empty());
        fixture.synchronizer.stop().await;
    }

    #[tokio::test]
    async fn observer_slot_keeps_only_the_last_callback() {
        let fixture = fixture();
        let root = fixture.sandbox.path();
        fs::write(root.join("a.liquid"), "a").unwrap();

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&first);
        fixture.synchronizer.on_changes(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second);
        fixture.synchronizer.on_changes(move |changes| {
            counter.store(changes.len(), Ordering::SeqCst);
        });

        fixture
            .synchronizer
            .start(SyncOptions::new(root, "s1"))
            .await
            .expect("start");
        fixture
            .synchronizer
            .handle_file_change(&root.join("a.liquid"), FileEvent::Change)
            .await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        fixture.synchronizer.stop().await;
    }

    #[tokio::test]
    async fn template_cache_entries_are_invalidated() {
        let fixture = fixture();
        let root = fixture.sandbox.path();
        fs::create_dir_all(root.join("sections")).unwrap();
        fs::write(root.join("sections/header.liquid"), "<header/>").unwrap();

        let raw = crate::cache::keys::template_key("s1", "sections/header.liquid");
        fixture
            .cache
            .set_cached(&raw, "old", fixture.cache.template_ttl())
            .await;

        fixture
            .synchronizer
            .start(SyncOptions::new(root, "s1"))
            .await
            .expect("start");
        fixture
            .synchronizer
            .handle_file_change(&root.join("sections/header.liquid"), FileEvent::Change)
            .await;

        assert_eq!(fixture.cache.get_cached::<String>(&raw).await, None);
        fixture.synchronizer.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let fixture = fixture();
        fixture.synchronizer.stop().await;
        fixture
            .synchronizer
            .start(SyncOptions::new(fixture.sandbox.path(), "s1"))
            .await
            .expect("start");
        assert!(fixture.synchronizer.is_running());
        fixture.synchronizer.stop().await;
        fixture.synchronizer.stop().await;
        assert!(!fixture.synchronizer.is_running());
    }
}
