//! Recursive directory watcher with write-finished semantics.
//!
//! Raw notifications are collected per path and only delivered once the
//! file's size and modification time have been stable for the configured
//! threshold. Events are classified by what is on disk at delivery time:
//! a present file is `add` the first time it is seen and `change` after,
//! a vanished file that was known is `unlink`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::changes::FileEvent;
use super::config::WatchConfig;
use super::error::SyncError;
use super::paths::{is_hidden, relative_path};

/// A file event ready for processing. `path` is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub event: FileEvent,
}

/// Every visible regular file under `root`, in a stable order.
///
/// Hidden entries are skipped together with their subtrees. Symlinks are
/// not followed.
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Watches a directory tree until dropped or stopped.
pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl DirectoryWatcher {
    /// Register the watch, run the initial scan and return once the watcher
    /// is ready. Unless `ignore_initial` is set, every existing file is sent
    /// as an `add` event before this returns.
    pub async fn start(
        root: PathBuf,
        config: WatchConfig,
        events: mpsc::UnboundedSender<WatchEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, SyncError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let _ = raw_tx.send(result);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let scan_root = root.clone();
        let initial = tokio::task::spawn_blocking(move || walk_files(&scan_root))
            .await
            .map_err(|err| std::io::Error::other(format!("initial scan failed: {err}")))?;

        if !config.ignore_initial {
            for path in &initial {
                let event = WatchEvent {
                    path: path.clone(),
                    event: FileEvent::Add,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        }
        debug!(root = %root.display(), files = initial.len(), "Watcher ready");

        let debouncer = Debouncer {
            root,
            config,
            known: initial.into_iter().collect(),
            pending: HashMap::new(),
            events,
        };
        let task = tokio::spawn(debouncer.run(raw_rx, shutdown));

        Ok(Self { watcher, task })
    }

    /// Stop watching and wait for the delivery task to exit.
    pub async fn stop(self) {
        let Self { watcher, task } = self;
        drop(watcher);
        if let Err(err) = task.await {
            warn!(error = %err, "Watcher task ended abnormally");
        }
    }
}

type Signature = (u64, Option<SystemTime>);

struct Pending {
    last_activity: Instant,
    signature: Option<Signature>,
}

struct Debouncer {
    root: PathBuf,
    config: WatchConfig,
    known: HashSet<PathBuf>,
    pending: HashMap<PathBuf, Pending>,
    events: mpsc::UnboundedSender<WatchEvent>,
}

impl Debouncer {
    async fn run(
        mut self,
        mut raw: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = raw.recv() => match received {
                    Some(Ok(event)) => self.observe(event),
                    Some(Err(err)) => warn!(error = %err, "File watcher reported an error"),
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.flush() {
                        break;
                    }
                }
            }
        }
    }

    fn observe(&mut self, event: Event) {
        // Reads (ours included) must not look like edits.
        if let EventKind::Access(kind) = event.kind
            && kind != AccessKind::Close(AccessMode::Write)
        {
            return;
        }

        let now = Instant::now();
        for path in event.paths {
            let Some(relative) = relative_path(&path, &self.root) else {
                continue;
            };
            if is_hidden(&relative) {
                continue;
            }
            self.pending
                .entry(path)
                .and_modify(|pending| pending.last_activity = now)
                .or_insert(Pending {
                    last_activity: now,
                    signature: None,
                });
        }
    }

    /// Deliver every pending path that has settled. Returns `false` once the
    /// receiving side is gone.
    fn flush(&mut self) -> bool {
        let now = Instant::now();
        let mut settled = Vec::new();

        for (path, pending) in self.pending.iter_mut() {
            let signature = signature(path);
            if signature != pending.signature {
                pending.signature = signature;
                pending.last_activity = now;
                continue;
            }
            if now.duration_since(pending.last_activity) >= self.config.stability_threshold {
                settled.push(path.clone());
            }
        }
        settled.sort();

        for path in settled {
            self.pending.remove(&path);
            for event in self.classify(path) {
                if self.events.send(event).is_err() {
                    return false;
                }
            }
        }
        true
    }

    fn classify(&mut self, path: PathBuf) -> Vec<WatchEvent> {
        match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => {
                let event = if self.known.insert(path.clone()) {
                    FileEvent::Add
                } else {
                    FileEvent::Change
                };
                vec![WatchEvent { path, event }]
            }
            // A directory moved in arrives without events for its children.
            Ok(metadata) if metadata.is_dir() => walk_files(&path)
                .into_iter()
                .filter(|file| self.known.insert(file.clone()))
                .map(|file| WatchEvent {
                    path: file,
                    event: FileEvent::Add,
                })
                .collect(),
            Ok(_) => Vec::new(),
            Err(_) => {
                if self.known.remove(&path) {
                    return vec![WatchEvent {
                        path,
                        event: FileEvent::Unlink,
                    }];
                }
                // A removed directory takes its known files with it.
                let mut removed: Vec<PathBuf> = self
                    .known
                    .iter()
                    .filter(|known| known.starts_with(&path))
                    .cloned()
                    .collect();
                removed.sort();
                removed
                    .into_iter()
                    .map(|file| {
                        self.known.remove(&file);
                        WatchEvent {
                            path: file,
                            event: FileEvent::Unlink,
                        }
                    })
                    .collect()
            }
        }
    }
}

fn signature(path: &Path) -> Option<Signature> {
    std::fs::metadata(path)
        .ok()
        .map(|metadata| (metadata.len(), metadata.modified().ok()))
}
