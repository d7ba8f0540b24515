//! Recent file activity.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use time::OffsetDateTime;

use crate::cache::mutex_lock;

const SOURCE: &str = "sync::changes";

pub const DEFAULT_RECENT_CHANGES_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEvent {
    Add,
    Change,
    Unlink,
}

impl FileEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            FileEvent::Add => "add",
            FileEvent::Change => "change",
            FileEvent::Unlink => "unlink",
        }
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One processed file event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    /// Relative to the synchronized directory, `/` separated.
    pub path: String,
    pub event: FileEvent,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl FileChange {
    pub fn new(path: impl Into<String>, event: FileEvent) -> Self {
        Self {
            path: path.into(),
            event,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Bounded buffer of the most recent changes, oldest first.
///
/// Readers only ever receive copies.
#[derive(Debug)]
pub struct RecentChanges {
    entries: Mutex<VecDeque<FileChange>>,
    capacity: usize,
}

impl RecentChanges {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a change, evicting the oldest past capacity, and return a
    /// snapshot of the buffer.
    pub fn push(&self, change: FileChange) -> Vec<FileChange> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "push");
        entries.push_back(change);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        entries.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<FileChange> {
        mutex_lock(&self.entries, SOURCE, "snapshot")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecentChanges {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CHANGES_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_most_recent_entries() {
        let recent = RecentChanges::default();
        for index in 0..60 {
            recent.push(FileChange::new(format!("snippets/{index}.liquid"), FileEvent::Change));
        }

        let snapshot = recent.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert_eq!(snapshot[0].path, "snippets/10.liquid");
        assert_eq!(snapshot[49].path, "snippets/59.liquid");
    }

    #[test]
    fn snapshots_are_detached_copies() {
        let recent = RecentChanges::new(2);
        let mut snapshot = recent.push(FileChange::new("a", FileEvent::Add));
        snapshot.clear();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn serializes_lowercase_events() {
        let change = FileChange {
            path: "layout/theme.liquid".into(),
            event: FileEvent::Unlink,
            timestamp: time::macros::datetime!(2025-03-01 12:00:00 UTC),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["event"], "unlink");
        assert_eq!(json["timestamp"], "2025-03-01T12:00:00Z");
    }
}
