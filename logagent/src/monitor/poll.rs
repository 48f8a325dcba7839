//! Polling fallback: diffs two successive directory snapshots. Used on
//! filesystems that don't support inotify/kqueue (network mounts, some
//! container overlay filesystems).

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::MonitorError;
use crate::monitor::{DirectoryMonitor, Event, EventKind};

#[derive(Clone)]
struct Entry {
    is_dir: bool,
}

pub struct PollMonitor {
    dir: PathBuf,
    last_snapshot: HashMap<String, Entry>,
}

impl PollMonitor {
    pub fn new(dir: PathBuf) -> Self {
        PollMonitor { dir, last_snapshot: HashMap::new() }
    }

    fn snapshot(&self) -> Result<HashMap<String, Entry>, MonitorError> {
        let mut out = HashMap::new();
        let entries = std::fs::read_dir(&self.dir).map_err(|e| MonitorError::Io { path: self.dir.clone(), source: e })?;
        for entry in entries {
            let entry = entry.map_err(|e| MonitorError::Io { path: self.dir.clone(), source: e })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            out.insert(name, Entry { is_dir });
        }
        Ok(out)
    }
}

impl DirectoryMonitor for PollMonitor {
    fn poll_events(&mut self) -> Result<Vec<Event>, MonitorError> {
        let current = self.snapshot()?;
        let mut events = Vec::new();

        for (name, entry) in &current {
            if !self.last_snapshot.contains_key(name) {
                events.push(Event {
                    name: name.clone(),
                    full_path: self.dir.join(name),
                    kind: if entry.is_dir { EventKind::DirectoryCreated } else { EventKind::FileCreated },
                });
            }
        }
        for (name, entry) in &self.last_snapshot {
            if !current.contains_key(name) {
                events.push(Event {
                    name: name.clone(),
                    full_path: self.dir.join(name),
                    kind: if entry.is_dir { EventKind::DirectoryDeleted } else { EventKind::FileDeleted },
                });
            }
        }

        self.last_snapshot = current;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detects_a_newly_created_file() {
        let dir = tempdir().unwrap();
        let mut monitor = PollMonitor::new(dir.path().to_path_buf());
        assert!(monitor.poll_events().unwrap().is_empty());

        std::fs::write(dir.path().join("a.log"), b"hi").unwrap();
        let events = monitor.poll_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::FileCreated);
        assert_eq!(events[0].name, "a.log");
    }

    #[test]
    fn detects_a_deleted_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, b"hi").unwrap();
        let mut monitor = PollMonitor::new(dir.path().to_path_buf());
        monitor.poll_events().unwrap();

        std::fs::remove_file(&path).unwrap();
        let events = monitor.poll_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::FileDeleted);
    }

    #[test]
    fn detects_a_created_subdirectory() {
        let dir = tempdir().unwrap();
        let mut monitor = PollMonitor::new(dir.path().to_path_buf());
        monitor.poll_events().unwrap();

        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let events = monitor.poll_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::DirectoryCreated);
    }

    #[test]
    fn unchanged_directory_reports_no_events() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), b"hi").unwrap();
        let mut monitor = PollMonitor::new(dir.path().to_path_buf());
        monitor.poll_events().unwrap();
        assert!(monitor.poll_events().unwrap().is_empty());
    }
}
