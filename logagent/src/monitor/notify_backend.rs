//! Event-driven backend over the `notify` crate (inotify on Linux, kqueue
//! on BSD/macOS, ReadDirectoryChangesW on Windows) — the same dependency
//! the config hot-reloader already uses, reused here instead of reaching
//! for a second file-watching crate.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};

use notify::{EventKind as NotifyEventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::errors::MonitorError;
use crate::monitor::{DirectoryMonitor, Event, EventKind};

pub struct NotifyMonitor {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<notify::Event>>,
}

impl NotifyMonitor {
    pub fn new(dir: PathBuf) -> Result<Self, MonitorError> {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        Ok(NotifyMonitor { dir, _watcher: watcher, rx })
    }

    pub fn watched_dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl DirectoryMonitor for NotifyMonitor {
    fn poll_events(&mut self) -> Result<Vec<Event>, MonitorError> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => out.extend(translate(event)),
                Ok(Err(e)) => return Err(MonitorError::Backend(e)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(out)
    }
}

fn translate(event: notify::Event) -> Vec<Event> {
    let kind = match event.kind {
        NotifyEventKind::Create(notify::event::CreateKind::File) => Some(EventKind::FileCreated),
        NotifyEventKind::Create(notify::event::CreateKind::Folder) => Some(EventKind::DirectoryCreated),
        NotifyEventKind::Remove(notify::event::RemoveKind::File) => Some(EventKind::FileDeleted),
        NotifyEventKind::Remove(notify::event::RemoveKind::Folder) => Some(EventKind::DirectoryDeleted),
        NotifyEventKind::Create(_) | NotifyEventKind::Remove(_) => Some(EventKind::Unknown),
        _ => None,
    };
    let Some(kind) = kind else { return Vec::new() };

    event
        .paths
        .into_iter()
        .map(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            Event { name, full_path: path, kind }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn constructs_and_watches_a_directory() {
        let dir = tempdir().unwrap();
        let monitor = NotifyMonitor::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(monitor.watched_dir(), dir.path());
    }

    #[test]
    fn translate_maps_file_creation() {
        let event = notify::Event::new(NotifyEventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/tmp/watched/new.log"));
        let events = translate(event);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::FileCreated);
        assert_eq!(events[0].name, "new.log");
    }
}
