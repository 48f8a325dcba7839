//! Agent configuration.
//!
//! Follows `user-agent/src/config/config.rs` exactly: a top-level `Config`
//! struct with nested section structs, a `Config::load` that reads, parses,
//! then runs explicit post-parse validation, and a `ConfigManager` that
//! wraps the parsed config in `Arc<RwLock<Config>>` and hot-reloads it from
//! a `notify` watcher on a named background thread.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, RwLock};
use std::thread;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;

use crate::errors::ConfigError;

/// Full agent configuration, loaded from TOML.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub sources: SourcesConfig,
    pub tail: TailConfig,
    pub state_store: StateStoreConfig,
}

/// Directory-watching / wildcard source settings, `[sources]`.
#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Directories to watch for matching files.
    pub watch_dirs: Vec<PathBuf>,
    /// Shell-style glob the wildcard source matches entries against.
    pub pattern: String,
    /// Upper bound on simultaneously open tail sources.
    pub max_files: usize,
    /// Whether to use the event-driven backend (`notify`) or the polling
    /// fallback. Event-driven by default; polling is for filesystems that
    /// don't support inotify/kqueue (network mounts, some containers).
    #[serde(default = "default_true")]
    pub use_event_driven: bool,
    /// Polling interval in seconds, used only when `use_event_driven` is
    /// false.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    2
}

impl SourcesConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}

/// Buffered tail source settings, `[tail]`.
#[derive(Debug, Deserialize, Clone)]
pub struct TailConfig {
    /// Source character encoding; `None` means "bytes pass through
    /// unconverted" (still validated as UTF-8 on frame extraction).
    pub encoding: Option<String>,
    /// Initial decoded-buffer size, in bytes.
    pub buffer_size: usize,
    /// Ceiling the decoded buffer may grow to before `ErrOverflow`.
    pub max_buffer_size: usize,
}

/// Persistent state store settings, `[state_store]`.
#[derive(Debug, Deserialize, Clone)]
pub struct StateStoreConfig {
    /// Path to the SQLite file, relative to the directory the binary runs
    /// from unless absolute.
    pub path: PathBuf,
    /// Seconds between WAL checkpoints — same knob the teacher's
    /// `DatabaseConfig` exposes, applied here to the state store instead of
    /// the event database.
    pub checkpoint_seconds: u64,
}

impl Config {
    /// Load, parse, and validate a `Config` from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;
        let cfg: Config = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.watch_dirs.is_empty() {
            return Err(ConfigError::Validation("sources.watch_dirs must have at least one entry".into()));
        }
        if self.sources.pattern.is_empty() {
            return Err(ConfigError::Validation("sources.pattern must not be empty".into()));
        }
        if self.sources.max_files == 0 {
            return Err(ConfigError::Validation("sources.max_files must be > 0".into()));
        }
        if self.tail.buffer_size == 0 {
            return Err(ConfigError::Validation("tail.buffer_size must be > 0".into()));
        }
        if self.tail.max_buffer_size < self.tail.buffer_size {
            return Err(ConfigError::Validation(
                "tail.max_buffer_size must be >= tail.buffer_size".into(),
            ));
        }
        if let Some(enc) = &self.tail.encoding {
            if encoding_rs::Encoding::for_label(enc.as_bytes()).is_none() {
                return Err(ConfigError::Validation(format!("tail.encoding `{enc}` is not a known encoding")));
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn from_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(toml)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Manages a live-updating `Config` via a file watcher, exactly the
/// teacher's `ConfigManager` shape.
pub struct ConfigManager {
    inner: Arc<RwLock<Config>>,
    _watcher: RecommendedWatcher,
}

impl ConfigManager {
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Config::load(path)?;
        let shared = Arc::new(RwLock::new(cfg));
        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            tx,
            notify::Config::default().with_poll_interval(std::time::Duration::from_secs(1)),
        )
        .map_err(|e| ConfigError::Validation(format!("watcher error: {e}")))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Validation(format!("watch error: {e}")))?;

        let cfg_path = path.to_path_buf();
        let shared_clone = Arc::clone(&shared);
        thread::Builder::new()
            .name("config_watcher".to_string())
            .spawn(move || {
                for evt in rx {
                    let Ok(event) = evt else { continue };
                    if let EventKind::Modify(_) = event.kind {
                        match Config::load(&cfg_path) {
                            Ok(new_cfg) => {
                                *shared_clone.write().unwrap() = new_cfg;
                                log::info!("config reloaded from {}", cfg_path.display());
                            }
                            Err(e) => log::error!("failed to reload config: {e}"),
                        }
                    }
                }
            })
            .expect("failed to spawn config_watcher thread");

        Ok(ConfigManager { inner: shared, _watcher: watcher })
    }

    /// Snapshot-like read of the current config.
    pub fn get(&self) -> Config {
        self.inner.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [sources]
        watch_dirs = ["/var/log/app"]
        pattern = "*.log"
        max_files = 16
        use_event_driven = true
        poll_interval_secs = 2

        [tail]
        encoding = "utf-8"
        buffer_size = 4096
        max_buffer_size = 1048576

        [state_store]
        path = "tail_state.db"
        checkpoint_seconds = 30
    "#;

    #[test]
    fn parses_full_config() {
        let cfg = Config::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.sources.watch_dirs, vec![PathBuf::from("/var/log/app")]);
        assert_eq!(cfg.sources.pattern, "*.log");
        assert_eq!(cfg.sources.max_files, 16);
        assert_eq!(cfg.tail.buffer_size, 4096);
        assert_eq!(cfg.tail.max_buffer_size, 1_048_576);
        assert_eq!(cfg.state_store.checkpoint_seconds, 30);
    }

    #[test]
    fn rejects_empty_watch_dirs() {
        let toml = r#"
            [sources]
            watch_dirs = []
            pattern = "*.log"
            max_files = 16

            [tail]
            buffer_size = 4096
            max_buffer_size = 4096

            [state_store]
            path = "s.db"
            checkpoint_seconds = 30
        "#;
        assert!(matches!(Config::from_str(toml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_max_buffer_smaller_than_buffer() {
        let toml = r#"
            [sources]
            watch_dirs = ["/var/log"]
            pattern = "*.log"
            max_files = 16

            [tail]
            buffer_size = 4096
            max_buffer_size = 1024

            [state_store]
            path = "s.db"
            checkpoint_seconds = 30
        "#;
        assert!(matches!(Config::from_str(toml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_unknown_encoding() {
        let toml = r#"
            [sources]
            watch_dirs = ["/var/log"]
            pattern = "*.log"
            max_files = 16

            [tail]
            encoding = "not-a-real-encoding"
            buffer_size = 4096
            max_buffer_size = 4096

            [state_store]
            path = "s.db"
            checkpoint_seconds = 30
        "#;
        assert!(matches!(Config::from_str(toml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_section_is_a_parse_error() {
        let toml = r#"
            [tail]
            buffer_size = 4096
            max_buffer_size = 4096
        "#;
        assert!(matches!(Config::from_str(toml), Err(ConfigError::Parse(_))));
    }
}
