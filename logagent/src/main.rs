//! Entry point: wires the directory monitor, wildcard matcher, and
//! per-file tail sources together, backed by the persistent state store.
//!
//! Structure follows the teacher's `main.rs`: `logger::init_logger()`, then
//! `Shutdown::new()`, then `ConfigManager::new`, then one named worker
//! thread per subsystem, then `thread::park()` on the main thread while
//! workers run. `find_config_file` keeps the teacher's env-var-override
//! pattern, generalized to this agent's own env var name.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use logagent::config::ConfigManager;
use logagent::db::{init_state_db, StateStore};
use logagent::monitor::notify_backend::NotifyMonitor;
use logagent::monitor::poll::PollMonitor;
use logagent::monitor::wildcard::WildcardMatcher;
use logagent::monitor::{DirectoryMonitor, EventKind};
use logagent::shutdown::Shutdown;
use logagent::source::{BufferedTailSource, FetchResult};

const CONFIG_ENV_VAR: &str = "LOGAGENT_CONFIG";

fn find_config_file() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("logagent.toml")))
        .unwrap_or_else(|| PathBuf::from("logagent.toml"))
}

fn main() {
    logagent::logger::init_logger().expect("failed to initialize logger");
    let shutdown = Shutdown::new();

    let config_path = find_config_file();
    let config_manager = ConfigManager::new(&config_path).unwrap_or_else(|e| {
        log::error!("failed to load configuration from {}: {e}", config_path.display());
        std::process::exit(1);
    });
    let cfg = config_manager.get();

    if let Err(e) = logagent::metrics::install(([0, 0, 0, 0], 9898).into()) {
        log::warn!("metrics exporter did not start: {e}");
    }

    let conn = init_state_db(&std::env::current_dir().unwrap_or_default(), &cfg.state_store)
        .expect("failed to open state store database");
    let store = Arc::new(StateStore::new(conn));

    let mut handles = Vec::new();
    for watch_dir in cfg.sources.watch_dirs.clone() {
        let store = Arc::clone(&store);
        let sources_cfg = cfg.sources.clone();
        let tail_cfg = cfg.tail.clone();
        let shutdown = shutdown.handle();

        let handle = thread::Builder::new()
            .name(format!("monitor:{}", watch_dir.display()))
            .spawn(move || {
                run_directory_worker(watch_dir, sources_cfg, tail_cfg, store, shutdown);
            })
            .expect("failed to spawn monitor thread");
        handles.push(handle);
    }

    log::info!(
        "logagent started, watching {} director{} (poll interval {})",
        cfg.sources.watch_dirs.len(),
        if cfg.sources.watch_dirs.len() == 1 { "y" } else { "ies" },
        humantime::format_duration(cfg.sources.poll_interval())
    );

    while !shutdown.requested() {
        thread::park_timeout(Duration::from_millis(500));
    }
    log::info!("shutdown requested, waiting for workers to drain");
    for handle in handles {
        let _ = handle.join();
    }
}

fn run_directory_worker(
    watch_dir: PathBuf,
    sources_cfg: logagent::config::SourcesConfig,
    tail_cfg: logagent::config::TailConfig,
    store: Arc<StateStore>,
    shutdown: logagent::shutdown::ShutdownHandle,
) {
    let mut monitor: Box<dyn DirectoryMonitor> = if sources_cfg.use_event_driven {
        match NotifyMonitor::new(watch_dir.clone()) {
            Ok(m) => Box::new(m),
            Err(e) => {
                log::warn!("{}: event-driven watch failed ({e}), falling back to polling", watch_dir.display());
                Box::new(PollMonitor::new(watch_dir.clone()))
            }
        }
    } else {
        Box::new(PollMonitor::new(watch_dir.clone()))
    };

    let mut matcher = WildcardMatcher::new(sources_cfg.pattern.clone(), sources_cfg.max_files);
    let mut active: std::collections::HashMap<PathBuf, BufferedTailSource> = std::collections::HashMap::new();

    metrics::gauge!(logagent::metrics::DIRECTORIES_WATCHED).increment(1.0);

    while !shutdown.requested() {
        match monitor.poll_events() {
            Ok(events) => {
                for event in events {
                    match event.kind {
                        EventKind::FileCreated if matcher.matches(&event.name) => {
                            if matcher.offer(event.full_path.clone()) {
                                spawn_source(&event.full_path, &tail_cfg, &store, &mut active);
                            }
                        }
                        EventKind::FileDeleted => {
                            if let Some(mut source) = active.remove(&event.full_path) {
                                let _ = source.close(&store);
                                metrics::gauge!(logagent::metrics::ACTIVE_TAIL_SOURCES).set(active.len() as f64);
                            }
                            if let Some(promoted) = matcher.release(&event.full_path) {
                                spawn_source(&promoted, &tail_cfg, &store, &mut active);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => log::error!("{}: monitor error: {e}", watch_dir.display()),
        }

        let mut to_restart = Vec::new();
        for (path, source) in active.iter_mut() {
            match source.fetch() {
                Ok(FetchResult::Frames(frames)) => {
                    metrics::counter!(logagent::metrics::FRAMES_EXTRACTED).increment(frames.len() as u64);
                    for frame in frames {
                        log::debug!("{}: {}", path.display(), frame);
                    }
                    if let Err(e) = source.ack(&store) {
                        log::error!("{}: failed to persist tail state: {e}", path.display());
                    }
                }
                Ok(FetchResult::Again) | Ok(FetchResult::Eof) => {}
                Err(e) => {
                    log::warn!("{}: {} (restarting from last good position)", path.display(), e);
                    to_restart.push(path.clone());
                }
            }
        }
        for path in to_restart {
            if let Some(mut source) = active.remove(&path) {
                let _ = source.close(&store);
            }
            spawn_source(&path, &tail_cfg, &store, &mut active);
        }

        thread::sleep(sources_cfg.poll_interval());
    }

    metrics::gauge!(logagent::metrics::DIRECTORIES_WATCHED).decrement(1.0);
    for (_, mut source) in active {
        let _ = source.close(&store);
    }
}

fn spawn_source(
    path: &PathBuf,
    tail_cfg: &logagent::config::TailConfig,
    store: &StateStore,
    active: &mut std::collections::HashMap<PathBuf, BufferedTailSource>,
) {
    match BufferedTailSource::new(path.clone(), tail_cfg.encoding.as_deref(), tail_cfg.buffer_size, tail_cfg.max_buffer_size) {
        Ok(mut source) => {
            if let Err(e) = source.attach(store) {
                log::error!("{}: failed to attach tail source: {e}", path.display());
                return;
            }
            active.insert(path.clone(), source);
            metrics::gauge!(logagent::metrics::ACTIVE_TAIL_SOURCES).set(active.len() as f64);
        }
        Err(e) => log::error!("{}: failed to create tail source: {e}", path.display()),
    }
}
