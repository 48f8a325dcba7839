//! Logger initialization.
//!
//! The teacher's own manifest declares `fern`, though its `logger.rs` had
//! drifted onto `flexi_logger` without updating the dependency; this wires
//! `fern` back up, keeping the same timestamp/level/file:line/thread format
//! the teacher's `log_format` function produces. Level is read from
//! `LOGAGENT_LOG` (the teacher reads a level string baked into
//! `Logger::try_with_str`; this generalizes that to an environment variable,
//! following the `env_logger`-style convention used across the retrieval
//! pack) and defaults to `info`.

use std::thread;

const LEVEL_ENV_VAR: &str = "LOGAGENT_LOG";
const DEFAULT_LEVEL: log::LevelFilter = log::LevelFilter::Info;

pub fn init_logger() -> Result<(), Box<dyn std::error::Error>> {
    let level = std::env::var(LEVEL_ENV_VAR)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_LEVEL);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{:<5}] [{}:{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.file().unwrap_or("<unknown>"),
                record.line().unwrap_or(0),
                thread::current().name().unwrap_or("<unnamed>"),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
