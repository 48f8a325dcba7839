//! Ambient observability: a handful of counters/gauges over the `metrics`
//! facade, exported via Prometheus. Installed once from `main`; every other
//! module just calls the free-standing `metrics::counter!`/`gauge!` macros,
//! same as the teacher does for its own scanner/DB metrics.

use metrics_exporter_prometheus::PrometheusBuilder;

pub const BYTES_READ: &str = "logagent_bytes_read_total";
pub const FRAMES_EXTRACTED: &str = "logagent_frames_extracted_total";
pub const DECODE_ERRORS_SKIPPED: &str = "logagent_decode_errors_skipped_total";
pub const DIRECTORIES_WATCHED: &str = "logagent_directories_watched";
pub const ACTIVE_TAIL_SOURCES: &str = "logagent_active_tail_sources";

/// Installs the global Prometheus recorder listening on `addr`. Call once
/// at startup; subsequent calls from worker threads just use the macros.
pub fn install(addr: std::net::SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!(BYTES_READ, "Raw bytes read from tailed files");
    metrics::describe_counter!(FRAMES_EXTRACTED, "Frames extracted from decoded tail-source output");
    metrics::describe_counter!(DECODE_ERRORS_SKIPPED, "Malformed byte sequences skipped during decode");
    metrics::describe_gauge!(DIRECTORIES_WATCHED, "Directories currently under watch");
    metrics::describe_gauge!(ACTIVE_TAIL_SOURCES, "Tail sources currently holding an open file handle");
    Ok(())
}
