use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

use crate::TelemetryError;

const VALID_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Timestamps as "[YYYY-MM-DD HH:MM:SS.micros]" in local time
struct LocalMicros;

impl FormatTime for LocalMicros {
	fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
		let now: chrono::DateTime<chrono::Local> = chrono::Local::now();
		write!(w, "{}", now.format("[%Y-%m-%d %H:%M:%S%.6f]"))
	}
}

type ReloadHandle = reload::Handle<EnvFilter, Registry>;

static RELOAD_HANDLE: OnceLock<ReloadHandle> = OnceLock::new();

/// Check a filter string and normalize it to lower case.
///
/// Accepts a bare level (`info`) or a comma separated list of directives,
/// each either a level or `target=level` (`warn,transport::pipeline=trace`).
pub fn parse_filter(filter: &str) -> Result<String, TelemetryError> {
	let normalized = filter.trim().to_lowercase();
	if normalized.is_empty() {
		return Err(TelemetryError::InvalidLogLevel(filter.to_string()));
	}
	for directive in normalized.split(',') {
		let level = match directive.split_once('=') {
			Some((target, level)) if !target.trim().is_empty() => level,
			Some(_) => return Err(TelemetryError::InvalidLogLevel(filter.to_string())),
			None => directive,
		};
		if !VALID_LEVELS.contains(&level.trim()) {
			return Err(TelemetryError::InvalidLogLevel(filter.to_string()));
		}
	}
	Ok(normalized)
}

/// Install the process-wide console logger.
///
/// Records emitted through the `log` facade by the protocol crates are
/// forwarded into the same subscriber. Output carries local timestamps,
/// thread ids and the emitting module, so pipeline read loops and worker
/// tasks can be told apart.
///
/// # Example
///
/// ```no_run
/// telemetry::logger::init("info,transport=debug")?;
/// log::info!("connection established");
/// # Ok::<(), telemetry::TelemetryError>(())
/// ```
///
/// # Errors
///
/// Fails on an unparsable filter, or when a global subscriber is already
/// installed.
pub fn init(level: &str) -> Result<(), TelemetryError> {
	let filter = parse_filter(level)?;
	let env_filter =
		EnvFilter::try_new(&filter).map_err(|e| TelemetryError::InvalidLogLevel(e.to_string()))?;

	let (filter_layer, reload_handle) = reload::Layer::new(env_filter);

	tracing_subscriber::registry()
		.with(filter_layer)
		.with(
			fmt::layer()
				.with_timer(LocalMicros)
				.with_target(true)
				.with_thread_ids(true)
				.with_line_number(false)
				.with_file(false),
		)
		.try_init()
		.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

	let _ = RELOAD_HANDLE.set(reload_handle);
	tracing::debug!(filter = %filter, "logger initialized");
	Ok(())
}

/// Swap the active filter without reinstalling the subscriber.
///
/// ```no_run
/// # use telemetry::logger::reload_log_level;
/// reload_log_level("transport::pipeline=trace")?;
/// # Ok::<(), telemetry::TelemetryError>(())
/// ```
pub fn reload_log_level(level: &str) -> Result<(), TelemetryError> {
	let filter = parse_filter(level)?;
	let handle = RELOAD_HANDLE.get().ok_or(TelemetryError::NotInitialized)?;

	let new_filter =
		EnvFilter::try_new(&filter).map_err(|e| TelemetryError::ReloadFailed(e.to_string()))?;
	handle
		.reload(new_filter)
		.map_err(|e| TelemetryError::ReloadFailed(e.to_string()))?;
	tracing::info!(filter = %filter, "log filter reloaded");
	Ok(())
}
