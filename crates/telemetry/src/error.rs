use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
	#[error("Invalid log level: {0} (expected trace, debug, info, warn or error)")]
	InvalidLogLevel(String),

	#[error("Logger not initialized")]
	NotInitialized,

	#[error("Logger already initialized: {0}")]
	AlreadyInitialized(String),

	#[error("Failed to reload log level: {0}")]
	ReloadFailed(String),
}
