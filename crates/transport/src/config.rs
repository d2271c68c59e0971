//! Connection settings.
//!
//! Every field has a default, so a config file only needs the keys it wants
//! to change. Files may be TOML, JSON or YAML, picked by extension.
//!
//! # Example
//!
//! ```no_run
//! use transport::config::TransportConfig;
//!
//! let config = TransportConfig::load_from_file("conf/client.toml")?;
//! config.init_logging()?;
//! println!("pool size: {}", config.pool_size);
//! # Ok::<(), transport::config::ConfigError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use resp::RespVersion;
use serde::Deserialize;
use serde::Serialize;
use telemetry::TelemetryError;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("Failed to read configuration file '{path}': {source}")]
	Io {
		source: std::io::Error,
		path: String,
	},

	#[error("Failed to parse TOML configuration: {0}")]
	TomlParse(#[from] toml::de::Error),

	#[error("Failed to parse JSON configuration: {0}")]
	JsonParse(#[from] serde_json::Error),

	#[error("Failed to parse YAML configuration: {0}")]
	YamlParse(#[from] serde_yaml::Error),

	#[error("Unsupported configuration format: {0}")]
	UnsupportedFormat(String),

	#[error("Configuration file has no extension")]
	NoExtension,

	#[error("Invalid value for '{field}': {reason}")]
	Invalid {
		field: &'static str,
		reason: String,
	},

	#[error(transparent)]
	Telemetry(#[from] TelemetryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
	Resp2,
	#[default]
	Resp3,
}

impl From<Protocol> for RespVersion {
	fn from(p: Protocol) -> Self {
		match p {
			Protocol::Resp2 => RespVersion::Resp2,
			Protocol::Resp3 => RespVersion::Resp3,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
	/// Most connections a pool keeps open at once.
	pub pool_size: usize,
	/// Size of each receive segment.
	pub segment_size: usize,
	/// Free tail space requested before each socket read.
	pub min_read: usize,
	/// Wire version used when encoding requests.
	pub protocol: Protocol,
	/// How long `rent` waits for a free connection. 0 waits forever.
	pub rent_timeout_ms: u64,
	/// How long a pipelined caller waits for its reply. 0 waits forever.
	pub reply_timeout_ms: u64,
	pub log_level: String,
}

impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			pool_size: 8,
			segment_size: resp::DEFAULT_SEGMENT_SIZE,
			min_read: 1024,
			protocol: Protocol::Resp3,
			rent_timeout_ms: 0,
			reply_timeout_ms: 0,
			log_level: "info".into(),
		}
	}
}

impl TransportConfig {
	pub fn version(&self) -> RespVersion {
		self.protocol.into()
	}

	pub fn rent_timeout(&self) -> Option<Duration> {
		non_zero_millis(self.rent_timeout_ms)
	}

	pub fn reply_timeout(&self) -> Option<Duration> {
		non_zero_millis(self.reply_timeout_ms)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.pool_size == 0 {
			return Err(ConfigError::Invalid {
				field: "pool_size",
				reason: "must be at least 1".into(),
			});
		}
		if self.segment_size == 0 {
			return Err(ConfigError::Invalid {
				field: "segment_size",
				reason: "must be at least 1".into(),
			});
		}
		if self.min_read == 0 || self.min_read > self.segment_size {
			return Err(ConfigError::Invalid {
				field: "min_read",
				reason: format!("must be between 1 and segment_size ({})", self.segment_size),
			});
		}
		telemetry::logger::parse_filter(&self.log_level)?;
		Ok(())
	}

	/// Install the process logger at `log_level`.
	pub fn init_logging(&self) -> Result<(), ConfigError> {
		telemetry::init(&self.log_level)?;
		Ok(())
	}

	/// Load and validate a config file.
	pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let path_ref = path.as_ref();
		let content = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
			path: path_ref.display().to_string(),
			source,
		})?;

		let extension = path_ref
			.extension()
			.and_then(|ext| ext.to_str())
			.ok_or(ConfigError::NoExtension)?;

		let config: TransportConfig = match extension.to_lowercase().as_str() {
			"toml" => toml::from_str(&content)?,
			"json" => serde_json::from_str(&content)?,
			"yaml" | "yml" => serde_yaml::from_str(&content)?,
			_ => return Err(ConfigError::UnsupportedFormat(extension.to_string())),
		};
		config.validate()?;
		Ok(config)
	}
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
	(ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	fn write_config(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
		let dir = tempfile::tempdir().unwrap();
		let file_path = dir.path().join(name);
		std::fs::write(&file_path, content).unwrap();
		(dir, file_path)
	}

	#[test]
	fn test_defaults() {
		let config = TransportConfig::default();
		assert_eq!(config.version(), RespVersion::Resp3);
		assert_eq!(config.segment_size, 16 * 1024);
		assert_eq!(config.rent_timeout(), None);
		assert_eq!(config.reply_timeout(), None);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_parse_toml() {
		let (_dir, path) = write_config(
			"client.toml",
			r#"
pool_size = 4
protocol = "resp2"
reply_timeout_ms = 250
log_level = "debug"
"#,
		);
		let config = TransportConfig::load_from_file(&path).unwrap();
		assert_eq!(config.pool_size, 4);
		assert_eq!(config.version(), RespVersion::Resp2);
		assert_eq!(config.reply_timeout(), Some(Duration::from_millis(250)));
		assert_eq!(config.log_level, "debug");
		// untouched keys keep their defaults
		assert_eq!(config.min_read, 1024);
	}

	#[test]
	fn test_parse_json() {
		let (_dir, path) = write_config(
			"client.json",
			r#"{ "pool_size": 2, "segment_size": 4096, "min_read": 512, "rent_timeout_ms": 10 }"#,
		);
		let config = TransportConfig::load_from_file(&path).unwrap();
		assert_eq!(config.pool_size, 2);
		assert_eq!(config.segment_size, 4096);
		assert_eq!(config.rent_timeout(), Some(Duration::from_millis(10)));
	}

	#[test]
	fn test_parse_yaml() {
		let (_dir, path) = write_config(
			"client.yml",
			"pool_size: 16\nprotocol: resp3\nlog_level: \"warn,transport=trace\"\n",
		);
		let config = TransportConfig::load_from_file(&path).unwrap();
		assert_eq!(config.pool_size, 16);
		assert_eq!(config.log_level, "warn,transport=trace");
	}

	#[rstest]
	#[case("client.ini", "pool_size=1")]
	#[case("client", "pool_size = 1")]
	fn test_rejects_unknown_format(#[case] name: &str, #[case] content: &str) {
		let (_dir, path) = write_config(name, content);
		let err = TransportConfig::load_from_file(&path).unwrap_err();
		assert!(matches!(
			err,
			ConfigError::UnsupportedFormat(_) | ConfigError::NoExtension
		));
	}

	#[rstest]
	#[case("pool_size = 0", "pool_size")]
	#[case("segment_size = 64\nmin_read = 128", "min_read")]
	#[case("min_read = 0", "min_read")]
	fn test_rejects_invalid_values(#[case] content: &str, #[case] field: &str) {
		let (_dir, path) = write_config("client.toml", content);
		match TransportConfig::load_from_file(&path) {
			Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
			other => panic!("expected invalid {}, got {:?}", field, other),
		}
	}

	#[test]
	fn test_rejects_bad_log_level() {
		let (_dir, path) = write_config("client.toml", "log_level = \"loud\"");
		assert!(matches!(
			TransportConfig::load_from_file(&path),
			Err(ConfigError::Telemetry(TelemetryError::InvalidLogLevel(_)))
		));
	}

	#[test]
	fn test_missing_file() {
		let err = TransportConfig::load_from_file("/nonexistent/client.toml").unwrap_err();
		assert!(matches!(err, ConfigError::Io { .. }));
	}
}
