use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// (De)serializes a `Duration` as a human-readable string (`"30s"`, `"5m"`) the way
/// the reference codebase's own `serdes::serde_dur` module does.
mod serde_dur {
	use duration_str::HumanFormat;
	pub use duration_str::deserialize_duration as deserialize;
	use serde::Serializer;
	use std::time::Duration;

	pub fn serialize<S: Serializer>(t: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&t.human_format())
	}
}

fn default_port() -> u16 {
	8080
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_thread_count() -> usize {
	50
}

fn default_timeout() -> Duration {
	Duration::from_secs(10)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
	#[serde(default = "default_port")]
	pub port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default = "default_thread_count")]
	pub thread_count: usize,
	/// Optional path used to persist/restore the Inventory across restarts. Purely a
	/// convenience — the Inventory is re-populated from sources regardless.
	#[serde(default)]
	pub snapshot_path: Option<PathBuf>,
}

impl Default for AppConfig {
	fn default() -> Self {
		AppConfig {
			port: default_port(),
			log_level: default_log_level(),
			thread_count: default_thread_count(),
			snapshot_path: None,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationConfig {
	pub target_urls: Vec<String>,
	#[serde(default = "default_timeout", with = "serde_dur")]
	pub timeout: Duration,
	#[serde(with = "serde_dur")]
	pub interval: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
	Text,
	Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
	pub url: String,
	#[serde(rename = "type")]
	pub kind: SourceKind,
	#[serde(with = "serde_dur")]
	pub interval: Duration,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub app: AppConfig,
	pub validation: ValidationConfig,
	#[serde(default)]
	pub sources: Vec<SourceConfig>,
}

impl Config {
	pub async fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let path = path.as_ref();
		let raw = tokio::fs::read_to_string(path)
			.await
			.map_err(|source| ConfigError::Read {
				path: path.display().to_string(),
				source,
			})?;
		serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
			path: path.display().to_string(),
			source,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn app_defaults_match_spec() {
		let app = AppConfig::default();
		assert_eq!(app.port, 8080);
		assert_eq!(app.log_level, "info");
		assert_eq!(app.thread_count, 50);
		assert!(app.snapshot_path.is_none());
	}

	#[test]
	fn parses_minimal_document() {
		let yaml = r#"
validation:
  target_urls:
    - "https://example.com"
  interval: "5m"
sources:
  - url: "https://example.com/list.txt"
    type: text
    interval: "1m"
"#;
		let cfg: Config = serde_yaml::from_str(yaml).unwrap();
		assert_eq!(cfg.app.port, 8080);
		assert_eq!(cfg.validation.timeout, Duration::from_secs(10));
		assert_eq!(cfg.validation.interval, Duration::from_secs(300));
		assert_eq!(cfg.sources.len(), 1);
		assert_eq!(cfg.sources[0].kind, SourceKind::Text);
		assert_eq!(cfg.sources[0].interval, Duration::from_secs(60));
	}
}
