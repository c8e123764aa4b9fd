use thiserror::Error;

/// Errors a single `Fetcher::fetch` call can return. All are recoverable from the
/// caller's perspective — the Manager retries with backoff and eventually gives up.
#[derive(Error, Debug)]
pub enum FetchError {
	#[error("network error fetching source: {0}")]
	Network(#[from] reqwest::Error),
	#[error("source returned status {status}")]
	Http { status: u16 },
	#[error("failed to parse source body: {0}")]
	Parse(String),
}

/// Errors loading the configuration file. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse config file {path}: {source}")]
	Parse {
		path: String,
		#[source]
		source: serde_yaml::Error,
	},
}

/// Errors persisting or loading an Inventory snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
	#[error("failed to read snapshot {path}: {source}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to write snapshot {path}: {source}")]
	Write {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to (de)serialize snapshot: {0}")]
	Serde(#[from] serde_json::Error),
}
