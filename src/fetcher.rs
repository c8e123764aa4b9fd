use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::{SourceConfig, SourceKind};
use crate::error::FetchError;
use crate::proxy::{Protocol, Proxy};

const USER_AGENT: &str =
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

static CANDIDATE_RE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?:(http|https|socks5|socks4)://)?(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})[^\d]+(\d{1,5})")
		.expect("candidate regex is valid")
});

/// Retrieves and parses one source's candidate listing. Does not deduplicate or
/// consult the Inventory — that is the Manager's job.
pub struct Fetcher {
	client: reqwest::Client,
}

impl Fetcher {
	pub fn new() -> Self {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(120))
			.build()
			.expect("fetcher http client builds with default TLS config");
		Fetcher { client }
	}

	pub async fn fetch(&self, source: &SourceConfig) -> Result<Vec<Proxy>, FetchError> {
		let resp = self
			.client
			.get(&source.url)
			.header(reqwest::header::USER_AGENT, USER_AGENT)
			.send()
			.await?;

		let status = resp.status();
		if !status.is_success() {
			return Err(FetchError::Http {
				status: status.as_u16(),
			});
		}

		let body = resp.text().await?;

		match source.kind {
			SourceKind::Text => Ok(parse_text(&body, &source.url)),
			SourceKind::Json => parse_json(&body, &source.url),
		}
	}
}

impl Default for Fetcher {
	fn default() -> Self {
		Fetcher::new()
	}
}

fn parse_text(body: &str, source_url: &str) -> Vec<Proxy> {
	let mut out = Vec::new();
	for caps in CANDIDATE_RE.captures_iter(body) {
		let protocol = caps
			.get(1)
			.map(|m| m.as_str())
			.filter(|s| !s.is_empty())
			.unwrap_or("http");
		let Ok(protocol) = Protocol::from_str(protocol) else {
			continue;
		};
		let Ok(ip) = caps[2].parse::<Ipv4Addr>() else {
			continue;
		};
		let Ok(port) = caps[3].parse::<u32>() else {
			continue;
		};
		if port == 0 || port > 65535 {
			continue;
		}
		out.push(Proxy::new(protocol, ip, port as u16, source_url));
	}
	out
}

fn parse_json(body: &str, source_url: &str) -> Result<Vec<Proxy>, FetchError> {
	let value: Value = serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
	let mut out = Vec::new();
	walk_json(&value, source_url, &mut out);
	Ok(out)
}

/// Recursively searches arbitrarily nested JSON for objects that carry `ip`/`ipAddress`
/// plus `port`. This is a heuristic, not a schema: providers shape their feeds wildly
/// differently, so any object lacking those keys is simply descended into instead of
/// being rejected.
fn walk_json(value: &Value, source_url: &str, out: &mut Vec<Proxy>) {
	match value {
		Value::Array(items) => {
			for item in items {
				walk_json(item, source_url, out);
			}
		},
		Value::Object(map) => {
			let ip = map
				.get("ip")
				.or_else(|| map.get("ipAddress"))
				.and_then(Value::as_str)
				.and_then(|s| s.parse::<Ipv4Addr>().ok());

			let port = map.get("port").and_then(|v| match v {
				Value::Number(n) => n.as_u64(),
				Value::String(s) => s.parse::<u64>().ok(),
				_ => None,
			});

			match (ip, port) {
				(Some(ip), Some(port)) if port > 0 && port <= 65535 => {
					let protocol = map
						.get("protocol")
						.and_then(Value::as_str)
						.and_then(|s| Protocol::from_str(s).ok())
						.unwrap_or(Protocol::Http);
					out.push(Proxy::new(protocol, ip, port as u16, source_url));
				},
				_ => {
					for val in map.values() {
						walk_json(val, source_url, out);
					}
				},
			}
		},
		_ => {},
	}
}
