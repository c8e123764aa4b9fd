use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The protocols a candidate endpoint can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
	Http,
	Https,
	Socks4,
	Socks5,
}

impl Protocol {
	pub fn as_str(self) -> &'static str {
		match self {
			Protocol::Http => "http",
			Protocol::Https => "https",
			Protocol::Socks4 => "socks4",
			Protocol::Socks5 => "socks5",
		}
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownProtocol;

impl FromStr for Protocol {
	type Err = UnknownProtocol;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"http" => Ok(Protocol::Http),
			"https" => Ok(Protocol::Https),
			"socks4" => Ok(Protocol::Socks4),
			"socks5" => Ok(Protocol::Socks5),
			_ => Err(UnknownProtocol),
		}
	}
}

/// A validated or candidate proxy endpoint.
///
/// `url` is the canonical `scheme://ip:port` form and is the Inventory's primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
	pub url: String,
	pub protocol: Protocol,
	pub ip: Ipv4Addr,
	pub port: u16,
	#[serde(with = "latency_nanos")]
	pub latency: Duration,
	pub last_check: Option<DateTime<Utc>>,
	pub fail_count: u32,
	pub source: String,
}

impl Proxy {
	pub fn new(protocol: Protocol, ip: Ipv4Addr, port: u16, source: impl Into<String>) -> Self {
		let url = canonical_url(protocol, ip, port);
		Proxy {
			url,
			protocol,
			ip,
			port,
			latency: Duration::ZERO,
			last_check: None,
			fail_count: 0,
			source: source.into(),
		}
	}

	/// Records a successful probe: resets `fail_count`, stamps `last_check`, and records latency.
	pub fn mark_success(&mut self, latency: Duration, at: DateTime<Utc>) {
		self.latency = latency;
		self.last_check = Some(at);
		self.fail_count = 0;
	}

	/// Records a failed probe: increments `fail_count` by exactly one.
	pub fn mark_failure(&mut self) {
		self.fail_count += 1;
	}

	/// True once `fail_count` has exceeded the eviction threshold.
	pub fn is_dead(&self) -> bool {
		self.fail_count > 3
	}

	/// Whether this proxy was checked within the last `window`.
	pub fn checked_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
		match self.last_check {
			Some(t) => (now - t).to_std().map(|age| age < window).unwrap_or(true),
			None => false,
		}
	}
}

pub fn canonical_url(protocol: Protocol, ip: Ipv4Addr, port: u16) -> String {
	format!("{protocol}://{ip}:{port}")
}

mod latency_nanos {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_nanos() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let nanos = u64::deserialize(d)?;
		Ok(Duration::from_nanos(nanos))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn canonical_url_is_lowercase_scheme() {
		let url = canonical_url(Protocol::Http, Ipv4Addr::new(1, 2, 3, 4), 8080);
		assert_eq!(url, "http://1.2.3.4:8080");
	}

	#[test]
	fn mark_success_resets_fail_count() {
		let mut p = Proxy::new(Protocol::Http, Ipv4Addr::new(1, 2, 3, 4), 8080, "test");
		p.mark_failure();
		p.mark_failure();
		assert_eq!(p.fail_count, 2);
		p.mark_success(Duration::from_millis(50), Utc::now());
		assert_eq!(p.fail_count, 0);
		assert!(p.last_check.is_some());
	}

	#[test]
	fn is_dead_above_threshold() {
		let mut p = Proxy::new(Protocol::Http, Ipv4Addr::new(1, 2, 3, 4), 8080, "test");
		for _ in 0..3 {
			p.mark_failure();
		}
		assert!(!p.is_dead());
		p.mark_failure();
		assert!(p.is_dead());
	}

	#[test]
	fn protocol_from_str_rejects_unknown() {
		assert_eq!("HTTP".parse::<Protocol>(), Ok(Protocol::Http));
		assert!("wireguard".parse::<Protocol>().is_err());
	}
}
