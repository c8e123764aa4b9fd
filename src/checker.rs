use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::trace;

use crate::proxy::Proxy;

const USER_AGENT: &str =
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Probes one Proxy through a real dial. Construction is cheap; a fresh
/// `reqwest::Client` is built per probe because each candidate needs its own proxy
/// transport.
pub struct Checker {
	targets: Vec<String>,
	timeout: Duration,
}

impl Checker {
	pub fn new(targets: Vec<String>, timeout: Duration) -> Self {
		Checker { targets, timeout }
	}

	/// Returns true iff `proxy` successfully relayed a GET to at least one configured
	/// target within the timeout. Mutates `proxy.latency` / `last_check` / `fail_count`
	/// in place, matching the single-owner-per-probe invariant the Manager upholds.
	pub async fn check(&self, proxy: &mut Proxy) -> bool {
		if url::Url::parse(&proxy.url).is_err() {
			return false;
		}

		let client = match self.build_client(&proxy.url) {
			Ok(client) => client,
			Err(e) => {
				trace!(url = %proxy.url, error = %e, "failed to build probe client");
				proxy.mark_failure();
				return false;
			},
		};

		for target in &self.targets {
			let start = Instant::now();
			let resp = client
				.get(target)
				.header(reqwest::header::USER_AGENT, USER_AGENT)
				.header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
				.header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
				.send()
				.await;

			let resp = match resp {
				Ok(resp) => resp,
				Err(_) => continue,
			};

			if resp.status() == reqwest::StatusCode::OK {
				proxy.mark_success(start.elapsed(), Utc::now());
				return true;
			}
		}

		proxy.mark_failure();
		false
	}

	/// Builds an HTTP client whose transport dials through `proxy_url`. `http`/`https`
	/// proxies are used as a forward proxy directly; `socks4`/`socks5` dial via a SOCKS
	/// connector over TCP — both schemes share the same dial strategy symmetrically.
	/// Upstream TLS verification is disabled: the probe measures reachability, not trust.
	fn build_client(&self, proxy_url: &str) -> Result<reqwest::Client, reqwest::Error> {
		reqwest::Client::builder()
			.proxy(reqwest::Proxy::all(proxy_url)?)
			.danger_accept_invalid_certs(true)
			.timeout(self.timeout)
			.build()
	}
}

#[cfg(test)]
mod tests {
	use std::net::Ipv4Addr;

	use super::*;
	use crate::proxy::Protocol;

	#[tokio::test]
	async fn check_returns_false_without_mutation_for_malformed_url() {
		let checker = Checker::new(vec!["http://example.invalid".to_string()], Duration::from_secs(1));
		let mut proxy = Proxy::new(Protocol::Http, Ipv4Addr::new(1, 2, 3, 4), 8080, "test");
		proxy.url = "not a url".to_string();

		let ok = checker.check(&mut proxy).await;
		assert!(!ok);
		assert_eq!(proxy.fail_count, 0);
		assert!(proxy.last_check.is_none());
	}

	#[tokio::test]
	async fn check_increments_fail_count_when_every_target_is_unreachable() {
		// Port 0 is never a valid connect target, so the dial fails immediately
		// without needing a real proxy listener.
		let checker = Checker::new(
			vec!["http://127.0.0.1:1".to_string()],
			Duration::from_millis(200),
		);
		let mut proxy = Proxy::new(Protocol::Http, Ipv4Addr::new(127, 0, 0, 1), 9, "test");

		let ok = checker.check(&mut proxy).await;
		assert!(!ok);
		assert_eq!(proxy.fail_count, 1);
	}
}
