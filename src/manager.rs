use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::checker::Checker;
use crate::config::{Config, SourceConfig};
use crate::fetcher::Fetcher;
use crate::inventory::Inventory;
use crate::pool::run_worker_pool;
use crate::proxy::Proxy;

/// Candidates checked within this window are skipped by a fresh fetch batch.
const FRESHNESS_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Owns the Config, the shared Inventory, a Fetcher and a Checker, and drives every
/// background loop under one cancellation token.
pub struct Manager {
	config: Config,
	inventory: Arc<Inventory>,
	fetcher: Arc<Fetcher>,
	checker: Arc<Checker>,
	cancel: CancellationToken,
}

impl Manager {
	pub fn new(config: Config, inventory: Arc<Inventory>) -> Self {
		let checker = Arc::new(Checker::new(
			config.validation.target_urls.clone(),
			config.validation.timeout,
		));
		Manager {
			config,
			inventory,
			fetcher: Arc::new(Fetcher::new()),
			checker,
			cancel: CancellationToken::new(),
		}
	}

	/// Returns a clone of the token every loop this Manager spawns is bound to, so the
	/// caller can share it with other process-lifetime tasks (the query server, the
	/// signal watcher) instead of minting a separate one.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	/// Spawns one `fetch_loop` per configured source plus the single `check_loop`,
	/// tracked in a `JoinSet` the caller awaits for clean shutdown.
	pub fn start(&self) -> JoinSet<()> {
		let mut set = JoinSet::new();
		let workers = self.config.app.thread_count;

		for source in self.config.sources.clone() {
			let inventory = self.inventory.clone();
			let fetcher = self.fetcher.clone();
			let checker = self.checker.clone();
			let cancel = self.cancel.clone();
			set.spawn(fetch_loop(source, inventory, fetcher, checker, cancel, workers));
		}

		let inventory = self.inventory.clone();
		let checker = self.checker.clone();
		let cancel = self.cancel.clone();
		let interval = self.config.validation.interval;
		set.spawn(check_loop(inventory, checker, cancel, workers, interval));

		set
	}

	/// Cancels every loop. Callers join the `JoinSet` returned by `start` afterwards.
	pub fn stop(&self) {
		self.cancel.cancel();
	}
}

async fn fetch_loop(
	source: SourceConfig,
	inventory: Arc<Inventory>,
	fetcher: Arc<Fetcher>,
	checker: Arc<Checker>,
	cancel: CancellationToken,
	workers: usize,
) {
	let mut ticker = tokio::time::interval(source.interval);
	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	loop {
		tokio::select! {
			_ = cancel.cancelled() => return,
			_ = ticker.tick() => {
				run_fetch(&source, &inventory, &fetcher, &checker, &cancel, workers).await;
			}
		}
	}
}

/// One ingestion cycle for a single source: retrying fetch, batch dedup, freshness
/// gate, probe, admit. Back-to-back invocations for the same source never overlap
/// because `fetch_loop` awaits this call before its next tick.
async fn run_fetch(
	source: &SourceConfig,
	inventory: &Arc<Inventory>,
	fetcher: &Arc<Fetcher>,
	checker: &Arc<Checker>,
	cancel: &CancellationToken,
	workers: usize,
) {
	let Some(candidates) = fetch_with_retry(source, fetcher, cancel).await else {
		return;
	};

	let to_probe = dedup_and_filter_fresh(candidates, inventory, Utc::now());
	if to_probe.is_empty() {
		return;
	}

	let (input_tx, input_rx) = mpsc::channel(to_probe.len());
	for proxy in to_probe {
		if input_tx.send(proxy).await.is_err() {
			break;
		}
	}
	drop(input_tx);

	let mut output = run_worker_pool(cancel.clone(), input_rx, checker.clone(), workers);
	while let Some(proxy) = output.recv().await {
		inventory.add(proxy);
	}
}

/// Drops intra-batch duplicates (by url) and candidates already in the Inventory
/// whose `last_check` falls within `FRESHNESS_WINDOW`, to avoid re-probing work the
/// revalidation loop has already covered recently. The Inventory is snapshotted once
/// via `get_all` up front, matching the "snapshot the Inventory once" contract instead
/// of issuing one read-lock acquisition per candidate.
fn dedup_and_filter_fresh(candidates: Vec<Proxy>, inventory: &Inventory, now: DateTime<Utc>) -> Vec<Proxy> {
	let existing = inventory.get_all();
	let existing_by_url: HashMap<&str, &Proxy> = existing.iter().map(|p| (p.url.as_str(), p)).collect();

	let mut seen = HashSet::new();
	let mut out = Vec::with_capacity(candidates.len());
	for proxy in candidates {
		if !seen.insert(proxy.url.clone()) {
			continue;
		}
		if let Some(existing) = existing_by_url.get(proxy.url.as_str()) {
			if existing.checked_within(FRESHNESS_WINDOW, now) {
				continue;
			}
		}
		out.push(proxy);
	}
	out
}

/// Retries a fetch up to 4 total attempts (1 initial + 3) with exponential backoff
/// 2s → 4s → 8s, returning `None` once retries are exhausted or cancellation fires.
async fn fetch_with_retry(
	source: &SourceConfig,
	fetcher: &Arc<Fetcher>,
	cancel: &CancellationToken,
) -> Option<Vec<Proxy>> {
	match fetcher.fetch(source).await {
		Ok(proxies) => return Some(proxies),
		Err(e) => warn!(source = %source.url, error = %e, "fetch failed, will retry"),
	}

	let mut backoff = backoff::ExponentialBackoffBuilder::new()
		.with_initial_interval(Duration::from_secs(2))
		.with_multiplier(2.0)
		.with_randomization_factor(0.0)
		.with_max_elapsed_time(None)
		.build();

	for attempt in 1..=3u32 {
		let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(8));
		tokio::select! {
			_ = cancel.cancelled() => return None,
			_ = tokio::time::sleep(delay) => {}
		}

		match fetcher.fetch(source).await {
			Ok(proxies) => return Some(proxies),
			Err(e) if attempt < 3 => {
				warn!(source = %source.url, error = %e, attempt, "fetch failed, will retry");
			},
			Err(e) => {
				error!(source = %source.url, error = %e, "fetch permanently failed after retries");
				return None;
			},
		}
	}

	None
}

async fn check_loop(
	inventory: Arc<Inventory>,
	checker: Arc<Checker>,
	cancel: CancellationToken,
	workers: usize,
	interval: Duration,
) {
	// Unlike `fetch_loop`, which is specified to probe immediately on startup,
	// `check_loop` only revalidates after a full interval has elapsed — `interval_at`
	// with a first deadline of `now + interval` avoids `tokio::time::interval`'s
	// fire-on-creation tick, which would otherwise race a freshly loaded snapshot
	// against the first fetch_loop ingestion.
	let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	loop {
		tokio::select! {
			_ = cancel.cancelled() => return,
			_ = ticker.tick() => {
				run_check(&inventory, &checker, &cancel, workers).await;
			}
		}
	}
}

/// Revalidates the whole current Inventory with bounded concurrency. Unlike the
/// ingestion path, this must observe *every* outcome, not just successes, so that a
/// proxy's `fail_count` keeps accumulating toward eviction even while it keeps
/// failing — so this drives the Checker directly over a `buffer_unordered` stream
/// instead of routing through the success-only Worker Pool. The whole stream is
/// drained (`collect().await`) before the eviction scan runs, which is what makes the
/// join-before-evict ordering in the Manager's contract hold.
async fn run_check(inventory: &Arc<Inventory>, checker: &Arc<Checker>, cancel: &CancellationToken, workers: usize) {
	let snapshot = inventory.get_all();
	if snapshot.is_empty() {
		return;
	}

	let results: Vec<Option<Proxy>> = stream::iter(snapshot)
		.map(|mut proxy| {
			let checker = checker.clone();
			let cancel = cancel.clone();
			async move {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => None,
					_ = checker.check(&mut proxy) => Some(proxy),
				}
			}
		})
		.buffer_unordered(workers.max(1))
		.collect()
		.await;

	for proxy in results.into_iter().flatten() {
		inventory.add(proxy);
	}

	let evicted = inventory.evict_dead();
	if !evicted.is_empty() {
		info!(count = evicted.len(), "evicted dead proxies");
	}
}
