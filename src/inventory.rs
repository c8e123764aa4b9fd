use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::SnapshotError;
use crate::proxy::Proxy;

/// The process-wide `url -> Proxy` mapping. Reads never block each other; a write
/// takes the exclusive half of the lock for as long as it takes to mutate the map
/// (no `.await` is ever held across the lock, so contention is brief).
#[derive(Default)]
pub struct Inventory {
	proxies: RwLock<HashMap<String, Proxy>>,
}

impl Inventory {
	pub fn new() -> Self {
		Inventory::default()
	}

	/// Upserts by `proxy.url`.
	pub fn add(&self, proxy: Proxy) {
		self.proxies.write().unwrap().insert(proxy.url.clone(), proxy);
	}

	/// Deletes by url; a no-op if absent.
	pub fn remove(&self, url: &str) {
		self.proxies.write().unwrap().remove(url);
	}

	/// Looks up a single entry by url.
	pub fn get(&self, url: &str) -> Option<Proxy> {
		self.proxies.read().unwrap().get(url).cloned()
	}

	/// Snapshot as an unordered list of cloned values.
	pub fn get_all(&self) -> Vec<Proxy> {
		self.proxies.read().unwrap().values().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.proxies.read().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Snapshot sorted ascending by latency, truncated to `limit` when `limit > 0`.
	pub fn get_sorted(&self, limit: usize) -> Vec<Proxy> {
		let mut list = self.get_all();
		list.sort_by(|a, b| a.latency.cmp(&b.latency));
		if limit > 0 && limit < list.len() {
			list.truncate(limit);
		}
		list
	}

	/// Evicts every entry with `fail_count > 3`. Returns the evicted urls.
	pub fn evict_dead(&self) -> Vec<String> {
		let mut guard = self.proxies.write().unwrap();
		let dead: Vec<String> = guard
			.values()
			.filter(|p| p.is_dead())
			.map(|p| p.url.clone())
			.collect();
		for url in &dead {
			guard.remove(url);
		}
		dead
	}

	/// Writes the current Inventory as a JSON array of Proxy records.
	pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
		let path = path.as_ref();
		let list = self.get_all();
		let body = serde_json::to_vec_pretty(&list)?;
		tokio::fs::write(path, body)
			.await
			.map_err(|source| SnapshotError::Write {
				path: path.display().to_string(),
				source,
			})
	}

	/// Merges a JSON array of Proxy records into the current map. A missing file is a no-op.
	pub async fn load(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
		let path = path.as_ref();
		let body = match tokio::fs::read(path).await {
			Ok(body) => body,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(source) => {
				return Err(SnapshotError::Read {
					path: path.display().to_string(),
					source,
				});
			},
		};
		let list: Vec<Proxy> = serde_json::from_slice(&body)?;
		let mut guard = self.proxies.write().unwrap();
		for proxy in list {
			guard.insert(proxy.url.clone(), proxy);
		}
		Ok(())
	}
}
