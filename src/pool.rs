use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::checker::Checker;
use crate::proxy::Proxy;

/// Runs `checker` over every item received from `input` with `workers` concurrent
/// probe tasks, returning a channel of successfully-validated Proxies. The returned
/// channel closes once every input has been drained (or `cancel` fires) and every
/// worker has exited.
pub fn run_worker_pool(
	cancel: CancellationToken,
	input: mpsc::Receiver<Proxy>,
	checker: Arc<Checker>,
	workers: usize,
) -> mpsc::Receiver<Proxy> {
	let (output_tx, output_rx) = mpsc::channel(workers.max(1) * 4);
	let input = Arc::new(Mutex::new(input));

	tokio::spawn(async move {
		let mut set = JoinSet::new();
		for _ in 0..workers.max(1) {
			let input = input.clone();
			let checker = checker.clone();
			let output_tx = output_tx.clone();
			let cancel = cancel.clone();
			set.spawn(async move {
				loop {
					let next = tokio::select! {
						biased;
						_ = cancel.cancelled() => None,
						next = async {
							let mut guard = input.lock().await;
							guard.recv().await
						} => next,
					};
					let Some(mut proxy) = next else {
						return;
					};
					if checker.check(&mut proxy).await {
						// The receiver may have been dropped if the collector gave up;
						// that just means this result is no longer wanted.
						let _ = output_tx.send(proxy).await;
					}
				}
			});
		}
		while set.join_next().await.is_some() {}
		// output_tx (the last clone held by this task) drops here, closing the channel
		// once every worker has exited.
	});

	output_rx
}

#[cfg(test)]
mod tests {
	use std::net::Ipv4Addr;
	use std::time::Duration;

	use super::*;
	use crate::proxy::Protocol;

	fn unreachable_proxy(n: u8) -> Proxy {
		Proxy::new(Protocol::Http, Ipv4Addr::new(127, 0, 0, n), 9, "test")
	}

	#[tokio::test]
	async fn drains_all_input_and_closes_output_on_completion() {
		let checker = Arc::new(Checker::new(
			vec!["http://127.0.0.1:1".to_string()],
			Duration::from_millis(100),
		));
		let (input_tx, input_rx) = mpsc::channel(16);
		for i in 1..=5u8 {
			input_tx.send(unreachable_proxy(i)).await.unwrap();
		}
		drop(input_tx);

		let cancel = CancellationToken::new();
		let mut output_rx = run_worker_pool(cancel, input_rx, checker, 3);

		// None of these targets are reachable, so nothing should come out, but the
		// channel must still close promptly.
		let mut count = 0;
		while let Some(_p) = output_rx.recv().await {
			count += 1;
		}
		assert_eq!(count, 0);
	}

	#[tokio::test]
	async fn cancellation_stops_workers_promptly() {
		let checker = Arc::new(Checker::new(
			vec!["http://127.0.0.1:1".to_string()],
			Duration::from_secs(30),
		));
		let (input_tx, input_rx) = mpsc::channel(16);
		// Leave the input channel open with nothing sent, simulating slow upstream work.
		let cancel = CancellationToken::new();
		let mut output_rx = run_worker_pool(cancel.clone(), input_rx, checker, 2);

		cancel.cancel();
		let result = tokio::time::timeout(Duration::from_secs(1), output_rx.recv()).await;
		assert!(result.is_ok(), "worker pool did not observe cancellation promptly");
		drop(input_tx);
	}
}
