use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use proxmgr::api::App;
use proxmgr::config::Config;
use proxmgr::inventory::Inventory;
use proxmgr::manager::Manager;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "proxmgr", about = "Continuously discovers, validates, and serves a live proxy inventory")]
struct Args {
	/// Path to the YAML configuration document.
	#[arg(short, long, default_value = "config.yaml")]
	config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	// Config is loaded before tracing initialises so we can use its log_level as the
	// default directive, but failures here are reported on stderr directly since
	// there is no logger yet.
	let config = match Config::load(&args.config).await {
		Ok(config) => config,
		Err(e) => {
			eprintln!("failed to load config {}: {e}", args.config.display());
			std::process::exit(1);
		},
	};

	init_tracing(&config.app.log_level);

	info!(config = %args.config.display(), "starting proxmgr");

	let inventory = Arc::new(Inventory::new());
	if let Some(path) = &config.app.snapshot_path {
		if let Err(e) = inventory.load(path).await {
			warn!(path = %path.display(), error = %e, "failed to load inventory snapshot, starting empty");
		} else {
			info!(count = inventory.len(), path = %path.display(), "loaded inventory snapshot");
		}
	}

	// The Manager owns the single `CancellationToken` the whole process shuts down
	// under; the query server and the signal watcher below share clones of it instead
	// of each minting their own.
	let manager = Manager::new(config.clone(), inventory.clone());
	let shutdown = manager.cancellation_token();
	let mut loops = manager.start();

	let app = App::new(inventory.clone()).router();
	let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.app.port)).await?;
	info!(port = config.app.port, "query interface listening");

	let graceful_shutdown = shutdown.clone();
	let error_shutdown = shutdown.clone();
	let server = tokio::spawn(async move {
		let result = axum::serve(listener, app)
			.with_graceful_shutdown(async move { graceful_shutdown.cancelled().await })
			.await;
		if let Err(ref e) = result {
			warn!(error = %e, "query interface server exited unexpectedly, triggering shutdown");
			error_shutdown.cancel();
		}
		result
	});

	let signal_shutdown = shutdown.clone();
	tokio::spawn(async move {
		wait_for_shutdown_signal().await;
		info!("shutdown signal received");
		signal_shutdown.cancel();
	});

	shutdown.cancelled().await;
	manager.stop();

	while loops.join_next().await.is_some() {}
	match server.await {
		Ok(Ok(())) => {},
		Ok(Err(e)) => warn!(error = %e, "query interface server error"),
		Err(e) => warn!(error = %e, "query interface task panicked during shutdown"),
	}

	if let Some(path) = &config.app.snapshot_path {
		if let Err(e) = inventory.save(path).await {
			warn!(path = %path.display(), error = %e, "failed to persist inventory snapshot on shutdown");
		} else {
			info!(count = inventory.len(), path = %path.display(), "persisted inventory snapshot");
		}
	}

	info!("proxmgr stopped");
	Ok(())
}

fn init_tracing(default_level: &str) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false).with_writer(std::io::stderr).init();
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
	let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

	tokio::select! {
		_ = sigint.recv() => {},
		_ = sigterm.recv() => {},
	}
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
}
