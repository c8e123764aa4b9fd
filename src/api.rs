use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::inventory::Inventory;

/// Thin read-only layer over the Inventory, mirroring the `State`-extractor shape the
/// reference codebase uses for its own admin/metrics surfaces.
#[derive(Clone)]
pub struct App {
	inventory: Arc<Inventory>,
}

impl App {
	pub fn new(inventory: Arc<Inventory>) -> Self {
		App { inventory }
	}

	pub fn router(self) -> Router {
		Router::new()
			.route("/health", get(health))
			.route("/api/v1/proxies", get(list_proxies))
			.with_state(self)
	}
}

async fn health() -> &'static str {
	"ok"
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
	limit: Option<usize>,
	format: Option<String>,
}

async fn list_proxies(State(app): State<App>, Query(query): Query<ListQuery>) -> Response {
	let limit = query.limit.unwrap_or(0);
	let proxies = app.inventory.get_sorted(limit);

	match query.format.as_deref() {
		Some("text") => {
			let body = proxies
				.iter()
				.map(|p| p.url.as_str())
				.collect::<Vec<_>>()
				.join("\n");
			(StatusCode::OK, body).into_response()
		},
		Some("json") | None => Json(proxies).into_response(),
		Some(other) => {
			(StatusCode::BAD_REQUEST, format!("unknown format {other:?}, expected json or text")).into_response()
		},
	}
}

#[cfg(test)]
mod tests {
	use std::net::Ipv4Addr;
	use std::time::Duration;

	use axum::body::Body;
	use axum::http::Request;
	use tower::ServiceExt;

	use super::*;
	use crate::proxy::{Protocol, Proxy};

	fn app_with(proxies: Vec<Proxy>) -> Router {
		let inventory = Arc::new(Inventory::new());
		for p in proxies {
			inventory.add(p);
		}
		App::new(inventory).router()
	}

	#[tokio::test]
	async fn health_returns_ok() {
		let router = app_with(vec![]);
		let resp = router
			.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn proxies_default_format_is_json() {
		let mut p = Proxy::new(Protocol::Http, Ipv4Addr::new(1, 2, 3, 4), 8080, "test");
		p.mark_success(Duration::from_millis(10), chrono::Utc::now());
		let router = app_with(vec![p]);

		let resp = router
			.oneshot(Request::builder().uri("/api/v1/proxies").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::OK);
		let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap().to_string();
		assert!(content_type.starts_with("application/json"));
	}

	#[tokio::test]
	async fn proxies_text_format_lists_canonical_urls() {
		let p = Proxy::new(Protocol::Http, Ipv4Addr::new(1, 2, 3, 4), 8080, "test");
		let router = app_with(vec![p]);

		let resp = router
			.oneshot(
				Request::builder()
					.uri("/api/v1/proxies?format=text")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::OK);
		let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
		assert_eq!(&body[..], b"http://1.2.3.4:8080");
	}

	#[tokio::test]
	async fn proxies_rejects_unknown_format() {
		let router = app_with(vec![]);
		let resp = router
			.oneshot(
				Request::builder()
					.uri("/api/v1/proxies?format=xml")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
	}
}
