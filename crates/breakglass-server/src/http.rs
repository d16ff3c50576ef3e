// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Metrics and probe endpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use breakglass_controller::ControllerMetrics;

#[derive(Clone)]
pub struct HttpState {
	metrics: Arc<ControllerMetrics>,
	ready: Arc<AtomicBool>,
}

impl HttpState {
	pub fn new(metrics: Arc<ControllerMetrics>, ready: Arc<AtomicBool>) -> Self {
		Self { metrics, ready }
	}
}

pub fn router(state: HttpState) -> Router {
	Router::new()
		.route("/metrics", get(metrics))
		.route("/healthz", get(healthz))
		.route("/readyz", get(readyz))
		.with_state(state)
}

async fn metrics(State(state): State<HttpState>) -> impl IntoResponse {
	(
		[("content-type", "text/plain; version=0.0.4")],
		state.metrics.encode(),
	)
}

async fn healthz() -> impl IntoResponse {
	(StatusCode::OK, "ok")
}

async fn readyz(State(state): State<HttpState>) -> impl IntoResponse {
	if state.ready.load(Ordering::SeqCst) {
		(StatusCode::OK, "ready")
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, "controller not started")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use tower::ServiceExt;

	fn state() -> (HttpState, Arc<AtomicBool>, Arc<ControllerMetrics>) {
		let metrics = Arc::new(ControllerMetrics::new());
		let ready = Arc::new(AtomicBool::new(false));
		(HttpState::new(metrics.clone(), ready.clone()), ready, metrics)
	}

	async fn get_path(app: Router, path: &str) -> (StatusCode, String) {
		let req = Request::builder().uri(path).body(Body::empty()).unwrap();
		let resp = app.oneshot(req).await.unwrap();
		let status = resp.status();
		let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
		(status, String::from_utf8(body.to_vec()).unwrap())
	}

	#[tokio::test]
	async fn healthz_is_always_ok() {
		let (state, _, _) = state();
		let (status, _) = get_path(router(state), "/healthz").await;
		assert_eq!(status, StatusCode::OK);
	}

	#[tokio::test]
	async fn readyz_follows_controller_state() {
		let (state, ready, _) = state();
		let app = router(state);

		let (status, _) = get_path(app.clone(), "/readyz").await;
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

		ready.store(true, Ordering::SeqCst);
		let (status, _) = get_path(app, "/readyz").await;
		assert_eq!(status, StatusCode::OK);
	}

	#[tokio::test]
	async fn metrics_exposes_controller_series() {
		let (state, _, metrics) = state();
		metrics.record_reconcile(true);
		metrics.inc_minted("ops", "admin");

		let (status, body) = get_path(router(state), "/metrics").await;
		assert_eq!(status, StatusCode::OK);
		assert!(body.contains("breakglass_reconciliations_total{result=\"success\"} 1"));
		assert!(body.contains("breakglass_tokens_minted_total{name=\"admin\",namespace=\"ops\"} 1"));
	}
}
