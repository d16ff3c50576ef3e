// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Prometheus metrics for the credential controller.

use chrono::{DateTime, Utc};
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};

pub struct ControllerMetrics {
	registry: Registry,

	/// Latest expiry among verified tokens, per credential.
	pub verified_valid_until: GaugeVec,
	pub reconciliations: CounterVec,
	pub tokens_minted: CounterVec,
	pub verification_failures: CounterVec,
}

impl Default for ControllerMetrics {
	fn default() -> Self {
		Self::new()
	}
}

impl ControllerMetrics {
	pub fn new() -> Self {
		let registry = Registry::new();

		let verified_valid_until = GaugeVec::new(
			Opts::new(
				"breakglass_verified_tokens_valid_until_seconds",
				"Unix time until which at least one verified break-glass token is valid",
			),
			&["namespace", "name"],
		)
		.expect("Failed to create verified_valid_until gauge");
		registry
			.register(Box::new(verified_valid_until.clone()))
			.expect("Failed to register verified_valid_until gauge");

		let reconciliations = CounterVec::new(
			Opts::new(
				"breakglass_reconciliations_total",
				"Total reconciliations by result",
			),
			&["result"],
		)
		.expect("Failed to create reconciliations counter");
		registry
			.register(Box::new(reconciliations.clone()))
			.expect("Failed to register reconciliations counter");

		let tokens_minted = CounterVec::new(
			Opts::new("breakglass_tokens_minted_total", "Total tokens minted"),
			&["namespace", "name"],
		)
		.expect("Failed to create tokens_minted counter");
		registry
			.register(Box::new(tokens_minted.clone()))
			.expect("Failed to register tokens_minted counter");

		let verification_failures = CounterVec::new(
			Opts::new(
				"breakglass_token_verification_failures_total",
				"Total token records that failed verification",
			),
			&["namespace", "name"],
		)
		.expect("Failed to create verification_failures counter");
		registry
			.register(Box::new(verification_failures.clone()))
			.expect("Failed to register verification_failures counter");

		Self {
			registry,
			verified_valid_until,
			reconciliations,
			tokens_minted,
			verification_failures,
		}
	}

	/// Publish the verified expiry, 0 when nothing verified.
	pub fn set_valid_until(&self, namespace: &str, name: &str, valid_until: Option<DateTime<Utc>>) {
		let seconds = valid_until.map_or(0.0, |t| t.timestamp() as f64);
		self
			.verified_valid_until
			.with_label_values(&[namespace, name])
			.set(seconds);
	}

	/// Current gauge value, `None` when the series does not exist.
	pub fn valid_until(&self, namespace: &str, name: &str) -> Option<f64> {
		let has_label = |m: &prometheus::proto::Metric, key: &str, value: &str| {
			m.get_label()
				.iter()
				.any(|l| l.get_name() == key && l.get_value() == value)
		};
		self
			.registry
			.gather()
			.iter()
			.filter(|family| family.get_name() == "breakglass_verified_tokens_valid_until_seconds")
			.flat_map(|family| family.get_metric())
			.find(|m| has_label(m, "namespace", namespace) && has_label(m, "name", name))
			.map(|m| m.get_gauge().get_value())
	}

	pub fn inc_verification_failures(&self, namespace: &str, name: &str, count: usize) {
		if count > 0 {
			self
				.verification_failures
				.with_label_values(&[namespace, name])
				.inc_by(count as f64);
		}
	}

	pub fn inc_minted(&self, namespace: &str, name: &str) {
		self.tokens_minted.with_label_values(&[namespace, name]).inc();
	}

	pub fn record_reconcile(&self, success: bool) {
		let result = if success { "success" } else { "error" };
		self.reconciliations.with_label_values(&[result]).inc();
	}

	/// Drop every per-credential series.
	pub fn remove_credential(&self, namespace: &str, name: &str) {
		let labels = [namespace, name];
		let _ = self.verified_valid_until.remove_label_values(&labels);
		let _ = self.tokens_minted.remove_label_values(&labels);
		let _ = self.verification_failures.remove_label_values(&labels);
	}

	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		let mut buffer = Vec::new();
		if encoder.encode(&metric_families, &mut buffer).is_err() {
			return String::new();
		}
		String::from_utf8(buffer).unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn valid_until_series_lifecycle() {
		let metrics = ControllerMetrics::new();
		assert_eq!(metrics.valid_until("ops", "admin"), None);

		let at = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
		metrics.set_valid_until("ops", "admin", Some(at));
		assert_eq!(metrics.valid_until("ops", "admin"), Some(at.timestamp() as f64));
		assert!(metrics
			.encode()
			.contains("breakglass_verified_tokens_valid_until_seconds{name=\"admin\",namespace=\"ops\"}"));

		metrics.set_valid_until("ops", "admin", None);
		assert_eq!(metrics.valid_until("ops", "admin"), Some(0.0));

		metrics.remove_credential("ops", "admin");
		assert_eq!(metrics.valid_until("ops", "admin"), None);
		assert!(!metrics.encode().contains("name=\"admin\""));
	}

	#[test]
	fn counters_are_exported() {
		let metrics = ControllerMetrics::new();
		metrics.record_reconcile(true);
		metrics.record_reconcile(false);
		metrics.inc_minted("ops", "admin");
		metrics.inc_verification_failures("ops", "admin", 2);
		metrics.inc_verification_failures("ops", "quiet", 0);

		let text = metrics.encode();
		assert!(text.contains("breakglass_reconciliations_total{result=\"success\"} 1"));
		assert!(text.contains("breakglass_reconciliations_total{result=\"error\"} 1"));
		assert!(text.contains("breakglass_tokens_minted_total{name=\"admin\",namespace=\"ops\"} 1"));
		assert!(text.contains(
			"breakglass_token_verification_failures_total{name=\"admin\",namespace=\"ops\"} 2"
		));
		assert!(!text.contains("name=\"quiet\""));
	}
}
