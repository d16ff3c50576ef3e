// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconciler runtime settings.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_ERROR_REQUEUE_SECS: u64 = 30;
const DEFAULT_FIELD_MANAGER: &str = "breakglass-controller";

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
	/// Namespace to watch. `None` watches every namespace.
	pub namespace: Option<String>,
	pub error_requeue_secs: u64,
	/// Field manager used for server-side apply.
	pub field_manager: String,
}

impl ControllerConfig {
	pub fn error_requeue(&self) -> Duration {
		Duration::from_secs(self.error_requeue_secs)
	}
}

impl Default for ControllerConfig {
	fn default() -> Self {
		ControllerConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfigLayer {
	#[serde(default)]
	pub namespace: Option<String>,
	#[serde(default, alias = "error_requeue_secs")]
	pub error_requeue_secs: Option<u64>,
	#[serde(default, alias = "field_manager")]
	pub field_manager: Option<String>,
}

impl ControllerConfigLayer {
	pub fn merge(&mut self, other: ControllerConfigLayer) {
		if other.namespace.is_some() {
			self.namespace = other.namespace;
		}
		if other.error_requeue_secs.is_some() {
			self.error_requeue_secs = other.error_requeue_secs;
		}
		if other.field_manager.is_some() {
			self.field_manager = other.field_manager;
		}
	}

	pub fn finalize(self) -> ControllerConfig {
		ControllerConfig {
			namespace: self.namespace.filter(|ns| !ns.trim().is_empty()),
			error_requeue_secs: self
				.error_requeue_secs
				.unwrap_or(DEFAULT_ERROR_REQUEUE_SECS),
			field_manager: self
				.field_manager
				.unwrap_or_else(|| DEFAULT_FIELD_MANAGER.to_string()),
		}
	}
}
