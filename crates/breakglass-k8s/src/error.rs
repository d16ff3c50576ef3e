// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("{kind} not found: {name}")]
	NotFound { kind: &'static str, name: String },

	#[error("invalid object: {message}")]
	InvalidObject { message: String },

	#[error("TokenRequest failed: {message}")]
	TokenRequestFailed { message: String },

	#[error("TokenReview API error: {message}")]
	TokenReviewError { message: String },
}

impl K8sError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::NotFound { .. })
	}

	pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
		K8sError::NotFound {
			kind,
			name: name.into(),
		}
	}

	/// Map a kube error, turning a 404 into [`K8sError::NotFound`].
	pub(crate) fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
		match err {
			kube::Error::Api(resp) if resp.code == 404 => K8sError::not_found(kind, name),
			other => other.into(),
		}
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}
