// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Outcome of checking a stored token with the cluster's authenticator.

use k8s_openapi::api::authentication::v1::TokenReviewStatus;

/// Whether the API server still accepts a token, and why not when it doesn't.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReviewResult {
	pub authenticated: bool,
	/// Authenticator message for a rejected token.
	pub error: Option<String>,
}

impl TokenReviewResult {
	pub fn authenticated() -> Self {
		Self {
			authenticated: true,
			error: None,
		}
	}

	pub fn unauthenticated(error: Option<String>) -> Self {
		Self {
			authenticated: false,
			error,
		}
	}

	/// Interpret the status of a created TokenReview. A missing status or a
	/// missing `authenticated` flag counts as rejected.
	pub fn from_status(status: Option<TokenReviewStatus>) -> Self {
		match status {
			Some(TokenReviewStatus {
				authenticated: Some(true),
				..
			}) => Self::authenticated(),
			Some(status) => Self::unauthenticated(status.error),
			None => Self::unauthenticated(Some("no status in TokenReview response".to_string())),
		}
	}

	/// The reason to report for a failed review.
	pub fn failure_reason(&self) -> String {
		self
			.error
			.clone()
			.filter(|e| !e.is_empty())
			.unwrap_or_else(|| "token not authenticated".to_string())
	}
}
