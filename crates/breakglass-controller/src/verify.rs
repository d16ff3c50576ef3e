// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use breakglass_api::{BreakGlassCredential, TokenStatus};
use breakglass_k8s::K8sClient;
use breakglass_stores::TokenStore;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::error::ReconcileResult;

/// Outcome of checking one recorded token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenVerification {
	pub token: TokenStatus,
	pub errors: Vec<String>,
}

impl TokenVerification {
	pub fn is_verified(&self) -> bool {
		self.errors.is_empty()
	}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
	pub verified: Vec<TokenStatus>,
	pub failed: Vec<TokenVerification>,
}

impl VerificationReport {
	/// Latest expiry among verified tokens.
	pub fn valid_until(&self) -> Option<DateTime<Utc>> {
		self.verified.iter().map(|t| t.expiration_timestamp).max()
	}
}

/// Check every recorded token against its expiry, each configured store and
/// the cluster's TokenReview.
///
/// Missing references, failed reads and rejected reviews mark a token as
/// failed. Only errors from the TokenReview API itself abort.
#[instrument(skip_all, fields(tokens = credential.status.as_ref().map_or(0, |s| s.tokens.len())))]
pub async fn verify_tokens(
	credential: &BreakGlassCredential,
	stores: &[(String, TokenStore)],
	k8s: &dyn K8sClient,
	now: DateTime<Utc>,
) -> ReconcileResult<VerificationReport> {
	let mut report = VerificationReport::default();
	let tokens = credential
		.status
		.as_ref()
		.map(|s| s.tokens.as_slice())
		.unwrap_or_default();

	for token in tokens {
		let verification = verify_token(credential, token, stores, k8s, now).await?;
		if verification.is_verified() {
			report.verified.push(verification.token);
		} else {
			info!(
				uid = %verification.token.uid,
				errors = ?verification.errors,
				"Token failed verification"
			);
			report.failed.push(verification);
		}
	}

	Ok(report)
}

async fn verify_token(
	credential: &BreakGlassCredential,
	token: &TokenStatus,
	stores: &[(String, TokenStore)],
	k8s: &dyn K8sClient,
	now: DateTime<Utc>,
) -> ReconcileResult<TokenVerification> {
	let mut errors = Vec::new();

	if token.expiration_timestamp <= now {
		errors.push("expired".to_string());
		return Ok(TokenVerification {
			token: token.clone(),
			errors,
		});
	}

	for (name, store) in stores {
		let Some(reference) = token.reference_for(name) else {
			errors.push(format!("missing reference for store {name}"));
			continue;
		};

		let retrieved = match store.retrieve_token(credential, &reference.reference).await {
			Ok(Some(retrieved)) => retrieved,
			Ok(None) => {
				debug!(store = %name, "Store cannot be read back, skipping");
				continue;
			}
			Err(e) => {
				errors.push(format!("store {name}: {e}"));
				continue;
			}
		};

		let review = k8s.validate_token(retrieved.expose()).await?;
		if !review.authenticated {
			errors.push(format!("store {name}: {}", review.failure_reason()));
		}
	}

	Ok(TokenVerification {
		token: token.clone(),
		errors,
	})
}
