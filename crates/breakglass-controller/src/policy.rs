// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Renewal policy.
//!
//! A new token is needed when no verified token will outlive the minimum
//! validity window, or when any store's settings drifted since the last mint.
//! Mints are rate limited by the minimum recreate interval.

use std::time::Duration;

use breakglass_api::{duration, BreakGlassCredentialSpec, TokenStatus};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintReason {
	/// No verified token outlives `now + minValidityDurationLeft`.
	NoValidToken,
	/// These stores changed since the last mint.
	Drift(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalDecision {
	/// Enough valid tokens and no drift. Check again after `requeue_after`.
	Healthy { requeue_after: Duration },
	/// A mint is due but the last one was too recent.
	Throttled { remaining: Duration, reason: MintReason },
	Mint { reason: MintReason },
}

/// Verified tokens that stay valid past the minimum validity window.
pub fn tokens_with_validity_left(
	spec: &BreakGlassCredentialSpec,
	verified: &[TokenStatus],
	now: DateTime<Utc>,
) -> usize {
	let threshold = duration::add(now, spec.min_validity_duration_left);
	verified
		.iter()
		.filter(|t| t.expiration_timestamp > threshold)
		.count()
}

pub fn decide(
	spec: &BreakGlassCredentialSpec,
	last_token_creation: Option<DateTime<Utc>>,
	verified: &[TokenStatus],
	drifted: &[String],
	now: DateTime<Utc>,
) -> RenewalDecision {
	let reason = if tokens_with_validity_left(spec, verified, now) == 0 {
		MintReason::NoValidToken
	} else if !drifted.is_empty() {
		MintReason::Drift(drifted.to_vec())
	} else {
		return RenewalDecision::Healthy {
			requeue_after: spec.check_interval,
		};
	};

	let since_last = last_token_creation.map(|last| duration::elapsed(last, now));
	match since_last {
		Some(elapsed) if elapsed < spec.min_recreate_interval => RenewalDecision::Throttled {
			remaining: spec.min_recreate_interval - elapsed,
			reason,
		},
		_ => RenewalDecision::Mint { reason },
	}
}
