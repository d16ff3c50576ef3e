// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use breakglass_api::{BreakGlassCredential, BreakGlassCredentialStatus, TokenRef, TokenStatus};
use breakglass_k8s::K8sClient;
use breakglass_stores::TokenStore;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{info, instrument};

use crate::drift::hash_snapshot;
use crate::error::{ReconcileError, ReconcileResult};

/// Request a token and write it to every store in declaration order.
///
/// Returns the status to persist. A store failure aborts the mint; copies
/// already written by earlier stores are left in place and not recorded.
#[instrument(skip_all, fields(credential = %credential.name_any()))]
pub async fn mint_token(
	credential: &BreakGlassCredential,
	stores: &[(String, TokenStore)],
	k8s: &dyn K8sClient,
	now: DateTime<Utc>,
) -> ReconcileResult<BreakGlassCredentialStatus> {
	let namespace = credential
		.namespace()
		.ok_or_else(|| ReconcileError::MissingNamespace(credential.name_any()))?;
	let name = credential.name_any();
	let spec = &credential.spec;

	let issued = k8s
		.request_token(&namespace, &name, spec.validity_duration)
		.await?;

	let mut refs = Vec::with_capacity(stores.len());
	for (store_name, store) in stores {
		let reference = store
			.store_token(credential, &issued.token)
			.await
			.map_err(|e| ReconcileError::store(store_name, e))?;
		refs.push(TokenRef {
			store: store_name.clone(),
			reference,
		});
	}

	let token = TokenStatus {
		uid: uuid::Uuid::new_v4().to_string(),
		expiration_timestamp: issued.expiration_timestamp,
		refs,
	};
	info!(
		uid = %token.uid,
		expires_at = %token.expiration_timestamp,
		stores = stores.len(),
		"Minted break-glass token"
	);

	let mut tokens = credential
		.status
		.as_ref()
		.map(|s| s.tokens.clone())
		.unwrap_or_default();
	tokens.push(token);

	Ok(BreakGlassCredentialStatus {
		last_token_creation_timestamp: Some(now),
		tokens: prune_history(tokens, spec.expired_token_history_limit, now),
		last_token_store_hashes: hash_snapshot(spec)?,
	})
}

/// Keep every unexpired token plus the `expired_limit` most recently expired ones.
///
/// Order of the surviving records is preserved.
pub fn prune_history(
	tokens: Vec<TokenStatus>,
	expired_limit: u32,
	now: DateTime<Utc>,
) -> Vec<TokenStatus> {
	let mut expired: Vec<DateTime<Utc>> = tokens
		.iter()
		.map(|t| t.expiration_timestamp)
		.filter(|exp| *exp <= now)
		.collect();
	let limit = usize::try_from(expired_limit).unwrap_or(usize::MAX);
	if expired.len() <= limit {
		return tokens;
	}

	if limit == 0 {
		return tokens
			.into_iter()
			.filter(|t| t.expiration_timestamp > now)
			.collect();
	}

	// Newest first. The limit-th newest expiry is the cutoff; ties at the
	// cutoff fill whatever slots the strictly newer records leave.
	expired.sort_unstable_by(|a, b| b.cmp(a));
	let cutoff = expired[limit - 1];
	let mut ties_left = limit - expired.iter().filter(|exp| **exp > cutoff).count();

	tokens
		.into_iter()
		.filter(|t| {
			let exp = t.expiration_timestamp;
			if exp > now || exp > cutoff {
				return true;
			}
			if exp == cutoff && ties_left > 0 {
				ties_left -= 1;
				return true;
			}
			false
		})
		.collect()
}
