// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Unverified JWT inspection.
//!
//! Only the `exp` claim is read. The signature is never checked here: whether a
//! token is genuine is decided by the cluster's TokenReview.

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
	exp: i64,
}

/// Read the expiry of a JWT without verifying it.
pub fn token_expiry_unverified(token: &str) -> StoreResult<DateTime<Utc>> {
	let mut validation = Validation::default();
	validation.insecure_disable_signature_validation();
	validation.validate_exp = false;
	validation.validate_aud = false;
	validation.required_spec_claims = ["exp".to_string()].into_iter().collect();

	let data = jsonwebtoken::decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation)
		.map_err(|e| StoreError::TokenDecode(e.to_string()))?;

	DateTime::from_timestamp(data.claims.exp, 0)
		.ok_or_else(|| StoreError::TokenDecode(format!("exp {} out of range", data.claims.exp)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use jsonwebtoken::{encode, EncodingKey, Header};
	use serde::Serialize;

	#[derive(Serialize)]
	struct Claims {
		sub: &'static str,
		aud: Vec<&'static str>,
		#[serde(skip_serializing_if = "Option::is_none")]
		exp: Option<i64>,
	}

	fn token(exp: Option<i64>) -> String {
		encode(
			&Header::default(),
			&Claims {
				sub: "system:serviceaccount:ops:admin",
				aud: vec!["https://kubernetes.default.svc"],
				exp,
			},
			&EncodingKey::from_secret(b"someone else's key"),
		)
		.unwrap()
	}

	#[test]
	fn reads_exp_without_checking_signature() {
		let expiry = token_expiry_unverified(&token(Some(1_700_000_000))).unwrap();
		assert_eq!(expiry.timestamp(), 1_700_000_000);
	}

	#[test]
	fn expired_tokens_still_decode() {
		let expiry = token_expiry_unverified(&token(Some(1))).unwrap();
		assert_eq!(expiry.timestamp(), 1);
	}

	#[test]
	fn missing_exp_is_an_error() {
		let err = token_expiry_unverified(&token(None)).unwrap_err();
		assert!(matches!(err, StoreError::TokenDecode(_)));
	}

	#[test]
	fn non_jwt_is_an_error() {
		assert!(token_expiry_unverified("opaque-token").is_err());
	}
}
