// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;

use breakglass_api::{BearerToken, BreakGlassCredential, VALID_UNTIL_ANNOTATION};
use breakglass_k8s::{owner_reference, K8sClient, K8sError, Secret};
use chrono::SecondsFormat;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use tracing::{debug, instrument};

use crate::error::{StoreError, StoreResult};
use crate::jwt::token_expiry_unverified;

/// Key of the token inside the Secret data.
pub const TOKEN_KEY: &str = "token";

/// Label linking a Secret back to its credential.
pub const CREDENTIAL_LABEL: &str = "breakglass.dev/credential";

/// Keeps tokens in Secrets owned by the credential, one Secret per token.
#[derive(Clone)]
pub struct SecretStore {
	name: String,
	k8s: Arc<dyn K8sClient>,
}

impl SecretStore {
	pub fn new(name: impl Into<String>, k8s: Arc<dyn K8sClient>) -> Self {
		Self {
			name: name.into(),
			k8s,
		}
	}

	/// Write the token to `<credential>-<exp>` and return the Secret name.
	#[instrument(skip_all, fields(store = %self.name, credential = %credential.name_any()))]
	pub async fn store_token(
		&self,
		credential: &BreakGlassCredential,
		token: &BearerToken,
	) -> StoreResult<String> {
		let expiry = token_expiry_unverified(token.expose())?;
		let secret_name = format!("{}-{}", credential.name_any(), expiry.timestamp());

		let secret = Secret {
			metadata: ObjectMeta {
				name: Some(secret_name.clone()),
				namespace: credential.namespace(),
				owner_references: Some(vec![owner_reference(credential)?]),
				labels: Some(BTreeMap::from([(
					CREDENTIAL_LABEL.to_string(),
					credential.name_any(),
				)])),
				annotations: Some(BTreeMap::from([(
					VALID_UNTIL_ANNOTATION.to_string(),
					expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
				)])),
				..Default::default()
			},
			type_: Some("Opaque".to_string()),
			data: Some(BTreeMap::from([(
				TOKEN_KEY.to_string(),
				ByteString(token.expose().as_bytes().to_vec()),
			)])),
			..Default::default()
		};

		self.k8s.apply_secret(secret).await?;
		debug!(secret = %secret_name, "Token stored in secret");
		Ok(secret_name)
	}

	/// Read a token back from the Secret named `reference`.
	pub async fn retrieve_token(
		&self,
		credential: &BreakGlassCredential,
		reference: &str,
	) -> StoreResult<BearerToken> {
		let namespace = credential.namespace().unwrap_or_default();
		let not_found = || StoreError::NotFound {
			store: self.name.clone(),
			reference: reference.to_string(),
		};

		let secret = match self.k8s.get_secret(&namespace, reference).await {
			Ok(secret) => secret,
			Err(K8sError::NotFound { .. }) => return Err(not_found()),
			Err(e) => return Err(e.into()),
		};

		let bytes = secret
			.data
			.and_then(|mut data| data.remove(TOKEN_KEY))
			.ok_or_else(not_found)?;
		let token = String::from_utf8(bytes.0)
			.map_err(|e| StoreError::TokenDecode(format!("token is not UTF-8: {e}")))?;
		Ok(BearerToken::new(token))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use breakglass_api::{
		BreakGlassCredentialSpec, ManualClock, SecretStoreSettings, StoreBackend, StoreConfig,
	};
	use breakglass_k8s::MockK8sClient;
	use chrono::{TimeZone, Utc};
	use std::time::Duration;

	fn setup() -> (Arc<MockK8sClient>, BreakGlassCredential) {
		let clock = Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
		));
		let k8s = Arc::new(MockK8sClient::new(clock));
		let mut cr = BreakGlassCredential::new(
			"admin",
			BreakGlassCredentialSpec::with_stores(vec![StoreConfig::new(
				"vault",
				StoreBackend::Secret(SecretStoreSettings {}),
			)]),
		);
		cr.metadata.namespace = Some("ops".to_string());
		let cr = k8s.insert_credential(cr);
		(k8s, cr)
	}

	#[tokio::test]
	async fn store_then_retrieve_returns_same_token() {
		let (k8s, cr) = setup();
		let store = SecretStore::new("vault", k8s.clone());
		let token = BearerToken::new(
			k8s.sign_token("system:serviceaccount:ops:admin", Duration::from_secs(3600))
				.unwrap(),
		);

		let reference = store.store_token(&cr, &token).await.unwrap();
		// 2024-03-01T13:00:00Z
		assert_eq!(reference, "admin-1709298000");

		let secret = k8s.secret("ops", &reference).unwrap();
		assert_eq!(
			secret.metadata.annotations.unwrap()[VALID_UNTIL_ANNOTATION],
			"2024-03-01T13:00:00Z"
		);
		assert_eq!(
			secret.metadata.owner_references.unwrap()[0].uid,
			cr.metadata.uid.clone().unwrap()
		);

		let retrieved = store.retrieve_token(&cr, &reference).await.unwrap();
		assert_eq!(retrieved, token);
	}

	#[tokio::test]
	async fn storing_again_overwrites() {
		let (k8s, cr) = setup();
		let store = SecretStore::new("vault", k8s.clone());
		let token = BearerToken::new(
			k8s.sign_token("system:serviceaccount:ops:admin", Duration::from_secs(60))
				.unwrap(),
		);

		let first = store.store_token(&cr, &token).await.unwrap();
		let second = store.store_token(&cr, &token).await.unwrap();
		assert_eq!(first, second);
		assert_eq!(k8s.secret_names("ops"), vec![first]);
	}

	#[tokio::test]
	async fn missing_secret_is_not_found() {
		let (k8s, cr) = setup();
		let store = SecretStore::new("vault", k8s);
		let err = store.retrieve_token(&cr, "admin-1").await.unwrap_err();
		assert!(matches!(err, StoreError::NotFound { .. }));
	}

	#[tokio::test]
	async fn secret_without_token_key_is_not_found() {
		let (k8s, cr) = setup();
		k8s.apply_secret(Secret {
			metadata: ObjectMeta {
				name: Some("admin-2".to_string()),
				namespace: Some("ops".to_string()),
				..Default::default()
			},
			..Default::default()
		})
		.await
		.unwrap();

		let store = SecretStore::new("vault", k8s);
		let err = store.retrieve_token(&cr, "admin-2").await.unwrap_err();
		assert!(matches!(err, StoreError::NotFound { .. }));
	}

	#[tokio::test]
	async fn non_jwt_tokens_are_rejected() {
		let (k8s, cr) = setup();
		let store = SecretStore::new("vault", k8s.clone());
		let err = store
			.store_token(&cr, &BearerToken::new("opaque"))
			.await
			.unwrap_err();
		assert!(matches!(err, StoreError::TokenDecode(_)));
		assert!(k8s.secret_names("ops").is_empty());
	}
}
