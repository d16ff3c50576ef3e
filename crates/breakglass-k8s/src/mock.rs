// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! An in-memory cluster for tests.
//!
//! [`MockK8sClient`] stores credentials, ServiceAccounts and Secrets in maps,
//! issues HS256 JWTs as its token authority and reviews them against its own
//! clock. Token reviews can be forced to reject tokens, or the TokenReview
//! API itself can be made to error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use breakglass_api::{
	duration, BearerToken, BreakGlassCredential, BreakGlassCredentialStatus, Clock,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::token_review::TokenReviewResult;
use crate::types::{service_account_for, IssuedToken, Secret, ServiceAccount};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
	(namespace.to_string(), name.to_string())
}

#[derive(Debug, Serialize, Deserialize)]
struct MockClaims {
	sub: String,
	iat: i64,
	exp: i64,
	jti: String,
}

#[derive(Default)]
struct MockState {
	credentials: HashMap<Key, BreakGlassCredential>,
	service_accounts: HashMap<Key, ServiceAccount>,
	secrets: HashMap<Key, Secret>,
	review_failure: Option<String>,
	review_api_error: Option<String>,
	issued_tokens: usize,
	reviews: usize,
}

impl MockState {
	/// Remove a credential and everything it owns.
	fn delete_credential(&mut self, k: &Key) {
		let Some(cr) = self.credentials.remove(k) else {
			return;
		};
		let uid = cr.uid();
		let owned_by = |owners: &Option<Vec<OwnerReference>>| {
			owners.iter().flatten().any(|o| Some(&o.uid) == uid.as_ref())
		};
		self
			.service_accounts
			.retain(|_, sa| !owned_by(&sa.metadata.owner_references));
		self
			.secrets
			.retain(|_, s| !owned_by(&s.metadata.owner_references));
	}
}

/// A mock K8s client backed by in-memory state.
pub struct MockK8sClient {
	state: Mutex<MockState>,
	clock: Arc<dyn Clock>,
	signing_key: Vec<u8>,
}

impl MockK8sClient {
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self {
			state: Mutex::new(MockState::default()),
			clock,
			signing_key: uuid::Uuid::new_v4().as_bytes().to_vec(),
		}
	}

	fn state(&self) -> MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Store a credential, assigning a uid and resource version when missing.
	pub fn insert_credential(&self, mut credential: BreakGlassCredential) -> BreakGlassCredential {
		if credential.metadata.uid.is_none() {
			credential.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
		}
		if credential.metadata.namespace.is_none() {
			credential.metadata.namespace = Some("default".to_string());
		}
		let k = key(
			credential.metadata.namespace.as_deref().unwrap_or_default(),
			&credential.name_any(),
		);
		self.state().credentials.insert(k, credential.clone());
		credential
	}

	pub fn credential(&self, namespace: &str, name: &str) -> Option<BreakGlassCredential> {
		self.state().credentials.get(&key(namespace, name)).cloned()
	}

	/// Edit a stored credential in place. Returns false if it does not exist.
	pub fn update_credential(
		&self,
		namespace: &str,
		name: &str,
		edit: impl FnOnce(&mut BreakGlassCredential),
	) -> bool {
		match self.state().credentials.get_mut(&key(namespace, name)) {
			Some(cr) => {
				edit(cr);
				true
			}
			None => false,
		}
	}

	/// Request deletion. A credential without finalizers is removed at once,
	/// otherwise it only gets a deletion timestamp.
	pub fn delete_credential(&self, namespace: &str, name: &str) {
		let now = self.clock.now();
		let k = key(namespace, name);
		let mut state = self.state();
		let remove = match state.credentials.get_mut(&k) {
			Some(cr) => {
				cr.metadata.deletion_timestamp = Some(Time(now));
				cr.finalizers().is_empty()
			}
			None => false,
		};
		if remove {
			state.delete_credential(&k);
		}
	}

	pub fn service_account(&self, namespace: &str, name: &str) -> Option<ServiceAccount> {
		self
			.state()
			.service_accounts
			.get(&key(namespace, name))
			.cloned()
	}

	pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
		self.state().secrets.get(&key(namespace, name)).cloned()
	}

	pub fn secret_names(&self, namespace: &str) -> Vec<String> {
		let mut names: Vec<String> = self
			.state()
			.secrets
			.keys()
			.filter(|(ns, _)| ns == namespace)
			.map(|(_, name)| name.clone())
			.collect();
		names.sort();
		names
	}

	/// Make every TokenReview report unauthenticated with this error, or
	/// restore normal reviews with `None`.
	pub fn fail_token_reviews(&self, error: Option<String>) {
		self.state().review_failure = error;
	}

	/// Make `validate_token` return an API error instead of a review result.
	pub fn break_token_review_api(&self, error: Option<String>) {
		self.state().review_api_error = error;
	}

	pub fn issued_tokens(&self) -> usize {
		self.state().issued_tokens
	}

	pub fn reviews(&self) -> usize {
		self.state().reviews
	}

	/// Issue a token signed by this authority without touching any state.
	pub fn sign_token(&self, subject: &str, lifetime: Duration) -> Result<String, K8sError> {
		let now = self.clock.now();
		let claims = MockClaims {
			sub: subject.to_string(),
			iat: now.timestamp(),
			exp: duration::add(now, lifetime).timestamp(),
			jti: uuid::Uuid::new_v4().to_string(),
		};
		jsonwebtoken::encode(
			&Header::new(Algorithm::HS256),
			&claims,
			&EncodingKey::from_secret(&self.signing_key),
		)
		.map_err(|e| K8sError::TokenRequestFailed {
			message: e.to_string(),
		})
	}

	fn review(&self, token: &str) -> TokenReviewResult {
		let mut validation = Validation::new(Algorithm::HS256);
		validation.validate_exp = false;
		validation.validate_aud = false;

		let claims = match jsonwebtoken::decode::<MockClaims>(
			token,
			&DecodingKey::from_secret(&self.signing_key),
			&validation,
		) {
			Ok(data) => data.claims,
			Err(e) => return TokenReviewResult::unauthenticated(Some(e.to_string())),
		};

		if claims.exp <= self.clock.now().timestamp() {
			return TokenReviewResult::unauthenticated(Some("token has expired".to_string()));
		}

		let parts: Vec<&str> = claims.sub.split(':').collect();
		if let [_, _, namespace, name] = parts.as_slice() {
			if !self
				.state()
				.service_accounts
				.contains_key(&key(namespace, name))
			{
				return TokenReviewResult::unauthenticated(Some(format!(
					"service account {namespace}/{name} has been deleted"
				)));
			}
		}

		TokenReviewResult::authenticated()
	}
}

#[async_trait]
impl K8sClient for MockK8sClient {
	async fn get_credential(
		&self,
		namespace: &str,
		name: &str,
	) -> Result<BreakGlassCredential, K8sError> {
		self
			.credential(namespace, name)
			.ok_or_else(|| K8sError::not_found("BreakGlassCredential", name))
	}

	async fn patch_credential_status(
		&self,
		namespace: &str,
		name: &str,
		status: &BreakGlassCredentialStatus,
	) -> Result<(), K8sError> {
		let mut state = self.state();
		let cr = state
			.credentials
			.get_mut(&key(namespace, name))
			.ok_or_else(|| K8sError::not_found("BreakGlassCredential", name))?;
		cr.status = Some(status.clone());
		Ok(())
	}

	async fn set_credential_finalizers(
		&self,
		namespace: &str,
		name: &str,
		finalizers: Vec<String>,
	) -> Result<(), K8sError> {
		let k = key(namespace, name);
		let mut state = self.state();
		let cr = state
			.credentials
			.get_mut(&k)
			.ok_or_else(|| K8sError::not_found("BreakGlassCredential", name))?;
		let released = finalizers.is_empty() && cr.metadata.deletion_timestamp.is_some();
		cr.metadata.finalizers = Some(finalizers);
		if released {
			state.delete_credential(&k);
		}
		Ok(())
	}

	async fn apply_service_account(
		&self,
		owner: &BreakGlassCredential,
	) -> Result<ServiceAccount, K8sError> {
		let desired = service_account_for(owner)?;
		let k = key(
			desired.metadata.namespace.as_deref().unwrap_or_default(),
			desired.metadata.name.as_deref().unwrap_or_default(),
		);
		self.state().service_accounts.insert(k, desired.clone());
		Ok(desired)
	}

	async fn request_token(
		&self,
		namespace: &str,
		service_account: &str,
		expiration: Duration,
	) -> Result<IssuedToken, K8sError> {
		if self.service_account(namespace, service_account).is_none() {
			return Err(K8sError::not_found("ServiceAccount", service_account));
		}

		let token = self.sign_token(
			&format!("system:serviceaccount:{namespace}:{service_account}"),
			expiration,
		)?;
		self.state().issued_tokens += 1;

		Ok(IssuedToken {
			token: BearerToken::new(token),
			expiration_timestamp: duration::add(self.clock.now(), expiration),
		})
	}

	async fn validate_token(&self, token: &str) -> Result<TokenReviewResult, K8sError> {
		let (api_error, forced) = {
			let mut state = self.state();
			state.reviews += 1;
			(state.review_api_error.clone(), state.review_failure.clone())
		};
		if let Some(message) = api_error {
			return Err(K8sError::TokenReviewError { message });
		}
		if let Some(error) = forced {
			return Ok(TokenReviewResult::unauthenticated(Some(error)));
		}
		Ok(self.review(token))
	}

	async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, K8sError> {
		self
			.secret(namespace, name)
			.ok_or_else(|| K8sError::not_found("Secret", name))
	}

	async fn apply_secret(&self, mut secret: Secret) -> Result<Secret, K8sError> {
		let name = secret
			.metadata
			.name
			.clone()
			.ok_or_else(|| K8sError::InvalidObject {
				message: "secret has no name".to_string(),
			})?;
		let namespace = secret.metadata.namespace.clone().unwrap_or_default();
		if secret.metadata.creation_timestamp.is_none() {
			secret.metadata.creation_timestamp = Some(Time(self.clock.now()));
		}
		self
			.state()
			.secrets
			.insert(key(&namespace, &name), secret.clone());
		Ok(secret)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use breakglass_api::{
		BreakGlassCredentialSpec, ManualClock, SecretStoreSettings, StoreBackend, StoreConfig,
	};
	use chrono::{TimeDelta, TimeZone, Utc};

	fn setup() -> (Arc<ManualClock>, MockK8sClient, BreakGlassCredential) {
		let clock = Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
		));
		let client = MockK8sClient::new(clock.clone());
		let mut cr = BreakGlassCredential::new(
			"admin",
			BreakGlassCredentialSpec::with_stores(vec![StoreConfig::new(
				"vault",
				StoreBackend::Secret(SecretStoreSettings {}),
			)]),
		);
		cr.metadata.namespace = Some("ops".to_string());
		let cr = client.insert_credential(cr);
		(clock, client, cr)
	}

	#[tokio::test]
	async fn issued_tokens_pass_review_until_expiry() {
		let (clock, client, cr) = setup();
		client.apply_service_account(&cr).await.unwrap();

		let issued = client
			.request_token("ops", "admin", Duration::from_secs(3600))
			.await
			.unwrap();
		assert_eq!(
			issued.expiration_timestamp,
			clock.now() + TimeDelta::hours(1)
		);

		let review = client
			.validate_token(issued.token.expose())
			.await
			.unwrap();
		assert!(review.authenticated);

		clock.advance(TimeDelta::hours(2));
		let review = client
			.validate_token(issued.token.expose())
			.await
			.unwrap();
		assert!(!review.authenticated);
	}

	#[tokio::test]
	async fn request_token_requires_service_account() {
		let (_clock, client, _cr) = setup();
		let err = client
			.request_token("ops", "admin", Duration::from_secs(60))
			.await
			.unwrap_err();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn forced_review_failure() {
		let (_clock, client, cr) = setup();
		client.apply_service_account(&cr).await.unwrap();
		let issued = client
			.request_token("ops", "admin", Duration::from_secs(3600))
			.await
			.unwrap();

		client.fail_token_reviews(Some("revoked".to_string()));
		let review = client
			.validate_token(issued.token.expose())
			.await
			.unwrap();
		assert_eq!(review.error.as_deref(), Some("revoked"));

		client.fail_token_reviews(None);
		let review = client
			.validate_token(issued.token.expose())
			.await
			.unwrap();
		assert!(review.authenticated);
	}

	#[tokio::test]
	async fn broken_review_api_is_an_error() {
		let (_clock, client, cr) = setup();
		client.apply_service_account(&cr).await.unwrap();
		let issued = client
			.request_token("ops", "admin", Duration::from_secs(3600))
			.await
			.unwrap();

		client.break_token_review_api(Some("connection reset".to_string()));
		let err = client
			.validate_token(issued.token.expose())
			.await
			.unwrap_err();
		assert!(matches!(err, K8sError::TokenReviewError { .. }));
		assert_eq!(client.reviews(), 1);

		client.break_token_review_api(None);
		assert!(client
			.validate_token(issued.token.expose())
			.await
			.unwrap()
			.authenticated);
	}

	#[tokio::test]
	async fn garbage_tokens_are_unauthenticated() {
		let (_clock, client, _cr) = setup();
		let review = client.validate_token("not-a-jwt").await.unwrap();
		assert!(!review.authenticated);
		assert!(review.error.is_some());
	}

	#[tokio::test]
	async fn deletion_waits_for_finalizers_and_cascades() {
		let (_clock, client, cr) = setup();
		client.apply_service_account(&cr).await.unwrap();
		client
			.set_credential_finalizers("ops", "admin", vec!["x".to_string()])
			.await
			.unwrap();

		client.delete_credential("ops", "admin");
		let pending = client.credential("ops", "admin").unwrap();
		assert!(pending.metadata.deletion_timestamp.is_some());
		assert!(client.service_account("ops", "admin").is_some());

		client
			.set_credential_finalizers("ops", "admin", Vec::new())
			.await
			.unwrap();
		assert!(client.credential("ops", "admin").is_none());
		assert!(client.service_account("ops", "admin").is_none());
	}
}
