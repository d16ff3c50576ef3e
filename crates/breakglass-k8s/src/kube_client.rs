// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use breakglass_api::{BearerToken, BreakGlassCredential, BreakGlassCredentialStatus};
use k8s_openapi::api::authentication::v1::{
	TokenRequest, TokenRequestSpec, TokenReview, TokenReviewSpec,
};
use kube::{
	api::{Api, Patch, PatchParams, PostParams},
	Client, ResourceExt,
};
use serde_json::json;
use tracing::{debug, instrument};

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::token_review::TokenReviewResult;
use crate::types::{service_account_for, IssuedToken, Secret, ServiceAccount};

/// Production K8s client implementation using the kube crate.
#[derive(Clone)]
pub struct KubeClient {
	client: Client,
	field_manager: String,
}

impl KubeClient {
	/// Create a new KubeClient that auto-discovers cluster configuration.
	///
	/// This will attempt to load config from:
	/// 1. In-cluster service account (when running in K8s)
	/// 2. KUBECONFIG environment variable
	/// 3. ~/.kube/config
	pub async fn new(field_manager: impl Into<String>) -> Result<Self, K8sError> {
		let client = Client::try_default().await?;
		debug!("K8s client initialized");
		Ok(Self::from_client(client, field_manager))
	}

	pub fn from_client(client: Client, field_manager: impl Into<String>) -> Self {
		Self {
			client,
			field_manager: field_manager.into(),
		}
	}

	/// The underlying kube client, for watches.
	pub fn client(&self) -> Client {
		self.client.clone()
	}

	fn apply_params(&self) -> PatchParams {
		PatchParams::apply(&self.field_manager).force()
	}
}

#[async_trait]
impl K8sClient for KubeClient {
	async fn get_credential(
		&self,
		namespace: &str,
		name: &str,
	) -> Result<BreakGlassCredential, K8sError> {
		let api: Api<BreakGlassCredential> = Api::namespaced(self.client.clone(), namespace);
		api
			.get(name)
			.await
			.map_err(|e| K8sError::from_kube(e, "BreakGlassCredential", name))
	}

	#[instrument(skip(self, status), fields(tokens = status.tokens.len()))]
	async fn patch_credential_status(
		&self,
		namespace: &str,
		name: &str,
		status: &BreakGlassCredentialStatus,
	) -> Result<(), K8sError> {
		let api: Api<BreakGlassCredential> = Api::namespaced(self.client.clone(), namespace);
		let patch = json!({ "status": status });
		api
			.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
			.await
			.map_err(|e| K8sError::from_kube(e, "BreakGlassCredential", name))?;
		Ok(())
	}

	#[instrument(skip(self))]
	async fn set_credential_finalizers(
		&self,
		namespace: &str,
		name: &str,
		finalizers: Vec<String>,
	) -> Result<(), K8sError> {
		let api: Api<BreakGlassCredential> = Api::namespaced(self.client.clone(), namespace);
		let patch = json!({ "metadata": { "finalizers": finalizers } });
		api
			.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
			.await
			.map_err(|e| K8sError::from_kube(e, "BreakGlassCredential", name))?;
		Ok(())
	}

	#[instrument(skip(self, owner), fields(name = %owner.name_any()))]
	async fn apply_service_account(
		&self,
		owner: &BreakGlassCredential,
	) -> Result<ServiceAccount, K8sError> {
		let namespace = owner.namespace().unwrap_or_default();
		let name = owner.name_any();
		let desired = service_account_for(owner)?;

		let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &namespace);
		let applied = api
			.patch(&name, &self.apply_params(), &Patch::Apply(&desired))
			.await?;
		Ok(applied)
	}

	#[instrument(skip(self), fields(expiration_seconds = expiration.as_secs()))]
	async fn request_token(
		&self,
		namespace: &str,
		service_account: &str,
		expiration: Duration,
	) -> Result<IssuedToken, K8sError> {
		let request = TokenRequest {
			metadata: Default::default(),
			spec: TokenRequestSpec {
				audiences: Vec::new(),
				bound_object_ref: None,
				expiration_seconds: Some(i64::try_from(expiration.as_secs()).unwrap_or(i64::MAX)),
			},
			status: None,
		};

		let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
		let response = api
			.create_token_request(service_account, &PostParams::default(), &request)
			.await
			.map_err(|e| match K8sError::from_kube(e, "ServiceAccount", service_account) {
				K8sError::ApiError { message } => K8sError::TokenRequestFailed { message },
				other => other,
			})?;

		let status = response.status.ok_or_else(|| K8sError::TokenRequestFailed {
			message: "no status in TokenRequest response".to_string(),
		})?;

		debug!(expires_at = %status.expiration_timestamp.0, "Token issued");

		Ok(IssuedToken {
			token: BearerToken::new(status.token),
			expiration_timestamp: status.expiration_timestamp.0,
		})
	}

	#[instrument(skip_all)]
	async fn validate_token(&self, token: &str) -> Result<TokenReviewResult, K8sError> {
		let token_review = TokenReview {
			metadata: Default::default(),
			spec: TokenReviewSpec {
				audiences: None,
				token: Some(token.to_string()),
			},
			status: None,
		};

		let token_reviews: Api<TokenReview> = Api::all(self.client.clone());
		let response = token_reviews
			.create(&PostParams::default(), &token_review)
			.await
			.map_err(|e| K8sError::TokenReviewError {
				message: e.to_string(),
			})?;

		let result = TokenReviewResult::from_status(response.status);
		debug!(authenticated = result.authenticated, error = ?result.error, "Token reviewed");
		Ok(result)
	}

	async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, K8sError> {
		let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
		secrets
			.get(name)
			.await
			.map_err(|e| K8sError::from_kube(e, "Secret", name))
	}

	#[instrument(skip(self, secret), fields(name = ?secret.metadata.name))]
	async fn apply_secret(&self, secret: Secret) -> Result<Secret, K8sError> {
		let name = secret
			.metadata
			.name
			.clone()
			.ok_or_else(|| K8sError::InvalidObject {
				message: "secret has no name".to_string(),
			})?;
		let namespace = secret.metadata.namespace.clone().unwrap_or_default();

		let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
		let applied = secrets
			.patch(&name, &self.apply_params(), &Patch::Apply(&secret))
			.await?;
		Ok(applied)
	}
}
