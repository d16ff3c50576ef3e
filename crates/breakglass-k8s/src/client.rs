// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use breakglass_api::{BreakGlassCredential, BreakGlassCredentialStatus};

use crate::error::K8sError;
use crate::token_review::TokenReviewResult;
use crate::types::{IssuedToken, Secret, ServiceAccount};

/// Trait for K8s client operations.
///
/// This abstraction allows for easy mocking in tests while providing
/// a clean interface for the K8s operations needed by the credential
/// controller and the secret store.
#[async_trait]
pub trait K8sClient: Send + Sync {
	/// Get a credential by name. Returns [`K8sError::NotFound`] if it is gone.
	async fn get_credential(&self, namespace: &str, name: &str)
		-> Result<BreakGlassCredential, K8sError>;

	/// Replace the status subresource of a credential.
	async fn patch_credential_status(
		&self,
		namespace: &str,
		name: &str,
		status: &BreakGlassCredentialStatus,
	) -> Result<(), K8sError>;

	/// Replace the finalizer list of a credential.
	async fn set_credential_finalizers(
		&self,
		namespace: &str,
		name: &str,
		finalizers: Vec<String>,
	) -> Result<(), K8sError>;

	/// Create or update the ServiceAccount owned by the credential.
	async fn apply_service_account(
		&self,
		owner: &BreakGlassCredential,
	) -> Result<ServiceAccount, K8sError>;

	/// Mint a token for a ServiceAccount using the TokenRequest API.
	async fn request_token(
		&self,
		namespace: &str,
		service_account: &str,
		expiration: Duration,
	) -> Result<IssuedToken, K8sError>;

	/// Validate a K8s service account token using the TokenReview API, with
	/// the API server's default audiences.
	///
	/// # Returns
	/// * `Ok(TokenReviewResult)` - The result of the token validation
	/// * `Err(K8sError)` - If the API call fails
	async fn validate_token(&self, token: &str) -> Result<TokenReviewResult, K8sError>;

	/// Get a Secret by name. Returns [`K8sError::NotFound`] if absent.
	async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, K8sError>;

	/// Create or update a Secret. Name and namespace are taken from its metadata.
	async fn apply_secret(&self, secret: Secret) -> Result<Secret, K8sError>;
}
