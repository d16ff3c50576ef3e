// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use breakglass_api::{BearerToken, BreakGlassCredential};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::error::K8sError;

pub use k8s_openapi::api::core::v1::{Secret, ServiceAccount};

/// A token returned by the TokenRequest API.
#[derive(Debug, Clone)]
pub struct IssuedToken {
	pub token: BearerToken,
	pub expiration_timestamp: DateTime<Utc>,
}

/// Controller owner reference pointing at the credential.
///
/// Fails when the credential has not been persisted yet (no uid).
pub fn owner_reference(owner: &BreakGlassCredential) -> Result<OwnerReference, K8sError> {
	owner
		.controller_owner_ref(&())
		.ok_or_else(|| K8sError::InvalidObject {
			message: format!("BreakGlassCredential {} has no uid", owner.name_any()),
		})
}

/// The ServiceAccount backing a credential: same name and namespace, owned by it.
pub fn service_account_for(owner: &BreakGlassCredential) -> Result<ServiceAccount, K8sError> {
	Ok(ServiceAccount {
		metadata: ObjectMeta {
			name: Some(owner.name_any()),
			namespace: owner.namespace(),
			owner_references: Some(vec![owner_reference(owner)?]),
			..Default::default()
		},
		..Default::default()
	})
}
