// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use breakglass_api::{BearerToken, BreakGlassCredential, StoreBackend, StoreConfig};
use breakglass_k8s::K8sClient;

use crate::error::StoreResult;
use crate::log::LogStore;
use crate::object_storage::ObjectStorage;
use crate::s3::S3Store;
use crate::secret::SecretStore;

/// Collaborators handed to stores at construction.
#[derive(Clone)]
pub struct StoreDeps {
	pub k8s: Arc<dyn K8sClient>,
	pub object_storage: Arc<dyn ObjectStorage>,
}

/// A configured token store.
#[derive(Clone)]
pub enum TokenStore {
	Secret(SecretStore),
	Log(LogStore),
	S3(S3Store),
}

impl TokenStore {
	pub fn from_config(config: &StoreConfig, deps: &StoreDeps) -> StoreResult<Self> {
		Ok(match &config.backend {
			StoreBackend::Secret(_) => {
				TokenStore::Secret(SecretStore::new(&config.name, deps.k8s.clone()))
			}
			StoreBackend::Log(settings) => {
				TokenStore::Log(LogStore::new(&config.name, settings.clone()))
			}
			StoreBackend::S3(settings) => TokenStore::S3(S3Store::new(
				&config.name,
				settings.clone(),
				deps.object_storage.clone(),
			)?),
		})
	}

	/// Persist a token copy and return the store-defined reference.
	pub async fn store_token(
		&self,
		credential: &BreakGlassCredential,
		token: &BearerToken,
	) -> StoreResult<String> {
		match self {
			TokenStore::Secret(store) => store.store_token(credential, token).await,
			TokenStore::Log(store) => Ok(store.store_token(credential, token)),
			TokenStore::S3(store) => store.store_token(credential, token).await,
		}
	}

	/// Read a token copy back. `Ok(None)` means this store cannot be read.
	pub async fn retrieve_token(
		&self,
		credential: &BreakGlassCredential,
		reference: &str,
	) -> StoreResult<Option<BearerToken>> {
		match self {
			TokenStore::Secret(store) => store.retrieve_token(credential, reference).await.map(Some),
			TokenStore::Log(_) | TokenStore::S3(_) => Ok(None),
		}
	}
}
