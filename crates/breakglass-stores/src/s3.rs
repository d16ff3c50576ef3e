// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use breakglass_api::{BearerToken, BreakGlassCredential, S3StoreSettings};
use tracing::{info, instrument};

use crate::encryption::encrypt_for_recipients;
use crate::error::{StoreError, StoreResult};
use crate::object_key::render_object_key;
use crate::object_storage::ObjectStorage;

/// Uploads tokens to an S3-compatible bucket, optionally encrypted.
#[derive(Clone)]
pub struct S3Store {
	name: String,
	settings: S3StoreSettings,
	storage: Arc<dyn ObjectStorage>,
}

impl S3Store {
	pub fn new(
		name: impl Into<String>,
		settings: S3StoreSettings,
		storage: Arc<dyn ObjectStorage>,
	) -> StoreResult<Self> {
		if settings.encryption.encrypt && settings.encryption.pgp_keys.is_empty() {
			return Err(StoreError::Config(
				"encryption is enabled but no PGP public keys are configured".to_string(),
			));
		}
		Ok(Self {
			name: name.into(),
			settings,
			storage,
		})
	}

	/// Upload the token and return the object key.
	#[instrument(skip_all, fields(store = %self.name, bucket = %self.settings.s3.bucket))]
	pub async fn store_token(
		&self,
		credential: &BreakGlassCredential,
		token: &BearerToken,
	) -> StoreResult<String> {
		let key = render_object_key(
			self.settings.object_key_template.as_deref(),
			credential,
			&self.settings.object_key_template_context,
		)?;

		let body = if self.settings.encryption.encrypt {
			encrypt_for_recipients(token.expose().as_bytes(), &self.settings.encryption.pgp_keys)?
		} else {
			token.expose().as_bytes().to_vec()
		};

		let stored = self.storage.put(&self.settings.s3, &key, body).await?;
		info!(
			key = %stored,
			encrypted = self.settings.encryption.encrypt,
			"Token uploaded"
		);
		Ok(stored)
	}
}
