// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use breakglass_k8s::K8sError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
	/// The store settings cannot work as configured.
	#[error("store configuration error: {0}")]
	Config(String),

	#[error("failed to decode token: {0}")]
	TokenDecode(String),

	#[error("token not found in store '{store}' under '{reference}'")]
	NotFound { store: String, reference: String },

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("decryption failed: {0}")]
	Decryption(String),

	#[error("object storage error: {0}")]
	ObjectStorage(String),

	#[error(transparent)]
	K8s(#[from] K8sError),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl StoreError {
	pub fn is_config_error(&self) -> bool {
		matches!(self, StoreError::Config(_))
	}
}

impl From<object_store::Error> for StoreError {
	fn from(err: object_store::Error) -> Self {
		StoreError::ObjectStorage(err.to_string())
	}
}
