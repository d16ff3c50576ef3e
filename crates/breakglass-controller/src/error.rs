// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use breakglass_api::ApiError;
use breakglass_k8s::K8sError;
use breakglass_stores::StoreError;
use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Error, Debug)]
pub enum ReconcileError {
	#[error(transparent)]
	Spec(#[from] ApiError),

	#[error("store '{store}': {source}")]
	Store {
		store: String,
		#[source]
		source: StoreError,
	},

	#[error(transparent)]
	K8s(#[from] K8sError),

	#[error("credential {0} has no namespace")]
	MissingNamespace(String),
}

impl ReconcileError {
	pub(crate) fn store(store: &str, source: StoreError) -> Self {
		ReconcileError::Store {
			store: store.to_string(),
			source,
		}
	}

	/// Errors that only a spec change can fix.
	pub fn is_config_error(&self) -> bool {
		match self {
			ReconcileError::Spec(_) => true,
			ReconcileError::Store { source, .. } => source.is_config_error(),
			ReconcileError::K8s(_) | ReconcileError::MissingNamespace(_) => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_config_errors() {
		assert!(ReconcileError::Spec(ApiError::Validation("x".into())).is_config_error());
		assert!(ReconcileError::store("s3", StoreError::Config("bad template".into())).is_config_error());
		assert!(!ReconcileError::store("s3", StoreError::ObjectStorage("503".into())).is_config_error());
		assert!(!ReconcileError::K8s(K8sError::ApiError {
			message: "timeout".into()
		})
		.is_config_error());
	}

	#[test]
	fn store_errors_name_the_store() {
		let err = ReconcileError::store("bucket", StoreError::ObjectStorage("denied".into()));
		assert_eq!(err.to_string(), "store 'bucket': object storage error: denied");
	}
}
