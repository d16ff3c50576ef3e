// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for resource-level operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised while validating or hashing a `BreakGlassCredential`.
#[derive(Error, Debug)]
pub enum ApiError {
	#[error("invalid spec: {0}")]
	Validation(String),

	#[error("failed to serialize store settings: {0}")]
	Serialization(#[from] serde_json::Error),
}
