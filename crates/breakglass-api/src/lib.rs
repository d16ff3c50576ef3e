// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Custom resource types for break-glass credentials.
//!
//! This crate provides:
//! - The `BreakGlassCredential` custom resource (spec, status, store configuration)
//! - Spec validation and per-store configuration hashing
//! - A redacting [`BearerToken`] wrapper and an injectable [`Clock`]

pub mod clock;
pub mod duration;
pub mod error;
pub mod token;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApiError, ApiResult};
pub use token::BearerToken;
pub use types::{
	BreakGlassCredential, BreakGlassCredentialSpec, BreakGlassCredentialStatus, EncryptionSettings,
	LogStoreSettings, S3Connection, S3StoreSettings, SecretStoreSettings, StoreBackend, StoreConfig,
	StoreHash, TokenRef, TokenStatus, FINALIZER, VALID_UNTIL_ANNOTATION,
};
