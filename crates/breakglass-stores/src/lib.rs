// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Token stores for break-glass credentials.
//!
//! A [`TokenStore`] is built from a `StoreConfig` and writes copies of a
//! minted token to one backend:
//! - `secret`: a Secret owned by the credential, readable for verification
//! - `log`: a structured log event, write-only
//! - `s3`: an object in S3-compatible storage, optionally OpenPGP-encrypted per recipient

pub mod encryption;
pub mod error;
pub mod jwt;
pub mod log;
pub mod object_key;
pub mod object_storage;
pub mod s3;
pub mod secret;
mod store;

pub use encryption::{
	decrypt_payload, decrypt_secret, encrypt_for_recipients, parse_public_key, parse_secret_key,
	split_public_key_blocks, EncryptedPayload, EncryptedSecret, UnterminatedKeyBlock,
};
pub use error::{StoreError, StoreResult};
pub use jwt::token_expiry_unverified;
pub use log::LogStore;
pub use object_key::render_object_key;
pub use object_storage::{MemoryObjectStorage, ObjectStorage, S3ObjectStorage};
pub use s3::S3Store;
pub use secret::SecretStore;
pub use store::{StoreDeps, TokenStore};
