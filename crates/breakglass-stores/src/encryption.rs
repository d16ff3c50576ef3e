// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OpenPGP encryption for tokens written to object storage.
//!
//! The token is encrypted once per recipient key into an armored
//! `PGP MESSAGE`, so any OpenPGP implementation holding the matching secret
//! key (`gpg --decrypt`) can recover it. The uploaded object is
//!
//! ```json
//! {"secrets": [{"data": "-----BEGIN PGP MESSAGE-----\n..."}]}
//! ```
//!
//! with one entry per recipient, in recipient order.

use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::types::PublicKeyTrait;
use pgp::{ArmorOptions, Deserializable, Message, SignedPublicKey, SignedSecretKey};
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::error::{StoreError, StoreResult};

const PUBLIC_KEY_BEGIN: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const PUBLIC_KEY_END: &str = "-----END PGP PUBLIC KEY BLOCK-----";

const CIPHER: SymmetricKeyAlgorithm = SymmetricKeyAlgorithm::AES256;

/// Uploaded payload: one armored message per recipient, in recipient order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
	pub secrets: Vec<EncryptedSecret>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
	pub data: String,
}

/// A public key block started but never ended.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unterminated PGP public key block after {} complete block(s)", parsed.len())]
pub struct UnterminatedKeyBlock {
	/// Blocks that were complete before the dangling one.
	pub parsed: Vec<String>,
}

impl From<UnterminatedKeyBlock> for StoreError {
	fn from(err: UnterminatedKeyBlock) -> Self {
		StoreError::Config(err.to_string())
	}
}

/// Split a string holding one or more concatenated armored PGP public keys
/// into blocks.
///
/// Text between blocks is dropped. Each block keeps its BEGIN and END lines.
pub fn split_public_key_blocks(input: &str) -> Result<Vec<String>, UnterminatedKeyBlock> {
	let mut blocks = Vec::new();
	let mut rest = input;

	while let Some(start) = rest.find(PUBLIC_KEY_BEGIN) {
		let candidate = &rest[start..];
		let Some(end) = candidate.find(PUBLIC_KEY_END) else {
			return Err(UnterminatedKeyBlock { parsed: blocks });
		};
		let end = end + PUBLIC_KEY_END.len();
		blocks.push(candidate[..end].to_string());
		rest = &candidate[end..];
	}

	Ok(blocks)
}

/// Parse and self-verify one armored public key block.
pub fn parse_public_key(block: &str) -> StoreResult<SignedPublicKey> {
	let (key, _headers) = SignedPublicKey::from_string(block)
		.map_err(|e| StoreError::Config(format!("invalid PGP public key: {e}")))?;
	key
		.verify()
		.map_err(|e| StoreError::Config(format!("PGP public key fails self-verification: {e}")))?;
	Ok(key)
}

/// Encrypt `plaintext` once per recipient and serialize the messages as JSON.
///
/// Every entry of `pgp_keys` may contain several concatenated key blocks.
/// At least one key is required.
pub fn encrypt_for_recipients(plaintext: &[u8], pgp_keys: &[String]) -> StoreResult<Vec<u8>> {
	let mut recipients = Vec::new();
	for entry in pgp_keys {
		for block in split_public_key_blocks(entry)? {
			recipients.push(parse_public_key(&block)?);
		}
	}

	if recipients.is_empty() {
		return Err(StoreError::Config(
			"encryption is enabled but no PGP public keys are configured".to_string(),
		));
	}

	let mut rng = rand::thread_rng();
	let secrets = recipients
		.iter()
		.map(|key| encrypt_for_recipient(&mut rng, key, plaintext).map(|data| EncryptedSecret { data }))
		.collect::<StoreResult<Vec<_>>>()?;

	Ok(serde_json::to_vec(&EncryptedPayload { secrets })?)
}

/// Encrypt to the first encryption-capable subkey, or to the primary key when
/// it can encrypt itself.
fn encrypt_for_recipient<R: CryptoRng + Rng>(
	rng: &mut R,
	key: &SignedPublicKey,
	plaintext: &[u8],
) -> StoreResult<String> {
	let message = Message::new_literal_bytes("", plaintext);

	let encrypted = match key.public_subkeys.iter().find(|sub| sub.is_encryption_key()) {
		Some(subkey) => message.encrypt_to_keys_seipdv1(rng, CIPHER, &[subkey]),
		None if key.is_encryption_key() => message.encrypt_to_keys_seipdv1(rng, CIPHER, &[key]),
		None => {
			return Err(StoreError::Config(
				"PGP public key has no encryption-capable key".to_string(),
			))
		}
	}
	.map_err(|e| StoreError::Encryption(format!("token encryption failed: {e}")))?;

	encrypted
		.to_armored_string(ArmorOptions::default())
		.map_err(|e| StoreError::Encryption(format!("armoring failed: {e}")))
}

/// Parse an armored PGP secret key (`gpg --export-secret-keys --armor`).
pub fn parse_secret_key(armored: &str) -> StoreResult<SignedSecretKey> {
	let (key, _headers) = SignedSecretKey::from_string(armored)
		.map_err(|e| StoreError::Decryption(format!("invalid PGP secret key: {e}")))?;
	Ok(key)
}

/// Decrypt one armored message. `passphrase` unlocks a protected secret key
/// and is ignored for an unprotected one.
pub fn decrypt_secret(
	armored: &str,
	key: &SignedSecretKey,
	passphrase: &str,
) -> StoreResult<Zeroizing<Vec<u8>>> {
	let (message, _headers) = Message::from_string(armored)
		.map_err(|e| StoreError::Decryption(format!("invalid PGP message: {e}")))?;

	let (decrypted, _key_ids) = message
		.decrypt(|| passphrase.to_string(), &[key])
		.map_err(|e| StoreError::Decryption(e.to_string()))?;

	let content = decrypted
		.get_content()
		.map_err(|e| StoreError::Decryption(e.to_string()))?
		.ok_or_else(|| StoreError::Decryption("message carries no literal data".to_string()))?;

	Ok(Zeroizing::new(content))
}

/// Try `key` against every secret of a payload and return the first
/// plaintext it opens.
pub fn decrypt_payload(
	payload: &[u8],
	key: &SignedSecretKey,
	passphrase: &str,
) -> StoreResult<Zeroizing<Vec<u8>>> {
	let payload: EncryptedPayload = serde_json::from_slice(payload)?;
	let mut last_error = None;
	for secret in &payload.secrets {
		match decrypt_secret(&secret.data, key, passphrase) {
			Ok(plaintext) => return Ok(plaintext),
			Err(e) => last_error = Some(e),
		}
	}
	Err(last_error.unwrap_or_else(|| StoreError::Decryption("payload has no secrets".to_string())))
}
