// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Offline recovery of tokens written by an encrypting s3 store.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use breakglass_stores::{decrypt_payload, parse_secret_key};
use zeroize::Zeroizing;

/// Decrypt a payload file (or stdin) and write the token to stdout.
pub fn run(secret_key: &Path, passphrase: &str, input: Option<&Path>) -> Result<()> {
	let armored = Zeroizing::new(
		fs::read_to_string(secret_key)
			.with_context(|| format!("reading secret key {}", secret_key.display()))?,
	);

	let payload = match input {
		Some(path) => {
			fs::read(path).with_context(|| format!("reading payload {}", path.display()))?
		}
		None => {
			let mut buf = Vec::new();
			std::io::stdin()
				.read_to_end(&mut buf)
				.context("reading payload from stdin")?;
			buf
		}
	};

	let token = decrypt(&armored, passphrase, &payload)?;
	let mut stdout = std::io::stdout().lock();
	stdout.write_all(&token)?;
	stdout.write_all(b"\n")?;
	Ok(())
}

/// Open the first secret in `payload` that the armored PGP secret key can
/// decrypt.
pub fn decrypt(secret_key: &str, passphrase: &str, payload: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
	let key = parse_secret_key(secret_key).context("parsing PGP secret key")?;
	decrypt_payload(payload, &key, passphrase)
		.context("no secret in the payload opens with this key")
}
