// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use breakglass_api::{ApiResult, BreakGlassCredentialSpec, BreakGlassCredentialStatus, StoreHash};

/// Current settings hash of every configured store, in declaration order.
pub fn hash_snapshot(spec: &BreakGlassCredentialSpec) -> ApiResult<Vec<StoreHash>> {
	spec
		.token_stores
		.iter()
		.map(|store| {
			Ok(StoreHash {
				name: store.name.clone(),
				sha256: store.settings_hash()?,
			})
		})
		.collect()
}

/// Names of configured stores whose settings differ from the snapshot taken at
/// the last mint, including stores missing from it.
pub fn detect_drift(
	spec: &BreakGlassCredentialSpec,
	status: &BreakGlassCredentialStatus,
) -> ApiResult<Vec<String>> {
	let mut drifted = Vec::new();
	for current in hash_snapshot(spec)? {
		if status.store_hash(&current.name) != Some(current.sha256.as_str()) {
			drifted.push(current.name);
		}
	}
	Ok(drifted)
}

#[cfg(test)]
mod tests {
	use super::*;
	use breakglass_api::{LogStoreSettings, SecretStoreSettings, StoreBackend, StoreConfig};
	use std::collections::BTreeMap;

	fn spec(fields: &[(&str, &str)]) -> BreakGlassCredentialSpec {
		BreakGlassCredentialSpec::with_stores(vec![
			StoreConfig::new("vault", StoreBackend::Secret(SecretStoreSettings {})),
			StoreConfig::new(
				"audit",
				StoreBackend::Log(LogStoreSettings {
					additional_fields: fields
						.iter()
						.map(|(k, v)| (k.to_string(), v.to_string()))
						.collect::<BTreeMap<_, _>>(),
				}),
			),
		])
	}

	#[test]
	fn empty_snapshot_drifts_everything() {
		let drifted = detect_drift(&spec(&[]), &BreakGlassCredentialStatus::default()).unwrap();
		assert_eq!(drifted, vec!["vault", "audit"]);
	}

	#[test]
	fn matching_snapshot_has_no_drift() {
		let spec = spec(&[("team", "sre")]);
		let status = BreakGlassCredentialStatus {
			last_token_store_hashes: hash_snapshot(&spec).unwrap(),
			..Default::default()
		};
		assert!(detect_drift(&spec, &status).unwrap().is_empty());
	}

	#[test]
	fn changed_settings_drift_only_that_store() {
		let before = spec(&[]);
		let status = BreakGlassCredentialStatus {
			last_token_store_hashes: hash_snapshot(&before).unwrap(),
			..Default::default()
		};
		let after = spec(&[("ticket", "INC-7")]);
		assert_eq!(detect_drift(&after, &status).unwrap(), vec!["audit"]);
	}

	#[test]
	fn removed_stores_do_not_drift() {
		let before = spec(&[]);
		let status = BreakGlassCredentialStatus {
			last_token_store_hashes: hash_snapshot(&before).unwrap(),
			..Default::default()
		};
		let mut after = before.clone();
		after.token_stores.truncate(1);
		assert!(detect_drift(&after, &status).unwrap().is_empty());
	}
}
