// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ApiError, ApiResult};

/// Finalizer that keeps the resource around until its metric series is removed.
pub const FINALIZER: &str = "breakglass.dev/metrics-cleanup";

/// Annotation on secret-store Secrets carrying the token expiry in RFC 3339.
pub const VALID_UNTIL_ANNOTATION: &str = "breakglass.dev/valid-until";

const DEFAULT_VALIDITY: Duration = Duration::from_secs(720 * 3600);
const DEFAULT_MIN_VALIDITY_LEFT: Duration = Duration::from_secs(168 * 3600);
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MIN_RECREATE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_EXPIRED_HISTORY_LIMIT: u32 = 10;

/// Desired state of an emergency credential.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
	group = "breakglass.dev",
	version = "v1",
	kind = "BreakGlassCredential",
	namespaced,
	status = "BreakGlassCredentialStatus",
	shortname = "bgc",
	printcolumn = r#"{"name":"Last Token","type":"date","jsonPath":".status.lastTokenCreationTimestamp"}"#,
	doc = "A service account whose short-lived tokens are kept available in one or more stores"
)]
#[serde(rename_all = "camelCase")]
pub struct BreakGlassCredentialSpec {
	/// Lifetime requested for every minted token.
	#[serde(with = "crate::duration", default = "default_validity")]
	#[schemars(with = "String")]
	pub validity_duration: Duration,

	/// A verified token only counts as healthy while it has at least this much life left.
	#[serde(with = "crate::duration", default = "default_min_validity_left")]
	#[schemars(with = "String")]
	pub min_validity_duration_left: Duration,

	#[serde(with = "crate::duration", default = "default_check_interval")]
	#[schemars(with = "String")]
	pub check_interval: Duration,

	/// Minimum time between two mints, whatever the reason.
	#[serde(with = "crate::duration", default = "default_min_recreate_interval")]
	#[schemars(with = "String")]
	pub min_recreate_interval: Duration,

	/// How many expired token records to keep in status.
	#[serde(default = "default_expired_history_limit")]
	pub expired_token_history_limit: u32,

	pub token_stores: Vec<StoreConfig>,
}

fn default_validity() -> Duration {
	DEFAULT_VALIDITY
}

fn default_min_validity_left() -> Duration {
	DEFAULT_MIN_VALIDITY_LEFT
}

fn default_check_interval() -> Duration {
	DEFAULT_CHECK_INTERVAL
}

fn default_min_recreate_interval() -> Duration {
	DEFAULT_MIN_RECREATE_INTERVAL
}

fn default_expired_history_limit() -> u32 {
	DEFAULT_EXPIRED_HISTORY_LIMIT
}

impl BreakGlassCredentialSpec {
	/// A spec with default timings and the given stores.
	pub fn with_stores(token_stores: Vec<StoreConfig>) -> Self {
		Self {
			validity_duration: DEFAULT_VALIDITY,
			min_validity_duration_left: DEFAULT_MIN_VALIDITY_LEFT,
			check_interval: DEFAULT_CHECK_INTERVAL,
			min_recreate_interval: DEFAULT_MIN_RECREATE_INTERVAL,
			expired_token_history_limit: DEFAULT_EXPIRED_HISTORY_LIMIT,
			token_stores,
		}
	}

	pub fn validate(&self) -> ApiResult<()> {
		if self.token_stores.is_empty() {
			return Err(ApiError::Validation(
				"at least one token store is required".to_string(),
			));
		}

		let mut seen = HashSet::new();
		for store in &self.token_stores {
			if store.name.trim().is_empty() {
				return Err(ApiError::Validation(
					"token store name must not be empty".to_string(),
				));
			}
			if !seen.insert(store.name.as_str()) {
				return Err(ApiError::Validation(format!(
					"duplicate token store name '{}'",
					store.name
				)));
			}
		}

		if self.validity_duration.is_zero() {
			return Err(ApiError::Validation(
				"validityDuration must be greater than zero".to_string(),
			));
		}
		if self.validity_duration <= self.min_validity_duration_left {
			return Err(ApiError::Validation(format!(
				"validityDuration ({}) must exceed minValidityDurationLeft ({})",
				humantime::format_duration(self.validity_duration),
				humantime::format_duration(self.min_validity_duration_left)
			)));
		}

		Ok(())
	}
}

/// One configured destination for minted tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
	pub name: String,
	#[serde(flatten)]
	pub backend: StoreBackend,
}

impl StoreConfig {
	pub fn new(name: impl Into<String>, backend: StoreBackend) -> Self {
		Self {
			name: name.into(),
			backend,
		}
	}

	/// Hex SHA-256 over the canonical JSON of the store settings.
	///
	/// The name is excluded, so renaming a store is not drift but any settings
	/// change is. Object keys are sorted, so map ordering never matters.
	pub fn settings_hash(&self) -> ApiResult<String> {
		let value = serde_json::to_value(&self.backend)?;
		let canonical = serde_json::to_vec(&canonicalize(value))?;
		Ok(hex::encode(Sha256::digest(&canonical)))
	}
}

fn canonicalize(value: serde_json::Value) -> serde_json::Value {
	match value {
		serde_json::Value::Object(map) => {
			let sorted: BTreeMap<String, serde_json::Value> = map
				.into_iter()
				.map(|(k, v)| (k, canonicalize(v)))
				.collect();
			serde_json::Value::Object(sorted.into_iter().collect())
		}
		serde_json::Value::Array(items) => {
			serde_json::Value::Array(items.into_iter().map(canonicalize).collect())
		}
		other => other,
	}
}

/// The closed set of store kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StoreBackend {
	Secret(SecretStoreSettings),
	Log(LogStoreSettings),
	S3(S3StoreSettings),
}

impl StoreBackend {
	pub fn kind(&self) -> &'static str {
		match self {
			StoreBackend::Secret(_) => "secret",
			StoreBackend::Log(_) => "log",
			StoreBackend::S3(_) => "s3",
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreSettings {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogStoreSettings {
	/// Static fields attached to the log event.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub additional_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3StoreSettings {
	pub s3: S3Connection,

	/// Jinja template for the object key. The resource name is used when unset.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object_key_template: Option<String>,

	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub object_key_template_context: BTreeMap<String, String>,

	#[serde(default)]
	pub encryption: EncryptionSettings,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Connection {
	pub endpoint: String,
	pub bucket: String,
	pub access_key_id: String,
	pub secret_access_key: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub region: Option<String>,
	/// Use plain HTTP instead of HTTPS.
	#[serde(default)]
	pub insecure: bool,
}

impl fmt::Debug for S3Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("S3Connection")
			.field("endpoint", &self.endpoint)
			.field("bucket", &self.bucket)
			.field("access_key_id", &self.access_key_id)
			.field("secret_access_key", &"[REDACTED]")
			.field("region", &self.region)
			.field("insecure", &self.insecure)
			.finish()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionSettings {
	#[serde(default)]
	pub encrypt: bool,
	/// Armored PGP public keys. One entry may contain several concatenated blocks.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub pgp_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BreakGlassCredentialStatus {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_token_creation_timestamp: Option<DateTime<Utc>>,

	#[serde(default)]
	pub tokens: Vec<TokenStatus>,

	/// Store settings hashes recorded at the last successful mint.
	#[serde(default)]
	pub last_token_store_hashes: Vec<StoreHash>,
}

impl BreakGlassCredentialStatus {
	pub fn store_hash(&self, name: &str) -> Option<&str> {
		self.last_token_store_hashes
			.iter()
			.find(|h| h.name == name)
			.map(|h| h.sha256.as_str())
	}
}

/// One minted token and where its copies went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
	pub uid: String,
	pub expiration_timestamp: DateTime<Utc>,
	#[serde(default)]
	pub refs: Vec<TokenRef>,
}

impl TokenStatus {
	pub fn reference_for(&self, store: &str) -> Option<&TokenRef> {
		self.refs.iter().find(|r| r.store == store)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenRef {
	pub store: String,
	/// Store-defined lookup key. Empty for stores that cannot be read back.
	#[serde(rename = "ref", default)]
	pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreHash {
	pub name: String,
	pub sha256: String,
}
