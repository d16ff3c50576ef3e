// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use breakglass_api::{BearerToken, BreakGlassCredential, LogStoreSettings};
use kube::ResourceExt;
use tracing::info;

/// Writes the token to the process log. Nothing can be read back.
#[derive(Debug, Clone)]
pub struct LogStore {
	name: String,
	settings: LogStoreSettings,
}

impl LogStore {
	pub fn new(name: impl Into<String>, settings: LogStoreSettings) -> Self {
		Self {
			name: name.into(),
			settings,
		}
	}

	/// Emit the token with the configured fields. The reference is always empty.
	///
	/// tracing field names are fixed at compile time, so `additionalFields`
	/// travel as one `fields` value holding a JSON object
	/// (`fields={"ticket":"INC-42"}`) rather than one log field per key.
	pub fn store_token(&self, credential: &BreakGlassCredential, token: &BearerToken) -> String {
		let fields = serde_json::to_string(&self.settings.additional_fields).unwrap_or_default();
		info!(
			store = %self.name,
			credential = %credential.name_any(),
			namespace = %credential.namespace().unwrap_or_default(),
			fields = %fields,
			token = token.expose(),
			"Break-glass token issued"
		);
		String::new()
	}
}
