// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use breakglass_api::BreakGlassCredential;
use kube::ResourceExt;
use minijinja::{context, Environment, Value};
use object_store::path::Path as ObjectPath;
use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

/// Compute the object key for a credential.
///
/// Without a template the key is the credential name. A template sees `name`,
/// `namespace`, the whole resource as `account` and the user map as `context`.
///
/// The rendered key must already be a normalized object path: keys with a
/// leading or trailing `/`, an empty segment (`a//b`) or a `.`/`..` segment
/// are rejected rather than rewritten, so the object lands exactly where the
/// template says.
pub fn render_object_key(
	template: Option<&str>,
	credential: &BreakGlassCredential,
	context: &BTreeMap<String, String>,
) -> StoreResult<String> {
	let Some(template) = template.filter(|t| !t.trim().is_empty()) else {
		return Ok(credential.name_any());
	};

	let env = template_environment();
	let rendered = env
		.render_str(
			template,
			context! {
				name => credential.name_any(),
				namespace => credential.namespace().unwrap_or_default(),
				account => Value::from_serialize(credential),
				context => context,
			},
		)
		.map_err(|e| StoreError::Config(format!("object key template: {e}")))?;

	let key = rendered.trim().to_string();
	if key.is_empty() {
		return Err(StoreError::Config(
			"object key template rendered an empty key".to_string(),
		));
	}

	match ObjectPath::parse(&key) {
		Ok(path) if path.to_string() == key => Ok(key),
		Ok(path) => Err(StoreError::Config(format!(
			"object key template rendered '{key}', which would be stored as '{path}'"
		))),
		Err(e) => Err(StoreError::Config(format!(
			"object key template rendered '{key}', which is not a valid object key: {e}"
		))),
	}
}

fn template_environment() -> Environment<'static> {
	let mut env = Environment::new();
	env.add_filter("sha256sum", |value: String| {
		hex::encode(Sha256::digest(value.as_bytes()))
	});
	env.add_filter("b64enc", |value: String| STANDARD.encode(value.as_bytes()));
	env.add_filter("trunc", trunc);
	env
}

/// Keep the first `n` characters, or the last `-n` when negative.
fn trunc(value: String, n: i64) -> String {
	let len = value.chars().count();
	let n_abs = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
	if n_abs >= len {
		return value;
	}
	if n >= 0 {
		value.chars().take(n_abs).collect()
	} else {
		value.chars().skip(len - n_abs).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use breakglass_api::{BreakGlassCredentialSpec, LogStoreSettings, StoreBackend, StoreConfig};

	fn credential() -> BreakGlassCredential {
		let mut cr = BreakGlassCredential::new(
			"cluster-admin",
			BreakGlassCredentialSpec::with_stores(vec![StoreConfig::new(
				"audit",
				StoreBackend::Log(LogStoreSettings::default()),
			)]),
		);
		cr.metadata.namespace = Some("ops".to_string());
		cr
	}

	#[test]
	fn defaults_to_resource_name() {
		let key = render_object_key(None, &credential(), &BTreeMap::new()).unwrap();
		assert_eq!(key, "cluster-admin");

		let key = render_object_key(Some("  "), &credential(), &BTreeMap::new()).unwrap();
		assert_eq!(key, "cluster-admin");
	}

	#[test]
	fn renders_name_namespace_and_context() {
		let ctx = BTreeMap::from([("cluster".to_string(), "prod-eu".to_string())]);
		let key = render_object_key(
			Some("{{ context.cluster }}/{{ namespace }}/{{ name }}.json"),
			&credential(),
			&ctx,
		)
		.unwrap();
		assert_eq!(key, "prod-eu/ops/cluster-admin.json");
	}

	#[test]
	fn account_exposes_the_resource() {
		let key = render_object_key(
			Some("{{ account.metadata.name }}-{{ account.spec.tokenStores[0].name }}"),
			&credential(),
			&BTreeMap::new(),
		)
		.unwrap();
		assert_eq!(key, "cluster-admin-audit");
	}

	#[test]
	fn extra_filters() {
		let key = render_object_key(
			Some("{{ name | sha256sum | trunc(8) }}/{{ namespace | b64enc }}/{{ name | trunc(-5) }}"),
			&credential(),
			&BTreeMap::new(),
		)
		.unwrap();
		let digest = hex::encode(Sha256::digest(b"cluster-admin"));
		assert_eq!(key, format!("{}/b3Bz/admin", &digest[..8]));
	}

	#[test]
	fn malformed_template_is_config_error() {
		let err = render_object_key(Some("{{ name "), &credential(), &BTreeMap::new()).unwrap_err();
		assert!(err.is_config_error());
	}

	#[test]
	fn empty_render_is_config_error() {
		let err =
			render_object_key(Some("{{ context.missing }}"), &credential(), &BTreeMap::new()).unwrap_err();
		assert!(err.is_config_error());
	}

	#[test]
	fn unnormalized_keys_are_rejected_with_the_rendered_key() {
		// Missing context entries render empty and leave stray slashes.
		for (template, rendered) in [
			("{{ context.env }}/{{ name }}", "/cluster-admin"),
			("{{ namespace }}/{{ context.env }}/{{ name }}", "ops//cluster-admin"),
			("{{ name }}/", "cluster-admin/"),
			("{{ namespace }}/../{{ name }}", "ops/../cluster-admin"),
		] {
			let err = render_object_key(Some(template), &credential(), &BTreeMap::new()).unwrap_err();
			assert!(err.is_config_error());
			assert!(
				err.to_string().contains(&format!("rendered '{rendered}'")),
				"{template}: {err}"
			);
		}
	}

	#[test]
	fn trunc_handles_bounds() {
		assert_eq!(trunc("abc".to_string(), 10), "abc");
		assert_eq!(trunc("abc".to_string(), -10), "abc");
		assert_eq!(trunc("abcdef".to_string(), 2), "ab");
		assert_eq!(trunc("abcdef".to_string(), -2), "ef");
		assert_eq!(trunc("abc".to_string(), 0), "");
	}
}
