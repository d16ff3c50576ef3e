// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use breakglass_api::{BreakGlassCredential, Clock, FINALIZER};
use breakglass_k8s::{K8sClient, K8sError};
use breakglass_stores::{ObjectStorage, StoreDeps, TokenStore};
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::drift::detect_drift;
use crate::error::{ReconcileError, ReconcileResult};
use crate::metrics::ControllerMetrics;
use crate::mint::mint_token;
use crate::policy::{decide, RenewalDecision};
use crate::verify::verify_tokens;

/// What a reconcile did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
	/// The credential no longer exists.
	Gone,
	/// Metrics and finalizer removed from a deleted credential.
	CleanedUp,
	/// First sight of the credential: identity ensured, finalizer added.
	FinalizerAdded,
	Healthy,
	Throttled,
	Minted { uid: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
	pub action: ReconcileAction,
	/// When to look at the credential again. `None` waits for the next change.
	pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
	fn new(action: ReconcileAction, requeue_after: Option<Duration>) -> Self {
		Self {
			action,
			requeue_after,
		}
	}
}

/// Reconciles one credential at a time. The caller guarantees that a single
/// credential is never reconciled concurrently.
pub struct Reconciler {
	k8s: Arc<dyn K8sClient>,
	object_storage: Arc<dyn ObjectStorage>,
	clock: Arc<dyn Clock>,
	metrics: Arc<ControllerMetrics>,
}

impl Reconciler {
	pub fn new(
		k8s: Arc<dyn K8sClient>,
		object_storage: Arc<dyn ObjectStorage>,
		clock: Arc<dyn Clock>,
		metrics: Arc<ControllerMetrics>,
	) -> Self {
		Self {
			k8s,
			object_storage,
			clock,
			metrics,
		}
	}

	pub fn metrics(&self) -> &Arc<ControllerMetrics> {
		&self.metrics
	}

	#[instrument(skip(self))]
	pub async fn reconcile(&self, namespace: &str, name: &str) -> ReconcileResult<ReconcileOutcome> {
		let result = self.reconcile_inner(namespace, name).await;
		self.metrics.record_reconcile(result.is_ok());
		match &result {
			Ok(outcome) => debug!(action = ?outcome.action, requeue_after = ?outcome.requeue_after, "Reconciled"),
			Err(e) => warn!(error = %e, config_error = e.is_config_error(), "Reconcile failed"),
		}
		result
	}

	async fn reconcile_inner(&self, namespace: &str, name: &str) -> ReconcileResult<ReconcileOutcome> {
		let credential = match self.k8s.get_credential(namespace, name).await {
			Ok(credential) => credential,
			Err(K8sError::NotFound { .. }) => {
				debug!("Credential is gone");
				return Ok(ReconcileOutcome::new(ReconcileAction::Gone, None));
			}
			Err(e) => return Err(e.into()),
		};

		if credential.metadata.deletion_timestamp.is_some() {
			return self.cleanup(&credential, namespace, name).await;
		}

		credential.spec.validate()?;

		self.k8s.apply_service_account(&credential).await?;

		if !credential.finalizers().iter().any(|f| f == FINALIZER) {
			let mut finalizers = credential.finalizers().to_vec();
			finalizers.push(FINALIZER.to_string());
			self
				.k8s
				.set_credential_finalizers(namespace, name, finalizers)
				.await?;
			info!("Service account ensured, finalizer added");
			return Ok(ReconcileOutcome::new(ReconcileAction::FinalizerAdded, None));
		}

		let stores = self.build_stores(&credential)?;
		let now = self.clock.now();

		let report = verify_tokens(&credential, &stores, self.k8s.as_ref(), now).await?;
		self
			.metrics
			.set_valid_until(namespace, name, report.valid_until());
		self
			.metrics
			.inc_verification_failures(namespace, name, report.failed.len());

		let status = credential.status.clone().unwrap_or_default();
		let drifted = detect_drift(&credential.spec, &status)?;
		let decision = decide(
			&credential.spec,
			status.last_token_creation_timestamp,
			&report.verified,
			&drifted,
			now,
		);

		match decision {
			RenewalDecision::Healthy { requeue_after } => {
				debug!(verified = report.verified.len(), "Enough valid tokens");
				Ok(ReconcileOutcome::new(ReconcileAction::Healthy, Some(requeue_after)))
			}
			RenewalDecision::Throttled { remaining, reason } => {
				info!(?reason, remaining = ?remaining, "Token needed but recreate interval not elapsed");
				Ok(ReconcileOutcome::new(ReconcileAction::Throttled, Some(remaining)))
			}
			RenewalDecision::Mint { reason } => {
				info!(?reason, "Minting token");
				let new_status = mint_token(&credential, &stores, self.k8s.as_ref(), now).await?;
				self
					.k8s
					.patch_credential_status(namespace, name, &new_status)
					.await?;
				self.metrics.inc_minted(namespace, name);

				let minted = new_status.tokens.last();
				let valid_until = report
					.valid_until()
					.into_iter()
					.chain(minted.map(|t| t.expiration_timestamp))
					.max();
				self.metrics.set_valid_until(namespace, name, valid_until);

				let uid = minted.map(|t| t.uid.clone()).unwrap_or_default();
				Ok(ReconcileOutcome::new(
					ReconcileAction::Minted { uid },
					Some(credential.spec.check_interval),
				))
			}
		}
	}

	async fn cleanup(
		&self,
		credential: &BreakGlassCredential,
		namespace: &str,
		name: &str,
	) -> ReconcileResult<ReconcileOutcome> {
		self.metrics.remove_credential(namespace, name);

		if credential.finalizers().iter().any(|f| f == FINALIZER) {
			let remaining: Vec<String> = credential
				.finalizers()
				.iter()
				.filter(|f| f.as_str() != FINALIZER)
				.cloned()
				.collect();
			self
				.k8s
				.set_credential_finalizers(namespace, name, remaining)
				.await?;
		}

		info!("Credential deleted, metrics removed");
		Ok(ReconcileOutcome::new(ReconcileAction::CleanedUp, None))
	}

	fn build_stores(
		&self,
		credential: &BreakGlassCredential,
	) -> ReconcileResult<Vec<(String, TokenStore)>> {
		let deps = StoreDeps {
			k8s: self.k8s.clone(),
			object_storage: self.object_storage.clone(),
		};
		credential
			.spec
			.token_stores
			.iter()
			.map(|config| {
				TokenStore::from_config(config, &deps)
					.map(|store| (config.name.clone(), store))
					.map_err(|e| ReconcileError::store(&config.name, e))
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use breakglass_api::{
		BreakGlassCredentialSpec, EncryptionSettings, ManualClock, S3Connection, S3StoreSettings,
		SecretStoreSettings, StoreBackend, StoreConfig,
	};
	use breakglass_k8s::MockK8sClient;
	use breakglass_stores::MemoryObjectStorage;
	use chrono::{TimeZone, Utc};

	fn reconciler(k8s: Arc<MockK8sClient>, clock: Arc<ManualClock>) -> Reconciler {
		Reconciler::new(
			k8s,
			Arc::new(MemoryObjectStorage::new()),
			clock,
			Arc::new(ControllerMetrics::new()),
		)
	}

	fn setup(stores: Vec<StoreConfig>) -> (Arc<MockK8sClient>, Reconciler) {
		let clock = Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
		));
		let k8s = Arc::new(MockK8sClient::new(clock.clone()));
		let mut cr = BreakGlassCredential::new("admin", BreakGlassCredentialSpec::with_stores(stores));
		cr.metadata.namespace = Some("ops".to_string());
		k8s.insert_credential(cr);
		let reconciler = reconciler(k8s.clone(), clock);
		(k8s, reconciler)
	}

	#[tokio::test]
	async fn missing_credential_is_not_an_error() {
		let (_k8s, reconciler) = setup(vec![]);
		let outcome = reconciler.reconcile("ops", "nobody").await.unwrap();
		assert_eq!(outcome.action, ReconcileAction::Gone);
		assert_eq!(outcome.requeue_after, None);
	}

	#[tokio::test]
	async fn invalid_spec_fails_before_side_effects() {
		let (k8s, reconciler) = setup(vec![]);
		let err = reconciler.reconcile("ops", "admin").await.unwrap_err();
		assert!(err.is_config_error());
		assert!(k8s.service_account("ops", "admin").is_none());
		assert!(reconciler
			.metrics()
			.encode()
			.contains("breakglass_reconciliations_total{result=\"error\"} 1"));
	}

	#[tokio::test]
	async fn bad_store_settings_are_config_errors() {
		let (k8s, reconciler) = setup(vec![StoreConfig::new(
			"bucket",
			StoreBackend::S3(S3StoreSettings {
				s3: S3Connection {
					endpoint: "minio:9000".to_string(),
					bucket: "tokens".to_string(),
					access_key_id: "id".to_string(),
					secret_access_key: "key".to_string(),
					region: None,
					insecure: true,
				},
				object_key_template: None,
				object_key_template_context: Default::default(),
				encryption: EncryptionSettings {
					encrypt: true,
					pgp_keys: Vec::new(),
				},
			}),
		)]);

		let first = reconciler.reconcile("ops", "admin").await.unwrap();
		assert_eq!(first.action, ReconcileAction::FinalizerAdded);

		let err = reconciler.reconcile("ops", "admin").await.unwrap_err();
		assert!(err.is_config_error());
		assert_eq!(k8s.issued_tokens(), 0);
	}

	#[tokio::test]
	async fn first_mint_records_token_and_hashes() {
		let (k8s, reconciler) = setup(vec![StoreConfig::new(
			"vault",
			StoreBackend::Secret(SecretStoreSettings {}),
		)]);
		reconciler.reconcile("ops", "admin").await.unwrap();

		let outcome = reconciler.reconcile("ops", "admin").await.unwrap();
		let ReconcileAction::Minted { uid } = outcome.action else {
			panic!("expected a mint, got {:?}", outcome.action);
		};
		assert_eq!(outcome.requeue_after, Some(Duration::from_secs(300)));

		let status = k8s.credential("ops", "admin").unwrap().status.unwrap();
		assert_eq!(status.tokens.len(), 1);
		assert_eq!(status.tokens[0].uid, uid);
		assert_eq!(status.tokens[0].refs[0].store, "vault");
		assert_eq!(status.last_token_store_hashes.len(), 1);
		assert!(k8s.secret("ops", &status.tokens[0].refs[0].reference).is_some());
	}

	#[tokio::test]
	async fn review_api_error_aborts_without_minting() {
		let (k8s, reconciler) = setup(vec![StoreConfig::new(
			"vault",
			StoreBackend::Secret(SecretStoreSettings {}),
		)]);
		reconciler.reconcile("ops", "admin").await.unwrap();
		reconciler.reconcile("ops", "admin").await.unwrap();
		assert_eq!(k8s.issued_tokens(), 1);

		k8s.break_token_review_api(Some("apiserver unavailable".to_string()));
		let err = reconciler.reconcile("ops", "admin").await.unwrap_err();
		assert!(matches!(
			err,
			ReconcileError::K8s(K8sError::TokenReviewError { ref message }) if message == "apiserver unavailable"
		));
		assert!(!err.is_config_error());
		assert_eq!(k8s.issued_tokens(), 1);
		let status = k8s.credential("ops", "admin").unwrap().status.unwrap();
		assert_eq!(status.tokens.len(), 1);
		assert!(reconciler
			.metrics()
			.encode()
			.contains("breakglass_reconciliations_total{result=\"error\"} 1"));

		k8s.break_token_review_api(None);
		let outcome = reconciler.reconcile("ops", "admin").await.unwrap();
		assert_eq!(outcome.action, ReconcileAction::Healthy);
	}

	#[tokio::test]
	async fn failed_store_write_records_nothing() {
		let clock = Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
		));
		let k8s = Arc::new(MockK8sClient::new(clock.clone()));
		let storage = Arc::new(MemoryObjectStorage::new());
		storage.fail_uploads(Some("access denied".to_string()));
		let mut cr = BreakGlassCredential::new(
			"admin",
			BreakGlassCredentialSpec::with_stores(vec![
				StoreConfig::new("vault", StoreBackend::Secret(SecretStoreSettings {})),
				StoreConfig::new(
					"bucket",
					StoreBackend::S3(S3StoreSettings {
						s3: S3Connection {
							endpoint: "minio:9000".to_string(),
							bucket: "tokens".to_string(),
							access_key_id: "id".to_string(),
							secret_access_key: "key".to_string(),
							region: None,
							insecure: true,
						},
						object_key_template: None,
						object_key_template_context: Default::default(),
						encryption: EncryptionSettings::default(),
					}),
				),
			]),
		);
		cr.metadata.namespace = Some("ops".to_string());
		k8s.insert_credential(cr);
		let reconciler = Reconciler::new(
			k8s.clone(),
			storage,
			clock,
			Arc::new(ControllerMetrics::new()),
		);

		reconciler.reconcile("ops", "admin").await.unwrap();
		let err = reconciler.reconcile("ops", "admin").await.unwrap_err();
		assert!(matches!(err, ReconcileError::Store { ref store, .. } if store == "bucket"));
		assert!(!err.is_config_error());

		// The secret written before the failure stays, unrecorded.
		assert_eq!(k8s.secret_names("ops").len(), 1);
		let cr = k8s.credential("ops", "admin").unwrap();
		assert!(cr.status.map_or(true, |s| s.tokens.is_empty()));
	}
}
