// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use breakglass_api::BreakGlassCredential;
use breakglass_k8s::ServiceAccount;
use futures::StreamExt;
use kube::{
	runtime::{controller::Action, watcher, Controller},
	Api, Client, ResourceExt,
};
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::reconcile::Reconciler;

/// Requeue delay for errors that need a spec change to clear.
pub const CONFIG_ERROR_REQUEUE: Duration = Duration::from_secs(5 * 60);

/// Shared state handed to every reconcile.
pub struct ControllerContext {
	pub reconciler: Reconciler,
	pub error_requeue: Duration,
}

/// Watch credentials (and the ServiceAccounts they own) until shutdown.
///
/// `ready` flips to true once the credential watcher has completed its
/// initial list, and back to false when the controller stops.
pub async fn run_controller(
	client: Client,
	namespace: Option<String>,
	context: Arc<ControllerContext>,
	ready: Arc<AtomicBool>,
) {
	let (credentials, service_accounts): (Api<BreakGlassCredential>, Api<ServiceAccount>) =
		match namespace.as_deref() {
			Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client, ns)),
			None => (Api::all(client.clone()), Api::all(client)),
		};

	info!(namespace = ?namespace, "Starting credential controller");

	let controller = Controller::new(credentials, watcher::Config::default())
		.owns(service_accounts, watcher::Config::default())
		.shutdown_on_signal();

	let cache = controller.store();
	let readiness = tokio::spawn({
		let ready = ready.clone();
		async move { mark_ready(cache.wait_until_ready(), &ready).await }
	});

	controller
		.run(reconcile, error_policy, context)
		.for_each(|result| async move {
			match result {
				Ok((object, action)) => debug!(object = %object.name, ?action, "Reconcile finished"),
				Err(e) => warn!(error = %e, "Controller error"),
			}
		})
		.await;

	readiness.abort();
	ready.store(false, Ordering::SeqCst);
	info!("Credential controller stopped");
}

/// Set `ready` once `synced` resolves without error.
async fn mark_ready<E: Debug>(synced: impl Future<Output = Result<(), E>>, ready: &AtomicBool) {
	match synced.await {
		Ok(()) => {
			ready.store(true, Ordering::SeqCst);
			info!("Credential cache synced, controller ready");
		}
		Err(e) => warn!(error = ?e, "Credential cache never synced"),
	}
}

async fn reconcile(
	credential: Arc<BreakGlassCredential>,
	context: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
	let namespace = credential
		.namespace()
		.ok_or_else(|| ReconcileError::MissingNamespace(credential.name_any()))?;
	let outcome = context
		.reconciler
		.reconcile(&namespace, &credential.name_any())
		.await?;
	Ok(match outcome.requeue_after {
		Some(after) => Action::requeue(after),
		None => Action::await_change(),
	})
}

/// Requeue delay after a failed reconcile.
pub fn error_policy(
	_credential: Arc<BreakGlassCredential>,
	error: &ReconcileError,
	context: Arc<ControllerContext>,
) -> Action {
	Action::requeue(requeue_delay(error, context.error_requeue))
}

fn requeue_delay(error: &ReconcileError, default: Duration) -> Duration {
	if error.is_config_error() {
		CONFIG_ERROR_REQUEUE
	} else {
		default
	}
}
