// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Break-glass credential controller binary.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use breakglass_api::{BreakGlassCredential, SystemClock};
use breakglass_config::{load_config, load_config_with_file, BreakGlassConfig};
use breakglass_controller::{run_controller, ControllerContext, ControllerMetrics, Reconciler};
use breakglass_k8s::KubeClient;
use breakglass_stores::S3ObjectStorage;
use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use tracing::{info, warn};

mod decrypt;
mod http;
mod logging;

/// Keeps break-glass ServiceAccount tokens minted, fanned out and verified.
#[derive(Parser, Debug)]
#[command(name = "breakglass-controller", version)]
struct Args {
	/// Config file to use instead of /etc/breakglass/controller.toml
	#[arg(long, global = true, env = "BREAKGLASS_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the controller and its metrics/probe server (default)
	Run,
	/// Print the BreakGlassCredential CustomResourceDefinition as JSON
	Crd,
	/// Decrypt a token payload written by an encrypting s3 store
	Decrypt {
		/// Armored PGP secret key of one recipient
		#[arg(long)]
		secret_key: PathBuf,
		/// Passphrase for a protected secret key
		#[arg(long, env = "BREAKGLASS_KEY_PASSPHRASE", hide_env_values = true, default_value = "")]
		passphrase: String,
		/// Payload file; reads stdin when omitted
		#[arg(long)]
		input: Option<PathBuf>,
	},
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	match args.command.unwrap_or(Command::Run) {
		Command::Version => {
			println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
			Ok(())
		}
		Command::Crd => {
			println!("{}", serde_json::to_string_pretty(&BreakGlassCredential::crd())?);
			Ok(())
		}
		Command::Decrypt {
			secret_key,
			passphrase,
			input,
		} => decrypt::run(&secret_key, &passphrase, input.as_deref()),
		Command::Run => {
			let config = match args.config {
				Some(path) => load_config_with_file(path)?,
				None => load_config()?,
			};
			run(config).await
		}
	}
}

async fn run(config: BreakGlassConfig) -> Result<()> {
	logging::init(&config.logging);

	info!(
		version = env!("CARGO_PKG_VERSION"),
		namespace = config.controller.namespace.as_deref().unwrap_or("*"),
		"starting breakglass-controller"
	);

	let k8s = KubeClient::new(config.controller.field_manager.clone())
		.await
		.context("connecting to the Kubernetes API")?;
	let client = k8s.client();

	let metrics = Arc::new(ControllerMetrics::new());
	let context = Arc::new(ControllerContext {
		reconciler: Reconciler::new(
			Arc::new(k8s),
			Arc::new(S3ObjectStorage),
			Arc::new(SystemClock),
			metrics.clone(),
		),
		error_requeue: config.controller.error_requeue(),
	});
	let ready = Arc::new(AtomicBool::new(false));

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("binding {addr}"))?;
	let app = http::router(http::HttpState::new(metrics, ready.clone()));
	info!(%addr, "HTTP server listening");
	let server = tokio::spawn(async move {
		if let Err(e) = axum::serve(listener, app).await {
			warn!(error = %e, "HTTP server error");
		}
	});

	run_controller(client, config.controller.namespace.clone(), context, ready).await;

	server.abort();
	info!("breakglass-controller stopped");
	Ok(())
}
