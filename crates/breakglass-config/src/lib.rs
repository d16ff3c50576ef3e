// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the break-glass credential controller.
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. TOML file (`/etc/breakglass/controller.toml`, or an explicit path)
//! 3. Environment variables (`BREAKGLASS_*`)
//!
//! ```ignore
//! use breakglass_config::load_config;
//!
//! let config = load_config()?;
//! println!("probes on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::BreakGlassConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH,
};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved controller configuration.
#[derive(Debug, Clone, Default)]
pub struct BreakGlassConfig {
	pub http: HttpConfig,
	pub logging: LoggingConfig,
	pub controller: ControllerConfig,
}

impl BreakGlassConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<BreakGlassConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path in place of the system file.
pub fn load_config_with_file(
	config_path: impl Into<PathBuf>,
) -> Result<BreakGlassConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<BreakGlassConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = BreakGlassConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: BreakGlassConfigLayer) -> Result<BreakGlassConfig, ConfigError> {
	let config = BreakGlassConfig {
		http: layer.http.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		controller: layer.controller.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		namespace = config.controller.namespace.as_deref().unwrap_or("*"),
		field_manager = %config.controller.field_manager,
		"controller configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &BreakGlassConfig) -> Result<(), ConfigError> {
	if config.http.port == 0 {
		return Err(ConfigError::Validation(
			"http.port must be non-zero".to_string(),
		));
	}
	if config.controller.error_requeue_secs == 0 {
		return Err(ConfigError::Validation(
			"controller.errorRequeueSecs must be at least 1".to_string(),
		));
	}
	if config.controller.field_manager.trim().is_empty() {
		return Err(ConfigError::Validation(
			"controller.fieldManager must not be empty".to_string(),
		));
	}
	Ok(())
}
