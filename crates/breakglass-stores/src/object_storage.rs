// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use breakglass_api::S3Connection;
use object_store::{aws::AmazonS3Builder, path::Path as ObjectPath, ObjectStore, PutPayload};
use tracing::{debug, instrument};

use crate::error::{StoreError, StoreResult};

const DEFAULT_REGION: &str = "us-east-1";

/// Bucket/key uploads for the s3 store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
	/// Upload `body` under `key` and return the key actually written.
	async fn put(&self, connection: &S3Connection, key: &str, body: Vec<u8>) -> StoreResult<String>;
}

/// S3-compatible object storage via `object_store`.
///
/// A client is built per upload from the store settings, so settings changes
/// take effect on the next mint.
#[derive(Debug, Default, Clone, Copy)]
pub struct S3ObjectStorage;

impl S3ObjectStorage {
	fn client(connection: &S3Connection) -> StoreResult<impl ObjectStore> {
		let endpoint = if connection.endpoint.contains("://") {
			connection.endpoint.clone()
		} else if connection.insecure {
			format!("http://{}", connection.endpoint)
		} else {
			format!("https://{}", connection.endpoint)
		};

		AmazonS3Builder::new()
			.with_endpoint(endpoint)
			.with_bucket_name(&connection.bucket)
			.with_region(connection.region.as_deref().unwrap_or(DEFAULT_REGION))
			.with_access_key_id(&connection.access_key_id)
			.with_secret_access_key(&connection.secret_access_key)
			.with_allow_http(connection.insecure)
			.build()
			.map_err(|e| StoreError::Config(format!("s3 client: {e}")))
	}
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
	#[instrument(skip(self, connection, body), fields(bucket = %connection.bucket, bytes = body.len()))]
	async fn put(&self, connection: &S3Connection, key: &str, body: Vec<u8>) -> StoreResult<String> {
		let path = ObjectPath::parse(key)
			.map_err(|e| StoreError::Config(format!("invalid object key '{key}': {e}")))?;
		let client = Self::client(connection)?;
		client.put(&path, PutPayload::from(body)).await?;
		debug!(key = %path, "Object uploaded");
		Ok(path.to_string())
	}
}

/// In-memory object storage for tests, keyed by (bucket, key).
#[derive(Debug, Default)]
pub struct MemoryObjectStorage {
	objects: Mutex<HashMap<(String, String), Vec<u8>>>,
	fail_with: Mutex<Option<String>>,
}

impl MemoryObjectStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
		self
			.objects
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.get(&(bucket.to_string(), key.to_string()))
			.cloned()
	}

	pub fn len(&self) -> usize {
		self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Make every upload fail with this message, or succeed again with `None`.
	pub fn fail_uploads(&self, error: Option<String>) {
		*self.fail_with.lock().unwrap_or_else(|e| e.into_inner()) = error;
	}
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
	async fn put(&self, connection: &S3Connection, key: &str, body: Vec<u8>) -> StoreResult<String> {
		if let Some(error) = self.fail_with.lock().unwrap_or_else(|e| e.into_inner()).clone() {
			return Err(StoreError::ObjectStorage(error));
		}
		let path = ObjectPath::parse(key)
			.map_err(|e| StoreError::Config(format!("invalid object key '{key}': {e}")))?;
		self
			.objects
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.insert((connection.bucket.clone(), path.to_string()), body);
		Ok(path.to_string())
	}
}
