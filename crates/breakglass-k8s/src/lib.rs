// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! K8s client abstraction for break-glass credentials.
//!
//! This crate provides:
//! - A trait-based K8s client abstraction for testability
//! - Production implementation using the kube crate
//! - An in-memory mock cluster with its own token authority

mod client;
mod error;
mod kube_client;
mod mock;
mod token_review;
mod types;

pub use client::K8sClient;
pub use error::K8sError;
pub use kube_client::KubeClient;
pub use mock::MockK8sClient;
pub use token_review::TokenReviewResult;
pub use types::{owner_reference, service_account_for, IssuedToken, Secret, ServiceAccount};
