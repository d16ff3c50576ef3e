// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconciliation core for break-glass credentials.
//!
//! Each reconcile ensures the backing ServiceAccount, verifies every recorded
//! token, checks store settings for drift and applies the renewal policy,
//! minting and fanning out a new token when one is due.

pub mod drift;
pub mod error;
pub mod metrics;
pub mod mint;
pub mod policy;
pub mod reconcile;
pub mod runtime;
pub mod verify;

pub use drift::{detect_drift, hash_snapshot};
pub use error::{ReconcileError, ReconcileResult};
pub use metrics::ControllerMetrics;
pub use mint::{mint_token, prune_history};
pub use policy::{decide, MintReason, RenewalDecision};
pub use reconcile::{ReconcileAction, ReconcileOutcome, Reconciler};
pub use runtime::{error_policy, run_controller, ControllerContext, CONFIG_ERROR_REQUEUE};
pub use verify::{verify_tokens, TokenVerification, VerificationReport};
