// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

const REDACTED: &str = "[REDACTED]";

/// A minted bearer token.
///
/// Debug and Display are redacted and the memory is zeroed on drop. Call
/// [`BearerToken::expose`] where the raw value is really needed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BearerToken(String);

impl BearerToken {
	pub fn new(token: impl Into<String>) -> Self {
		Self(token.into())
	}

	pub fn expose(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<String> for BearerToken {
	fn from(token: String) -> Self {
		Self(token)
	}
}

impl fmt::Debug for BearerToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("BearerToken").field(&REDACTED).finish()
	}
}

impl fmt::Display for BearerToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn debug_and_display_are_redacted() {
		let token = BearerToken::new("eyJhbGciOi.secret.sig");
		assert_eq!(format!("{token:?}"), "BearerToken(\"[REDACTED]\")");
		assert_eq!(token.to_string(), "[REDACTED]");
		assert_eq!(token.expose(), "eyJhbGciOi.secret.sig");
	}
}
