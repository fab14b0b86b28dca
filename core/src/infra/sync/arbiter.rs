//! Compare-and-swap decision for schedule writes
//!
//! Every write path (in-memory, SQLite) asks the arbiter whether a write may proceed
//! before touching state, so the policy lives in exactly one place:
//!
//! - a missing entity always wins over version checks (`NotFound`)
//! - no expectation means a force write and is accepted unconditionally
//! - an expectation equal to the stored version is accepted
//! - an older expectation is an ordinary conflict (`StaleVersion`)
//! - a newer expectation cannot come from an honest client (`FutureVersion`)

use std::fmt;

use sched_types::{Actor, Version};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	Accepted,
	StaleVersion { current: Version },
	NotFound,
	/// Caller claims to have observed a version the store never produced
	FutureVersion { claimed: Version, current: Version },
}

/// Decide a write given the stored version (`None` when the entity does not exist) and
/// the version the caller last observed (`None` for a privileged force write).
pub fn arbitrate(stored: Option<Version>, expected: Option<Version>) -> Verdict {
	let Some(current) = stored else {
		return Verdict::NotFound;
	};

	match expected {
		None => Verdict::Accepted,
		Some(claimed) if claimed == current => Verdict::Accepted,
		Some(claimed) if claimed < current => Verdict::StaleVersion { current },
		Some(claimed) => Verdict::FutureVersion { claimed, current },
	}
}

/// Proof that the caller passed the administrative check.
///
/// Only [`AdminGrant::authorize`] mints one, so the force-write path cannot be reached by
/// accident from the regular write route.
#[derive(Clone)]
pub struct AdminGrant {
	actor: Actor,
}

impl AdminGrant {
	/// Check a presented bearer token against the configured admin token.
	///
	/// Force writes are disabled entirely when no token is configured.
	pub fn authorize(
		actor: Actor,
		presented: &str,
		configured: Option<&str>,
	) -> Result<AdminGrant, AuthError> {
		let configured = configured.ok_or(AuthError::Disabled)?;
		if !constant_time_eq(presented.as_bytes(), configured.as_bytes()) {
			return Err(AuthError::InvalidToken);
		}
		Ok(AdminGrant { actor })
	}

	pub fn actor(&self) -> &Actor {
		&self.actor
	}

	#[cfg(test)]
	pub(crate) fn for_tests() -> Self {
		Self {
			actor: Actor::new("test-admin"),
		}
	}
}

impl fmt::Debug for AdminGrant {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AdminGrant")
			.field("actor", &self.actor)
			.finish()
	}
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
	#[error("force writes are disabled on this server")]
	Disabled,
	#[error("invalid admin token")]
	InvalidToken,
}

/// How a write states its precondition
#[derive(Debug, Clone)]
pub enum Expectation {
	/// Regular optimistic write against the version the caller last observed
	Exact(Version),
	/// Administrative corrective write that bypasses the version check
	Force(AdminGrant),
}

impl Expectation {
	pub fn expected_version(&self) -> Option<Version> {
		match self {
			Expectation::Exact(version) => Some(*version),
			Expectation::Force(_) => None,
		}
	}

	pub fn is_forced(&self) -> bool {
		matches!(self, Expectation::Force(_))
	}
}
