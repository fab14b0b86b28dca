use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client-side timing and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// How long a write may go unanswered before its outcome is treated as unknown
	pub write_timeout_ms: u64,

	/// Silence on the event channel after which the cache is considered suspect.
	/// Should exceed the server's heartbeat interval.
	pub idle_threshold_ms: u64,

	/// Consecutive failed resyncs before the problem is shown to the user
	pub max_resync_attempts: u32,

	/// First resync retry delay; doubles per attempt
	pub resync_backoff_ms: u64,

	/// Upper bound for resync and reconnect delays
	pub max_backoff_ms: u64,

	/// Capacity of the session's inbound queue
	pub inbound_capacity: usize,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			write_timeout_ms: 10_000,
			idle_threshold_ms: 45_000,
			max_resync_attempts: 3,
			resync_backoff_ms: 500,
			max_backoff_ms: 30_000,
			inbound_capacity: 256,
		}
	}
}

impl SyncConfig {
	pub fn write_timeout(&self) -> Duration {
		Duration::from_millis(self.write_timeout_ms)
	}

	pub fn idle_threshold(&self) -> Duration {
		Duration::from_millis(self.idle_threshold_ms)
	}

	/// Delay before retry number `attempt` (0 for the first retry)
	pub fn backoff(&self, attempt: u32) -> Duration {
		let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
		Duration::from_millis(
			self.resync_backoff_ms
				.saturating_mul(factor)
				.min(self.max_backoff_ms),
		)
	}
}
