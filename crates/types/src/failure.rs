//! Classification of failed writes as seen by a client

use thiserror::Error;

use crate::schedule::{ScheduleId, Version};

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
	/// Retry will never help without changing inputs/state.
	Permanent,
	/// Retry may help (transient contention/outage).
	Retryable,
	/// Unknown if retry will help.
	Unknown,
}

/// What we know about side effects when a write fails.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
	/// Definitely no side effects occurred.
	None,
	/// Side effects definitely occurred.
	Some,
	/// We don't know if side effects occurred.
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteFailure {
	#[error("schedule {id} was changed by someone else (now at {current})")]
	StaleVersion { id: ScheduleId, current: Version },

	#[error("schedule {id} no longer exists")]
	NotFound { id: ScheduleId },

	#[error("expected version {claimed} of {id} is ahead of the stored {current}")]
	ProtocolError {
		id: ScheduleId,
		claimed: Version,
		current: Version,
	},

	#[error("invalid change: {0}")]
	Validation(String),

	#[error("transport failure: {0}")]
	Transport(String),

	#[error("no response before the deadline, outcome unknown")]
	TimedOut,
}

impl WriteFailure {
	/// Stale writes become retryable after a reload; everything else needs a different input
	/// or an explicit resync before trying again.
	pub fn transience(&self) -> Transience {
		match self {
			WriteFailure::StaleVersion { .. } | WriteFailure::Transport(_) => Transience::Retryable,
			WriteFailure::NotFound { .. }
			| WriteFailure::ProtocolError { .. }
			| WriteFailure::Validation(_) => Transience::Permanent,
			WriteFailure::TimedOut => Transience::Unknown,
		}
	}

	pub fn effect(&self) -> Effect {
		match self {
			WriteFailure::TimedOut | WriteFailure::Transport(_) => Effect::Unknown,
			_ => Effect::None,
		}
	}
}
