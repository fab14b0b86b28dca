//! Versioned storage for schedule entries
//!
//! A store is the only component allowed to advance an entry's version. Its write is a
//! compare-and-swap: the check of the caller's expected version and the
//! write-and-increment happen atomically with respect to every other writer of the same
//! id. How that atomicity is obtained is up to the backend:
//!
//! - [`MemoryStore`] holds a per-id lock around read-check-write
//! - [`SqliteStore`] issues a conditional `UPDATE … WHERE version = ?` and inspects the
//!   affected row count

use async_trait::async_trait;
use sched_types::{
	Actor, ScheduleEntity, ScheduleFields, ScheduleId, SchedulePatch, Semester, ValidationError,
	Version,
};
use thiserror::Error;

use crate::infra::sync::{Expectation, Verdict};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors from the storage backend itself
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Database error: {0}")]
	Database(#[from] sea_orm::DbErr),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Corrupt record {id}: {reason}")]
	Corrupt { id: ScheduleId, reason: String },

	#[error("Schedule {0} already exists")]
	Duplicate(ScheduleId),

	#[error("Version counter exhausted for {0}")]
	VersionExhausted(ScheduleId),

	#[error("Gave up on {id} after {attempts} contended attempts")]
	Contention { id: ScheduleId, attempts: u32 },
}

/// Why a write was not applied
#[derive(Debug, Error)]
pub enum WriteError {
	#[error("Schedule {id} is at {current}, write expected {expected}")]
	StaleVersion {
		id: ScheduleId,
		expected: Version,
		current: Version,
	},

	#[error("Schedule {0} not found")]
	NotFound(ScheduleId),

	#[error("Write on {id} claims {claimed} but the store is at {current}")]
	FutureVersion {
		id: ScheduleId,
		claimed: Version,
		current: Version,
	},

	#[error("Invalid change: {0}")]
	Validation(#[from] ValidationError),

	#[error(transparent)]
	Store(#[from] StoreError),
}

impl WriteError {
	/// Turn an arbiter verdict into the write's result. `Accepted` passes through.
	pub(crate) fn from_verdict(
		verdict: Verdict,
		id: ScheduleId,
		expectation: &Expectation,
	) -> Result<(), WriteError> {
		match verdict {
			Verdict::Accepted => Ok(()),
			Verdict::NotFound => Err(WriteError::NotFound(id)),
			Verdict::StaleVersion { current } => Err(WriteError::StaleVersion {
				id,
				// A force write never yields a stale verdict
				expected: expectation.expected_version().unwrap_or(current),
				current,
			}),
			Verdict::FutureVersion { claimed, current } => Err(WriteError::FutureVersion {
				id,
				claimed,
				current,
			}),
		}
	}
}

/// Result of an accepted write
#[derive(Debug, Clone)]
pub struct Committed {
	/// Field set before the write, for topic classification
	pub previous: ScheduleFields,
	/// The entry as it now stands in the store
	pub entity: ScheduleEntity,
}

/// Filter for listing schedule entries
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
	pub school_year: Option<String>,
	pub semester: Option<Semester>,
	pub include_archived: bool,
}

impl ListFilter {
	pub fn matches(&self, fields: &ScheduleFields) -> bool {
		if fields.archived && !self.include_archived {
			return false;
		}
		if let Some(year) = &self.school_year {
			if fields.school_year.as_str() != year {
				return false;
			}
		}
		if let Some(semester) = self.semester {
			if fields.semester != semester {
				return false;
			}
		}
		true
	}
}

#[async_trait]
pub trait ScheduleStore: Send + Sync + 'static {
	/// Insert a new entry at version 1
	async fn create(
		&self,
		id: ScheduleId,
		fields: ScheduleFields,
		actor: &Actor,
	) -> Result<ScheduleEntity, WriteError>;

	/// Current state of an entry, if it exists
	async fn get(&self, id: ScheduleId) -> Result<Option<ScheduleEntity>, StoreError>;

	/// Entries matching `filter`, ordered by id
	async fn list(&self, filter: &ListFilter) -> Result<Vec<ScheduleEntity>, StoreError>;

	/// Compare-and-swap write. On success the returned entity is already visible to
	/// subsequent reads.
	async fn write(
		&self,
		id: ScheduleId,
		expectation: &Expectation,
		patch: &SchedulePatch,
		actor: &Actor,
	) -> Result<Committed, WriteError>;
}
