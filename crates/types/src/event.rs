//! Change events fanned out to connected sessions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::{ScheduleEntity, ScheduleFields, ScheduleId, Version};

/// Handle of one connected session (one browser tab / one event channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl FromStr for SessionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
	#[serde(rename = "entity-created")]
	Created,
	#[serde(rename = "entity-updated")]
	Updated,
	#[serde(rename = "entity-deleted")]
	Deleted,
}

impl Topic {
	/// Topic for an accepted mutation from `before` to `after`.
	///
	/// Archiving is how entries are removed, so the transition into the archived state is
	/// published as a deletion. Everything else, restoring included, is an update.
	pub fn for_transition(before: &ScheduleFields, after: &ScheduleFields) -> Self {
		if !before.archived && after.archived {
			Topic::Deleted
		} else {
			Topic::Updated
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Topic::Created => "entity-created",
			Topic::Updated => "entity-updated",
			Topic::Deleted => "entity-deleted",
		}
	}
}

/// One accepted mutation, as seen by subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
	pub topic: Topic,
	pub id: ScheduleId,
	pub version: Version,
	pub entity: ScheduleEntity,
	/// Session that issued the write, if it came through one
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin: Option<SessionId>,
}

impl ChangeEvent {
	pub fn new(topic: Topic, entity: ScheduleEntity, origin: Option<SessionId>) -> Self {
		Self {
			topic,
			id: entity.id,
			version: entity.version,
			entity,
			origin,
		}
	}
}
