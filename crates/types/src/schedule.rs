//! Schedule entity, version token and the patch format used by writes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of a schedule entry, immutable after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(Uuid);

impl ScheduleId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	pub fn from_uuid(uuid: Uuid) -> Self {
		Self(uuid)
	}

	pub fn as_uuid(&self) -> Uuid {
		self.0
	}
}

impl Default for ScheduleId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ScheduleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl FromStr for ScheduleId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

/// Version token of a schedule entry.
///
/// Starts at 1 on creation and grows by exactly one per accepted mutation. Only the store
/// ever produces a successor; clients adopt versions they are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
	pub const INITIAL: Version = Version(1);

	pub fn new(value: u64) -> Self {
		Self(value)
	}

	pub fn get(&self) -> u64 {
		self.0
	}

	/// The version an accepted mutation produces. `None` on counter exhaustion.
	pub fn next(&self) -> Option<Version> {
		self.0.checked_add(1).map(Version)
	}
}

impl fmt::Display for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}

/// Who performed a mutation; recorded as `updated_by`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	pub fn anonymous() -> Self {
		Self("anonymous".to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Day {
	Monday,
	Tuesday,
	Wednesday,
	Thursday,
	Friday,
	Saturday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Semester {
	First,
	Second,
	Summer,
}

impl FromStr for Semester {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"first" => Ok(Semester::First),
			"second" => Ok(Semester::Second),
			"summer" => Ok(Semester::Summer),
			other => Err(ValidationError::UnknownSemester(other.to_string())),
		}
	}
}

impl Semester {
	pub fn as_str(&self) -> &'static str {
		match self {
			Semester::First => "first",
			Semester::Second => "second",
			Semester::Summer => "summer",
		}
	}
}

/// Academic year written as `YYYY-YYYY`, e.g. `2024-2025`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchoolYear(String);

impl SchoolYear {
	pub fn parse(raw: &str) -> Result<Self, ValidationError> {
		let invalid = || ValidationError::InvalidSchoolYear(raw.to_string());

		let (start, end) = raw.split_once('-').ok_or_else(invalid)?;
		if start.len() != 4 || end.len() != 4 {
			return Err(invalid());
		}
		let start: u16 = start.parse().map_err(|_| invalid())?;
		let end: u16 = end.parse().map_err(|_| invalid())?;
		if end != start + 1 {
			return Err(invalid());
		}

		Ok(Self(raw.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
	pub day: Day,
	pub start: NaiveTime,
	pub end: NaiveTime,
}

impl TimeSlot {
	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.start >= self.end {
			return Err(ValidationError::EmptyTimeSlot {
				start: self.start,
				end: self.end,
			});
		}
		Ok(())
	}
}

/// Domain payload of a schedule entry.
///
/// The concurrency machinery treats this as an opaque unit: it is compared and replaced
/// wholesale, never locked or merged field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFields {
	pub instructor: String,
	pub room: String,
	pub section: String,
	pub slot: TimeSlot,
	pub school_year: SchoolYear,
	pub semester: Semester,
	#[serde(default)]
	pub archived: bool,
}

impl ScheduleFields {
	pub fn validate(&self) -> Result<(), ValidationError> {
		for (field, value) in [
			("instructor", &self.instructor),
			("room", &self.room),
			("section", &self.section),
		] {
			if value.trim().is_empty() {
				return Err(ValidationError::MissingField(field));
			}
		}
		self.slot.validate()?;
		SchoolYear::parse(self.school_year.as_str())?;
		Ok(())
	}
}

/// Partial update applied by the store as a pure transformation of the current fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePatch {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub instructor: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub room: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub section: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub slot: Option<TimeSlot>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub school_year: Option<SchoolYear>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub semester: Option<Semester>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub archived: Option<bool>,
}

impl SchedulePatch {
	/// Patch that marks the entry as removed
	pub fn archive() -> Self {
		Self {
			archived: Some(true),
			..Default::default()
		}
	}

	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}

	/// Layer `later` over this patch; fields set in `later` win
	pub fn merge(&mut self, later: SchedulePatch) {
		if later.instructor.is_some() {
			self.instructor = later.instructor;
		}
		if later.room.is_some() {
			self.room = later.room;
		}
		if later.section.is_some() {
			self.section = later.section;
		}
		if later.slot.is_some() {
			self.slot = later.slot;
		}
		if later.school_year.is_some() {
			self.school_year = later.school_year;
		}
		if later.semester.is_some() {
			self.semester = later.semester;
		}
		if later.archived.is_some() {
			self.archived = later.archived;
		}
	}

	/// Produce the field set this patch yields on top of `current`.
	///
	/// Validation runs on the merged result so a patch can never leave an entry in a
	/// state a fresh create would reject.
	pub fn apply(&self, current: &ScheduleFields) -> Result<ScheduleFields, ValidationError> {
		if self.is_empty() {
			return Err(ValidationError::EmptyPatch);
		}

		let mut next = current.clone();
		if let Some(instructor) = &self.instructor {
			next.instructor = instructor.clone();
		}
		if let Some(room) = &self.room {
			next.room = room.clone();
		}
		if let Some(section) = &self.section {
			next.section = section.clone();
		}
		if let Some(slot) = self.slot {
			next.slot = slot;
		}
		if let Some(school_year) = &self.school_year {
			next.school_year = school_year.clone();
		}
		if let Some(semester) = self.semester {
			next.semester = semester;
		}
		if let Some(archived) = self.archived {
			next.archived = archived;
		}

		next.validate()?;
		Ok(next)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntity {
	pub id: ScheduleId,
	pub version: Version,
	pub fields: ScheduleFields,
	pub updated_at: DateTime<Utc>,
	pub updated_by: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
	#[error("field `{0}` must not be empty")]
	MissingField(&'static str),

	#[error("time slot must end after it starts ({start} >= {end})")]
	EmptyTimeSlot { start: NaiveTime, end: NaiveTime },

	#[error("invalid school year `{0}`, expected consecutive years like 2024-2025")]
	InvalidSchoolYear(String),

	#[error("unknown semester `{0}`")]
	UnknownSemester(String),

	#[error("patch does not change anything")]
	EmptyPatch,
}
