//! JSON bodies exchanged over HTTP and the event channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{ChangeEvent, SessionId};
use crate::failure::WriteFailure;
use crate::schedule::{ScheduleEntity, ScheduleFields, ScheduleId, SchedulePatch, Semester, Version};

/// Header carrying the event-channel session of the caller, used for echo suppression
pub const SESSION_HEADER: &str = "x-session-id";

/// Header naming the actor recorded as `updated_by`
pub const ACTOR_HEADER: &str = "x-actor";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
	pub fields: ScheduleFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
	/// Version the caller last observed. Required on the regular write route.
	#[serde(default)]
	pub expected_version: Option<Version>,
	pub patch: SchedulePatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceWriteRequest {
	pub patch: SchedulePatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityResponse {
	pub entity: ScheduleEntity,
	pub version: Version,
}

impl From<ScheduleEntity> for EntityResponse {
	fn from(entity: ScheduleEntity) -> Self {
		Self {
			version: entity.version,
			entity,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
	pub new_version: Version,
	pub entity: ScheduleEntity,
}

impl From<ScheduleEntity> for WriteResponse {
	fn from(entity: ScheduleEntity) -> Self {
		Self {
			new_version: entity.version,
			entity,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub school_year: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub semester: Option<Semester>,
	#[serde(default)]
	pub include_archived: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	StaleVersion,
	NotFound,
	ProtocolError,
	ValidationFailed,
	ExpectedVersionRequired,
	Unauthorized,
	Forbidden,
	BadRequest,
	Unavailable,
	Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
	pub code: ErrorCode,
	pub message: String,
	/// Set on `stale_version` and `protocol_error` so the client can decide how to resync
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_version: Option<Version>,
}

impl ErrorBody {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			current_version: None,
		}
	}

	pub fn with_current_version(mut self, version: Version) -> Self {
		self.current_version = Some(version);
		self
	}

	/// Map a rejected write on `id` back into the client-side failure taxonomy
	pub fn into_write_failure(self, id: ScheduleId, claimed: Option<Version>) -> WriteFailure {
		match (self.code, self.current_version) {
			(ErrorCode::StaleVersion, Some(current)) => WriteFailure::StaleVersion { id, current },
			(ErrorCode::NotFound, _) => WriteFailure::NotFound { id },
			(ErrorCode::ProtocolError, Some(current)) => WriteFailure::ProtocolError {
				id,
				claimed: claimed.unwrap_or(current),
				current,
			},
			(ErrorCode::ValidationFailed, _) => WriteFailure::Validation(self.message),
			_ => WriteFailure::Transport(self.message),
		}
	}
}

/// Frames sent by the server over the event channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
	/// First frame on every connection; names the session for echo suppression
	Hello { session_id: SessionId },
	Event(ChangeEvent),
	/// Sent on a fixed interval so clients can tell a quiet channel from a dead one
	Heartbeat { at: DateTime<Utc> },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_stale_body_maps_to_stale_failure() {
		let id = ScheduleId::new();
		let body = ErrorBody::new(ErrorCode::StaleVersion, "stale")
			.with_current_version(Version::new(4));

		assert_eq!(
			body.into_write_failure(id, Some(Version::new(3))),
			WriteFailure::StaleVersion {
				id,
				current: Version::new(4)
			}
		);
	}

	#[test]
	fn test_hello_frame_is_tagged() {
		let session_id = SessionId::new();
		let json = serde_json::to_value(ServerMessage::Hello { session_id }).unwrap();
		assert_eq!(json["type"], "hello");
		assert_eq!(json["session_id"], session_id.to_string());
	}

	#[test]
	fn test_write_request_without_version_parses() {
		let request: WriteRequest =
			serde_json::from_str(r#"{"patch":{"room":"R1"}}"#).unwrap();
		assert_eq!(request.expected_version, None);
		assert_eq!(request.patch.room.as_deref(), Some("R1"));
	}
}
