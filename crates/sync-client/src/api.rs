use async_trait::async_trait;
use sched_types::{ScheduleEntity, ScheduleId, SchedulePatch, SessionId, Version, WriteFailure};

/// Request/response half of the server, as the sync session needs it.
///
/// Every call reports failures in the client taxonomy so the agent can decide between
/// conflict, removal, resync and confirmation without knowing the transport.
#[async_trait]
pub trait ScheduleApi: Send + Sync + 'static {
	async fn read(&self, id: ScheduleId) -> Result<ScheduleEntity, WriteFailure>;

	/// Every entry, archived ones included
	async fn list(&self) -> Result<Vec<ScheduleEntity>, WriteFailure>;

	async fn write(
		&self,
		id: ScheduleId,
		expected: Version,
		patch: SchedulePatch,
		origin: Option<SessionId>,
	) -> Result<ScheduleEntity, WriteFailure>;
}
