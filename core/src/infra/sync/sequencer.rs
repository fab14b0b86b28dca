//! Per-entity ordering of commit and publish
//!
//! The store decides which write wins, but two accepted writes on the same entity could
//! still reach the broadcaster in the wrong order if they race between commit and
//! publish. Holding an entity's lane across both steps makes event order equal commit
//! order for that entity. Lanes of different entities never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use sched_types::ScheduleId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the duration of one commit-and-publish on an entity
pub type LaneGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct WriteSequencer {
	lanes: Mutex<HashMap<ScheduleId, Weak<AsyncMutex<()>>>>,
}

impl WriteSequencer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Wait for exclusive use of `id`'s lane
	pub async fn acquire(&self, id: ScheduleId) -> LaneGuard {
		self.lane(id).lock_owned().await
	}

	fn lane(&self, id: ScheduleId) -> Arc<AsyncMutex<()>> {
		// A poisoned map only means another thread panicked mid-insert; the map itself
		// holds nothing but weak handles, so keep going with its contents.
		let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());

		if let Some(lane) = lanes.get(&id).and_then(Weak::upgrade) {
			return lane;
		}

		// Forget lanes nobody holds any more before adding a new one
		lanes.retain(|_, lane| lane.strong_count() > 0);

		let lane = Arc::new(AsyncMutex::new(()));
		lanes.insert(id, Arc::downgrade(&lane));
		lane
	}

	/// Number of lanes currently held or waited on
	pub fn active_lanes(&self) -> usize {
		let lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
		lanes.values().filter(|lane| lane.strong_count() > 0).count()
	}
}
