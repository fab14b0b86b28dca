//! Process-local schedule store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sched_types::{Actor, ScheduleEntity, ScheduleFields, ScheduleId, SchedulePatch, Version};
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

use super::{Committed, ListFilter, ScheduleStore, StoreError, WriteError};
use crate::infra::sync::{arbitrate, Expectation};

/// Each entry sits behind its own lock, so check-and-write on one id never waits on
/// another id and never interleaves with a second writer of the same id.
#[derive(Default)]
pub struct MemoryStore {
	entries: RwLock<HashMap<ScheduleId, Arc<Mutex<ScheduleEntity>>>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	async fn slot(&self, id: ScheduleId) -> Option<Arc<Mutex<ScheduleEntity>>> {
		self.entries.read().await.get(&id).cloned()
	}
}

#[async_trait]
impl ScheduleStore for MemoryStore {
	async fn create(
		&self,
		id: ScheduleId,
		fields: ScheduleFields,
		actor: &Actor,
	) -> Result<ScheduleEntity, WriteError> {
		fields.validate()?;

		let entity = ScheduleEntity {
			id,
			version: Version::INITIAL,
			fields,
			updated_at: Utc::now(),
			updated_by: actor.clone(),
		};

		let mut entries = self.entries.write().await;
		if entries.contains_key(&id) {
			return Err(StoreError::Duplicate(id).into());
		}
		entries.insert(id, Arc::new(Mutex::new(entity.clone())));

		Ok(entity)
	}

	async fn get(&self, id: ScheduleId) -> Result<Option<ScheduleEntity>, StoreError> {
		match self.slot(id).await {
			Some(slot) => Ok(Some(slot.lock().await.clone())),
			None => Ok(None),
		}
	}

	async fn list(&self, filter: &ListFilter) -> Result<Vec<ScheduleEntity>, StoreError> {
		let slots: Vec<_> = self.entries.read().await.values().cloned().collect();

		let mut matching = Vec::with_capacity(slots.len());
		for slot in slots {
			let entity = slot.lock().await;
			if filter.matches(&entity.fields) {
				matching.push(entity.clone());
			}
		}
		matching.sort_by_key(|entity| entity.id);

		Ok(matching)
	}

	async fn write(
		&self,
		id: ScheduleId,
		expectation: &Expectation,
		patch: &SchedulePatch,
		actor: &Actor,
	) -> Result<Committed, WriteError> {
		let slot = self.slot(id).await;
		let mut current = match &slot {
			Some(slot) => Some(slot.lock().await),
			None => None,
		};

		let verdict = arbitrate(
			current.as_ref().map(|entity| entity.version),
			expectation.expected_version(),
		);
		WriteError::from_verdict(verdict, id, expectation)?;

		let Some(current) = current.as_mut() else {
			return Err(WriteError::NotFound(id));
		};

		let fields = patch.apply(&current.fields)?;
		let version = current
			.version
			.next()
			.ok_or(StoreError::VersionExhausted(id))?;

		let previous = std::mem::replace(&mut current.fields, fields);
		current.version = version;
		current.updated_at = Utc::now();
		current.updated_by = actor.clone();

		trace!(%id, %version, forced = expectation.is_forced(), "committed write");

		Ok(Committed {
			previous,
			entity: current.clone(),
		})
	}
}
