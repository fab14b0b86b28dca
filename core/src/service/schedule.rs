//! Schedule write path
//!
//! Ties the store, the sequencer and the broadcaster together. Every accepted mutation,
//! creation included, runs as:
//!
//! 1. acquire the entity's lane
//! 2. commit through the store (compare-and-swap)
//! 3. publish the change event
//! 4. release the lane
//!
//! so the order events leave the broadcaster equals the order the store accepted them.

use std::sync::Arc;

use sched_types::{
	Actor, ChangeEvent, ScheduleEntity, ScheduleFields, ScheduleId, SchedulePatch, SessionId,
	Topic, Version,
};
use tracing::{debug, error, info, warn};

use crate::infra::event::ChangeBroadcaster;
use crate::infra::store::{ListFilter, ScheduleStore, StoreError, WriteError};
use crate::infra::sync::{AdminGrant, Expectation, WriteSequencer};

pub struct ScheduleService {
	store: Arc<dyn ScheduleStore>,
	broadcaster: ChangeBroadcaster,
	sequencer: WriteSequencer,
}

impl ScheduleService {
	pub fn new(store: Arc<dyn ScheduleStore>, broadcaster: ChangeBroadcaster) -> Self {
		Self {
			store,
			broadcaster,
			sequencer: WriteSequencer::new(),
		}
	}

	pub fn broadcaster(&self) -> &ChangeBroadcaster {
		&self.broadcaster
	}

	/// Create an entry at version 1 and announce it as `entity-created`
	pub async fn create(
		&self,
		fields: ScheduleFields,
		actor: Actor,
		origin: Option<SessionId>,
	) -> Result<ScheduleEntity, WriteError> {
		let id = ScheduleId::new();
		let _lane = self.sequencer.acquire(id).await;

		let entity = self
			.store
			.create(id, fields, &actor)
			.await
			.inspect_err(|e| log_rejection(id, e))?;

		info!(%id, actor = %actor, "Created schedule");
		self.announce(ChangeEvent::new(Topic::Created, entity.clone(), origin));

		Ok(entity)
	}

	pub async fn get(&self, id: ScheduleId) -> Result<Option<ScheduleEntity>, StoreError> {
		self.store.get(id).await
	}

	pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ScheduleEntity>, StoreError> {
		self.store.list(filter).await
	}

	/// Optimistic write against the version the caller last observed
	pub async fn write(
		&self,
		id: ScheduleId,
		expected: Version,
		patch: &SchedulePatch,
		actor: Actor,
		origin: Option<SessionId>,
	) -> Result<ScheduleEntity, WriteError> {
		self.commit(id, Expectation::Exact(expected), patch, actor, origin)
			.await
	}

	/// Administrative write that skips the version check
	pub async fn force_write(
		&self,
		id: ScheduleId,
		grant: AdminGrant,
		patch: &SchedulePatch,
		origin: Option<SessionId>,
	) -> Result<ScheduleEntity, WriteError> {
		let actor = grant.actor().clone();
		warn!(%id, actor = %actor, "Forced write requested, bypassing version check");
		self.commit(id, Expectation::Force(grant), patch, actor, origin)
			.await
	}

	/// Archive an entry; announced as `entity-deleted`
	pub async fn archive(
		&self,
		id: ScheduleId,
		expected: Version,
		actor: Actor,
		origin: Option<SessionId>,
	) -> Result<ScheduleEntity, WriteError> {
		self.write(id, expected, &SchedulePatch::archive(), actor, origin)
			.await
	}

	async fn commit(
		&self,
		id: ScheduleId,
		expectation: Expectation,
		patch: &SchedulePatch,
		actor: Actor,
		origin: Option<SessionId>,
	) -> Result<ScheduleEntity, WriteError> {
		let _lane = self.sequencer.acquire(id).await;

		let committed = self
			.store
			.write(id, &expectation, patch, &actor)
			.await
			.inspect_err(|e| log_rejection(id, e))?;

		let topic = Topic::for_transition(&committed.previous, &committed.entity.fields);
		debug!(
			%id,
			version = %committed.entity.version,
			topic = topic.as_str(),
			actor = %actor,
			"Accepted write"
		);
		self.announce(ChangeEvent::new(topic, committed.entity.clone(), origin));

		Ok(committed.entity)
	}

	fn announce(&self, event: ChangeEvent) {
		// The write is already durable; a broadcaster failure only costs liveness, which
		// clients recover through resync.
		if let Err(e) = self.broadcaster.publish(&event) {
			error!(id = %event.id, version = %event.version, "Failed to publish change: {}", e);
		}
	}
}

fn log_rejection(id: ScheduleId, err: &WriteError) {
	match err {
		WriteError::StaleVersion {
			expected, current, ..
		} => debug!(%id, %expected, %current, "Rejected stale write"),
		WriteError::FutureVersion {
			claimed, current, ..
		} => warn!(
			%id,
			%claimed,
			%current,
			"Protocol violation: expected version is ahead of the stored version"
		),
		WriteError::NotFound(_) => debug!(%id, "Write to unknown schedule"),
		WriteError::Validation(e) => debug!(%id, "Rejected invalid change: {}", e),
		WriteError::Store(e) => error!(%id, "Store failure: {}", e),
	}
}
