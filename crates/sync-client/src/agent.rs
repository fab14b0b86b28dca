//! Client-side cache of schedule entries and the edit state machine around it
//!
//! The agent is a reducer: [`SyncAgent::apply`] takes one [`Inbound`] message and returns
//! the [`Effect`]s it wants performed. It never does I/O and never advances a version on
//! its own; every version it holds came from the server through a read, a write response
//! or a change event. That keeps all of the optimistic-edit logic testable without a
//! runtime.
//!
//! Per entry:
//!
//! ```text
//!            BeginEdit                Save rejected (stale) / newer remote change
//!   Synced ───────────▶ Editing ─────────────────────────────────▶ ConflictPending
//!     ▲                   │                                              │
//!     └───── Save ok ─────┘                                              │
//!     └────────────────────────────── Reload ────────────────────────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};

use sched_types::{
	failure::Effect as SideEffect, ChangeEvent, ScheduleEntity, ScheduleFields, ScheduleId,
	SchedulePatch, SessionId, Version, WriteFailure,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
	/// Our save was refused because someone else saved first
	StaleWrite { current: Version },
	/// Someone else's change arrived while we were editing
	ChangedRemotely { version: Version },
	/// The server rejected our expected version as impossible
	ProtocolError,
	/// A save went unanswered and the entry changed in a way we cannot attribute
	OutcomeUnknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityState {
	Synced,
	Editing {
		base_version: Version,
		draft: SchedulePatch,
	},
	/// Edits are blocked until the entry is reloaded
	ConflictPending { reason: ConflictReason },
}

/// A save that has been sent and not yet answered, or answered ambiguously
#[derive(Debug, Clone)]
struct PendingWrite {
	expected: Version,
	patch: SchedulePatch,
	base_fields: ScheduleFields,
	/// Session the write was tagged with; may differ from the current one after a reconnect
	origin: Option<SessionId>,
	/// Timed out or lost in transport; the server may or may not have applied it
	unconfirmed: bool,
}

impl PendingWrite {
	/// Whether `entity` is exactly what this write would have produced
	fn produced(&self, entity: &ScheduleEntity) -> bool {
		self.expected.next() == Some(entity.version)
			&& self.patch.apply(&self.base_fields).as_ref() == Ok(&entity.fields)
	}

	/// Whether `event` is the broadcast of this write
	fn echoed_by(&self, event: &ChangeEvent) -> bool {
		(self.origin.is_some() && event.origin == self.origin) || self.produced(&event.entity)
	}
}

#[derive(Debug, Clone)]
pub struct Tracked {
	shadow: ScheduleEntity,
	state: EntityState,
	verified: bool,
	pending: Option<PendingWrite>,
}

impl Tracked {
	fn new(shadow: ScheduleEntity) -> Self {
		Self {
			shadow,
			state: EntityState::Synced,
			verified: true,
			pending: None,
		}
	}

	/// Last server state we know of
	pub fn shadow(&self) -> &ScheduleEntity {
		&self.shadow
	}

	pub fn state(&self) -> &EntityState {
		&self.state
	}

	/// False while we may have missed changes (disconnected, idle, ambiguous save)
	pub fn is_verified(&self) -> bool {
		self.verified
	}

	pub fn is_saving(&self) -> bool {
		self.pending.is_some()
	}

	/// What the user sees: the shadow with any draft laid over it
	pub fn view(&self) -> ScheduleFields {
		match &self.state {
			EntityState::Editing { draft, .. } if !draft.is_empty() => draft
				.apply(&self.shadow.fields)
				.unwrap_or_else(|_| self.shadow.fields.clone()),
			_ => self.shadow.fields.clone(),
		}
	}

	/// Take a server-provided copy if it is not older than what we hold
	fn adopt(&mut self, entity: ScheduleEntity) -> bool {
		if entity.version < self.shadow.version {
			return false;
		}
		self.shadow = entity;
		self.verified = true;
		true
	}
}

/// Why a single entry is being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
	/// Explicit reload; replaces the entry and clears any conflict
	Reload,
	/// Find out whether an unanswered save landed
	ConfirmWrite,
}

/// Everything that can happen to a session, serialised through one queue
#[derive(Debug, Clone)]
pub enum Inbound {
	// User input
	/// Load an entry, or reload it to recover from a conflict
	Reload { id: ScheduleId },
	BeginEdit { id: ScheduleId },
	EditDraft { id: ScheduleId, patch: SchedulePatch },
	Save { id: ScheduleId },
	CancelEdit { id: ScheduleId },

	// Results of effects
	Fetched {
		id: ScheduleId,
		reason: FetchReason,
		result: Result<ScheduleEntity, WriteFailure>,
	},
	WriteSucceeded { id: ScheduleId, entity: ScheduleEntity },
	WriteFailed { id: ScheduleId, failure: WriteFailure },
	Resynced {
		result: Result<Vec<ScheduleEntity>, WriteFailure>,
	},

	// Event channel
	Connected { session_id: SessionId },
	Event(ChangeEvent),
	Heartbeat,
	ConnectionLost,
	/// Nothing arrived on the event channel for longer than the liveness threshold
	IdleTimeout,
}

impl Inbound {
	/// Traffic that proves the event channel is alive
	pub fn is_channel_traffic(&self) -> bool {
		matches!(
			self,
			Inbound::Connected { .. } | Inbound::Event(_) | Inbound::Heartbeat
		)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
	Write {
		id: ScheduleId,
		expected: Version,
		patch: SchedulePatch,
		origin: Option<SessionId>,
	},
	Fetch {
		id: ScheduleId,
		reason: FetchReason,
	},
	/// Re-read every entry; `attempt` counts consecutive failures so far
	Resync { attempt: u32 },
	Notify(Notice),
}

/// Things the user needs to hear about
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
	Conflict { id: ScheduleId, reason: ConflictReason },
	/// A conflict was cleared by a reload
	Resolved { id: ScheduleId },
	/// An edit was attempted on an entry with an unresolved conflict
	EditBlocked { id: ScheduleId },
	/// The entry no longer exists on the server
	Removed { id: ScheduleId },
	Saved { id: ScheduleId, version: Version },
	/// The save was refused for a reason other than a conflict; the draft is gone
	Rejected { id: ScheduleId, failure: WriteFailure },
	/// An unanswered save turned out not to have been applied; the draft is back
	SaveNotApplied { id: ScheduleId },
	ReloadFailed { id: ScheduleId, failure: WriteFailure },
	/// Resync keeps failing
	Degraded { attempts: u32 },
	Recovered,
}

pub struct SyncAgent {
	entities: BTreeMap<ScheduleId, Tracked>,
	session_id: Option<SessionId>,
	resync_in_flight: bool,
	resync_failures: u32,
	degraded: bool,
	max_resync_attempts: u32,
}

impl SyncAgent {
	pub fn new(max_resync_attempts: u32) -> Self {
		Self {
			entities: BTreeMap::new(),
			session_id: None,
			resync_in_flight: false,
			resync_failures: 0,
			degraded: false,
			max_resync_attempts: max_resync_attempts.max(1),
		}
	}

	pub fn tracked(&self, id: ScheduleId) -> Option<&Tracked> {
		self.entities.get(&id)
	}

	pub fn entries(&self) -> impl Iterator<Item = &Tracked> {
		self.entities.values()
	}

	pub fn session_id(&self) -> Option<SessionId> {
		self.session_id
	}

	pub fn apply(&mut self, msg: Inbound) -> Vec<Effect> {
		let mut effects = Vec::new();

		match msg {
			Inbound::Reload { id } => effects.push(Effect::Fetch {
				id,
				reason: FetchReason::Reload,
			}),
			Inbound::BeginEdit { id } => self.begin_edit(id, &mut effects),
			Inbound::EditDraft { id, patch } => self.edit_draft(id, patch, &mut effects),
			Inbound::Save { id } => self.save(id, &mut effects),
			Inbound::CancelEdit { id } => self.cancel_edit(id),
			Inbound::Fetched { id, reason, result } => {
				self.fetched(id, reason, result, &mut effects)
			}
			Inbound::WriteSucceeded { id, entity } => {
				self.write_succeeded(id, entity, &mut effects)
			}
			Inbound::WriteFailed { id, failure } => self.write_failed(id, failure, &mut effects),
			Inbound::Resynced { result } => self.resynced(result, &mut effects),
			Inbound::Connected { session_id } => {
				debug!(%session_id, "Event channel connected");
				self.session_id = Some(session_id);
				self.start_resync(&mut effects);
			}
			Inbound::Event(event) => self.event(event, &mut effects),
			Inbound::Heartbeat => {}
			Inbound::ConnectionLost => {
				debug!("Event channel lost, cache unverified");
				self.session_id = None;
				self.mark_all_unverified();
			}
			Inbound::IdleTimeout => {
				debug!("Event channel idle, cache suspect");
				self.mark_all_unverified();
				self.start_resync(&mut effects);
			}
		}

		effects
	}

	fn begin_edit(&mut self, id: ScheduleId, effects: &mut Vec<Effect>) {
		let Some(tracked) = self.entities.get_mut(&id) else {
			debug!(%id, "Edit on an entry that is not loaded");
			return;
		};

		match tracked.state {
			EntityState::Synced => {
				tracked.state = EntityState::Editing {
					base_version: tracked.shadow.version,
					draft: SchedulePatch::default(),
				};
			}
			EntityState::Editing { .. } => {}
			EntityState::ConflictPending { .. } => {
				effects.push(Effect::Notify(Notice::EditBlocked { id }));
			}
		}
	}

	fn edit_draft(&mut self, id: ScheduleId, patch: SchedulePatch, effects: &mut Vec<Effect>) {
		self.begin_edit(id, effects);

		let Some(tracked) = self.entities.get_mut(&id) else {
			return;
		};
		if tracked.pending.is_some() {
			debug!(%id, "Draft change while a save is in flight, ignored");
			return;
		}
		if let EntityState::Editing { draft, .. } = &mut tracked.state {
			draft.merge(patch);
		}
	}

	fn save(&mut self, id: ScheduleId, effects: &mut Vec<Effect>) {
		let origin = self.session_id;
		let Some(tracked) = self.entities.get_mut(&id) else {
			return;
		};
		if tracked.pending.is_some() {
			return;
		}

		match &tracked.state {
			EntityState::Editing {
				base_version,
				draft,
			} => {
				if draft.is_empty() {
					tracked.state = EntityState::Synced;
					return;
				}
				tracked.pending = Some(PendingWrite {
					expected: *base_version,
					patch: draft.clone(),
					base_fields: tracked.shadow.fields.clone(),
					origin,
					unconfirmed: false,
				});
				effects.push(Effect::Write {
					id,
					expected: *base_version,
					patch: draft.clone(),
					origin,
				});
			}
			EntityState::ConflictPending { .. } => {
				effects.push(Effect::Notify(Notice::EditBlocked { id }));
			}
			EntityState::Synced => {}
		}
	}

	fn cancel_edit(&mut self, id: ScheduleId) {
		if let Some(tracked) = self.entities.get_mut(&id) {
			if tracked.pending.is_none() && matches!(tracked.state, EntityState::Editing { .. }) {
				tracked.state = EntityState::Synced;
			}
		}
	}

	fn fetched(
		&mut self,
		id: ScheduleId,
		reason: FetchReason,
		result: Result<ScheduleEntity, WriteFailure>,
		effects: &mut Vec<Effect>,
	) {
		let entity = match result {
			Ok(entity) => entity,
			Err(WriteFailure::NotFound { .. }) => {
				if self.entities.contains_key(&id) {
					self.remove(id, effects);
				} else {
					// Nothing cached, but the reload still needs an answer
					effects.push(Effect::Notify(Notice::Removed { id }));
				}
				return;
			}
			Err(failure) => {
				if reason == FetchReason::ConfirmWrite {
					// Still cannot tell whether the save landed; only the user can settle it
					if let Some(tracked) = self.entities.get_mut(&id) {
						tracked.pending = None;
						tracked.state = EntityState::ConflictPending {
							reason: ConflictReason::OutcomeUnknown,
						};
						effects.push(Effect::Notify(Notice::Conflict {
							id,
							reason: ConflictReason::OutcomeUnknown,
						}));
					}
				}
				effects.push(Effect::Notify(Notice::ReloadFailed { id, failure }));
				return;
			}
		};

		let Some(tracked) = self.entities.get_mut(&id) else {
			self.entities.insert(id, Tracked::new(entity));
			return;
		};

		match reason {
			FetchReason::Reload => {
				let was_conflicted = matches!(tracked.state, EntityState::ConflictPending { .. });
				if !tracked.adopt(entity) {
					// A newer event got here first; the cache is already authoritative
					tracked.verified = true;
				}
				tracked.state = EntityState::Synced;
				tracked.pending = None;
				if was_conflicted {
					effects.push(Effect::Notify(Notice::Resolved { id }));
				}
			}
			FetchReason::ConfirmWrite => match tracked.pending.take() {
				Some(pending) => reconcile(id, tracked, pending, entity, effects),
				None => {
					tracked.adopt(entity);
				}
			},
		}
	}

	fn write_succeeded(&mut self, id: ScheduleId, entity: ScheduleEntity, effects: &mut Vec<Effect>) {
		let Some(tracked) = self.entities.get_mut(&id) else {
			return;
		};

		let version = entity.version;
		tracked.pending = None;
		tracked.adopt(entity);

		let ours = match &tracked.state {
			EntityState::Editing { .. } => true,
			// A conflict raised by the broadcast of this very write
			EntityState::ConflictPending {
				reason: ConflictReason::ChangedRemotely { version: seen },
			} => *seen == version && tracked.shadow.version == version,
			EntityState::ConflictPending { .. } | EntityState::Synced => false,
		};
		if ours {
			tracked.state = EntityState::Synced;
			effects.push(Effect::Notify(Notice::Saved { id, version }));
		}
	}

	fn write_failed(&mut self, id: ScheduleId, failure: WriteFailure, effects: &mut Vec<Effect>) {
		if let WriteFailure::NotFound { .. } = failure {
			self.remove(id, effects);
			return;
		}

		let Some(tracked) = self.entities.get_mut(&id) else {
			return;
		};
		let pending = tracked.pending.take();

		match failure {
			WriteFailure::StaleVersion { current, .. } => {
				debug!(%id, %current, "Save refused, entry changed underneath");
				let reason = ConflictReason::StaleWrite { current };
				tracked.state = EntityState::ConflictPending {
					reason: reason.clone(),
				};
				tracked.verified = false;
				effects.push(Effect::Notify(Notice::Conflict { id, reason }));
			}
			WriteFailure::ProtocolError {
				claimed, current, ..
			} => {
				warn!(%id, %claimed, %current, "Server reported a protocol violation, resyncing");
				tracked.state = EntityState::ConflictPending {
					reason: ConflictReason::ProtocolError,
				};
				tracked.verified = false;
				effects.push(Effect::Notify(Notice::Conflict {
					id,
					reason: ConflictReason::ProtocolError,
				}));
				self.start_resync(effects);
			}
			failure if failure.effect() == SideEffect::Unknown => {
				// Never resend blindly: find out what the server has first
				debug!(%id, "Save outcome unknown ({}), confirming", failure);
				if let Some(mut pending) = pending {
					pending.unconfirmed = true;
					tracked.pending = Some(pending);
				}
				tracked.verified = false;
				effects.push(Effect::Fetch {
					id,
					reason: FetchReason::ConfirmWrite,
				});
			}
			failure => {
				tracked.state = EntityState::Synced;
				effects.push(Effect::Notify(Notice::Rejected { id, failure }));
			}
		}
	}

	fn event(&mut self, event: ChangeEvent, effects: &mut Vec<Effect>) {
		let Some(tracked) = self.entities.get_mut(&event.id) else {
			self.entities.insert(event.id, Tracked::new(event.entity));
			return;
		};

		if event.version <= tracked.shadow.version {
			if event.version == tracked.shadow.version {
				tracked.verified = true;
			}
			debug!(id = %event.id, version = %event.version, "Discarding stale or duplicate event");
			return;
		}

		let version = event.version;
		tracked.adopt(event.entity.clone());

		if let EntityState::Editing { .. } = tracked.state {
			// Our own save coming back before its response
			if tracked.pending.as_ref().is_some_and(|p| p.echoed_by(&event)) {
				return;
			}
			let reason = ConflictReason::ChangedRemotely { version };
			tracked.state = EntityState::ConflictPending {
				reason: reason.clone(),
			};
			effects.push(Effect::Notify(Notice::Conflict {
				id: event.id,
				reason,
			}));
		}
	}

	fn resynced(
		&mut self,
		result: Result<Vec<ScheduleEntity>, WriteFailure>,
		effects: &mut Vec<Effect>,
	) {
		self.resync_in_flight = false;

		let entities = match result {
			Ok(entities) => entities,
			Err(failure) => {
				self.resync_failures += 1;
				debug!(attempts = self.resync_failures, "Resync failed: {}", failure);
				if self.resync_failures >= self.max_resync_attempts && !self.degraded {
					self.degraded = true;
					effects.push(Effect::Notify(Notice::Degraded {
						attempts: self.resync_failures,
					}));
				}
				self.resync_in_flight = true;
				effects.push(Effect::Resync {
					attempt: self.resync_failures,
				});
				return;
			}
		};

		let mut seen = BTreeSet::new();
		for entity in entities {
			let id = entity.id;
			seen.insert(id);

			let Some(tracked) = self.entities.get_mut(&id) else {
				self.entities.insert(id, Tracked::new(entity));
				continue;
			};

			if tracked.pending.as_ref().is_some_and(|p| p.unconfirmed) {
				if let Some(pending) = tracked.pending.take() {
					reconcile(id, tracked, pending, entity, effects);
				}
				continue;
			}

			let version = entity.version;
			if !tracked.adopt(entity) {
				tracked.verified = true;
			}

			match &tracked.state {
				EntityState::ConflictPending {
					reason: ConflictReason::ProtocolError,
				} => {
					tracked.state = EntityState::Synced;
					effects.push(Effect::Notify(Notice::Resolved { id }));
				}
				EntityState::Editing { base_version, .. }
					if version > *base_version && tracked.pending.is_none() =>
				{
					let reason = ConflictReason::ChangedRemotely { version };
					tracked.state = EntityState::ConflictPending {
						reason: reason.clone(),
					};
					effects.push(Effect::Notify(Notice::Conflict { id, reason }));
				}
				_ => {}
			}
		}

		let gone: Vec<_> = self
			.entities
			.keys()
			.filter(|id| !seen.contains(id))
			.copied()
			.collect();
		for id in gone {
			self.remove(id, effects);
		}

		self.resync_failures = 0;
		if self.degraded {
			self.degraded = false;
			effects.push(Effect::Notify(Notice::Recovered));
		}
	}

	fn start_resync(&mut self, effects: &mut Vec<Effect>) {
		if self.resync_in_flight {
			return;
		}
		self.resync_in_flight = true;
		effects.push(Effect::Resync {
			attempt: self.resync_failures,
		});
	}

	fn mark_all_unverified(&mut self) {
		for tracked in self.entities.values_mut() {
			tracked.verified = false;
		}
	}

	fn remove(&mut self, id: ScheduleId, effects: &mut Vec<Effect>) {
		if self.entities.remove(&id).is_some() {
			debug!(%id, "Entry gone on the server, dropped from cache");
			effects.push(Effect::Notify(Notice::Removed { id }));
		}
	}
}

/// Decide what an unanswered save did, given the entry as the server now has it
fn reconcile(
	id: ScheduleId,
	tracked: &mut Tracked,
	pending: PendingWrite,
	entity: ScheduleEntity,
	effects: &mut Vec<Effect>,
) {
	let version = entity.version;
	let ours = pending.produced(&entity);

	tracked.adopt(entity);

	if version == pending.expected {
		tracked.state = EntityState::Editing {
			base_version: pending.expected,
			draft: pending.patch,
		};
		effects.push(Effect::Notify(Notice::SaveNotApplied { id }));
	} else if ours {
		tracked.state = EntityState::Synced;
		effects.push(Effect::Notify(Notice::Saved { id, version }));
	} else {
		let reason = ConflictReason::ChangedRemotely { version };
		tracked.state = EntityState::ConflictPending {
			reason: reason.clone(),
		};
		effects.push(Effect::Notify(Notice::Conflict { id, reason }));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{entity, room};
	use pretty_assertions::assert_eq;
	use sched_types::Topic;

	fn agent_with(entity: &ScheduleEntity) -> SyncAgent {
		let mut agent = SyncAgent::new(3);
		agent.apply(Inbound::Fetched {
			id: entity.id,
			reason: FetchReason::Reload,
			result: Ok(entity.clone()),
		});
		agent
	}

	fn event_at(base: &ScheduleEntity, version: u64, room_name: &str) -> ChangeEvent {
		let mut next = base.clone();
		next.version = Version::new(version);
		next.fields.room = room_name.to_string();
		ChangeEvent::new(Topic::Updated, next, None)
	}

	fn notices(effects: &[Effect]) -> Vec<&Notice> {
		effects
			.iter()
			.filter_map(|effect| match effect {
				Effect::Notify(notice) => Some(notice),
				_ => None,
			})
			.collect()
	}

	#[test]
	fn test_duplicate_event_leaves_version_unchanged() {
		let base = entity(4);
		let mut agent = agent_with(&base);

		let event = event_at(&base, 5, "R5");
		agent.apply(Inbound::Event(event.clone()));
		agent.apply(Inbound::Event(event));

		let tracked = agent.tracked(base.id).unwrap();
		assert_eq!(tracked.shadow().version, Version::new(5));
		assert_eq!(tracked.shadow().fields.room, "R5");
	}

	#[test]
	fn test_older_event_is_discarded() {
		let base = entity(7);
		let mut agent = agent_with(&base);

		agent.apply(Inbound::Event(event_at(&base, 6, "old")));

		assert_eq!(agent.tracked(base.id).unwrap().shadow().version, Version::new(7));
		assert_eq!(agent.tracked(base.id).unwrap().shadow().fields.room, "R101");
	}

	#[test]
	fn test_save_sends_base_version_and_draft() {
		let base = entity(4);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::Connected {
			session_id: SessionId::new(),
		});

		agent.apply(Inbound::BeginEdit { id: base.id });
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		assert_eq!(agent.tracked(base.id).unwrap().view().room, "R9");
		assert_eq!(agent.tracked(base.id).unwrap().shadow().fields.room, "R101");

		let effects = agent.apply(Inbound::Save { id: base.id });
		assert_eq!(
			effects,
			vec![Effect::Write {
				id: base.id,
				expected: Version::new(4),
				patch: room("R9"),
				origin: agent.session_id(),
			}]
		);
	}

	#[test]
	fn test_stale_rejection_rolls_back_and_blocks_edits() {
		let base = entity(4);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		agent.apply(Inbound::Save { id: base.id });

		let effects = agent.apply(Inbound::WriteFailed {
			id: base.id,
			failure: WriteFailure::StaleVersion {
				id: base.id,
				current: Version::new(5),
			},
		});

		let reason = ConflictReason::StaleWrite {
			current: Version::new(5),
		};
		assert_eq!(
			notices(&effects),
			vec![&Notice::Conflict {
				id: base.id,
				reason: reason.clone()
			}]
		);
		let tracked = agent.tracked(base.id).unwrap();
		assert_eq!(tracked.state(), &EntityState::ConflictPending { reason });
		assert_eq!(tracked.view().room, "R101");
		assert_eq!(tracked.shadow().version, Version::new(4));

		let blocked = agent.apply(Inbound::BeginEdit { id: base.id });
		assert_eq!(
			notices(&blocked),
			vec![&Notice::EditBlocked { id: base.id }]
		);
	}

	#[test]
	fn test_reload_clears_conflict() {
		let base = entity(4);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::BeginEdit { id: base.id });
		agent.apply(Inbound::Event(event_at(&base, 5, "theirs")));
		assert!(matches!(
			agent.tracked(base.id).unwrap().state(),
			EntityState::ConflictPending { .. }
		));

		let effects = agent.apply(Inbound::Reload { id: base.id });
		assert_eq!(
			effects,
			vec![Effect::Fetch {
				id: base.id,
				reason: FetchReason::Reload
			}]
		);

		let mut fresh = base.clone();
		fresh.version = Version::new(5);
		let effects = agent.apply(Inbound::Fetched {
			id: base.id,
			reason: FetchReason::Reload,
			result: Ok(fresh),
		});

		assert_eq!(notices(&effects), vec![&Notice::Resolved { id: base.id }]);
		assert_eq!(agent.tracked(base.id).unwrap().state(), &EntityState::Synced);
	}

	#[test]
	fn test_own_echo_during_save_is_not_a_conflict() {
		let base = entity(4);
		let session_id = SessionId::new();
		let mut agent = agent_with(&base);
		agent.apply(Inbound::Connected { session_id });
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		agent.apply(Inbound::Save { id: base.id });

		let mut echo = event_at(&base, 5, "R9");
		echo.origin = Some(session_id);
		let effects = agent.apply(Inbound::Event(echo.clone()));
		assert!(notices(&effects).is_empty());

		let effects = agent.apply(Inbound::WriteSucceeded {
			id: base.id,
			entity: echo.entity,
		});
		assert_eq!(
			notices(&effects),
			vec![&Notice::Saved {
				id: base.id,
				version: Version::new(5)
			}]
		);
		assert_eq!(agent.tracked(base.id).unwrap().state(), &EntityState::Synced);
	}

	#[test]
	fn test_own_save_echoed_after_reconnect_is_not_a_conflict() {
		let base = entity(4);
		let first = SessionId::new();
		let mut agent = agent_with(&base);
		agent.apply(Inbound::Connected { session_id: first });
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		agent.apply(Inbound::Save { id: base.id });

		agent.apply(Inbound::ConnectionLost);
		agent.apply(Inbound::Connected {
			session_id: SessionId::new(),
		});

		// The echo still carries the session the save was sent from
		let mut echo = event_at(&base, 5, "R9");
		echo.origin = Some(first);
		let effects = agent.apply(Inbound::Event(echo.clone()));
		assert!(notices(&effects).is_empty());
		assert!(agent.tracked(base.id).unwrap().is_saving());

		let effects = agent.apply(Inbound::WriteSucceeded {
			id: base.id,
			entity: echo.entity,
		});
		assert_eq!(
			notices(&effects),
			vec![&Notice::Saved {
				id: base.id,
				version: Version::new(5)
			}]
		);
		assert_eq!(agent.tracked(base.id).unwrap().state(), &EntityState::Synced);
	}

	#[test]
	fn test_untagged_echo_matching_the_save_is_not_a_conflict() {
		let base = entity(4);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		agent.apply(Inbound::Save { id: base.id });

		let effects = agent.apply(Inbound::Event(event_at(&base, 5, "R9")));
		assert!(notices(&effects).is_empty());

		// Same next version but different content is someone else's write
		let mut other = agent_with(&base);
		other.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		other.apply(Inbound::Save { id: base.id });
		let effects = other.apply(Inbound::Event(event_at(&base, 5, "R12")));
		assert_eq!(
			notices(&effects),
			vec![&Notice::Conflict {
				id: base.id,
				reason: ConflictReason::ChangedRemotely {
					version: Version::new(5)
				}
			}]
		);
	}

	#[test]
	fn test_reload_of_unknown_missing_entry_reports_removal() {
		let mut agent = SyncAgent::new(3);
		let id = ScheduleId::new();

		let effects = agent.apply(Inbound::Fetched {
			id,
			reason: FetchReason::Reload,
			result: Err(WriteFailure::NotFound { id }),
		});

		assert_eq!(notices(&effects), vec![&Notice::Removed { id }]);
		assert!(agent.tracked(id).is_none());
	}

	#[test]
	fn test_not_found_drops_cached_copy() {
		let base = entity(2);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		agent.apply(Inbound::Save { id: base.id });

		let effects = agent.apply(Inbound::WriteFailed {
			id: base.id,
			failure: WriteFailure::NotFound { id: base.id },
		});

		assert_eq!(notices(&effects), vec![&Notice::Removed { id: base.id }]);
		assert!(agent.tracked(base.id).is_none());
	}

	#[test]
	fn test_timeout_confirms_instead_of_retrying() {
		let base = entity(4);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		agent.apply(Inbound::Save { id: base.id });

		let effects = agent.apply(Inbound::WriteFailed {
			id: base.id,
			failure: WriteFailure::TimedOut,
		});
		assert_eq!(
			effects,
			vec![Effect::Fetch {
				id: base.id,
				reason: FetchReason::ConfirmWrite
			}]
		);
		assert!(!agent.tracked(base.id).unwrap().is_verified());

		// The save did land
		let mut landed = base.clone();
		landed.version = Version::new(5);
		landed.fields.room = "R9".to_string();
		let effects = agent.apply(Inbound::Fetched {
			id: base.id,
			reason: FetchReason::ConfirmWrite,
			result: Ok(landed),
		});

		assert_eq!(
			notices(&effects),
			vec![&Notice::Saved {
				id: base.id,
				version: Version::new(5)
			}]
		);
		assert!(agent.tracked(base.id).unwrap().is_verified());
	}

	#[test]
	fn test_timeout_that_did_not_land_restores_draft() {
		let base = entity(4);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		agent.apply(Inbound::Save { id: base.id });
		agent.apply(Inbound::WriteFailed {
			id: base.id,
			failure: WriteFailure::TimedOut,
		});

		let effects = agent.apply(Inbound::Fetched {
			id: base.id,
			reason: FetchReason::ConfirmWrite,
			result: Ok(base.clone()),
		});

		assert_eq!(notices(&effects), vec![&Notice::SaveNotApplied { id: base.id }]);
		let tracked = agent.tracked(base.id).unwrap();
		assert!(!tracked.is_saving());
		assert_eq!(tracked.view().room, "R9");
	}

	#[test]
	fn test_disconnect_then_resync_jumps_to_latest() {
		let base = entity(4);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::Connected {
			session_id: SessionId::new(),
		});
		agent.apply(Inbound::Resynced {
			result: Ok(vec![base.clone()]),
		});

		agent.apply(Inbound::ConnectionLost);
		assert!(!agent.tracked(base.id).unwrap().is_verified());

		let effects = agent.apply(Inbound::Connected {
			session_id: SessionId::new(),
		});
		assert_eq!(effects, vec![Effect::Resync { attempt: 0 }]);

		let mut latest = base.clone();
		latest.version = Version::new(7);
		agent.apply(Inbound::Resynced {
			result: Ok(vec![latest]),
		});

		let tracked = agent.tracked(base.id).unwrap();
		assert_eq!(tracked.shadow().version, Version::new(7));
		assert!(tracked.is_verified());
	}

	#[test]
	fn test_idle_channel_triggers_resync() {
		let base = entity(1);
		let mut agent = agent_with(&base);

		let effects = agent.apply(Inbound::IdleTimeout);

		assert_eq!(effects, vec![Effect::Resync { attempt: 0 }]);
		assert!(!agent.tracked(base.id).unwrap().is_verified());
	}

	#[test]
	fn test_matching_event_restores_verification() {
		let base = entity(3);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::ConnectionLost);

		agent.apply(Inbound::Event(ChangeEvent::new(Topic::Updated, base.clone(), None)));

		assert!(agent.tracked(base.id).unwrap().is_verified());
	}

	#[test]
	fn test_repeated_resync_failures_are_surfaced_once() {
		let mut agent = SyncAgent::new(2);
		agent.apply(Inbound::IdleTimeout);

		let first = agent.apply(Inbound::Resynced {
			result: Err(WriteFailure::Transport("refused".into())),
		});
		assert_eq!(first, vec![Effect::Resync { attempt: 1 }]);

		let second = agent.apply(Inbound::Resynced {
			result: Err(WriteFailure::Transport("refused".into())),
		});
		assert_eq!(notices(&second), vec![&Notice::Degraded { attempts: 2 }]);

		let third = agent.apply(Inbound::Resynced {
			result: Err(WriteFailure::Transport("refused".into())),
		});
		assert!(notices(&third).is_empty());

		let recovered = agent.apply(Inbound::Resynced { result: Ok(vec![]) });
		assert_eq!(notices(&recovered), vec![&Notice::Recovered]);
	}

	#[test]
	fn test_protocol_error_forces_resync() {
		let base = entity(4);
		let mut agent = agent_with(&base);
		agent.apply(Inbound::EditDraft {
			id: base.id,
			patch: room("R9"),
		});
		agent.apply(Inbound::Save { id: base.id });

		let effects = agent.apply(Inbound::WriteFailed {
			id: base.id,
			failure: WriteFailure::ProtocolError {
				id: base.id,
				claimed: Version::new(4),
				current: Version::new(3),
			},
		});
		assert!(effects.contains(&Effect::Resync { attempt: 0 }));

		let effects = agent.apply(Inbound::Resynced {
			result: Ok(vec![base.clone()]),
		});
		assert_eq!(notices(&effects), vec![&Notice::Resolved { id: base.id }]);
		assert_eq!(agent.tracked(base.id).unwrap().state(), &EntityState::Synced);
	}

	#[test]
	fn test_resync_drops_entries_missing_on_server() {
		let base = entity(2);
		let mut agent = agent_with(&base);

		let effects = agent.apply(Inbound::Resynced { result: Ok(vec![]) });

		assert_eq!(notices(&effects), vec![&Notice::Removed { id: base.id }]);
		assert!(agent.tracked(base.id).is_none());
	}
}
