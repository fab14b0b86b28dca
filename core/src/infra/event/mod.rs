//! Fan-out of accepted changes to connected sessions
//!
//! Each session gets its own bounded queue. Publishing never waits on a slow reader: a
//! session whose queue is full is dropped with [`DropReason::SubscriberLagged`] and has to
//! reconnect and reload, the same as after any other disconnect. Nothing is replayed on
//! reconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use sched_types::{ChangeEvent, SessionId};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::config::BroadcastConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
	/// The session's queue filled up before it was drained
	SubscriberLagged,
	/// The broadcaster was shut down
	ServerShutdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
	#[error("session limit reached ({max_sessions})")]
	SessionLimitReached { max_sessions: usize },
	#[error("session {0} is already subscribed")]
	AlreadySubscribed(SessionId),
	#[error("broadcaster is shut down")]
	Closed,
	#[error("broadcaster lock poisoned")]
	LockPoisoned,
}

struct Connection {
	event_tx: mpsc::Sender<ChangeEvent>,
	drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl Connection {
	fn drop_with(self, reason: DropReason) {
		if let Ok(mut slot) = self.drop_reason.lock() {
			*slot = Some(reason);
		}
	}
}

#[derive(Default)]
struct Registry {
	connections: HashMap<SessionId, Connection>,
	closed: bool,
}

/// Explicit registry of live sessions
#[derive(Clone)]
pub struct ChangeBroadcaster {
	registry: Arc<RwLock<Registry>>,
	config: BroadcastConfig,
}

impl ChangeBroadcaster {
	pub fn new(config: BroadcastConfig) -> Self {
		Self {
			registry: Arc::new(RwLock::new(Registry::default())),
			config,
		}
	}

	/// Register `session_id` and return the handle its events arrive on
	pub fn subscribe(&self, session_id: SessionId) -> Result<Subscription, BroadcastError> {
		let mut registry = self
			.registry
			.write()
			.map_err(|_| BroadcastError::LockPoisoned)?;

		if registry.closed {
			return Err(BroadcastError::Closed);
		}
		if registry.connections.contains_key(&session_id) {
			return Err(BroadcastError::AlreadySubscribed(session_id));
		}
		if registry.connections.len() >= self.config.max_sessions {
			return Err(BroadcastError::SessionLimitReached {
				max_sessions: self.config.max_sessions,
			});
		}

		let (event_tx, event_rx) = mpsc::channel(self.config.queue_depth.max(1));
		let drop_reason = Arc::new(Mutex::new(None));
		registry.connections.insert(
			session_id,
			Connection {
				event_tx,
				drop_reason: drop_reason.clone(),
			},
		);

		debug!(
			session_id = %session_id,
			sessions = registry.connections.len(),
			"Session subscribed"
		);

		Ok(Subscription {
			session_id,
			event_rx,
			drop_reason,
			broadcaster: self.clone(),
		})
	}

	/// Forget a session. Its handle sees the end of the stream once drained.
	pub fn unsubscribe(&self, session_id: SessionId) {
		let Ok(mut registry) = self.registry.write() else {
			return;
		};
		if registry.connections.remove(&session_id).is_some() {
			debug!(session_id = %session_id, "Session unsubscribed");
		}
	}

	/// Deliver `event` to every registered session, except its origin when echo
	/// suppression is on. Returns the number of sessions it was queued for.
	pub fn publish(&self, event: &ChangeEvent) -> Result<usize, BroadcastError> {
		let mut delivered = 0;
		let mut lagged = Vec::new();
		let mut closed = Vec::new();

		{
			let registry = self
				.registry
				.read()
				.map_err(|_| BroadcastError::LockPoisoned)?;

			for (session_id, connection) in &registry.connections {
				if self.config.suppress_echo && event.origin == Some(*session_id) {
					continue;
				}

				match connection.event_tx.try_send(event.clone()) {
					Ok(()) => delivered += 1,
					Err(TrySendError::Full(_)) => lagged.push(*session_id),
					Err(TrySendError::Closed(_)) => closed.push(*session_id),
				}
			}
		}

		if !lagged.is_empty() || !closed.is_empty() {
			let mut registry = self
				.registry
				.write()
				.map_err(|_| BroadcastError::LockPoisoned)?;

			for session_id in lagged {
				if let Some(connection) = registry.connections.remove(&session_id) {
					warn!(
						session_id = %session_id,
						queue_depth = self.config.queue_depth,
						"Dropping lagged session"
					);
					connection.drop_with(DropReason::SubscriberLagged);
				}
			}
			for session_id in closed {
				registry.connections.remove(&session_id);
			}
		}

		debug!(
			topic = event.topic.as_str(),
			id = %event.id,
			version = %event.version,
			delivered,
			"Published change"
		);

		Ok(delivered)
	}

	/// Drop every session and refuse new ones
	pub fn shutdown(&self) {
		let Ok(mut registry) = self.registry.write() else {
			return;
		};
		registry.closed = true;
		let count = registry.connections.len();
		for (_, connection) in registry.connections.drain() {
			connection.drop_with(DropReason::ServerShutdown);
		}
		debug!(sessions = count, "Broadcaster shut down");
	}

	pub fn session_count(&self) -> usize {
		self.registry
			.read()
			.map(|registry| registry.connections.len())
			.unwrap_or(0)
	}

	pub fn config(&self) -> &BroadcastConfig {
		&self.config
	}
}

/// Receiving end of one session. Unsubscribes when dropped.
pub struct Subscription {
	session_id: SessionId,
	event_rx: mpsc::Receiver<ChangeEvent>,
	drop_reason: Arc<Mutex<Option<DropReason>>>,
	broadcaster: ChangeBroadcaster,
}

impl Subscription {
	/// Next event, or `None` once the session has been dropped and its queue drained
	pub async fn recv(&mut self) -> Option<ChangeEvent> {
		self.event_rx.recv().await
	}

	pub fn session_id(&self) -> SessionId {
		self.session_id
	}

	/// Why the broadcaster let go of this session, if it did
	pub fn drop_reason(&self) -> Option<DropReason> {
		self.drop_reason.lock().ok().and_then(|guard| *guard)
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.broadcaster.unsubscribe(self.session_id);
	}
}
