//! Runtime around [`SyncAgent`]
//!
//! All inputs (user actions, API results, event channel frames) go through one queue and are
//! applied to the agent in arrival order. Effects run as spawned tasks whose results come
//! back through the same queue, so the agent never sees two things at once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::Url;
use sched_types::{ScheduleId, SchedulePatch, WriteFailure};
use tokio::{
	sync::mpsc,
	task::JoinHandle,
	time::{sleep_until, timeout, Instant},
};
use tracing::debug;

use crate::{
	agent::{Effect, Inbound, SyncAgent, Tracked},
	api::ScheduleApi,
	config::SyncConfig,
	error::SyncError,
	events,
	presenter::ConflictPresenter,
};

/// Handle to a running sync session. Dropping it stops the session.
pub struct SyncHandle {
	tx: mpsc::Sender<Inbound>,
	agent: Arc<Mutex<SyncAgent>>,
	tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
	/// Start a session. With `events_url` unset no event channel is opened; inputs can still
	/// be fed through [`SyncHandle::send`].
	pub fn start(
		api: Arc<dyn ScheduleApi>,
		events_url: Option<Url>,
		config: SyncConfig,
		presenter: Arc<dyn ConflictPresenter>,
	) -> Self {
		let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
		let agent = Arc::new(Mutex::new(SyncAgent::new(config.max_resync_attempts)));

		let mut tasks = vec![tokio::spawn(run(
			rx,
			tx.downgrade(),
			agent.clone(),
			api,
			config.clone(),
			presenter,
		))];
		if let Some(url) = events_url {
			tasks.push(events::spawn(url, config, tx.downgrade()));
		}

		Self { tx, agent, tasks }
	}

	pub async fn send(&self, msg: Inbound) -> Result<(), SyncError> {
		self.tx.send(msg).await.map_err(|_| SyncError::Stopped)
	}

	/// Load an entry, or reload it to clear a conflict
	pub async fn reload(&self, id: ScheduleId) -> Result<(), SyncError> {
		self.send(Inbound::Reload { id }).await
	}

	pub async fn begin_edit(&self, id: ScheduleId) -> Result<(), SyncError> {
		self.send(Inbound::BeginEdit { id }).await
	}

	pub async fn edit(&self, id: ScheduleId, patch: SchedulePatch) -> Result<(), SyncError> {
		self.send(Inbound::EditDraft { id, patch }).await
	}

	pub async fn save(&self, id: ScheduleId) -> Result<(), SyncError> {
		self.send(Inbound::Save { id }).await
	}

	pub async fn cancel_edit(&self, id: ScheduleId) -> Result<(), SyncError> {
		self.send(Inbound::CancelEdit { id }).await
	}

	pub fn entry(&self, id: ScheduleId) -> Option<Tracked> {
		lock(&self.agent).tracked(id).cloned()
	}

	pub fn entries(&self) -> Vec<Tracked> {
		lock(&self.agent).entries().cloned().collect()
	}
}

impl Drop for SyncHandle {
	fn drop(&mut self) {
		for task in &self.tasks {
			task.abort();
		}
	}
}

fn lock(agent: &Mutex<SyncAgent>) -> MutexGuard<'_, SyncAgent> {
	// The agent is only mutated by `apply`, which leaves it consistent between messages
	agent.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run(
	mut rx: mpsc::Receiver<Inbound>,
	tx: mpsc::WeakSender<Inbound>,
	agent: Arc<Mutex<SyncAgent>>,
	api: Arc<dyn ScheduleApi>,
	config: SyncConfig,
	presenter: Arc<dyn ConflictPresenter>,
) {
	let idle = sleep_until(Instant::now() + config.idle_threshold());
	tokio::pin!(idle);

	loop {
		let msg = tokio::select! {
			msg = rx.recv() => match msg {
				Some(msg) => msg,
				None => break,
			},
			_ = &mut idle => {
				idle.as_mut().reset(Instant::now() + config.idle_threshold());
				Inbound::IdleTimeout
			}
		};

		if msg.is_channel_traffic() {
			idle.as_mut().reset(Instant::now() + config.idle_threshold());
		}

		let effects = lock(&agent).apply(msg);

		for effect in effects {
			match effect {
				Effect::Notify(notice) => presenter.present(&notice),
				effect => {
					let Some(tx) = tx.upgrade() else {
						return;
					};
					tokio::spawn(perform(effect, api.clone(), config.clone(), tx));
				}
			}
		}
	}

	debug!("Sync session stopped");
}

/// Carry out one API effect and queue its result
async fn perform(
	effect: Effect,
	api: Arc<dyn ScheduleApi>,
	config: SyncConfig,
	tx: mpsc::Sender<Inbound>,
) {
	let deadline = config.write_timeout();

	let result = match effect {
		Effect::Write {
			id,
			expected,
			patch,
			origin,
		} => match timeout(deadline, api.write(id, expected, patch, origin)).await {
			Ok(Ok(entity)) => Inbound::WriteSucceeded { id, entity },
			Ok(Err(failure)) => Inbound::WriteFailed { id, failure },
			Err(_) => Inbound::WriteFailed {
				id,
				failure: WriteFailure::TimedOut,
			},
		},
		Effect::Fetch { id, reason } => Inbound::Fetched {
			id,
			reason,
			result: timeout(deadline, api.read(id))
				.await
				.unwrap_or(Err(WriteFailure::TimedOut)),
		},
		Effect::Resync { attempt } => {
			if attempt > 0 {
				tokio::time::sleep(config.backoff(attempt - 1)).await;
			}
			Inbound::Resynced {
				result: timeout(deadline, api.list())
					.await
					.unwrap_or(Err(WriteFailure::TimedOut)),
			}
		}
		Effect::Notify(_) => return,
	};

	let _ = tx.send(result).await;
}
