//! Client side of schedule synchronisation.
//!
//! A [`SyncHandle`] keeps a versioned cache of schedule entries, lets the user edit them
//! against the version they last saw, and reconciles with the server through the change
//! event channel and periodic resyncs.

use std::sync::Arc;

use sched_types::Actor;

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod presenter;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::{ConflictReason, Effect, EntityState, FetchReason, Inbound, Notice, SyncAgent, Tracked};
pub use api::ScheduleApi;
pub use config::SyncConfig;
pub use error::SyncError;
pub use http::HttpApi;
pub use presenter::{ConflictPresenter, LogPresenter};
pub use session::SyncHandle;

/// Connect to a server at `base_url` over HTTP and its event channel
pub fn connect(
	base_url: &str,
	actor: Option<Actor>,
	config: SyncConfig,
	presenter: Arc<dyn ConflictPresenter>,
) -> Result<SyncHandle, SyncError> {
	let api = HttpApi::new(base_url, actor)?;
	let events_url = api.events_url()?;

	Ok(SyncHandle::start(Arc::new(api), Some(events_url), config, presenter))
}
