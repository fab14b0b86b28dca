//! Server side of the class schedule concurrency core.
//!
//! [`Core`] owns the schedule store, the change broadcaster and the service that ties them
//! together. Transports (see `sched-server`) hold an `Arc<Core>` and call into
//! [`Core::schedules`].

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub mod config;
pub mod infra;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{default_data_dir, BroadcastConfig, ServerConfig, StorageBackend};
pub use infra::db::Database;
pub use infra::event::{BroadcastError, ChangeBroadcaster, DropReason, Subscription};
pub use infra::store::{
	Committed, ListFilter, MemoryStore, ScheduleStore, SqliteStore, StoreError, WriteError,
};
pub use infra::sync::{arbitrate, AdminGrant, AuthError, Expectation, Verdict, WriteSequencer};
pub use service::ScheduleService;

pub struct Core {
	config: ServerConfig,
	schedules: Arc<ScheduleService>,
}

impl Core {
	/// Open the configured store and start an empty session registry
	pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
		config.ensure_directories()?;

		let store: Arc<dyn ScheduleStore> = match config.storage {
			StorageBackend::Memory => {
				info!("Using in-memory schedule store");
				Arc::new(MemoryStore::new())
			}
			StorageBackend::Sqlite => {
				let path = config.database_path();
				let db = Database::open(&path)
					.await
					.with_context(|| format!("opening database at {}", path.display()))?;
				db.migrate().await.context("running migrations")?;
				Arc::new(SqliteStore::new(db))
			}
		};

		Ok(Self::with_store(config, store))
	}

	/// Assemble a core around an existing store
	pub fn with_store(config: ServerConfig, store: Arc<dyn ScheduleStore>) -> Self {
		let broadcaster = ChangeBroadcaster::new(config.broadcast.clone());
		let schedules = Arc::new(ScheduleService::new(store, broadcaster));

		Self { config, schedules }
	}

	pub fn config(&self) -> &ServerConfig {
		&self.config
	}

	pub fn schedules(&self) -> &Arc<ScheduleService> {
		&self.schedules
	}

	pub fn broadcaster(&self) -> &ChangeBroadcaster {
		self.schedules.broadcaster()
	}

	/// Check a bearer token presented on the administrative route
	pub fn authorize_admin(
		&self,
		actor: sched_types::Actor,
		presented: &str,
	) -> Result<AdminGrant, AuthError> {
		AdminGrant::authorize(actor, presented, self.config.admin_token.as_deref())
	}

	/// Disconnect every session; in-flight writes still complete
	pub fn shutdown(&self) {
		info!(
			sessions = self.broadcaster().session_count(),
			"Shutting down change broadcaster"
		);
		self.broadcaster().shutdown();
	}
}
