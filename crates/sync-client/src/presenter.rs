use sched_types::{Transience, WriteFailure};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::agent::Notice;

/// Where user-facing notices go. Called from the session loop, so it must not block.
pub trait ConflictPresenter: Send + Sync + 'static {
	fn present(&self, notice: &Notice);
}

/// Writes notices to the log; the default when nothing renders them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl ConflictPresenter for LogPresenter {
	fn present(&self, notice: &Notice) {
		match notice {
			Notice::Conflict { id, reason } => {
				warn!(%id, ?reason, "Schedule changed by someone else, reload before editing")
			}
			Notice::EditBlocked { id } => warn!(%id, "Edit blocked until the conflict is resolved"),
			Notice::Rejected { id, failure } => {
				warn!(%id, "Change rejected: {} ({})", failure, next_step(failure))
			}
			Notice::ReloadFailed { id, failure } => {
				warn!(%id, "Reload failed: {} ({})", failure, next_step(failure))
			}
			Notice::Degraded { attempts } => {
				warn!(attempts, "Cannot reach the server, showing possibly outdated data")
			}
			Notice::Resolved { id } => info!(%id, "Conflict resolved"),
			Notice::Removed { id } => info!(%id, "Schedule removed on the server"),
			Notice::Saved { id, version } => info!(%id, %version, "Saved"),
			Notice::SaveNotApplied { id } => info!(%id, "Save did not reach the server, draft kept"),
			Notice::Recovered => info!("Connection to the server restored"),
		}
	}
}

/// Whether asking the user to simply try again makes sense
fn next_step(failure: &WriteFailure) -> &'static str {
	match failure.transience() {
		Transience::Retryable => "try again",
		Transience::Permanent => "fix the change or reload",
		Transience::Unknown => "reload to see what the server has",
	}
}

/// Hand notices to another task, e.g. a UI loop
impl ConflictPresenter for mpsc::UnboundedSender<Notice> {
	fn present(&self, notice: &Notice) {
		let _ = self.send(notice.clone());
	}
}
