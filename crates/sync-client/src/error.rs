use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
	#[error("invalid server url `{url}`: {reason}")]
	InvalidUrl { url: String, reason: String },

	#[error("failed to build http client: {0}")]
	Client(#[from] reqwest::Error),

	#[error("sync session has stopped")]
	Stopped,
}
