//! [`ScheduleApi`] over the server's JSON routes

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use sched_types::{
	wire::{EntityResponse, ErrorBody, WriteRequest, WriteResponse, ACTOR_HEADER, SESSION_HEADER},
	Actor, ScheduleEntity, ScheduleId, SchedulePatch, SessionId, Version, WriteFailure,
};
use tracing::debug;

use crate::{api::ScheduleApi, error::SyncError};

pub struct HttpApi {
	client: Client,
	base: Url,
	actor: Option<Actor>,
}

impl HttpApi {
	pub fn new(base_url: &str, actor: Option<Actor>) -> Result<Self, SyncError> {
		let invalid = |reason: String| SyncError::InvalidUrl {
			url: base_url.to_string(),
			reason,
		};

		let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
		if !matches!(base.scheme(), "http" | "https") {
			return Err(invalid("expected an http or https url".to_string()));
		}
		// `join` replaces the last segment unless the path ends in a slash
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}

		Ok(Self {
			client: Client::builder().build()?,
			base,
			actor,
		})
	}

	/// WebSocket address of the event channel on the same server
	pub fn events_url(&self) -> Result<Url, SyncError> {
		let mut url = self.base.clone();
		let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
		url.set_scheme(scheme).map_err(|_| SyncError::InvalidUrl {
			url: self.base.to_string(),
			reason: format!("cannot switch scheme to {scheme}"),
		})?;

		url.join("events").map_err(|e| SyncError::InvalidUrl {
			url: self.base.to_string(),
			reason: e.to_string(),
		})
	}

	fn url(&self, path: &str) -> Result<Url, WriteFailure> {
		self.base
			.join(path)
			.map_err(|e| WriteFailure::Transport(e.to_string()))
	}

	fn with_actor(&self, request: RequestBuilder) -> RequestBuilder {
		match &self.actor {
			Some(actor) => request.header(ACTOR_HEADER, actor.as_str()),
			None => request,
		}
	}
}

fn transport(error: reqwest::Error) -> WriteFailure {
	if error.is_timeout() {
		WriteFailure::TimedOut
	} else {
		WriteFailure::Transport(error.to_string())
	}
}

/// Turn a non-success response into a failure, using the error body when there is one
async fn rejection(response: Response, id: ScheduleId, claimed: Option<Version>) -> WriteFailure {
	let status = response.status();
	match response.json::<ErrorBody>().await {
		Ok(body) => {
			debug!(%id, %status, code = ?body.code, "Request rejected");
			body.into_write_failure(id, claimed)
		}
		Err(_) => WriteFailure::Transport(format!("unexpected response status {status}")),
	}
}

#[async_trait]
impl ScheduleApi for HttpApi {
	async fn read(&self, id: ScheduleId) -> Result<ScheduleEntity, WriteFailure> {
		let response = self
			.client
			.get(self.url(&format!("schedules/{id}"))?)
			.send()
			.await
			.map_err(transport)?;

		if !response.status().is_success() {
			return Err(rejection(response, id, None).await);
		}

		let body: EntityResponse = response.json().await.map_err(transport)?;
		Ok(body.entity)
	}

	async fn list(&self) -> Result<Vec<ScheduleEntity>, WriteFailure> {
		let response = self
			.client
			.get(self.url("schedules")?)
			.query(&[("include_archived", "true")])
			.send()
			.await
			.map_err(transport)?;

		let status = response.status();
		if !status.is_success() {
			let message = match response.json::<ErrorBody>().await {
				Ok(body) => body.message,
				Err(_) => format!("unexpected response status {status}"),
			};
			return Err(WriteFailure::Transport(message));
		}

		response.json().await.map_err(transport)
	}

	async fn write(
		&self,
		id: ScheduleId,
		expected: Version,
		patch: SchedulePatch,
		origin: Option<SessionId>,
	) -> Result<ScheduleEntity, WriteFailure> {
		let mut request = self
			.with_actor(self.client.put(self.url(&format!("schedules/{id}"))?))
			.json(&WriteRequest {
				expected_version: Some(expected),
				patch,
			});
		if let Some(origin) = origin {
			request = request.header(SESSION_HEADER, origin.to_string());
		}

		let response = request.send().await.map_err(transport)?;
		if !response.status().is_success() {
			return Err(rejection(response, id, Some(expected)).await);
		}

		let body: WriteResponse = response.json().await.map_err(transport)?;
		Ok(body.entity)
	}
}
