use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use sched_core::{AuthError, BroadcastError, StoreError, WriteError};
use sched_types::wire::{ErrorBody, ErrorCode};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
	#[error(transparent)]
	Write(#[from] WriteError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("schedule not found")]
	NotFound,

	#[error("expected_version is required; use the admin route for corrective writes")]
	ExpectedVersionRequired,

	#[error("missing or malformed bearer token")]
	Unauthorized,

	#[error(transparent)]
	Forbidden(#[from] AuthError),

	#[error("Malformed request: {0}")]
	BadRequest(String),

	#[error(transparent)]
	Unavailable(#[from] BroadcastError),
}

impl ApiError {
	fn status_and_body(&self) -> (StatusCode, ErrorBody) {
		let message = self.to_string();
		match self {
			ApiError::Write(WriteError::StaleVersion { current, .. }) => (
				StatusCode::CONFLICT,
				ErrorBody::new(ErrorCode::StaleVersion, message).with_current_version(*current),
			),
			ApiError::Write(WriteError::NotFound(_)) | ApiError::NotFound => (
				StatusCode::NOT_FOUND,
				ErrorBody::new(ErrorCode::NotFound, message),
			),
			ApiError::Write(WriteError::FutureVersion { current, .. }) => (
				StatusCode::BAD_REQUEST,
				ErrorBody::new(ErrorCode::ProtocolError, message).with_current_version(*current),
			),
			ApiError::Write(WriteError::Validation(_)) => (
				StatusCode::UNPROCESSABLE_ENTITY,
				ErrorBody::new(ErrorCode::ValidationFailed, message),
			),
			ApiError::Write(WriteError::Store(_)) | ApiError::Store(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				ErrorBody::new(ErrorCode::Internal, "internal storage error"),
			),
			ApiError::ExpectedVersionRequired => (
				StatusCode::BAD_REQUEST,
				ErrorBody::new(ErrorCode::ExpectedVersionRequired, message),
			),
			ApiError::Unauthorized => (
				StatusCode::UNAUTHORIZED,
				ErrorBody::new(ErrorCode::Unauthorized, message),
			),
			ApiError::Forbidden(_) => (
				StatusCode::FORBIDDEN,
				ErrorBody::new(ErrorCode::Forbidden, message),
			),
			ApiError::BadRequest(_) => (
				StatusCode::BAD_REQUEST,
				ErrorBody::new(ErrorCode::BadRequest, message),
			),
			ApiError::Unavailable(_) => (
				StatusCode::SERVICE_UNAVAILABLE,
				ErrorBody::new(ErrorCode::Unavailable, message),
			),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, body) = self.status_and_body();

		if status == StatusCode::INTERNAL_SERVER_ERROR {
			error!("Request failed: {}", self);
		}

		(status, Json(body)).into_response()
	}
}
