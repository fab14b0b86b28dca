//! Request metadata carried in headers

use axum::{
	async_trait,
	extract::FromRequestParts,
	http::{header::AUTHORIZATION, request::Parts},
};
use sched_types::{
	wire::{ACTOR_HEADER, SESSION_HEADER},
	Actor, SessionId,
};

use crate::error::ApiError;

/// Who is writing, and from which event-channel session
#[derive(Debug, Clone)]
pub struct Caller {
	pub actor: Actor,
	/// Session to leave out of the resulting broadcast
	pub origin: Option<SessionId>,
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let actor = match header_str(parts, ACTOR_HEADER)? {
			Some(name) if !name.trim().is_empty() => Actor::new(name.trim()),
			_ => Actor::anonymous(),
		};

		let origin = header_str(parts, SESSION_HEADER)?
			.map(|raw| {
				raw.parse::<SessionId>()
					.map_err(|_| ApiError::BadRequest(format!("invalid {SESSION_HEADER} header")))
			})
			.transpose()?;

		Ok(Caller { actor, origin })
	}
}

/// Token presented as `Authorization: Bearer <token>`
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let value = parts
			.headers
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.ok_or(ApiError::Unauthorized)?;

		let token = value
			.strip_prefix("Bearer ")
			.map(str::trim)
			.filter(|token| !token.is_empty())
			.ok_or(ApiError::Unauthorized)?;

		Ok(BearerToken(token.to_string()))
	}
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
	parts
		.headers
		.get(name)
		.map(|value| {
			value
				.to_str()
				.map_err(|_| ApiError::BadRequest(format!("{name} header is not valid text")))
		})
		.transpose()
}
