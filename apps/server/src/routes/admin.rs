//! Administrative corrective writes
//!
//! The only route that can write without an expected version. Every request must present
//! the configured admin token; without one configured the route refuses everything.

use std::sync::Arc;

use axum::{
	extract::{
		rejection::{JsonRejection, PathRejection},
		Path, State,
	},
	Json,
};
use sched_core::Core;
use sched_types::{
	wire::{ForceWriteRequest, WriteResponse},
	ScheduleId,
};

use super::schedules::parse_id;
use crate::error::ApiError;
use crate::extract::{BearerToken, Caller};

pub async fn force_write_handler(
	State(core): State<Arc<Core>>,
	BearerToken(token): BearerToken,
	caller: Caller,
	id: Result<Path<String>, PathRejection>,
	body: Result<Json<ForceWriteRequest>, JsonRejection>,
) -> Result<Json<WriteResponse>, ApiError> {
	let grant = core.authorize_admin(caller.actor, &token)?;
	let id: ScheduleId = parse_id(id)?;
	let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

	let entity = core
		.schedules()
		.force_write(id, grant, &request.patch, caller.origin)
		.await?;

	Ok(Json(entity.into()))
}
