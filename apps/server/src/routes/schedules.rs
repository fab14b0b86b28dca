use std::sync::Arc;

use axum::{
	extract::{
		rejection::{JsonRejection, PathRejection, QueryRejection},
		Path, Query, State,
	},
	http::StatusCode,
	Json,
};
use sched_core::{Core, ListFilter};
use sched_types::{
	wire::{CreateRequest, EntityResponse, ListQuery, WriteRequest, WriteResponse},
	ScheduleEntity, ScheduleId,
};

use crate::error::ApiError;
use crate::extract::Caller;

pub(crate) fn parse_id(path: Result<Path<String>, PathRejection>) -> Result<ScheduleId, ApiError> {
	let Path(raw) = path.map_err(|e| ApiError::BadRequest(e.body_text()))?;
	raw.parse()
		.map_err(|_| ApiError::BadRequest(format!("`{raw}` is not a schedule id")))
}

pub async fn create_handler(
	State(core): State<Arc<Core>>,
	caller: Caller,
	body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EntityResponse>), ApiError> {
	let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

	let entity = core
		.schedules()
		.create(request.fields, caller.actor, caller.origin)
		.await?;

	Ok((StatusCode::CREATED, Json(entity.into())))
}

pub async fn list_handler(
	State(core): State<Arc<Core>>,
	query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<ScheduleEntity>>, ApiError> {
	let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

	let filter = ListFilter {
		school_year: query.school_year,
		semester: query.semester,
		include_archived: query.include_archived,
	};

	Ok(Json(core.schedules().list(&filter).await?))
}

pub async fn read_handler(
	State(core): State<Arc<Core>>,
	id: Result<Path<String>, PathRejection>,
) -> Result<Json<EntityResponse>, ApiError> {
	let id = parse_id(id)?;

	let entity = core
		.schedules()
		.get(id)
		.await?
		.ok_or(ApiError::NotFound)?;

	Ok(Json(entity.into()))
}

pub async fn write_handler(
	State(core): State<Arc<Core>>,
	caller: Caller,
	id: Result<Path<String>, PathRejection>,
	body: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<WriteResponse>, ApiError> {
	let id = parse_id(id)?;
	let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
	let expected = request
		.expected_version
		.ok_or(ApiError::ExpectedVersionRequired)?;

	let entity = core
		.schedules()
		.write(id, expected, &request.patch, caller.actor, caller.origin)
		.await?;

	Ok(Json(entity.into()))
}
