//! SQLite-backed schedule store
//!
//! Writes are a read followed by a conditional update:
//!
//! ```sql
//! UPDATE schedules SET version = :next, ... WHERE id = :id AND version = :observed
//! ```
//!
//! One affected row means this writer advanced the version. Zero means another writer got
//! there first, in which case the row is read again and the write re-decided against what
//! is now stored. For a regular write that re-decision is a stale verdict; only forced
//! writes can go round more than once.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
	ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
	SqlErr,
};
use sched_types::{
	Actor, ScheduleEntity, ScheduleFields, ScheduleId, SchedulePatch, Version,
};
use tracing::{debug, trace};

use super::{Committed, ListFilter, ScheduleStore, StoreError, WriteError};
use crate::infra::db::entities::schedule;
use crate::infra::db::Database;
use crate::infra::sync::{arbitrate, Expectation};

/// Attempts before a write that keeps losing the update race is abandoned
const MAX_ATTEMPTS: u32 = 8;

pub struct SqliteStore {
	db: Database,
}

impl SqliteStore {
	pub fn new(db: Database) -> Self {
		Self { db }
	}

	fn conn(&self) -> &DatabaseConnection {
		self.db.conn()
	}

	async fn load(&self, id: ScheduleId) -> Result<Option<ScheduleEntity>, StoreError> {
		schedule::Entity::find_by_id(id.as_uuid())
			.one(self.conn())
			.await?
			.map(into_entity)
			.transpose()
	}
}

fn into_entity(model: schedule::Model) -> Result<ScheduleEntity, StoreError> {
	let id = ScheduleId::from_uuid(model.id);
	let version = u64::try_from(model.version)
		.ok()
		.filter(|v| *v >= Version::INITIAL.get())
		.ok_or_else(|| StoreError::Corrupt {
			id,
			reason: format!("version {} out of range", model.version),
		})?;
	let fields: ScheduleFields = serde_json::from_value(model.fields)?;

	Ok(ScheduleEntity {
		id,
		version: Version::new(version),
		fields,
		updated_at: model.updated_at,
		updated_by: Actor::new(model.updated_by),
	})
}

fn column_version(id: ScheduleId, version: Version) -> Result<i64, StoreError> {
	i64::try_from(version.get()).map_err(|_| StoreError::VersionExhausted(id))
}

#[async_trait]
impl ScheduleStore for SqliteStore {
	async fn create(
		&self,
		id: ScheduleId,
		fields: ScheduleFields,
		actor: &Actor,
	) -> Result<ScheduleEntity, WriteError> {
		fields.validate()?;

		let entity = ScheduleEntity {
			id,
			version: Version::INITIAL,
			fields,
			updated_at: Utc::now(),
			updated_by: actor.clone(),
		};

		let model = schedule::ActiveModel {
			id: Set(id.as_uuid()),
			version: Set(column_version(id, entity.version)?),
			fields: Set(serde_json::to_value(&entity.fields).map_err(StoreError::from)?),
			school_year: Set(entity.fields.school_year.as_str().to_string()),
			semester: Set(entity.fields.semester.as_str().to_string()),
			archived: Set(entity.fields.archived),
			updated_at: Set(entity.updated_at),
			updated_by: Set(actor.as_str().to_string()),
		};

		schedule::Entity::insert(model)
			.exec_without_returning(self.conn())
			.await
			.map_err(|e| match e.sql_err() {
				Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Duplicate(id),
				_ => StoreError::Database(e),
			})?;

		Ok(entity)
	}

	async fn get(&self, id: ScheduleId) -> Result<Option<ScheduleEntity>, StoreError> {
		self.load(id).await
	}

	async fn list(&self, filter: &ListFilter) -> Result<Vec<ScheduleEntity>, StoreError> {
		let mut query = schedule::Entity::find();

		if !filter.include_archived {
			query = query.filter(schedule::Column::Archived.eq(false));
		}
		if let Some(year) = &filter.school_year {
			query = query.filter(schedule::Column::SchoolYear.eq(year.as_str()));
		}
		if let Some(semester) = filter.semester {
			query = query.filter(schedule::Column::Semester.eq(semester.as_str()));
		}

		query
			.order_by_asc(schedule::Column::Id)
			.all(self.conn())
			.await?
			.into_iter()
			.map(into_entity)
			.collect()
	}

	async fn write(
		&self,
		id: ScheduleId,
		expectation: &Expectation,
		patch: &SchedulePatch,
		actor: &Actor,
	) -> Result<Committed, WriteError> {
		for attempt in 1..=MAX_ATTEMPTS {
			let current = self.load(id).await?;

			let verdict = arbitrate(
				current.as_ref().map(|entity| entity.version),
				expectation.expected_version(),
			);
			WriteError::from_verdict(verdict, id, expectation)?;

			let Some(current) = current else {
				return Err(WriteError::NotFound(id));
			};

			let fields = patch.apply(&current.fields)?;
			let version = current
				.version
				.next()
				.ok_or(StoreError::VersionExhausted(id))?;
			let updated_at = Utc::now();

			let result = schedule::Entity::update_many()
				.col_expr(
					schedule::Column::Version,
					Expr::value(column_version(id, version)?),
				)
				.col_expr(
					schedule::Column::Fields,
					Expr::value(serde_json::to_value(&fields).map_err(StoreError::from)?),
				)
				.col_expr(
					schedule::Column::SchoolYear,
					Expr::value(fields.school_year.as_str()),
				)
				.col_expr(
					schedule::Column::Semester,
					Expr::value(fields.semester.as_str()),
				)
				.col_expr(schedule::Column::Archived, Expr::value(fields.archived))
				.col_expr(schedule::Column::UpdatedAt, Expr::value(updated_at))
				.col_expr(schedule::Column::UpdatedBy, Expr::value(actor.as_str()))
				.filter(schedule::Column::Id.eq(id.as_uuid()))
				.filter(schedule::Column::Version.eq(column_version(id, current.version)?))
				.exec(self.conn())
				.await
				.map_err(StoreError::from)?;

			if result.rows_affected == 1 {
				trace!(%id, %version, forced = expectation.is_forced(), "committed write");
				return Ok(Committed {
					previous: current.fields,
					entity: ScheduleEntity {
						id,
						version,
						fields,
						updated_at,
						updated_by: actor.clone(),
					},
				});
			}

			debug!(%id, attempt, "lost the update race, re-reading");
		}

		Err(StoreError::Contention {
			id,
			attempts: MAX_ATTEMPTS,
		}
		.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::infra::sync::AdminGrant;
	use crate::test_support::sample_fields;
	use std::sync::Arc;

	async fn store() -> SqliteStore {
		let db = Database::in_memory().await.unwrap();
		db.migrate().await.unwrap();
		SqliteStore::new(db)
	}

	fn section(name: &str) -> SchedulePatch {
		SchedulePatch {
			section: Some(name.to_string()),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn test_created_entry_reads_back() {
		let store = store().await;
		let id = ScheduleId::new();

		let created = store
			.create(id, sample_fields(), &Actor::new("registrar"))
			.await
			.unwrap();
		let loaded = store.get(id).await.unwrap().unwrap();

		assert_eq!(loaded.version, Version::INITIAL);
		assert_eq!(loaded.fields, created.fields);
		assert_eq!(loaded.updated_by, Actor::new("registrar"));
	}

	#[tokio::test]
	async fn test_duplicate_id_is_refused() {
		let store = store().await;
		let id = ScheduleId::new();
		let actor = Actor::anonymous();

		store.create(id, sample_fields(), &actor).await.unwrap();
		let err = store.create(id, sample_fields(), &actor).await.unwrap_err();

		assert!(matches!(err, WriteError::Store(StoreError::Duplicate(_))));
	}

	#[tokio::test]
	async fn test_second_writer_on_same_version_is_stale() {
		let store = store().await;
		let id = ScheduleId::new();
		let actor = Actor::anonymous();
		store.create(id, sample_fields(), &actor).await.unwrap();

		let first = store
			.write(id, &Expectation::Exact(Version::INITIAL), &section("A"), &actor)
			.await
			.unwrap();
		let second = store
			.write(id, &Expectation::Exact(Version::INITIAL), &section("B"), &actor)
			.await
			.unwrap_err();

		assert_eq!(first.entity.version, Version::new(2));
		assert!(matches!(
			second,
			WriteError::StaleVersion { current, .. } if current == Version::new(2)
		));
		assert_eq!(store.get(id).await.unwrap().unwrap().fields.section, "A");
	}

	#[tokio::test]
	async fn test_future_version_is_reported() {
		let store = store().await;
		let id = ScheduleId::new();
		let actor = Actor::anonymous();
		store.create(id, sample_fields(), &actor).await.unwrap();

		let err = store
			.write(id, &Expectation::Exact(Version::new(7)), &section("A"), &actor)
			.await
			.unwrap_err();

		assert!(matches!(err, WriteError::FutureVersion { .. }));
	}

	#[tokio::test]
	async fn test_concurrent_writers_exactly_one_wins() {
		let store = Arc::new(store().await);
		let id = ScheduleId::new();
		store
			.create(id, sample_fields(), &Actor::anonymous())
			.await
			.unwrap();

		let mut handles = Vec::new();
		for n in 0..8 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				store
					.write(
						id,
						&Expectation::Exact(Version::INITIAL),
						&section(&format!("S{n}")),
						&Actor::anonymous(),
					)
					.await
			}));
		}

		let mut accepted = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(_) => accepted += 1,
				Err(WriteError::StaleVersion { .. }) => {}
				Err(other) => panic!("unexpected error: {other}"),
			}
		}

		assert_eq!(accepted, 1);
		assert_eq!(store.get(id).await.unwrap().unwrap().version, Version::new(2));
	}

	#[tokio::test]
	async fn test_list_filters_by_term_and_archive_flag() {
		let store = store().await;
		let actor = Actor::anonymous();

		let first_sem = ScheduleId::new();
		store.create(first_sem, sample_fields(), &actor).await.unwrap();

		let mut summer = sample_fields();
		summer.semester = sched_types::Semester::Summer;
		store.create(ScheduleId::new(), summer, &actor).await.unwrap();

		let gone = ScheduleId::new();
		store.create(gone, sample_fields(), &actor).await.unwrap();
		store
			.write(
				gone,
				&Expectation::Force(AdminGrant::for_tests()),
				&SchedulePatch::archive(),
				&actor,
			)
			.await
			.unwrap();

		let listed = store
			.list(&ListFilter {
				semester: Some(sched_types::Semester::First),
				..Default::default()
			})
			.await
			.unwrap();

		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0].id, first_sem);
	}
}
