//! Schedule entry entity
//!
//! The field set is stored whole as JSON. `school_year`, `semester` and `archived` are
//! copied into their own columns so listing can filter in SQL.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "schedules")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: Uuid,
	pub version: i64,
	pub fields: Json,
	pub school_year: String,
	pub semester: String,
	pub archived: bool,
	pub updated_at: DateTimeUtc,
	pub updated_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
