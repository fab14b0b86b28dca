//! Create the schedules table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Schedules::Table)
					.if_not_exists()
					.col(ColumnDef::new(Schedules::Id).uuid().not_null().primary_key())
					.col(
						ColumnDef::new(Schedules::Version)
							.big_integer()
							.not_null()
							.default(1),
					)
					.col(ColumnDef::new(Schedules::Fields).json().not_null())
					.col(ColumnDef::new(Schedules::SchoolYear).string().not_null())
					.col(ColumnDef::new(Schedules::Semester).string().not_null())
					.col(
						ColumnDef::new(Schedules::Archived)
							.boolean()
							.not_null()
							.default(false),
					)
					.col(
						ColumnDef::new(Schedules::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(ColumnDef::new(Schedules::UpdatedBy).string().not_null())
					.to_owned(),
			)
			.await?;

		// Listing filters on term
		manager
			.create_index(
				Index::create()
					.name("idx_schedules_term")
					.table(Schedules::Table)
					.col(Schedules::SchoolYear)
					.col(Schedules::Semester)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(Schedules::Table).to_owned())
			.await
	}
}

#[derive(DeriveIden)]
enum Schedules {
	Table,
	Id,
	Version,
	Fields,
	SchoolYear,
	Semester,
	Archived,
	UpdatedAt,
	UpdatedBy,
}
