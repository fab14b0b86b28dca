//! Database infrastructure using SeaORM

use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;

/// SQLite connection for the schedule store
#[derive(Clone)]
pub struct Database {
	conn: DatabaseConnection,
}

impl Database {
	/// Open the database at `path`, creating the file if needed
	pub async fn open(path: &Path) -> Result<Self, DbErr> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)
				.map_err(|e| DbErr::Custom(format!("Failed to create directory: {}", e)))?;
		}

		let db_url = format!("sqlite://{}?mode=rwc", path.display());
		let conn = Self::connect(db_url, 8).await?;

		info!("Opened database at {:?}", path);

		Ok(Self { conn })
	}

	/// Private in-memory database. A single connection, since every pooled
	/// connection to `sqlite::memory:` would see its own empty database.
	pub async fn in_memory() -> Result<Self, DbErr> {
		let conn = Self::connect("sqlite::memory:".to_string(), 1).await?;
		Ok(Self { conn })
	}

	async fn connect(url: String, max_connections: u32) -> Result<DatabaseConnection, DbErr> {
		let mut opt = ConnectOptions::new(url);
		opt.max_connections(max_connections)
			.min_connections(1)
			.connect_timeout(Duration::from_secs(8))
			.sqlx_logging(false); // We'll use tracing instead

		SeaDatabase::connect(opt).await
	}

	/// Run migrations
	pub async fn migrate(&self) -> Result<(), DbErr> {
		migration::Migrator::up(&self.conn, None).await?;
		info!("Database migrations completed successfully");
		Ok(())
	}

	/// Get the database connection
	pub fn conn(&self) -> &DatabaseConnection {
		&self.conn
	}
}
