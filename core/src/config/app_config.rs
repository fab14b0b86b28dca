//! Server configuration

use super::default_data_dir;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_FILE: &str = "scheduler.json";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
	/// Config schema version
	pub version: u32,

	/// Data directory path
	pub data_dir: PathBuf,

	/// Address the HTTP server binds to
	#[serde(default = "default_bind")]
	pub bind: String,

	/// Port the HTTP server listens on
	#[serde(default = "default_port")]
	pub port: u16,

	/// Where schedule records live
	#[serde(default)]
	pub storage: StorageBackend,

	/// SQLite file name (relative to data_dir)
	#[serde(default = "default_database_file")]
	pub database_file: String,

	/// Bearer token for the administrative force-write route. Force writes are
	/// disabled while this is unset.
	#[serde(default)]
	pub admin_token: Option<String>,

	/// Logging level used when RUST_LOG is not set
	#[serde(default = "default_log_level")]
	pub log_level: String,

	/// Whether to also write a daily-rolling log file under `logs/`
	#[serde(default)]
	pub file_logging: bool,

	/// Change broadcast configuration
	#[serde(default)]
	pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
	/// Process-local map; contents are lost on restart
	Memory,
	#[default]
	Sqlite,
}

/// Configuration for the change broadcaster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
	/// Maximum number of concurrently connected sessions
	pub max_sessions: usize,

	/// Events queued per session before it is considered lagged and dropped
	pub queue_depth: usize,

	/// Skip delivering a write's event back to the session that issued it
	pub suppress_echo: bool,

	/// Seconds between heartbeat frames on the event channel
	pub heartbeat_secs: u64,
}

impl Default for BroadcastConfig {
	fn default() -> Self {
		Self {
			max_sessions: 512,
			queue_depth: 256,
			suppress_echo: true,
			heartbeat_secs: 15,
		}
	}
}

fn default_bind() -> String {
	"0.0.0.0".to_string()
}

fn default_port() -> u16 {
	8080
}

fn default_database_file() -> String {
	"schedules.db".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

impl ServerConfig {
	/// Current config schema version
	pub const fn target_version() -> u32 {
		2
	}

	/// Load configuration from the default location
	pub fn load() -> Result<Self> {
		let data_dir = default_data_dir()?;
		Self::load_from(&data_dir)
	}

	/// Load configuration from a specific data directory
	pub fn load_from(data_dir: &Path) -> Result<Self> {
		let config_path = data_dir.join(CONFIG_FILE);

		if config_path.exists() {
			info!("Loading config from {:?}", config_path);
			let json = fs::read_to_string(&config_path)?;
			let mut config: ServerConfig = serde_json::from_str(&json)?;

			if config.version < Self::target_version() {
				// Fields added since then carry serde defaults, so an upgrade is a re-save
				info!(
					"Upgrading config from v{} to v{}",
					config.version,
					Self::target_version()
				);
				config.version = Self::target_version();
				config.save()?;
			}

			Ok(config)
		} else {
			warn!("No config found, creating default at {:?}", config_path);
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		}
	}

	/// Load or create configuration
	pub fn load_or_create(data_dir: &Path) -> Result<Self> {
		Self::load_from(data_dir).or_else(|e| {
			warn!("Config at {:?} unreadable ({}), recreating", data_dir, e);
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		})
	}

	/// Create default configuration with specific data directory
	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			version: Self::target_version(),
			data_dir,
			bind: default_bind(),
			port: default_port(),
			storage: StorageBackend::default(),
			database_file: default_database_file(),
			admin_token: None,
			log_level: default_log_level(),
			file_logging: false,
			broadcast: BroadcastConfig::default(),
		}
	}

	/// Save configuration to disk
	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;

		let config_path = self.data_dir.join(CONFIG_FILE);
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)?;
		info!("Saved config to {:?}", config_path);
		Ok(())
	}

	/// Get the path of the SQLite database
	pub fn database_path(&self) -> PathBuf {
		self.data_dir.join(&self.database_file)
	}

	/// Get the path for logs directory
	pub fn logs_dir(&self) -> PathBuf {
		self.data_dir.join("logs")
	}

	/// Ensure all required directories exist
	pub fn ensure_directories(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;
		if self.file_logging {
			fs::create_dir_all(self.logs_dir())?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_creates_default_config_when_missing() {
		let dir = TempDir::new().unwrap();

		let config = ServerConfig::load_from(dir.path()).unwrap();

		assert_eq!(config.version, ServerConfig::target_version());
		assert_eq!(config.storage, StorageBackend::Sqlite);
		assert!(config.admin_token.is_none());
		assert!(dir.path().join(CONFIG_FILE).exists());
	}

	#[test]
	fn test_upgrades_old_config_and_keeps_values() {
		let dir = TempDir::new().unwrap();
		let old = serde_json::json!({
			"version": 1,
			"data_dir": dir.path(),
			"port": 9999,
		});
		fs::write(dir.path().join(CONFIG_FILE), old.to_string()).unwrap();

		let config = ServerConfig::load_from(dir.path()).unwrap();

		assert_eq!(config.version, ServerConfig::target_version());
		assert_eq!(config.port, 9999);
		assert_eq!(config.bind, "0.0.0.0");
		assert!(config.broadcast.suppress_echo);
	}

	#[test]
	fn test_load_or_create_recovers_from_garbage() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();

		let config = ServerConfig::load_or_create(dir.path()).unwrap();

		assert_eq!(config.port, 8080);
	}
}
