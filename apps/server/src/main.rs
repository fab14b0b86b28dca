use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sched_core::{default_data_dir, Core, ServerConfig, StorageBackend};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sched-server", about = "Class schedule server with live change broadcast")]
struct Cli {
	/// Data directory holding scheduler.json, the database and logs
	#[arg(long, env = "SCHED_DATA_DIR")]
	data_dir: Option<PathBuf>,

	/// Address to bind
	#[arg(long, env = "SCHED_BIND")]
	bind: Option<String>,

	/// Port to listen on
	#[arg(long, env = "SCHED_PORT")]
	port: Option<u16>,

	/// Storage backend
	#[arg(long, value_enum, env = "SCHED_STORAGE")]
	storage: Option<StorageArg>,

	/// Bearer token enabling the admin force-write route
	#[arg(long, env = "SCHED_ADMIN_TOKEN", hide_env_values = true)]
	admin_token: Option<String>,

	/// Log level used when RUST_LOG is unset
	#[arg(long)]
	log_level: Option<String>,

	/// Also write daily log files under <data-dir>/logs
	#[arg(long)]
	file_logging: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StorageArg {
	Memory,
	Sqlite,
}

impl From<StorageArg> for StorageBackend {
	fn from(arg: StorageArg) -> Self {
		match arg {
			StorageArg::Memory => StorageBackend::Memory,
			StorageArg::Sqlite => StorageBackend::Sqlite,
		}
	}
}

impl Cli {
	fn apply(self, config: &mut ServerConfig) {
		if let Some(bind) = self.bind {
			config.bind = bind;
		}
		if let Some(port) = self.port {
			config.port = port;
		}
		if let Some(storage) = self.storage {
			config.storage = storage.into();
		}
		if self.admin_token.is_some() {
			config.admin_token = self.admin_token;
		}
		if let Some(level) = self.log_level {
			config.log_level = level;
		}
		if self.file_logging {
			config.file_logging = true;
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let data_dir = match &cli.data_dir {
		Some(dir) => dir.clone(),
		None => default_data_dir()?,
	};
	let mut config = ServerConfig::load_or_create(&data_dir)?;
	config.data_dir = data_dir;
	cli.apply(&mut config);
	config.ensure_directories()?;

	init_tracing(&config.log_level, config.file_logging.then(|| config.logs_dir()).as_deref())?;

	info!(
		data_dir = %config.data_dir.display(),
		storage = ?config.storage,
		force_writes = config.admin_token.is_some(),
		"Starting schedule server"
	);

	let address = format!("{}:{}", config.bind, config.port);
	let core = Arc::new(Core::new(config).await?);

	let listener = TcpListener::bind(&address)
		.await
		.with_context(|| format!("binding {address}"))?;

	sched_server::serve(core, listener, sched_server::utils::shutdown_signal()).await
}

fn init_tracing(default_level: &str, logs_dir: Option<&Path>) -> Result<()> {
	use tracing_appender::rolling::{RollingFileAppender, Rotation};
	use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		EnvFilter::new(format!(
			"sched_server={default_level},sched_core={default_level},tower_http=info,warn"
		))
	});

	let file_layer = logs_dir.map(|dir| {
		let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "server.log");
		fmt::layer()
			.with_target(true)
			.with_ansi(false) // No ANSI colors in log files
			.with_writer(file_appender)
	});

	tracing_subscriber::registry()
		.with(env_filter)
		.with(fmt::layer().with_target(true))
		.with(file_layer)
		.try_init()
		.context("initializing tracing")?;

	Ok(())
}
