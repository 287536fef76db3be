use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub mod worker;

#[derive(Debug, Parser)]
#[command(
	version = statdoc_cli::VERSION,
	rename_all = "kebab",
	styles = statdoc_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
	/// Stable worker identity; generated when omitted.
	#[arg(long, value_name = "ID")]
	pub worker_id: Option<String>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = statdoc_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = statdoc_storage::db::Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let worker_id =
		args.worker_id.unwrap_or_else(|| format!("worker-{}", Uuid::new_v4().simple()));
	let store = Arc::new(statdoc_storage::PgJobStore::new(db.clone(), &config.queue));
	let generator =
		Arc::new(statdoc_service::HttpGenerator::new(config.providers.generation.clone()));
	let state = worker::WorkerState { db, store, generator, config: Arc::new(config), worker_id };

	worker::run_worker(state).await
}
