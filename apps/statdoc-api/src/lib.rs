use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod routes;
pub mod state;

#[derive(Debug, Parser)]
#[command(
	version = statdoc_cli::VERSION,
	rename_all = "kebab",
	styles = statdoc_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = statdoc_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let bind = config.service.http_bind.clone();
	let state = state::AppState::new(config).await?;
	let router = routes::router(state);
	let listener = tokio::net::TcpListener::bind(&bind).await?;

	tracing::info!(%bind, "API listening.");
	axum::serve(listener, router).await?;

	Ok(())
}
