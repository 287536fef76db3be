use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = statdoc_api::Args::parse();
	statdoc_api::run(args).await
}
