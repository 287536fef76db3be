use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	let args = statdoc_worker::Args::parse();

	statdoc_worker::run(args).await
}
