use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = cutover_sync::Args::parse();
	cutover_sync::run(args).await
}
