use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = cutover_api::Args::parse();
	cutover_api::run(args).await
}
