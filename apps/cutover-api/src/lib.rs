pub mod routes;
pub mod state;

use std::net::SocketAddr;

use tokio::net::TcpListener;

pub use cutover_cli::Args;

use crate::state::AppState;

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = cutover_config::load(&args.config)?;

	cutover_cli::init_tracing(&config.service.log_level);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let state = AppState::new(config).await?;
	let app = routes::router(state);
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(http_listener, app).await?;

	Ok(())
}
