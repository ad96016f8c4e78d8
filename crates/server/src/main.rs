use anyhow::Context;
use gatehouse_server::{AppState, config::ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        database = ?config.database,
        pool = config.db_pool_size,
        "loading configuration"
    );

    let state = AppState::from_config(&config).await?;
    tracing::info!(store = state.backend.kind(), "session store ready");

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("starting server at http://{addr}");

    gatehouse_server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
    })
    .await
}
