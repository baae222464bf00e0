use std::sync::Arc;

use agora_gateway::JwtIdentityVerifier;
use agora_server::app;
use agora_server::config::ServerConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agora=debug,agora_gateway=debug,agora_api=debug,tower_http=debug".into()
            }),
        )
        .init();

    // Config (loads .env first)
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };

    // Init database
    let db = agora_db::Database::open(&config.db_path)?;

    let ctx = app::gateway_context(
        db,
        Arc::new(JwtIdentityVerifier::new(&config.identity_secret)),
        config.gateway,
    );
    let router = app::router(ctx);

    let addr = config.addr()?;
    info!("Agora server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
